//! Trigger automation engine.
//!
//! Watches each session's output, matches user rules against it and runs the
//! rules' actions. Processing of one chunk happens in two phases:
//!
//! 1. **Text pass**: every enabled regex / plain-text rule in scope is matched
//!    against the session buffer. A match consumes the buffer through its end,
//!    extracts capture variables and, unless cooldown, dedup or suppression
//!    holds it back, runs the rule's actions.
//! 2. **Variable pass**: every enabled variable-mode rule in scope evaluates
//!    its condition against the (possibly updated) session variables and fires
//!    on a false→true transition or on a variable change while true.
//!
//! Submodules:
//! - [`pattern`]: pattern compilation and the plain-text dialect
//! - [`condition`]: condition expressions for variable-mode rules
//! - [`stream`]: UTF-8 decoding, escape stripping, capped buffer, redraw check
//! - [`cooldown`]: per-(rule, session) cooldown and duplicate-match window
//! - [`transition`]: variable-mode edge detection
//! - [`variables`]: per-session variable store and `%name` interpolation
//! - [`actions`]: action dispatch through the collaborator traits
//! - [`engine`]: the orchestrator

pub mod actions;
pub mod condition;
pub mod cooldown;
pub mod engine;
pub mod pattern;
pub mod stream;
pub mod transition;
pub mod variables;

pub use condition::Condition;
pub use engine::{FiredTrigger, OutputReport, TriggerEngine};
pub use pattern::{CompiledPattern, PatternCache};
pub use variables::VariableStore;

/// Errors produced while compiling a trigger pattern.
#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    #[error("invalid regex: {0}")]
    Pattern(#[from] regex::Error),

    #[error("invalid condition at offset {position}: {message}")]
    Condition { position: usize, message: String },
}

impl TriggerError {
    pub fn condition(position: usize, message: impl Into<String>) -> Self {
        Self::Condition {
            position,
            message: message.into(),
        }
    }
}
