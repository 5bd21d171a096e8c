//! Configuration system for the aiTerm trigger engine.
//!
//! This crate provides the data model the trigger engine reads, plus the file
//! formats it is loaded from and persisted to:
//!
//! - Trigger rule and action definitions ([`TriggerConfig`], [`TriggerActionConfig`])
//! - Engine tuning knobs ([`EngineSettings`])
//! - The YAML rules file ([`TriggersConfig`]) with load/save/validation
//! - The JSON state file holding per-session trigger variables ([`TriggerVariablesState`])

pub mod automation;
pub mod config;
pub mod defaults;
pub mod error;
pub mod state;

pub use automation::{
    CAPTURE_MARKER, MatchMode, NotifySeverity, SessionStateTag, TriggerActionConfig, TriggerConfig,
    VariableMapping,
};
pub use config::{EngineSettings, TriggersConfig};
pub use error::ConfigError;
pub use state::{SessionVariables, TriggerVariablesState};
