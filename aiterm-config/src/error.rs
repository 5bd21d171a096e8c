//! Typed error variants for the aiterm-config crate.
//!
//! Callers that only care about success can keep using `anyhow`; a
//! `ConfigError` converts into `anyhow::Error` automatically and can be
//! recovered with `downcast_ref`.
//!
//! # Example
//!
//! ```rust,no_run
//! use aiterm_config::ConfigError;
//!
//! fn check_load_err(e: &anyhow::Error) {
//!     if let Some(cfg_err) = e.downcast_ref::<ConfigError>() {
//!         match cfg_err {
//!             ConfigError::Io(io) => eprintln!("I/O error: {io}"),
//!             ConfigError::Parse(p) => eprintln!("YAML parse error: {p}"),
//!             ConfigError::Json(j) => eprintln!("state file error: {j}"),
//!             ConfigError::Validation(msg) => eprintln!("Validation: {msg}"),
//!         }
//!     }
//! }
//! ```

use thiserror::Error;

/// Errors that can occur when loading, saving or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An I/O error occurred reading or writing a config or state file.
    #[error("I/O error reading config: {0}")]
    Io(#[from] std::io::Error),

    /// The rules file contained invalid YAML.
    #[error("YAML parse error in config: {0}")]
    Parse(#[from] serde_yaml_ng::Error),

    /// The trigger variable state file contained invalid JSON.
    #[error("JSON error in trigger state file: {0}")]
    Json(#[from] serde_json::Error),

    /// A rule failed semantic validation.
    ///
    /// The inner string names the offending rule and the problem.
    #[error("Config validation error: {0}")]
    Validation(String),
}
