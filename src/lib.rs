// Library exports for the aiTerm trigger engine.
//
// The engine is driven from a single event loop: every method on
// `TriggerEngine` takes `&mut self`, so the engine itself holds no locks.
// Collaborators that are shared with other threads (rule lists edited from
// the preferences window, the variable state file) use `parking_lot` locks
// internally and must never block the caller for longer than a map update.

/// Application version (root crate version, for use by sub-crates).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[macro_use]
pub mod debug;

pub mod cli;
pub mod persistence;
pub mod replay;
pub mod traits;
pub mod triggers;

/// Configuration types re-exported from the `aiterm-config` crate.
pub use aiterm_config as config;

pub use triggers::{OutputReport, TriggerEngine};
