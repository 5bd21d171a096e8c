//! Persisted trigger variables.
//!
//! Variables extracted by triggers survive restarts so that variable-condition
//! triggers can be re-seeded when a session is restored. The file is plain
//! JSON keyed by session id.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Variable map for one session, ordered by name.
pub type SessionVariables = BTreeMap<String, String>;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TriggerVariablesState {
    #[serde(default)]
    pub sessions: BTreeMap<String, SessionVariables>,
}

impl TriggerVariablesState {
    /// Default state file location under the platform data directory.
    pub fn state_path() -> PathBuf {
        dirs::data_dir()
            .map(|p| p.join("aiterm").join("trigger-variables.json"))
            .unwrap_or_else(|| PathBuf::from("trigger-variables.json"))
    }

    /// Read the state file. A missing file is an empty state.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Like [`load_from`](Self::load_from), but a damaged file is logged and
    /// treated as empty instead of failing startup.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load_from(path) {
            Ok(state) => state,
            Err(e) => {
                log::warn!("Ignoring unreadable trigger state {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Write the state file atomically.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, &json)?;
        fs::rename(&temp_path, path)?;
        log::debug!("Saved trigger variables to {:?} ({} bytes)", path, json.len());
        Ok(())
    }

    pub fn session(&self, session_id: &str) -> Option<&SessionVariables> {
        self.sessions.get(session_id)
    }

    /// Replace one session's variables. An empty map removes the entry.
    pub fn set_session(&mut self, session_id: &str, vars: SessionVariables) {
        if vars.is_empty() {
            self.sessions.remove(session_id);
        } else {
            self.sessions.insert(session_id.to_string(), vars);
        }
    }
}
