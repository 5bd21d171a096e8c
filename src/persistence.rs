//! File-backed trigger variable persistence.
//!
//! Keeps the whole state file in memory and rewrites it on every change.
//! Changes are rare (a variable only persists when its value differs), so a
//! full rewrite is cheaper than tracking dirty sessions.

use std::path::{Path, PathBuf};

use aiterm_config::{SessionVariables, TriggerVariablesState};
use parking_lot::Mutex;

use crate::traits::VariablePersistence;

pub struct FileVariablePersistence {
    path: PathBuf,
    state: Mutex<TriggerVariablesState>,
}

impl FileVariablePersistence {
    /// Open the state file at `path`; an unreadable file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = TriggerVariablesState::load_or_default(&path);
        log::info!(
            "Loaded trigger variables for {} session(s) from {:?}",
            state.sessions.len(),
            path
        );
        Self {
            path,
            state: Mutex::new(state),
        }
    }

    /// Open the state file in the platform data directory.
    pub fn open_default() -> Self {
        Self::open(TriggerVariablesState::state_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drop a session's saved variables, e.g. when its tab is closed for good.
    pub fn forget(&self, session_id: &str) -> anyhow::Result<()> {
        let mut state = self.state.lock();
        if state.session(session_id).is_none() {
            return Ok(());
        }
        state.set_session(session_id, SessionVariables::new());
        state.save_to(&self.path)?;
        Ok(())
    }
}

impl VariablePersistence for FileVariablePersistence {
    fn persist(&self, session_id: &str, variables: &SessionVariables) -> anyhow::Result<()> {
        let mut state = self.state.lock();
        state.set_session(session_id, variables.clone());
        state.save_to(&self.path)?;
        Ok(())
    }

    fn load(&self, session_id: &str) -> anyhow::Result<SessionVariables> {
        Ok(self
            .state
            .lock()
            .session(session_id)
            .cloned()
            .unwrap_or_default())
    }
}
