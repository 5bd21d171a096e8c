//! Shared integration test helpers for aiterm-triggers.
//!
//! Provides recording mock collaborators and a small harness around
//! `TriggerEngine` with a controllable clock.
//!
//! # Usage
//!
//! ```ignore
//! mod common;
//! use common::Harness;
//! ```
//!
//! The `#[allow(dead_code)]` attribute suppresses warnings when only a subset
//! of helpers is used per test file.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use aiterm_triggers::config::{
    EngineSettings, NotifySeverity, SessionStateTag, SessionVariables, TriggerConfig,
};
use aiterm_triggers::traits::{
    AutoResumeContext, Collaborators, InputWriter, NotificationDispatcher, PtyContext,
    PtyInspector, SessionInfo, SessionRegistry, SessionStateSetter, SharedRules,
    VariablePersistence,
};
use aiterm_triggers::{OutputReport, TriggerEngine};
use parking_lot::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub severity: NotifySeverity,
    pub session_id: String,
}

/// Everything the mock collaborators were asked to do.
#[derive(Clone, Default)]
pub struct Recorder {
    inputs: Arc<Mutex<Vec<(String, String)>>>,
    notifications: Arc<Mutex<Vec<Notification>>>,
    states: Arc<Mutex<Vec<(String, SessionStateTag)>>>,
    auto_resumes: Arc<Mutex<Vec<(String, AutoResumeContext)>>>,
    persisted: Arc<Mutex<Vec<(String, SessionVariables)>>>,
    /// Action kinds whose collaborator call should fail.
    failing: Arc<Mutex<HashSet<&'static str>>>,
    sessions: Arc<Mutex<HashMap<String, SessionInfo>>>,
    saved: Arc<Mutex<HashMap<String, SessionVariables>>>,
    pty: Arc<Mutex<PtyContext>>,
}

impl Recorder {
    pub fn inputs(&self) -> Vec<(String, String)> {
        self.inputs.lock().clone()
    }

    pub fn sent_text(&self) -> Vec<String> {
        self.inputs.lock().iter().map(|(_, t)| t.clone()).collect()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().clone()
    }

    pub fn states(&self) -> Vec<(String, SessionStateTag)> {
        self.states.lock().clone()
    }

    pub fn auto_resumes(&self) -> Vec<(String, AutoResumeContext)> {
        self.auto_resumes.lock().clone()
    }

    pub fn persisted(&self) -> Vec<(String, SessionVariables)> {
        self.persisted.lock().clone()
    }

    pub fn fail(&self, kind: &'static str) {
        self.failing.lock().insert(kind);
    }

    pub fn add_session(&self, session_id: &str, info: SessionInfo) {
        self.sessions.lock().insert(session_id.to_string(), info);
    }

    /// Variables returned by `VariablePersistence::load` for `session_id`.
    pub fn save_variables(&self, session_id: &str, vars: SessionVariables) {
        self.saved.lock().insert(session_id.to_string(), vars);
    }

    pub fn set_pty(&self, context: PtyContext) {
        *self.pty.lock() = context;
    }

    fn check(&self, kind: &'static str) -> anyhow::Result<()> {
        if self.failing.lock().contains(kind) {
            anyhow::bail!("mock {kind} failure");
        }
        Ok(())
    }
}

impl SessionRegistry for Recorder {
    fn session_info(&self, session_id: &str) -> Option<SessionInfo> {
        self.sessions.lock().get(session_id).cloned()
    }

    fn record_auto_resume(
        &self,
        session_id: &str,
        context: AutoResumeContext,
    ) -> anyhow::Result<()> {
        self.check("arm_auto_resume")?;
        self.auto_resumes
            .lock()
            .push((session_id.to_string(), context));
        Ok(())
    }
}

impl InputWriter for Recorder {
    fn write(&self, session_id: &str, data: &[u8]) -> anyhow::Result<()> {
        self.check("send_text")?;
        self.inputs.lock().push((
            session_id.to_string(),
            String::from_utf8_lossy(data).to_string(),
        ));
        Ok(())
    }
}

impl NotificationDispatcher for Recorder {
    fn dispatch(
        &self,
        title: &str,
        body: &str,
        severity: NotifySeverity,
        source_session_id: &str,
    ) -> anyhow::Result<()> {
        self.check("notify")?;
        self.notifications.lock().push(Notification {
            title: title.to_string(),
            body: body.to_string(),
            severity,
            session_id: source_session_id.to_string(),
        });
        Ok(())
    }
}

impl SessionStateSetter for Recorder {
    fn set_state(&self, session_id: &str, state: SessionStateTag) -> anyhow::Result<()> {
        self.check("set_session_state")?;
        self.states.lock().push((session_id.to_string(), state));
        Ok(())
    }
}

impl PtyInspector for Recorder {
    fn context(&self, _session_id: &str) -> anyhow::Result<PtyContext> {
        Ok(self.pty.lock().clone())
    }
}

impl VariablePersistence for Recorder {
    fn persist(&self, session_id: &str, variables: &SessionVariables) -> anyhow::Result<()> {
        self.persisted
            .lock()
            .push((session_id.to_string(), variables.clone()));
        Ok(())
    }

    fn load(&self, session_id: &str) -> anyhow::Result<SessionVariables> {
        Ok(self.saved.lock().get(session_id).cloned().unwrap_or_default())
    }
}

/// Engine wired to a [`Recorder`], with a clock starting at `t0`.
pub struct Harness {
    pub engine: TriggerEngine,
    pub recorder: Recorder,
    pub rules: SharedRules,
    pub t0: Instant,
}

impl Harness {
    pub fn new(rules: Vec<TriggerConfig>) -> Self {
        Self::with_settings(rules, EngineSettings::default())
    }

    pub fn with_settings(rules: Vec<TriggerConfig>, settings: EngineSettings) -> Self {
        let recorder = Recorder::default();
        let shared = SharedRules::new(rules);
        let collaborators = Collaborators {
            rules: Box::new(shared.clone()),
            sessions: Box::new(recorder.clone()),
            input: Box::new(recorder.clone()),
            notifier: Box::new(recorder.clone()),
            state: Box::new(recorder.clone()),
            pty: Box::new(recorder.clone()),
            persistence: Box::new(recorder.clone()),
        };
        Self {
            engine: TriggerEngine::new(settings, collaborators),
            recorder,
            rules: shared,
            t0: Instant::now(),
        }
    }

    /// Feed `text` to `session` at `secs` seconds after `t0`.
    pub fn feed_at(&mut self, session: &str, text: &str, secs: u64) -> OutputReport {
        self.feed_bytes_at(session, text.as_bytes(), Duration::from_secs(secs))
    }

    pub fn feed(&mut self, session: &str, text: &str) -> OutputReport {
        self.feed_at(session, text, 0)
    }

    pub fn feed_bytes_at(&mut self, session: &str, bytes: &[u8], after: Duration) -> OutputReport {
        self.engine
            .on_session_output_at(session, bytes, self.t0 + after)
    }
}

pub fn vars(pairs: &[(&str, &str)]) -> SessionVariables {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn session_in_workspace(workspace: &str) -> SessionInfo {
    SessionInfo {
        workspace_id: Some(workspace.to_string()),
        ..Default::default()
    }
}
