//! Collaborator contracts consumed by the trigger engine.
//!
//! The engine owns no I/O. Everything it reads (rules, session metadata,
//! PTY context) and everything it does (writing input, notifying, setting
//! session state, persisting variables) goes through the traits below, so the
//! engine can be driven by the real application or by mocks in tests.
//!
//! # Non-blocking contract
//!
//! The engine processes one output chunk to completion before the next one.
//! Implementations of the action-side traits must therefore *submit and
//! return*: hand the work to a channel, task or writer thread and report only
//! whether the submission was accepted. Errors are logged by the engine and
//! never stop the pipeline.

use std::sync::Arc;

use aiterm_config::{
    NotifySeverity, SessionStateTag, SessionVariables, TriggerConfig, TriggersConfig,
};
use parking_lot::RwLock;
use serde::Serialize;

// ── Rule source ─────────────────────────────────────────────────────────────

/// Read-only list of trigger rules, consulted on every chunk so live edits
/// take effect immediately.
pub trait RuleSource {
    fn rules(&self) -> Vec<TriggerConfig>;
}

impl RuleSource for Vec<TriggerConfig> {
    fn rules(&self) -> Vec<TriggerConfig> {
        self.clone()
    }
}

impl RuleSource for TriggersConfig {
    fn rules(&self) -> Vec<TriggerConfig> {
        self.triggers.clone()
    }
}

/// Rule list shared with an editor (e.g. the preferences window).
#[derive(Clone, Default)]
pub struct SharedRules(Arc<RwLock<Vec<TriggerConfig>>>);

impl SharedRules {
    pub fn new(rules: Vec<TriggerConfig>) -> Self {
        Self(Arc::new(RwLock::new(rules)))
    }

    /// Replace the whole list; the next chunk sees the new rules.
    pub fn replace(&self, rules: Vec<TriggerConfig>) {
        *self.0.write() = rules;
    }

    /// Edit the list in place.
    pub fn update(&self, f: impl FnOnce(&mut Vec<TriggerConfig>)) {
        f(&mut self.0.write());
    }
}

impl RuleSource for SharedRules {
    fn rules(&self) -> Vec<TriggerConfig> {
        self.0.read().clone()
    }
}

// ── Session registry ────────────────────────────────────────────────────────

/// What the host knows about a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionInfo {
    /// Owning workspace, used for trigger scoping.
    pub workspace_id: Option<String>,
    /// Title last reported by the program via OSC 0/2.
    pub terminal_title: Option<String>,
    /// Name the user gave the tab.
    pub name: String,
    /// The name actually shown in the tab bar after all fallbacks.
    pub display_name: String,
}

/// Where a session was when an auto-resume trigger fired.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AutoResumeContext {
    pub cwd: Option<String>,
    /// Full `ssh ...` command line when the session was inside a remote login.
    pub ssh_command: Option<String>,
    /// Working directory on the remote host, when the PTY reported one.
    pub remote_cwd: Option<String>,
    /// Command to run after reconnecting.
    pub command: Option<String>,
}

pub trait SessionRegistry {
    /// Resolve a session id. `None` for sessions the host does not know.
    fn session_info(&self, session_id: &str) -> Option<SessionInfo>;

    /// Store the auto-resume context so the host can reconnect the session
    /// after a restart.
    fn record_auto_resume(&self, session_id: &str, context: AutoResumeContext)
    -> anyhow::Result<()>;
}

// ── Action-side collaborators ───────────────────────────────────────────────

pub trait InputWriter {
    /// Queue `data` for the session's PTY input.
    fn write(&self, session_id: &str, data: &[u8]) -> anyhow::Result<()>;
}

pub trait NotificationDispatcher {
    fn dispatch(
        &self,
        title: &str,
        body: &str,
        severity: NotifySeverity,
        source_session_id: &str,
    ) -> anyhow::Result<()>;
}

pub trait SessionStateSetter {
    fn set_state(&self, session_id: &str, state: SessionStateTag) -> anyhow::Result<()>;
}

/// Snapshot of what is running in a PTY.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PtyContext {
    pub cwd: Option<String>,
    /// Command line of the foreground process group leader, if any.
    pub foreground_command: Option<String>,
    /// Directory the remote shell last reported (OSC 7) inside an ssh login.
    pub remote_cwd: Option<String>,
}

pub trait PtyInspector {
    fn context(&self, session_id: &str) -> anyhow::Result<PtyContext>;
}

pub trait VariablePersistence {
    fn persist(&self, session_id: &str, variables: &SessionVariables) -> anyhow::Result<()>;

    /// Variables saved for a restored session. Consulted once, on session load.
    fn load(&self, session_id: &str) -> anyhow::Result<SessionVariables>;
}

/// Every collaborator the engine talks to.
pub struct Collaborators {
    pub rules: Box<dyn RuleSource>,
    pub sessions: Box<dyn SessionRegistry>,
    pub input: Box<dyn InputWriter>,
    pub notifier: Box<dyn NotificationDispatcher>,
    pub state: Box<dyn SessionStateSetter>,
    pub pty: Box<dyn PtyInspector>,
    pub persistence: Box<dyn VariablePersistence>,
}
