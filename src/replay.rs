//! Offline replay of captured session output.
//!
//! Feeds a recorded PTY stream through a [`TriggerEngine`] with dry-run
//! collaborators that record what each action *would* do. Used by the
//! `replay` CLI command to debug rules against real program output.

use std::sync::Arc;
use std::time::{Duration, Instant};

use aiterm_config::{
    NotifySeverity, SessionStateTag, SessionVariables, TriggerConfig, TriggersConfig,
};
use parking_lot::Mutex;
use serde::Serialize;

use crate::traits::{
    AutoResumeContext, Collaborators, InputWriter, NotificationDispatcher, PtyContext,
    PtyInspector, SessionInfo, SessionRegistry, SessionStateSetter, VariablePersistence,
};
use crate::triggers::{OutputReport, TriggerEngine};

/// Lines describing the actions taken during a replay, in order.
#[derive(Clone, Default)]
pub struct ActionLog(Arc<Mutex<Vec<String>>>);

impl ActionLog {
    fn push(&self, line: String) {
        self.0.lock().push(line);
    }

    pub fn lines(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

/// Stand-in for every collaborator. Nothing leaves the process.
#[derive(Clone)]
struct DryRun {
    log: ActionLog,
    workspace_id: Option<String>,
}

impl SessionRegistry for DryRun {
    fn session_info(&self, session_id: &str) -> Option<SessionInfo> {
        Some(SessionInfo {
            workspace_id: self.workspace_id.clone(),
            terminal_title: None,
            name: session_id.to_string(),
            display_name: session_id.to_string(),
        })
    }

    fn record_auto_resume(
        &self,
        session_id: &str,
        context: AutoResumeContext,
    ) -> anyhow::Result<()> {
        self.log.push(format!(
            "[{session_id}] arm_auto_resume {}",
            serde_json::to_string(&context)?
        ));
        Ok(())
    }
}

impl InputWriter for DryRun {
    fn write(&self, session_id: &str, data: &[u8]) -> anyhow::Result<()> {
        self.log.push(format!(
            "[{session_id}] send_text {:?}",
            String::from_utf8_lossy(data)
        ));
        Ok(())
    }
}

impl NotificationDispatcher for DryRun {
    fn dispatch(
        &self,
        title: &str,
        body: &str,
        severity: NotifySeverity,
        source_session_id: &str,
    ) -> anyhow::Result<()> {
        self.log.push(format!(
            "[{source_session_id}] notify ({severity:?}) {title:?}: {body:?}"
        ));
        Ok(())
    }
}

impl SessionStateSetter for DryRun {
    fn set_state(&self, session_id: &str, state: SessionStateTag) -> anyhow::Result<()> {
        self.log
            .push(format!("[{session_id}] set_session_state {state:?}"));
        Ok(())
    }
}

impl PtyInspector for DryRun {
    fn context(&self, _session_id: &str) -> anyhow::Result<PtyContext> {
        Ok(PtyContext {
            cwd: std::env::current_dir()
                .ok()
                .map(|p| p.to_string_lossy().to_string()),
            foreground_command: None,
            remote_cwd: None,
        })
    }
}

impl VariablePersistence for DryRun {
    fn persist(&self, session_id: &str, variables: &SessionVariables) -> anyhow::Result<()> {
        log::debug!("Replay: session {} variables now {:?}", session_id, variables);
        Ok(())
    }

    fn load(&self, _session_id: &str) -> anyhow::Result<SessionVariables> {
        Ok(SessionVariables::new())
    }
}

#[derive(Debug, Clone)]
pub struct ReplayOptions {
    pub session_id: String,
    pub workspace_id: Option<String>,
    /// Bytes per simulated PTY read.
    pub chunk_size: usize,
    /// Simulated time between reads; drives cooldowns and the duplicate window.
    pub chunk_interval: Duration,
    /// Replay with actions suppressed (as for restored scrollback).
    pub suppress: bool,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            session_id: "replay".to_string(),
            workspace_id: None,
            chunk_size: 1024,
            chunk_interval: Duration::from_millis(100),
            suppress: false,
        }
    }
}

/// One chunk that fired or held back at least one rule.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkEvent {
    pub chunk: usize,
    pub offset: usize,
    #[serde(flatten)]
    pub report: OutputReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplaySummary {
    pub chunks: usize,
    pub events: Vec<ChunkEvent>,
    /// Lines recorded by the dry-run collaborators.
    pub actions: Vec<String>,
    pub variables: SessionVariables,
}

impl ReplaySummary {
    pub fn fired_count(&self) -> usize {
        self.events.iter().map(|e| e.report.fired.len()).sum()
    }

    pub fn held_count(&self) -> usize {
        self.events.iter().map(|e| e.report.held.len()).sum()
    }
}

pub fn replay(config: &TriggersConfig, data: &[u8], options: &ReplayOptions) -> ReplaySummary {
    let log = ActionLog::default();
    let dry = DryRun {
        log: log.clone(),
        workspace_id: options.workspace_id.clone(),
    };
    let rules: Vec<TriggerConfig> = config.triggers.clone();
    let collaborators = Collaborators {
        rules: Box::new(rules),
        sessions: Box::new(dry.clone()),
        input: Box::new(dry.clone()),
        notifier: Box::new(dry.clone()),
        state: Box::new(dry.clone()),
        pty: Box::new(dry.clone()),
        persistence: Box::new(dry),
    };

    let mut engine = TriggerEngine::new(config.settings.clone(), collaborators);
    let session = options.session_id.as_str();
    engine.on_session_load(session);
    engine.set_suppressed(session, options.suppress);

    let mut now = Instant::now();
    let mut events = Vec::new();
    let mut chunks = 0;
    for (index, chunk) in data.chunks(options.chunk_size.max(1)).enumerate() {
        if index > 0 {
            // The simulated clock stops at the last representable instant.
            now = now.checked_add(options.chunk_interval).unwrap_or(now);
        }
        let report = engine.on_session_output_at(session, chunk, now);
        chunks += 1;
        if !report.fired.is_empty() || !report.held.is_empty() {
            events.push(ChunkEvent {
                chunk: index,
                offset: index * options.chunk_size.max(1),
                report,
            });
        }
    }

    let variables = engine.variables(session).cloned().unwrap_or_default();
    ReplaySummary {
        chunks,
        events,
        actions: log.lines(),
        variables,
    }
}
