//! The trigger engine: per-chunk orchestration and session lifecycle.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use aiterm_config::{EngineSettings, MatchMode, SessionVariables, TriggerConfig};
use serde::Serialize;

use super::actions::{ActionExecutor, ActionOutcome};
use super::cooldown::{CooldownTracker, Gate};
use super::pattern::{CompiledPattern, PatternCache};
use super::stream::SessionBuffer;
use super::transition::TransitionTracker;
use super::variables::{VariableStore, extract_captures};
use crate::traits::Collaborators;

/// A rule that ran its actions during one chunk.
#[derive(Debug, Clone, Serialize)]
pub struct FiredTrigger {
    pub trigger_id: String,
    pub name: String,
    /// Matched text for text-mode rules; `None` for variable-mode rules.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched: Option<String>,
    pub actions: Vec<ActionOutcome>,
}

/// Why a match or transition did not run its actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldReason {
    Cooldown,
    Duplicate,
    Suppressed,
}

#[derive(Debug, Clone, Serialize)]
pub struct HeldTrigger {
    pub trigger_id: String,
    pub reason: HoldReason,
}

/// What happened while processing one chunk.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OutputReport {
    /// The chunk looked like a repaint and replaced the buffer.
    pub redraw: bool,
    pub fired: Vec<FiredTrigger>,
    pub held: Vec<HeldTrigger>,
    /// At least one session variable changed value.
    pub variables_changed: bool,
}

impl OutputReport {
    pub fn fired_ids(&self) -> Vec<&str> {
        self.fired.iter().map(|f| f.trigger_id.as_str()).collect()
    }

    pub fn held_reason(&self, trigger_id: &str) -> Option<HoldReason> {
        self.held
            .iter()
            .find(|h| h.trigger_id == trigger_id)
            .map(|h| h.reason)
    }
}

/// Owns every piece of per-session trigger state.
///
/// Driven from a single event loop: call [`on_session_output`] for each PTY
/// chunk, [`on_session_load`] when a session is restored and
/// [`on_session_teardown`] when it closes.
///
/// [`on_session_output`]: TriggerEngine::on_session_output
/// [`on_session_load`]: TriggerEngine::on_session_load
/// [`on_session_teardown`]: TriggerEngine::on_session_teardown
pub struct TriggerEngine {
    settings: EngineSettings,
    collaborators: Collaborators,
    patterns: PatternCache,
    buffers: HashMap<String, SessionBuffer>,
    cooldowns: CooldownTracker,
    transitions: TransitionTracker,
    variables: VariableStore,
    suppressed: HashSet<String>,
}

impl TriggerEngine {
    pub fn new(settings: EngineSettings, collaborators: Collaborators) -> Self {
        let dedup_window = Duration::from_secs(settings.dedup_window_secs);
        Self {
            settings,
            collaborators,
            patterns: PatternCache::new(),
            buffers: HashMap::new(),
            cooldowns: CooldownTracker::new(dedup_window),
            transitions: TransitionTracker::new(),
            variables: VariableStore::new(),
            suppressed: HashSet::new(),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn on_session_output(&mut self, session_id: &str, bytes: &[u8]) -> OutputReport {
        self.on_session_output_at(session_id, bytes, Instant::now())
    }

    /// Process one output chunk as of `now`.
    pub fn on_session_output_at(
        &mut self,
        session_id: &str,
        bytes: &[u8],
        now: Instant,
    ) -> OutputReport {
        let rules = self.collaborators.rules.rules();
        let workspace = self.workspace_of(session_id);
        let capacity = self.settings.buffer_capacity;

        let redraw = self
            .buffers
            .entry(session_id.to_string())
            .or_insert_with(|| SessionBuffer::new(capacity))
            .ingest(bytes);
        crate::debug_trace!(
            "TRIGGER",
            "session={} chunk={}B redraw={} buffer={:?}",
            session_id,
            bytes.len(),
            redraw,
            self.buffers.get(session_id).map(SessionBuffer::text)
        );

        let mut report = OutputReport {
            redraw,
            ..Default::default()
        };

        for rule in in_scope(&rules, workspace.as_deref()).filter(|r| r.mode.is_text()) {
            self.match_text_rule(rule, session_id, now, &mut report);
        }

        for rule in in_scope(&rules, workspace.as_deref()).filter(|r| r.mode == MatchMode::Variable)
        {
            self.evaluate_variable_rule(rule, session_id, now, &mut report);
        }

        self.patterns.evict_unused(&rules);
        report
    }

    fn match_text_rule(
        &mut self,
        rule: &TriggerConfig,
        session_id: &str,
        now: Instant,
        report: &mut OutputReport,
    ) {
        let compiled = self.patterns.get(&rule.pattern, rule.mode);
        let CompiledPattern::Text(regex) = compiled.as_ref() else {
            return;
        };
        let Some(buffer) = self.buffers.get_mut(session_id) else {
            return;
        };

        let (matched, end, updates) = {
            // Patterns like `\d*` can match empty text first; only a non-empty
            // match counts.
            let Some((caps, whole)) = regex
                .captures_iter(buffer.text())
                .find_map(|caps| caps.get(0).filter(|m| !m.is_empty()).map(|m| (caps, m)))
            else {
                return;
            };
            (
                whole.as_str().to_string(),
                whole.end(),
                extract_captures(&caps, &rule.variables),
            )
        };
        buffer.consume_through(end);
        log::debug!(
            "Trigger {} matched {:?} in session {}",
            rule.id,
            matched,
            session_id
        );

        if self.variables.apply(session_id, updates) {
            report.variables_changed = true;
            self.persist_variables(session_id);
        }

        let gate = if self.suppressed.contains(session_id) {
            Some(HoldReason::Suppressed)
        } else {
            match self.cooldowns.check_match(
                &rule.id,
                session_id,
                Duration::from_secs(rule.cooldown_secs),
                &matched,
                now,
            ) {
                Gate::Open => None,
                Gate::CoolingDown => Some(HoldReason::Cooldown),
                Gate::Duplicate => Some(HoldReason::Duplicate),
            }
        };

        if let Some(reason) = gate {
            log::debug!(
                "Trigger {} held back in session {}: {:?}",
                rule.id,
                session_id,
                reason
            );
            report.held.push(HeldTrigger {
                trigger_id: rule.id.clone(),
                reason,
            });
            return;
        }

        self.cooldowns
            .record_fire(&rule.id, session_id, Some(&matched), now);
        self.fire(rule, session_id, Some(matched), report);
    }

    fn evaluate_variable_rule(
        &mut self,
        rule: &TriggerConfig,
        session_id: &str,
        now: Instant,
        report: &mut OutputReport,
    ) {
        let compiled = self.patterns.get(&rule.pattern, rule.mode);
        let CompiledPattern::Condition(condition) = compiled.as_ref() else {
            return;
        };

        let snapshot = self.variables.snapshot(session_id);
        let result = condition.evaluate(&snapshot);
        if !self
            .transitions
            .observe(&rule.id, session_id, result, &snapshot)
        {
            return;
        }

        let reason = if self.suppressed.contains(session_id) {
            Some(HoldReason::Suppressed)
        } else if !self.cooldowns.cooldown_elapsed(
            &rule.id,
            session_id,
            Duration::from_secs(rule.cooldown_secs),
            now,
        ) {
            Some(HoldReason::Cooldown)
        } else {
            None
        };

        if let Some(reason) = reason {
            log::debug!(
                "Variable trigger {} transition consumed without firing in session {}: {:?}",
                rule.id,
                session_id,
                reason
            );
            report.held.push(HeldTrigger {
                trigger_id: rule.id.clone(),
                reason,
            });
            return;
        }

        self.cooldowns.record_fire(&rule.id, session_id, None, now);
        self.fire(rule, session_id, None, report);
    }

    fn fire(
        &self,
        rule: &TriggerConfig,
        session_id: &str,
        matched: Option<String>,
        report: &mut OutputReport,
    ) {
        crate::debug_info!(
            "TRIGGER",
            "fired trigger_id={} name={:?} session={} matched={:?}",
            rule.id,
            rule.name,
            session_id,
            matched
        );
        let actions = ActionExecutor::new(&self.collaborators, &self.variables).run(rule, session_id);
        report.fired.push(FiredTrigger {
            trigger_id: rule.id.clone(),
            name: rule.name.clone(),
            matched,
            actions,
        });
    }

    /// Restore a session's variables and seed variable-mode rules so that
    /// conditions already true at restore time do not fire.
    pub fn on_session_load(&mut self, session_id: &str) {
        let loaded = match self.collaborators.persistence.load(session_id) {
            Ok(vars) => vars,
            Err(e) => {
                log::warn!(
                    "Failed to load trigger variables for session {}: {:#}",
                    session_id,
                    e
                );
                SessionVariables::new()
            }
        };
        crate::debug_info!(
            "TRIGGER",
            "session load session={} variables={}",
            session_id,
            loaded.len()
        );
        self.variables.seed(session_id, loaded);

        let rules = self.collaborators.rules.rules();
        let workspace = self.workspace_of(session_id);
        let snapshot = self.variables.snapshot(session_id);
        for rule in in_scope(&rules, workspace.as_deref()).filter(|r| r.mode == MatchMode::Variable)
        {
            let compiled = self.patterns.get(&rule.pattern, rule.mode);
            if let CompiledPattern::Condition(condition) = compiled.as_ref() {
                let result = condition.evaluate(&snapshot);
                self.transitions
                    .record(&rule.id, session_id, result, &snapshot);
            }
        }
    }

    /// Forget everything the engine holds for a closed session.
    pub fn on_session_teardown(&mut self, session_id: &str) {
        self.buffers.remove(session_id);
        self.cooldowns.purge_session(session_id);
        self.transitions.purge_session(session_id);
        self.variables.remove_session(session_id);
        self.suppressed.remove(session_id);
        crate::debug_info!("TRIGGER", "session teardown session={}", session_id);
    }

    /// While set, matches still consume output and update variables but no
    /// actions run. Used while restored scrollback is replayed.
    pub fn set_suppressed(&mut self, session_id: &str, suppressed: bool) {
        if suppressed {
            self.suppressed.insert(session_id.to_string());
        } else {
            self.suppressed.remove(session_id);
        }
    }

    pub fn is_suppressed(&self, session_id: &str) -> bool {
        self.suppressed.contains(session_id)
    }

    /// Interpolate `%name` references with the session's variables.
    pub fn resolve(&self, session_id: &str, template: &str, clear_unresolved: bool) -> String {
        self.variables
            .resolve(session_id, template, clear_unresolved)
    }

    pub fn variables(&self, session_id: &str) -> Option<&SessionVariables> {
        self.variables.get(session_id)
    }

    pub fn buffer_text(&self, session_id: &str) -> Option<&str> {
        self.buffers.get(session_id).map(SessionBuffer::text)
    }

    /// Number of compiled patterns currently held.
    pub fn cached_pattern_count(&self) -> usize {
        self.patterns.len()
    }

    fn workspace_of(&self, session_id: &str) -> Option<String> {
        self.collaborators
            .sessions
            .session_info(session_id)
            .and_then(|info| info.workspace_id)
    }

    fn persist_variables(&self, session_id: &str) {
        let Some(vars) = self.variables.get(session_id) else {
            return;
        };
        log::debug!(
            "Trigger variables changed in session {}: {:?}",
            session_id,
            vars
        );
        if let Err(e) = self.collaborators.persistence.persist(session_id, vars) {
            log::warn!(
                "Failed to persist trigger variables for session {}: {:#}",
                session_id,
                e
            );
        }
    }
}

/// Enabled rules that apply to a session in `workspace`, in config order.
fn in_scope<'a>(
    rules: &'a [TriggerConfig],
    workspace: Option<&'a str>,
) -> impl Iterator<Item = &'a TriggerConfig> + 'a {
    rules
        .iter()
        .filter(move |rule| rule.enabled && rule.applies_to_workspace(workspace))
}
