//! Edge detection for variable-mode rules.
//!
//! A variable-mode rule fires when its condition becomes true, and again when
//! the session's variables change while it stays true. Holding true with the
//! same variables does not fire.

use std::collections::HashMap;

use aiterm_config::SessionVariables;

#[derive(Debug, Default, Clone)]
struct TransitionState {
    last_result: bool,
    /// Variables at the last evaluation that came out true.
    snapshot_at_true: Option<SessionVariables>,
}

#[derive(Debug, Default)]
pub struct TransitionTracker {
    states: HashMap<(String, String), TransitionState>,
}

impl TransitionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a result of `result` over `vars` is a transition worth firing.
    pub fn is_transition(
        &self,
        rule_id: &str,
        session_id: &str,
        result: bool,
        vars: &SessionVariables,
    ) -> bool {
        if !result {
            return false;
        }
        match self.states.get(&(rule_id.to_string(), session_id.to_string())) {
            None => true,
            Some(state) => {
                !state.last_result || state.snapshot_at_true.as_ref() != Some(vars)
            }
        }
    }

    /// Store the outcome of an evaluation. Called whether or not the rule fired.
    pub fn record(&mut self, rule_id: &str, session_id: &str, result: bool, vars: &SessionVariables) {
        let state = self
            .states
            .entry((rule_id.to_string(), session_id.to_string()))
            .or_default();
        state.last_result = result;
        if result {
            state.snapshot_at_true = Some(vars.clone());
        }
    }

    /// Evaluate the transition and record it in one step.
    pub fn observe(
        &mut self,
        rule_id: &str,
        session_id: &str,
        result: bool,
        vars: &SessionVariables,
    ) -> bool {
        let fire = self.is_transition(rule_id, session_id, result, vars);
        self.record(rule_id, session_id, result, vars);
        fire
    }

    pub fn purge_session(&mut self, session_id: &str) {
        self.states.retain(|(_, s), _| s != session_id);
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
