//! Per-session trigger variables.
//!
//! Text-mode rules write variables from their capture groups; conditions,
//! action templates and persistence read them. Templates reference variables
//! as `%name`, where `name` is the longest run of `[A-Za-z0-9_]` starting with
//! a letter or underscore.

use std::collections::HashMap;
use std::sync::LazyLock;

use aiterm_config::{SessionVariables, VariableMapping};
use regex::{Captures, Regex};

/// `%name` reference in an action template.
static VARIABLE_REF_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"%([A-Za-z_][A-Za-z0-9_]*)")
        .expect("variable reference regex is a compile-time constant and must be valid")
});

/// Replace `%name` references using `lookup`.
///
/// Unresolved references are kept verbatim, or removed when
/// `clear_unresolved` is set.
pub fn interpolate<F>(template: &str, lookup: F, clear_unresolved: bool) -> String
where
    F: Fn(&str) -> Option<String>,
{
    VARIABLE_REF_PATTERN
        .replace_all(template, |caps: &Captures| match lookup(&caps[1]) {
            Some(value) => value,
            None if clear_unresolved => String::new(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Values produced by `mappings` for one match. Groups that did not
/// participate in the match are skipped.
pub fn extract_captures(caps: &Captures, mappings: &[VariableMapping]) -> Vec<(String, String)> {
    mappings
        .iter()
        .filter_map(|mapping| {
            caps.get(mapping.group)
                .map(|m| (mapping.name.clone(), mapping.render(m.as_str())))
        })
        .collect()
}

#[derive(Debug, Default)]
pub struct VariableStore {
    sessions: HashMap<String, SessionVariables>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, session_id: &str) -> Option<&SessionVariables> {
        self.sessions.get(session_id)
    }

    pub fn value(&self, session_id: &str, name: &str) -> Option<&str> {
        self.sessions
            .get(session_id)
            .and_then(|vars| vars.get(name))
            .map(String::as_str)
    }

    /// Sorted copy of a session's variables (empty when none are set).
    pub fn snapshot(&self, session_id: &str) -> SessionVariables {
        self.sessions.get(session_id).cloned().unwrap_or_default()
    }

    /// Replace a session's variables wholesale (used when restoring).
    pub fn seed(&mut self, session_id: &str, vars: SessionVariables) {
        self.sessions.insert(session_id.to_string(), vars);
    }

    /// Apply extracted values. Returns `true` if any value changed.
    pub fn apply(&mut self, session_id: &str, updates: Vec<(String, String)>) -> bool {
        if updates.is_empty() {
            return false;
        }
        let vars = self.sessions.entry(session_id.to_string()).or_default();
        let mut changed = false;
        for (name, value) in updates {
            if vars.get(&name) != Some(&value) {
                vars.insert(name, value);
                changed = true;
            }
        }
        changed
    }

    pub fn resolve(&self, session_id: &str, template: &str, clear_unresolved: bool) -> String {
        let vars = self.sessions.get(session_id);
        interpolate(
            template,
            |name| vars.and_then(|v| v.get(name)).cloned(),
            clear_unresolved,
        )
    }

    pub fn remove_session(&mut self, session_id: &str) -> Option<SessionVariables> {
        self.sessions.remove(session_id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
