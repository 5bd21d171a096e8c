//! Per-(rule, session) rate limiting.
//!
//! Two independent gates hold a matching rule back:
//! - the rule's own cooldown since it last fired in that session, and
//! - the duplicate window: the same matched text does not fire twice within
//!   `dedup_window` of the firing that recorded it.

use std::collections::HashMap;
use std::time::{Duration, Instant};

type Key = (String, String);

fn key(rule_id: &str, session_id: &str) -> Key {
    (rule_id.to_string(), session_id.to_string())
}

/// Why a match was allowed or held back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Open,
    CoolingDown,
    Duplicate,
}

impl Gate {
    pub fn is_open(self) -> bool {
        self == Gate::Open
    }
}

#[derive(Debug)]
pub struct CooldownTracker {
    /// (rule, session) -> last fire time
    last_fire: HashMap<Key, Instant>,
    /// (rule, session) -> text and time of the last fired match
    last_match: HashMap<Key, (String, Instant)>,
    dedup_window: Duration,
}

impl CooldownTracker {
    pub fn new(dedup_window: Duration) -> Self {
        Self {
            last_fire: HashMap::new(),
            last_match: HashMap::new(),
            dedup_window,
        }
    }

    /// True when `cooldown` has passed since the rule last fired here.
    pub fn cooldown_elapsed(
        &self,
        rule_id: &str,
        session_id: &str,
        cooldown: Duration,
        now: Instant,
    ) -> bool {
        match self.last_fire.get(&key(rule_id, session_id)) {
            Some(last) => now.saturating_duration_since(*last) >= cooldown,
            None => true,
        }
    }

    /// True when `text` equals the last fired match and the window is still open.
    pub fn is_duplicate(&self, rule_id: &str, session_id: &str, text: &str, now: Instant) -> bool {
        self.last_match
            .get(&key(rule_id, session_id))
            .is_some_and(|(last_text, at)| {
                last_text == text && now.saturating_duration_since(*at) < self.dedup_window
            })
    }

    /// Gate for a text-mode match.
    pub fn check_match(
        &self,
        rule_id: &str,
        session_id: &str,
        cooldown: Duration,
        text: &str,
        now: Instant,
    ) -> Gate {
        if !self.cooldown_elapsed(rule_id, session_id, cooldown, now) {
            Gate::CoolingDown
        } else if self.is_duplicate(rule_id, session_id, text, now) {
            Gate::Duplicate
        } else {
            Gate::Open
        }
    }

    /// Record a firing. `matched` is the matched text for text-mode rules,
    /// `None` for variable-mode rules (which only use the cooldown).
    pub fn record_fire(
        &mut self,
        rule_id: &str,
        session_id: &str,
        matched: Option<&str>,
        now: Instant,
    ) {
        let k = key(rule_id, session_id);
        if let Some(text) = matched {
            self.last_match.insert(k.clone(), (text.to_string(), now));
        }
        self.last_fire.insert(k, now);
    }

    /// Drop every entry belonging to `session_id`.
    pub fn purge_session(&mut self, session_id: &str) {
        self.last_fire.retain(|(_, s), _| s != session_id);
        self.last_match.retain(|(_, s), _| s != session_id);
    }

    pub fn len(&self) -> usize {
        self.last_fire.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_fire.is_empty() && self.last_match.is_empty()
    }
}
