//! Trigger pattern compilation and caching.
//!
//! A trigger's pattern text is compiled once per `(pattern, mode)` pair and
//! shared by every session. Patterns that fail to compile are cached as
//! [`CompiledPattern::Invalid`] so the engine skips them on later chunks
//! without paying the parse cost again.
//!
//! ## Plain-text dialect
//!
//! Plain-text patterns let users write what they see on screen without
//! learning regex syntax. The translation rules are:
//!
//! 1. Every literal character is escaped (`?` matches a question mark).
//! 2. A run of whitespace becomes `\s*`, tolerating the alignment gaps
//!    interactive programs leave when they draw with cursor movement.
//! 3. A parenthesized group containing `|`, e.g. `(proceed|continue)`, becomes
//!    a non-capturing alternation whose branches follow rules 1 and 2.
//! 4. Any other parenthesis is a literal.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use aiterm_config::{MatchMode, TriggerConfig};
use regex::{Regex, RegexBuilder};

use super::TriggerError;
use super::condition::Condition;

/// Result of compiling a trigger pattern.
#[derive(Debug)]
pub enum CompiledPattern {
    /// Matcher for regex and plain-text triggers.
    Text(Regex),
    /// Parsed expression for variable-condition triggers.
    Condition(Condition),
    /// The pattern did not compile; the trigger is skipped.
    Invalid,
}

impl CompiledPattern {
    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid)
    }
}

/// Compile `pattern` in `mode` without caching.
///
/// Used by the cache and by the CLI `check` command, which wants the error.
pub fn build(pattern: &str, mode: MatchMode) -> Result<CompiledPattern, TriggerError> {
    match mode {
        MatchMode::Regex => Ok(CompiledPattern::Text(build_regex(pattern)?)),
        MatchMode::PlainText => Ok(CompiledPattern::Text(build_regex(&plain_text_to_regex(
            pattern,
        ))?)),
        MatchMode::Variable => Ok(CompiledPattern::Condition(Condition::parse(pattern)?)),
    }
}

fn build_regex(source: &str) -> Result<Regex, TriggerError> {
    Ok(RegexBuilder::new(source)
        .multi_line(true)
        .dot_matches_new_line(true)
        .build()?)
}

/// Translate a plain-text pattern into regex source.
pub fn plain_text_to_regex(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '(' {
            if let Some(close) = alternation_end(&chars, i) {
                let inner: String = chars[i + 1..close].iter().collect();
                let branches: Vec<String> = inner.split('|').map(escape_literal_run).collect();
                out.push_str("(?:");
                out.push_str(&branches.join("|"));
                out.push(')');
                i = close + 1;
                continue;
            }
            out.push_str(r"\(");
            i += 1;
        } else if c.is_whitespace() {
            while i < chars.len() && chars[i].is_whitespace() {
                i += 1;
            }
            out.push_str(r"\s*");
        } else {
            let mut buf = [0u8; 4];
            out.push_str(&regex::escape(c.encode_utf8(&mut buf)));
            i += 1;
        }
    }

    out
}

/// Index of the `)` closing an alternation group opened at `open`, if the
/// group is flat (no nested `(`) and contains at least one `|`.
fn alternation_end(chars: &[char], open: usize) -> Option<usize> {
    let mut has_bar = false;
    for (offset, &c) in chars[open + 1..].iter().enumerate() {
        match c {
            ')' => return has_bar.then_some(open + 1 + offset),
            '(' => return None,
            '|' => has_bar = true,
            _ => {}
        }
    }
    None
}

/// Escape one alternation branch: literal characters, tolerant whitespace.
fn escape_literal_run(text: &str) -> String {
    let mut out = String::with_capacity(text.len() * 2);
    let mut in_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push_str(r"\s*");
                in_space = true;
            }
            continue;
        }
        in_space = false;
        let mut buf = [0u8; 4];
        out.push_str(&regex::escape(c.encode_utf8(&mut buf)));
    }
    out
}

/// Memoizing compiler shared by all sessions of an engine.
#[derive(Debug, Default)]
pub struct PatternCache {
    entries: HashMap<(String, MatchMode), Arc<CompiledPattern>>,
}

impl PatternCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiled form of `pattern`, compiling on first use.
    pub fn get(&mut self, pattern: &str, mode: MatchMode) -> Arc<CompiledPattern> {
        if let Some(hit) = self.entries.get(&(pattern.to_string(), mode)) {
            return Arc::clone(hit);
        }

        let compiled = match build(pattern, mode) {
            Ok(compiled) => compiled,
            Err(e) => {
                log::warn!(
                    "Trigger pattern {:?} ({}) is invalid and will be skipped: {}",
                    pattern,
                    mode.display_name(),
                    e
                );
                CompiledPattern::Invalid
            }
        };
        let compiled = Arc::new(compiled);
        self.entries
            .insert((pattern.to_string(), mode), Arc::clone(&compiled));
        compiled
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop patterns no rule in `rules` uses any more. Each rule owns at
    /// most one entry, so a cache larger than the rule list holds stale ones.
    pub fn evict_unused(&mut self, rules: &[TriggerConfig]) {
        if self.entries.len() <= rules.len() {
            return;
        }
        let live: HashSet<(&str, MatchMode)> = rules
            .iter()
            .map(|rule| (rule.pattern.as_str(), rule.mode))
            .collect();
        let before = self.entries.len();
        self.entries
            .retain(|(pattern, mode), _| live.contains(&(pattern.as_str(), *mode)));
        log::debug!(
            "Evicted {} unused trigger pattern(s)",
            before - self.entries.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_regex(pattern: &str, mode: MatchMode) -> Regex {
        match build(pattern, mode).unwrap() {
            CompiledPattern::Text(re) => re,
            other => panic!("expected text matcher, got {other:?}"),
        }
    }

    // ── Plain-text translation rules ───────────────────────────────────────

    #[test]
    fn test_plain_text_escapes_metacharacters() {
        assert_eq!(plain_text_to_regex("a.b*c?"), r"a\.b\*c\?");
        assert_eq!(plain_text_to_regex("$5 [ok]"), r"\$5\s*\[ok\]");
    }

    #[test]
    fn test_plain_text_whitespace_runs_become_tolerant() {
        assert_eq!(plain_text_to_regex("a  \t b"), r"a\s*b");
        assert_eq!(plain_text_to_regex(" lead"), r"\s*lead");
    }

    #[test]
    fn test_plain_text_alternation_is_preserved_and_escaped() {
        assert_eq!(
            plain_text_to_regex("(y/n|yes or no)"),
            r"(?:y/n|yes\s*or\s*no)"
        );
        assert_eq!(plain_text_to_regex("(a.b|c)"), r"(?:a\.b|c)");
    }

    #[test]
    fn test_plain_text_parens_without_bar_are_literal() {
        assert_eq!(plain_text_to_regex("(y/n)"), r"\(y/n\)");
    }

    #[test]
    fn test_plain_text_unbalanced_paren_is_literal() {
        assert_eq!(plain_text_to_regex("(a|b"), r"\(a\|b");
        assert_eq!(plain_text_to_regex("a)"), r"a\)");
    }

    #[test]
    fn test_plain_text_nested_paren_is_literal() {
        assert_eq!(plain_text_to_regex("((a|b)"), r"\((?:a|b)");
    }

    #[test]
    fn test_plain_text_alternation_has_no_capture_groups() {
        let re = text_regex("pick (one|two)", MatchMode::PlainText);
        assert_eq!(re.captures_len(), 1);
    }

    #[test]
    fn test_plain_text_matches_irregular_spacing() {
        let re = text_regex("Would you like to (proceed|continue)?", MatchMode::PlainText);
        assert!(re.is_match("Would you  like   to proceed?"));
        assert!(re.is_match("Would you like to continue?"));
        assert!(!re.is_match("Would you like to stop?"));
    }

    #[test]
    fn test_plain_text_user_regex_syntax_is_not_interpreted() {
        let re = text_regex("a+b", MatchMode::PlainText);
        assert!(re.is_match("a+b"));
        assert!(!re.is_match("aab"));
    }

    // ── Regex mode ─────────────────────────────────────────────────────────

    #[test]
    fn test_regex_spans_lines() {
        let re = text_regex("start.*end", MatchMode::Regex);
        assert!(re.is_match("start\nmiddle\nend"));
    }

    #[test]
    fn test_regex_multiline_anchors() {
        let re = text_regex("^\\$ $", MatchMode::Regex);
        assert!(re.is_match("output\n$ \nmore"));
    }

    #[test]
    fn test_regex_example_error_or_fail() {
        let re = text_regex("error|fail", MatchMode::Regex);
        let m = re.find("build failed").unwrap();
        assert_eq!(m.start(), 6);
    }

    // ── Cache ──────────────────────────────────────────────────────────────

    #[test]
    fn test_invalid_pattern_is_cached_as_sentinel() {
        let mut cache = PatternCache::new();
        let first = cache.get("(unclosed", MatchMode::Regex);
        assert!(first.is_invalid());
        let second = cache.get("(unclosed", MatchMode::Regex);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_keys_on_mode() {
        let mut cache = PatternCache::new();
        // Invalid as regex, fine as plain text.
        assert!(cache.get("(unclosed", MatchMode::Regex).is_invalid());
        assert!(!cache.get("(unclosed", MatchMode::PlainText).is_invalid());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_variable_mode_compiles_condition() {
        let mut cache = PatternCache::new();
        let compiled = cache.get("status == \"idle\"", MatchMode::Variable);
        assert!(matches!(*compiled, CompiledPattern::Condition(_)));
        assert!(cache.get("status ==", MatchMode::Variable).is_invalid());
    }

    #[test]
    fn test_evict_unused_drops_edited_patterns() {
        let mut cache = PatternCache::new();
        let mut rule = TriggerConfig::new("r", "r", "first", MatchMode::PlainText);
        cache.get(&rule.pattern, rule.mode);

        rule.pattern = "second".to_string();
        cache.get(&rule.pattern, rule.mode);
        assert_eq!(cache.len(), 2);

        cache.evict_unused(std::slice::from_ref(&rule));
        assert_eq!(cache.len(), 1);
        let kept = cache.get("second", MatchMode::PlainText);
        assert!(!kept.is_invalid());
        assert_eq!(cache.len(), 1);
    }
}
