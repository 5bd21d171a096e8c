//! Default value functions for configuration.
//!
//! Used as `#[serde(default = "crate::defaults::...")]` attributes so that a
//! hand-written rules file only needs to spell out what it changes.

pub fn bool_true() -> bool {
    true
}

/// Sliding window size for each session's output buffer, in bytes.
pub fn buffer_capacity() -> usize {
    4096
}

/// Identical matches inside this window are treated as a repaint, not new output.
pub fn dedup_window_secs() -> u64 {
    10
}

pub fn cooldown_secs() -> u64 {
    0
}
