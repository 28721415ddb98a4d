//! Per-phase wall-clock deadline tracking.
//!
//! The timer is advisory only: reaching zero never ends a phase. It holds at
//! most one start timestamp, set lazily on the first read after a reset.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Current Unix epoch in milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTimer {
    started_at_ms: Option<u64>,
}

impl PhaseTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seconds left of a `duration_minutes` phase, never below zero.
    pub fn remaining_seconds(&mut self, duration_minutes: u64) -> u64 {
        self.remaining_seconds_at(duration_minutes, now_ms())
    }

    /// Same as [`remaining_seconds`](Self::remaining_seconds) with an explicit
    /// clock reading. Starts the timer at `now_ms` if it is not running.
    pub fn remaining_seconds_at(&mut self, duration_minutes: u64, now_ms: u64) -> u64 {
        let started = *self.started_at_ms.get_or_insert(now_ms);
        let elapsed_ms = now_ms.saturating_sub(started);
        let total_ms = duration_minutes.saturating_mul(60_000);
        total_ms.saturating_sub(elapsed_ms) / 1000
    }

    /// Discard the start timestamp; the next read restarts from zero elapsed.
    pub fn reset(&mut self) {
        self.started_at_ms = None;
    }

    pub fn is_running(&self) -> bool {
        self.started_at_ms.is_some()
    }

    pub fn started_at_ms(&self) -> Option<u64> {
        self.started_at_ms
    }
}

/// Format seconds as `MM:SS`, the way the countdown banner shows them.
pub fn format_mmss(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_first_read_starts_timer() {
        let mut t = PhaseTimer::new();
        assert!(!t.is_running());
        assert_eq!(t.remaining_seconds_at(10, 1_000), 600);
        assert_eq!(t.started_at_ms(), Some(1_000));
    }

    #[test]
    fn test_elapsed_time_is_subtracted() {
        let mut t = PhaseTimer::new();
        t.remaining_seconds_at(10, 0);
        assert_eq!(t.remaining_seconds_at(10, 61_000), 539);
    }

    #[test]
    fn test_partial_seconds_are_truncated() {
        let mut t = PhaseTimer::new();
        t.remaining_seconds_at(1, 0);
        // 59.5 s left
        assert_eq!(t.remaining_seconds_at(1, 500), 59);
    }

    #[test]
    fn test_expired_timer_floors_at_zero() {
        let mut t = PhaseTimer::new();
        t.remaining_seconds_at(5, 0);
        assert_eq!(t.remaining_seconds_at(5, 300_000), 0);
        assert_eq!(t.remaining_seconds_at(5, 10_000_000), 0);
    }

    #[test]
    fn test_reset_restarts_from_full_duration() {
        let mut t = PhaseTimer::new();
        t.remaining_seconds_at(10, 0);
        assert_eq!(t.remaining_seconds_at(10, 120_000), 480);
        t.reset();
        assert!(!t.is_running());
        assert_eq!(t.remaining_seconds_at(10, 120_000), 600);
    }

    #[test]
    fn test_clock_going_backwards_does_not_underflow() {
        let mut t = PhaseTimer::new();
        t.remaining_seconds_at(2, 50_000);
        assert_eq!(t.remaining_seconds_at(2, 10_000), 120);
    }

    #[test]
    fn test_remaining_seconds_with_real_clock() {
        let mut t = PhaseTimer::new();
        let r = t.remaining_seconds(10);
        assert!((599..=600).contains(&r));
    }

    #[test]
    fn test_format_mmss() {
        assert_eq!(format_mmss(600), "10:00");
        assert_eq!(format_mmss(59), "00:59");
        assert_eq!(format_mmss(0), "00:00");
        assert_eq!(format_mmss(3_599), "59:59");
    }

    proptest! {
        #[test]
        fn prop_remaining_is_bounded(minutes in 1u64..240, start in 0u64..1_000_000_000, elapsed in 0u64..100_000_000) {
            let mut t = PhaseTimer::new();
            let first = t.remaining_seconds_at(minutes, start);
            prop_assert_eq!(first, minutes * 60);
            let later = t.remaining_seconds_at(minutes, start + elapsed);
            prop_assert!(later <= minutes * 60);
        }

        #[test]
        fn prop_remaining_never_increases(minutes in 1u64..60, a in 0u64..10_000_000, b in 0u64..10_000_000) {
            let mut t = PhaseTimer::new();
            t.remaining_seconds_at(minutes, 0);
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(t.remaining_seconds_at(minutes, hi) <= t.remaining_seconds_at(minutes, lo));
        }
    }
}
