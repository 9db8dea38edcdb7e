// src/storage/key_state.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Quota state of a single API key, addressed by its fingerprint.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct KeyState {
    pub fingerprint: String,
    pub exhausted: bool,
    pub exhausted_at: Option<DateTime<Utc>>,
    pub quota_used: u32,
    /// Start of the accounting window `quota_used` belongs to.
    pub window_started: DateTime<Utc>,
}

impl KeyState {
    pub fn new(fingerprint: String, now: DateTime<Utc>) -> Self {
        Self {
            fingerprint,
            exhausted: false,
            exhausted_at: None,
            quota_used: 0,
            window_started: now,
        }
    }

    pub fn mark_exhausted(&mut self, now: DateTime<Utc>) {
        if !self.exhausted {
            self.exhausted = true;
            self.exhausted_at = Some(now);
        }
    }

    /// Add consumed units. Returns true when this call crossed `soft_limit`.
    pub fn record_usage(&mut self, units: u32, soft_limit: u32, now: DateTime<Utc>) -> bool {
        self.quota_used = self.quota_used.saturating_add(units);
        if !self.exhausted && self.quota_used >= soft_limit {
            self.mark_exhausted(now);
            return true;
        }
        false
    }

    /// True when the state was recorded before `boundary` and must be cleared.
    pub fn is_stale(&self, boundary: DateTime<Utc>) -> bool {
        let exhausted_before = self.exhausted_at.is_some_and(|at| at < boundary);
        let window_before = self.window_started < boundary && self.quota_used > 0;
        exhausted_before || window_before
    }

    /// Move the state into the window that opened at `boundary`. Usage from
    /// an older window is dropped; an exhaustion recorded at or after
    /// `boundary` survives.
    pub fn roll_forward(&mut self, boundary: DateTime<Utc>, now: DateTime<Utc>) {
        if self.exhausted_at.is_some_and(|at| at < boundary) {
            self.exhausted = false;
            self.exhausted_at = None;
        }
        if self.window_started < boundary {
            self.quota_used = 0;
            self.window_started = now;
        }
    }

    pub fn is_available(&self) -> bool {
        !self.exhausted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_usage_crosses_soft_limit_once() {
        let now = Utc::now();
        let mut state = KeyState::new("abc".into(), now);
        assert!(!state.record_usage(9_400, 9_500, now));
        assert!(state.record_usage(100, 9_500, now));
        assert!(!state.is_available());
        assert!(!state.record_usage(100, 9_500, now));
        assert_eq!(state.quota_used, 9_600);
    }

    #[test]
    fn test_staleness_against_boundary() {
        let now = Utc::now();
        let boundary = now + Duration::hours(1);
        let mut state = KeyState::new("abc".into(), now);
        assert!(!state.is_stale(boundary), "untouched state has nothing to clear");

        state.mark_exhausted(now);
        assert!(state.is_stale(boundary));
        assert!(!state.is_stale(now - Duration::hours(1)));

        state.roll_forward(boundary, boundary);
        assert!(state.is_available());
        assert_eq!(state.window_started, boundary);
    }

    #[test]
    fn test_roll_forward_keeps_exhaustion_from_current_window() {
        let boundary = Utc::now() - Duration::hours(2);
        let now = Utc::now();
        let mut state = KeyState::new("abc".into(), boundary - Duration::days(2));
        state.quota_used = 50;
        state.mark_exhausted(now);
        assert!(state.is_stale(boundary));

        state.roll_forward(boundary, now);
        assert!(!state.is_available());
        assert_eq!(state.exhausted_at, Some(now));
        assert_eq!(state.quota_used, 0);
        assert_eq!(state.window_started, now);
        assert!(!state.is_stale(boundary));
    }

    #[test]
    fn test_roll_forward_clears_old_exhaustion() {
        let boundary = Utc::now() - Duration::hours(2);
        let earlier = boundary - Duration::hours(5);
        let now = Utc::now();
        let mut state = KeyState::new("abc".into(), earlier);
        state.record_usage(9_500, 9_500, earlier);

        state.roll_forward(boundary, now);
        assert!(state.is_available());
        assert_eq!(state.quota_used, 0);
    }
}
