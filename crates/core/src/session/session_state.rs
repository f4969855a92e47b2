use std::time::{Duration, Instant};

use serde::Serialize;

/// Cumulative counters for one monitoring session. Cleared on stop.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionState {
    pub tab_inactive_count: u32,
    pub tab_active: bool,
    #[serde(skip)]
    pub multi_face_since: Option<Instant>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            tab_inactive_count: 0,
            tab_active: true,
            multi_face_since: None,
        }
    }
}

impl SessionState {
    /// How long more than one face has been continuously in frame.
    pub fn multi_face_elapsed(&self, now: Instant) -> Option<Duration> {
        self.multi_face_since
            .map(|since| now.saturating_duration_since(since))
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_active_with_no_counts() {
        let s = SessionState::default();
        assert!(s.tab_active);
        assert_eq!(s.tab_inactive_count, 0);
        assert!(s.multi_face_since.is_none());
    }

    #[test]
    fn test_multi_face_elapsed() {
        let t0 = Instant::now();
        let s = SessionState {
            multi_face_since: Some(t0),
            ..SessionState::default()
        };
        assert_eq!(
            s.multi_face_elapsed(t0 + Duration::from_millis(1500)),
            Some(Duration::from_millis(1500))
        );
    }

    #[test]
    fn test_reset_clears_counters() {
        let mut s = SessionState {
            tab_inactive_count: 2,
            tab_active: false,
            multi_face_since: Some(Instant::now()),
        };
        s.reset();
        assert_eq!(s, SessionState::default());
    }
}
