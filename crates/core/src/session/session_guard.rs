use serde::{Deserialize, Serialize};

use super::failure::SessionFailure;
use super::session_state::SessionState;

/// Focus/visibility signal from the host environment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabEvent {
    Hidden,
    Blurred,
    Visible,
    Focused,
}

impl TabEvent {
    pub fn is_inactive(self) -> bool {
        matches!(self, TabEvent::Hidden | TabEvent::Blurred)
    }
}

/// Accumulates terminal failure conditions for a session.
///
/// The first failure wins; later ones are ignored until [`SessionGuard::reset`].
#[derive(Debug)]
pub struct SessionGuard {
    inactive_limit: u32,
    failure: Option<SessionFailure>,
}

impl SessionGuard {
    pub fn new(inactive_limit: u32) -> Self {
        Self {
            inactive_limit,
            failure: None,
        }
    }

    pub fn failure(&self) -> Option<SessionFailure> {
        self.failure
    }

    pub fn is_terminated(&self) -> bool {
        self.failure.is_some()
    }

    /// Records a failure. Returns true if it became the session's failure.
    pub fn raise(&mut self, failure: SessionFailure) -> bool {
        if self.failure.is_some() {
            return false;
        }
        log::info!("Session failed: {failure}");
        self.failure = Some(failure);
        true
    }

    /// Applies a tab event. Only an active → inactive transition counts;
    /// regaining focus never lowers the count.
    pub fn on_tab_event(
        &mut self,
        state: &mut SessionState,
        event: TabEvent,
    ) -> Option<SessionFailure> {
        if self.is_terminated() {
            return None;
        }
        if !event.is_inactive() {
            state.tab_active = true;
            return None;
        }
        if !state.tab_active {
            return None;
        }
        state.tab_active = false;
        state.tab_inactive_count += 1;
        log::debug!(
            "Tab inactive ({}/{})",
            state.tab_inactive_count,
            self.inactive_limit
        );

        if state.tab_inactive_count >= self.inactive_limit
            && self.raise(SessionFailure::TabInactivity)
        {
            return Some(SessionFailure::TabInactivity);
        }
        None
    }

    pub fn reset(&mut self) {
        self.failure = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> (SessionGuard, SessionState) {
        (SessionGuard::new(3), SessionState::default())
    }

    #[test]
    fn test_three_inactive_transitions_fail() {
        let (mut g, mut s) = guard();
        assert_eq!(g.on_tab_event(&mut s, TabEvent::Hidden), None);
        g.on_tab_event(&mut s, TabEvent::Visible);
        assert_eq!(g.on_tab_event(&mut s, TabEvent::Blurred), None);
        g.on_tab_event(&mut s, TabEvent::Focused);
        assert_eq!(
            g.on_tab_event(&mut s, TabEvent::Hidden),
            Some(SessionFailure::TabInactivity)
        );
        assert_eq!(s.tab_inactive_count, 3);
        assert!(g.is_terminated());
    }

    #[test]
    fn test_focus_never_decrements() {
        let (mut g, mut s) = guard();
        g.on_tab_event(&mut s, TabEvent::Hidden);
        for _ in 0..5 {
            g.on_tab_event(&mut s, TabEvent::Focused);
            g.on_tab_event(&mut s, TabEvent::Visible);
        }
        assert_eq!(s.tab_inactive_count, 1);
        assert!(s.tab_active);
    }

    #[test]
    fn test_blur_then_hidden_is_one_transition() {
        let (mut g, mut s) = guard();
        g.on_tab_event(&mut s, TabEvent::Blurred);
        g.on_tab_event(&mut s, TabEvent::Hidden);
        assert_eq!(s.tab_inactive_count, 1);
        assert!(!s.tab_active);
    }

    #[test]
    fn test_first_failure_wins() {
        let (mut g, _) = guard();
        assert!(g.raise(SessionFailure::Liveness));
        assert!(!g.raise(SessionFailure::MultiFaceSustained));
        assert_eq!(g.failure(), Some(SessionFailure::Liveness));
    }

    #[test]
    fn test_terminated_session_ignores_tab_events() {
        let (mut g, mut s) = guard();
        g.raise(SessionFailure::Liveness);
        assert_eq!(g.on_tab_event(&mut s, TabEvent::Hidden), None);
        assert_eq!(s.tab_inactive_count, 0);
    }

    #[test]
    fn test_reset_clears_failure() {
        let (mut g, _) = guard();
        g.raise(SessionFailure::TabInactivity);
        g.reset();
        assert!(!g.is_terminated());
    }

    #[test]
    fn test_tab_event_serde_lowercase() {
        let e: TabEvent = serde_json::from_str(r#""blurred""#).unwrap();
        assert_eq!(e, TabEvent::Blurred);
    }
}
