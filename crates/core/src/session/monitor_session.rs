//! Session core: the `Idle -> Running -> Idle` state machine behind the
//! detection loop.
//!
//! All mutation goes through this type. Anything produced asynchronously (a
//! detection result, a sustain timer expiry) carries the epoch it was started
//! under, and is dropped if the session has since been stopped or restarted.

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::detection::domain::detection_result::DetectionResult;
use crate::heuristics::heuristics_engine::HeuristicsEngine;
use crate::heuristics::multi_face_sustain::{MultiFaceSustain, SustainAction};
use crate::shared::settings::MonitorSettings;

use super::failure::SessionFailure;
use super::frame_snapshot::FrameSnapshot;
use super::session_guard::{SessionGuard, TabEvent};
use super::session_state::SessionState;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SessionConfig {
    pub tick_interval: Duration,
    pub multi_face_sustain: Duration,
    pub tab_inactive_limit: u32,
    pub gaze_threshold: f64,
}

impl From<&MonitorSettings> for SessionConfig {
    fn from(s: &MonitorSettings) -> Self {
        Self {
            tick_interval: s.tick_interval(),
            multi_face_sustain: s.multi_face_sustain(),
            tab_inactive_limit: s.tab_inactive_limit,
            gaze_threshold: s.gaze_threshold,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&MonitorSettings::default())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopState {
    Idle,
    Running,
}

/// Identifies one `Running` period.
pub type Epoch = u64;

/// What a completed tick asks of the runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickOutcome {
    pub applied: bool,
    pub sustain: SustainAction,
    pub failure: Option<SessionFailure>,
}

impl TickOutcome {
    fn ignored() -> Self {
        Self {
            applied: false,
            sustain: SustainAction::Unchanged,
            failure: None,
        }
    }
}

#[derive(Debug)]
pub struct MonitorSession {
    config: SessionConfig,
    state: LoopState,
    epoch: Epoch,
    snapshot: FrameSnapshot,
    session: SessionState,
    guard: SessionGuard,
    sustain: MultiFaceSustain,
    engine: HeuristicsEngine,
}

impl MonitorSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            state: LoopState::Idle,
            epoch: 0,
            snapshot: FrameSnapshot::default(),
            session: SessionState::default(),
            guard: SessionGuard::new(config.tab_inactive_limit),
            sustain: MultiFaceSustain::new(config.multi_face_sustain),
            engine: HeuristicsEngine::new(config.gaze_threshold),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == LoopState::Running
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn snapshot(&self) -> &FrameSnapshot {
        &self.snapshot
    }

    pub fn session_state(&self) -> &SessionState {
        &self.session
    }

    pub fn failure(&self) -> Option<SessionFailure> {
        self.guard.failure()
    }

    /// Enters `Running`. Refused while the camera is not ready, while already
    /// running, or while a terminal failure is pending restart.
    pub fn begin(&mut self, camera_ready: bool) -> Option<Epoch> {
        if !camera_ready || self.is_running() || self.guard.is_terminated() {
            return None;
        }
        self.epoch += 1;
        self.state = LoopState::Running;
        self.snapshot = FrameSnapshot::default();
        log::debug!("Detection loop running (epoch {})", self.epoch);
        Some(self.epoch)
    }

    fn is_current(&self, epoch: Epoch) -> bool {
        self.is_running() && epoch == self.epoch
    }

    /// Whether work started under `epoch` may still change the session.
    pub fn accepts(&self, epoch: Epoch) -> bool {
        self.is_current(epoch) && !self.guard.is_terminated()
    }

    /// Whether a tick of `epoch` should call the detector at all.
    pub fn should_detect(&self, epoch: Epoch, frame_decodable: bool) -> bool {
        self.accepts(epoch) && frame_decodable
    }

    /// Replaces the snapshot with a completed detection.
    pub fn apply_detections(
        &mut self,
        epoch: Epoch,
        results: &[DetectionResult],
        now: Instant,
    ) -> TickOutcome {
        if !self.is_current(epoch) || self.guard.is_terminated() {
            return TickOutcome::ignored();
        }

        let face_count = results.len();
        let analysis = self.engine.analyze(results);
        self.snapshot = FrameSnapshot::from_tick(face_count, analysis);

        let sustain = self.sustain.observe(face_count, now);
        self.session.multi_face_since = self.sustain.started_at();

        let mut failure = None;
        if self.snapshot.is_real_face == Some(false) && self.raise(SessionFailure::Liveness) {
            failure = Some(SessionFailure::Liveness);
        }
        self.snapshot.failure = self.guard.failure();

        TickOutcome {
            applied: true,
            sustain: if failure.is_some() {
                SustainAction::Cancelled
            } else {
                sustain
            },
            failure,
        }
    }

    /// Handles the sustain timer firing. Stale expiries (stopped session,
    /// cancelled or re-armed timer) are ignored.
    pub fn expire_sustain(&mut self, epoch: Epoch, generation: u64) -> Option<SessionFailure> {
        if !self.is_current(epoch) || !self.sustain.expire(generation) {
            return None;
        }
        self.session.multi_face_since = None;
        if self.snapshot.face_count <= 1 {
            return None;
        }
        self.snapshot.multi_face_sustained = true;
        if self.raise(SessionFailure::MultiFaceSustained) {
            self.snapshot.failure = self.guard.failure();
            return Some(SessionFailure::MultiFaceSustained);
        }
        None
    }

    pub fn tab_event(&mut self, event: TabEvent) -> Option<SessionFailure> {
        let failure = self.guard.on_tab_event(&mut self.session, event);
        if failure.is_some() {
            self.sustain.cancel();
            self.session.multi_face_since = None;
            self.snapshot.failure = failure;
        }
        failure
    }

    fn raise(&mut self, failure: SessionFailure) -> bool {
        let raised = self.guard.raise(failure);
        if raised {
            self.sustain.cancel();
            self.session.multi_face_since = None;
        }
        raised
    }

    /// Returns to `Idle`: invalidates in-flight work, cancels the sustain
    /// timer and clears counters. A pending failure stays visible.
    pub fn stop(&mut self) {
        if self.is_running() {
            log::debug!("Detection loop idle (epoch {})", self.epoch);
        }
        self.state = LoopState::Idle;
        self.epoch += 1;
        self.sustain.cancel();
        self.session.reset();
        self.snapshot = FrameSnapshot {
            failure: self.guard.failure(),
            ..FrameSnapshot::default()
        };
    }

    /// Stops and clears the failure so a new session can begin.
    pub fn restart(&mut self) {
        self.stop();
        self.guard.reset();
        self.snapshot.failure = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::expression::{Expression, ExpressionScores};
    use crate::detection::domain::face_landmarks::{FaceLandmarks, Point};
    use crate::heuristics::gaze::tests::landmarks_with_eye_ratios;

    const TICK: Duration = Duration::from_millis(200);

    fn session() -> MonitorSession {
        MonitorSession::new(SessionConfig::default())
    }

    fn running() -> (MonitorSession, Epoch) {
        let mut s = session();
        let epoch = s.begin(true).unwrap();
        (s, epoch)
    }

    fn happy_face() -> DetectionResult {
        DetectionResult::new(
            landmarks_with_eye_ratios(4.0, 3.5),
            ExpressionScores::new()
                .with(Expression::Happy, 0.9)
                .with(Expression::Neutral, 0.1),
        )
    }

    fn faces(n: usize) -> Vec<DetectionResult> {
        vec![happy_face(); n]
    }

    fn photo_face() -> DetectionResult {
        DetectionResult::new(
            FaceLandmarks::new(vec![Point::new(1.0, 1.0); 17]),
            ExpressionScores::new().with(Expression::Neutral, 1.0),
        )
    }

    // ── lifecycle ───────────────────────────────────────────────────

    #[test]
    fn test_begin_requires_camera_ready() {
        let mut s = session();
        assert_eq!(s.begin(false), None);
        assert_eq!(s.state(), LoopState::Idle);
        assert!(s.begin(true).is_some());
        assert_eq!(s.state(), LoopState::Running);
    }

    #[test]
    fn test_begin_twice_is_refused() {
        let (mut s, _) = running();
        assert_eq!(s.begin(true), None);
    }

    #[test]
    fn test_should_detect_skips_undecodable_frames() {
        let (s, epoch) = running();
        assert!(s.should_detect(epoch, true));
        assert!(!s.should_detect(epoch, false));
        assert!(!s.should_detect(epoch + 1, true));
    }

    // ── per-tick snapshot ───────────────────────────────────────────

    #[test]
    fn test_single_face_snapshot() {
        let (mut s, epoch) = running();
        let outcome = s.apply_detections(epoch, &faces(1), Instant::now());
        assert!(outcome.applied);
        let snap = s.snapshot();
        assert_eq!(snap.face_count, 1);
        assert!(snap.face_detected);
        assert_eq!(snap.dominant_expression, Some(Expression::Happy));
        assert_eq!(snap.looking_at_screen, Some(true));
        assert_eq!(snap.is_real_face, Some(true));
        assert_eq!(snap.failure, None);
    }

    #[test]
    fn test_zero_faces_clears_expression_and_gaze() {
        let (mut s, epoch) = running();
        let t0 = Instant::now();
        s.apply_detections(epoch, &faces(1), t0);
        s.apply_detections(epoch, &[], t0 + TICK);
        let snap = s.snapshot();
        assert!(!snap.face_detected);
        assert_eq!(snap.dominant_expression, None);
        assert_eq!(snap.looking_at_screen, None);
        assert_eq!(snap.failure, None);
    }

    #[test]
    fn test_two_faces_clear_single_face_signals() {
        let (mut s, epoch) = running();
        let t0 = Instant::now();
        s.apply_detections(epoch, &faces(1), t0);
        s.apply_detections(epoch, &faces(2), t0 + TICK);
        let snap = s.snapshot();
        assert_eq!(snap.face_count, 2);
        assert_eq!(snap.dominant_expression, None);
        assert_eq!(snap.looking_at_screen, None);
    }

    // ── liveness ────────────────────────────────────────────────────

    #[test]
    fn test_photo_face_is_immediate_terminal_failure() {
        let (mut s, epoch) = running();
        let outcome = s.apply_detections(epoch, &[photo_face()], Instant::now());
        assert_eq!(outcome.failure, Some(SessionFailure::Liveness));
        assert_eq!(s.snapshot().is_real_face, Some(false));
        assert_eq!(
            s.snapshot().failure_reason().as_deref(),
            Some("face is likely a photo/image")
        );
    }

    #[test]
    fn test_failure_freezes_ticks() {
        let (mut s, epoch) = running();
        let t0 = Instant::now();
        s.apply_detections(epoch, &[photo_face()], t0);
        assert!(!s.should_detect(epoch, true));
        let outcome = s.apply_detections(epoch, &faces(3), t0 + TICK);
        assert!(!outcome.applied);
        assert_eq!(s.snapshot().face_count, 1);
    }

    // ── multi-face sustain ──────────────────────────────────────────

    #[test]
    fn test_two_faces_held_five_seconds_fails() {
        let (mut s, epoch) = running();
        let t0 = Instant::now();

        let outcome = s.apply_detections(epoch, &faces(2), t0);
        let SustainAction::Armed(ticket) = outcome.sustain else {
            panic!("expected sustain timer to arm");
        };
        assert_eq!(ticket.deadline, t0 + Duration::from_secs(5));

        // Every 200 ms for 5 s the detector keeps returning two faces.
        for i in 1..25 {
            let outcome = s.apply_detections(epoch, &faces(2), t0 + TICK * i);
            assert_eq!(outcome.sustain, SustainAction::Unchanged);
        }
        assert_eq!(
            s.session_state().multi_face_elapsed(t0 + Duration::from_secs(5)),
            Some(Duration::from_secs(5))
        );

        assert_eq!(
            s.expire_sustain(epoch, ticket.generation),
            Some(SessionFailure::MultiFaceSustained)
        );
        let snap = s.snapshot();
        assert!(snap.multi_face_sustained);
        assert_eq!(
            snap.failure_reason().as_deref(),
            Some("multiple faces detected in frame")
        );
    }

    #[test]
    fn test_drop_to_one_face_cancels_sustain() {
        let (mut s, epoch) = running();
        let t0 = Instant::now();
        let SustainAction::Armed(ticket) = s.apply_detections(epoch, &faces(2), t0).sustain else {
            panic!("expected sustain timer to arm");
        };
        let outcome = s.apply_detections(epoch, &faces(1), t0 + Duration::from_secs(3));
        assert_eq!(outcome.sustain, SustainAction::Cancelled);
        assert!(s.session_state().multi_face_since.is_none());

        // A late expiry of the cancelled timer must not fail the session.
        assert_eq!(s.expire_sustain(epoch, ticket.generation), None);
        assert_eq!(s.failure(), None);
    }

    #[test]
    fn test_stop_invalidates_pending_sustain_timer() {
        let (mut s, epoch) = running();
        let SustainAction::Armed(ticket) =
            s.apply_detections(epoch, &faces(2), Instant::now()).sustain
        else {
            panic!("expected sustain timer to arm");
        };
        s.stop();
        assert_eq!(s.expire_sustain(epoch, ticket.generation), None);

        // Even after starting again, the old ticket stays dead.
        let new_epoch = s.begin(true).unwrap();
        assert_eq!(s.expire_sustain(new_epoch, ticket.generation), None);
        assert_eq!(s.failure(), None);
    }

    #[test]
    fn test_stale_detection_after_stop_is_ignored() {
        let (mut s, epoch) = running();
        s.stop();
        let outcome = s.apply_detections(epoch, &faces(2), Instant::now());
        assert!(!outcome.applied);
        assert_eq!(s.snapshot().face_count, 0);
        assert!(s.session_state().multi_face_since.is_none());
    }

    // ── tab inactivity ──────────────────────────────────────────────

    #[test]
    fn test_tab_inactivity_fails_and_freezes() {
        let (mut s, epoch) = running();
        s.tab_event(TabEvent::Hidden);
        s.tab_event(TabEvent::Visible);
        s.tab_event(TabEvent::Blurred);
        s.tab_event(TabEvent::Focused);
        assert_eq!(
            s.tab_event(TabEvent::Hidden),
            Some(SessionFailure::TabInactivity)
        );
        assert!(!s.should_detect(epoch, true));
        assert_eq!(
            s.snapshot().failure_reason().as_deref(),
            Some("tab inactive too often")
        );
    }

    #[test]
    fn test_tab_failure_cancels_sustain() {
        let (mut s, epoch) = running();
        let SustainAction::Armed(ticket) =
            s.apply_detections(epoch, &faces(2), Instant::now()).sustain
        else {
            panic!("expected sustain timer to arm");
        };
        for event in [
            TabEvent::Hidden,
            TabEvent::Visible,
            TabEvent::Hidden,
            TabEvent::Visible,
            TabEvent::Hidden,
        ] {
            s.tab_event(event);
        }
        assert_eq!(s.failure(), Some(SessionFailure::TabInactivity));
        assert_eq!(s.expire_sustain(epoch, ticket.generation), None);
        assert_eq!(s.failure(), Some(SessionFailure::TabInactivity));
    }

    // ── stop / restart ──────────────────────────────────────────────

    #[test]
    fn test_stop_resets_counters_but_keeps_failure() {
        let (mut s, epoch) = running();
        s.tab_event(TabEvent::Hidden);
        s.apply_detections(epoch, &[photo_face()], Instant::now());
        s.stop();
        assert_eq!(s.state(), LoopState::Idle);
        assert_eq!(s.session_state().tab_inactive_count, 0);
        assert_eq!(s.snapshot().face_count, 0);
        assert_eq!(s.failure(), Some(SessionFailure::Liveness));
        assert_eq!(s.begin(true), None, "terminated session needs restart");
    }

    #[test]
    fn test_restart_clears_everything() {
        let (mut s, epoch) = running();
        s.apply_detections(epoch, &[photo_face()], Instant::now());
        s.restart();
        assert_eq!(s.state(), LoopState::Idle);
        assert_eq!(s.failure(), None);
        assert_eq!(s.snapshot(), &FrameSnapshot::default());
        assert_eq!(s.session_state(), &SessionState::default());
        assert!(s.begin(true).is_some());
    }
}
