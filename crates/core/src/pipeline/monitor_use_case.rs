use std::sync::{Arc, Mutex};

use crossbeam_channel::{Receiver, Sender};
use thiserror::Error;

use crate::capture::capture_manager::{CaptureHandle, CaptureManager, PermissionState};
use crate::capture::domain::capture_error::CaptureError;
use crate::detection::domain::face_detector::FaceDetector;
use crate::session::failure::SessionFailure;
use crate::session::frame_snapshot::FrameSnapshot;
use crate::session::monitor_session::{LoopState, MonitorSession, SessionConfig};
use crate::session::session_guard::TabEvent;
use crate::session::session_state::SessionState;

use super::detection_loop::{self, lock_session, DetectionLoopHandle, LoopParts};
use super::session_event::SessionEvent;
use super::session_logger::SessionLogger;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error("session has failed; restart it before starting again")]
    SessionTerminated,
    #[error("face detector is unavailable")]
    DetectorUnavailable,
    #[error("monitoring is already running")]
    AlreadyRunning,
    #[error("failed to start detection thread: {0}")]
    Spawn(#[from] std::io::Error),
}

struct ActiveRun {
    detection: DetectionLoopHandle,
    camera: CaptureHandle,
}

/// Host-facing facade over one monitoring session.
///
/// Owns the camera, the detector and the session core. Everything the host
/// needs to render arrives on [`MonitorUseCase::events`]; the getters return
/// the latest state for hosts that poll instead.
pub struct MonitorUseCase {
    session: Arc<Mutex<MonitorSession>>,
    capture: CaptureManager,
    parts: Option<LoopParts>,
    active: Option<ActiveRun>,
    events_tx: Sender<SessionEvent>,
    events_rx: Receiver<SessionEvent>,
}

impl MonitorUseCase {
    pub fn new(
        config: SessionConfig,
        capture: CaptureManager,
        detector: Box<dyn FaceDetector>,
        logger: Box<dyn SessionLogger>,
    ) -> Self {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        Self {
            session: Arc::new(Mutex::new(MonitorSession::new(config))),
            capture,
            parts: Some(LoopParts { detector, logger }),
            active: None,
            events_tx,
            events_rx,
        }
    }

    pub fn events(&self) -> Receiver<SessionEvent> {
        self.events_rx.clone()
    }

    /// Starts the camera and the detection loop.
    pub fn start(&mut self) -> Result<(), MonitorError> {
        if lock_session(&self.session).failure().is_some() {
            return Err(MonitorError::SessionTerminated);
        }
        if self.active.is_some() {
            return Err(MonitorError::AlreadyRunning);
        }
        if self.parts.is_none() {
            return Err(MonitorError::DetectorUnavailable);
        }

        let camera = self.capture.start()?;
        self.emit(SessionEvent::CameraReady {
            label: camera.info().label.clone(),
            width: camera.info().width,
            height: camera.info().height,
        });

        let Some(epoch) = lock_session(&self.session).begin(self.capture.is_ready()) else {
            self.capture.stop(&camera);
            return Err(MonitorError::AlreadyRunning);
        };
        let Some(LoopParts { detector, logger }) = self.parts.take() else {
            return Err(MonitorError::DetectorUnavailable);
        };

        let spawned = detection_loop::spawn(
            self.session.clone(),
            epoch,
            self.capture.surface().clone(),
            self.capture.ready_flag(),
            detector,
            logger,
            self.events_tx.clone(),
        );
        match spawned {
            Ok(detection) => {
                self.active = Some(ActiveRun { detection, camera });
                Ok(())
            }
            Err(e) => {
                lock_session(&self.session).stop();
                self.capture.stop(&camera);
                Err(e.into())
            }
        }
    }

    /// Stops detection and releases the camera. Stopping an idle session
    /// does nothing.
    pub fn stop(&mut self) -> Result<(), MonitorError> {
        let Some(run) = self.active.take() else {
            lock_session(&self.session).stop();
            return Ok(());
        };

        lock_session(&self.session).stop();
        let joined = run.detection.stop();
        self.capture.stop(&run.camera);
        self.emit(SessionEvent::Stopped);

        match joined {
            Ok(parts) => {
                self.parts = Some(parts);
                Ok(())
            }
            Err(_) => {
                log::error!("Detection loop panicked; detector discarded");
                Err(MonitorError::DetectorUnavailable)
            }
        }
    }

    /// Stops everything and clears the failure and counters. Monitoring
    /// stays idle until the next [`MonitorUseCase::start`].
    pub fn restart(&mut self) -> Result<(), MonitorError> {
        let stopped = self.stop();
        lock_session(&self.session).restart();
        log::info!("Session restarted");
        stopped
    }

    /// Feeds a focus/visibility change. Returns the failure it raised, if any.
    pub fn tab_event(&mut self, tab: TabEvent) -> Option<SessionFailure> {
        let (failure, inactive_count) = {
            let mut session = lock_session(&self.session);
            let failure = session.tab_event(tab);
            (failure, session.session_state().tab_inactive_count)
        };
        self.emit(SessionEvent::TabChanged {
            tab,
            inactive_count,
        });
        if let Some(failure) = failure {
            self.emit(SessionEvent::failed(failure));
        }
        failure
    }

    pub fn snapshot(&self) -> FrameSnapshot {
        lock_session(&self.session).snapshot().clone()
    }

    pub fn session_state(&self) -> SessionState {
        lock_session(&self.session).session_state().clone()
    }

    pub fn state(&self) -> LoopState {
        lock_session(&self.session).state()
    }

    pub fn failure(&self) -> Option<SessionFailure> {
        lock_session(&self.session).failure()
    }

    pub fn permission(&self) -> PermissionState {
        self.capture.permission()
    }

    pub fn is_camera_ready(&self) -> bool {
        self.capture.is_ready()
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events_tx.send(event);
    }
}

impl Drop for MonitorUseCase {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    use crate::capture::capture_manager::tests::StubCamera;
    use crate::capture::domain::camera_source::CaptureConstraints;
    use crate::detection::domain::detection_result::DetectionResult;
    use crate::detection::domain::expression::{Expression, ExpressionScores};
    use crate::detection::infrastructure::scripted_face_detector::ScriptedFaceDetector;
    use crate::heuristics::gaze::tests::landmarks_with_eye_ratios;
    use crate::pipeline::session_logger::NullSessionLogger;

    const WAIT: Duration = Duration::from_secs(2);

    fn face() -> DetectionResult {
        DetectionResult::new(
            landmarks_with_eye_ratios(4.0, 3.5),
            ExpressionScores::new()
                .with(Expression::Happy, 0.9)
                .with(Expression::Neutral, 0.1),
        )
    }

    fn use_case(camera: StubCamera, steps: Vec<Vec<DetectionResult>>) -> MonitorUseCase {
        let config = SessionConfig {
            tick_interval: Duration::from_millis(5),
            multi_face_sustain: Duration::from_millis(60),
            ..SessionConfig::default()
        };
        let capture = CaptureManager::new(
            Box::new(camera),
            CaptureConstraints::default(),
            Duration::from_millis(50),
        );
        MonitorUseCase::new(
            config,
            capture,
            Box::new(ScriptedFaceDetector::new(steps)),
            Box::new(NullSessionLogger),
        )
    }

    fn wait_for<F: Fn(&SessionEvent) -> bool>(
        rx: &Receiver<SessionEvent>,
        pred: F,
    ) -> Option<SessionEvent> {
        let deadline = Instant::now() + WAIT;
        while let Ok(event) = rx.recv_deadline(deadline) {
            if pred(&event) {
                return Some(event);
            }
        }
        None
    }

    #[test]
    fn test_start_reports_camera_then_snapshots() {
        let mut uc = use_case(StubCamera::streaming(), vec![vec![face()]]);
        let rx = uc.events();
        uc.start().unwrap();
        assert_eq!(uc.state(), LoopState::Running);
        assert!(uc.is_camera_ready());
        assert_eq!(uc.permission(), PermissionState::Granted);

        match rx.recv_timeout(WAIT).unwrap() {
            SessionEvent::CameraReady { label, .. } => assert_eq!(label, "stub"),
            other => panic!("expected camera ready, got {other:?}"),
        }
        let Some(SessionEvent::Snapshot { snapshot, .. }) =
            wait_for(&rx, |e| matches!(e, SessionEvent::Snapshot { .. }))
        else {
            panic!("no snapshot");
        };
        assert_eq!(snapshot.face_count, 1);
        assert_eq!(snapshot.dominant_expression, Some(Expression::Happy));
        assert_eq!(snapshot.looking_at_screen, Some(true));
        assert_eq!(snapshot.is_real_face, Some(true));
        uc.stop().unwrap();
    }

    #[test]
    fn test_denied_camera_is_surfaced() {
        let camera = StubCamera {
            acquire_error: Some(CaptureError::PermissionDenied),
            ..StubCamera::streaming()
        };
        let mut uc = use_case(camera, vec![vec![face()]]);
        let err = uc.start().unwrap_err();
        assert!(matches!(
            err,
            MonitorError::Capture(CaptureError::PermissionDenied)
        ));
        assert_eq!(uc.permission(), PermissionState::Denied);
        assert_eq!(uc.state(), LoopState::Idle);
    }

    #[test]
    fn test_silent_camera_never_enters_running() {
        let camera = StubCamera {
            frames: 0,
            ..StubCamera::streaming()
        };
        let mut uc = use_case(camera, vec![vec![face()]]);
        assert!(matches!(
            uc.start(),
            Err(MonitorError::Capture(CaptureError::PlaybackError(_)))
        ));
        assert_eq!(uc.state(), LoopState::Idle);
        assert!(!uc.is_camera_ready());
    }

    #[test]
    fn test_second_start_is_rejected() {
        let mut uc = use_case(StubCamera::streaming(), vec![vec![face()]]);
        uc.start().unwrap();
        assert!(matches!(uc.start(), Err(MonitorError::AlreadyRunning)));
        uc.stop().unwrap();
    }

    #[test]
    fn test_stop_is_idempotent_and_allows_restart() {
        let mut uc = use_case(StubCamera::streaming(), vec![vec![face()]]);
        let rx = uc.events();
        uc.start().unwrap();
        uc.stop().unwrap();
        uc.stop().unwrap();
        assert_eq!(uc.state(), LoopState::Idle);
        assert!(!uc.is_camera_ready());
        assert_eq!(uc.snapshot(), FrameSnapshot::default());
        assert_eq!(
            rx.try_iter()
                .filter(|e| matches!(e, SessionEvent::Stopped))
                .count(),
            1
        );

        uc.start().unwrap();
        assert_eq!(uc.state(), LoopState::Running);
    }

    #[test]
    fn test_sustained_multi_face_terminates_until_restart() {
        let mut uc = use_case(StubCamera::streaming(), vec![vec![face(), face()]]);
        let rx = uc.events();
        uc.start().unwrap();

        let failed = wait_for(&rx, |e| matches!(e, SessionEvent::Failed { .. }));
        assert_eq!(
            failed,
            Some(SessionEvent::failed(SessionFailure::MultiFaceSustained))
        );
        assert_eq!(uc.failure(), Some(SessionFailure::MultiFaceSustained));
        assert!(uc.snapshot().multi_face_sustained);

        uc.stop().unwrap();
        assert!(matches!(uc.start(), Err(MonitorError::SessionTerminated)));

        uc.restart().unwrap();
        assert_eq!(uc.failure(), None);
        uc.start().unwrap();
        uc.stop().unwrap();
    }

    #[test]
    fn test_tab_inactivity_fails_on_third_transition() {
        let mut uc = use_case(StubCamera::streaming(), vec![vec![face()]]);
        let rx = uc.events();

        for _ in 0..2 {
            assert_eq!(uc.tab_event(TabEvent::Hidden), None);
            assert_eq!(uc.tab_event(TabEvent::Blurred), None);
            assert_eq!(uc.tab_event(TabEvent::Focused), None);
        }
        assert_eq!(uc.session_state().tab_inactive_count, 2);
        assert_eq!(
            uc.tab_event(TabEvent::Hidden),
            Some(SessionFailure::TabInactivity)
        );
        assert_eq!(uc.snapshot().failure, Some(SessionFailure::TabInactivity));

        let events: Vec<_> = rx.try_iter().collect();
        assert!(events.contains(&SessionEvent::failed(SessionFailure::TabInactivity)));
        assert!(events.contains(&SessionEvent::TabChanged {
            tab: TabEvent::Hidden,
            inactive_count: 3,
        }));
        assert!(matches!(uc.start(), Err(MonitorError::SessionTerminated)));
    }

    #[test]
    fn test_restart_clears_counters() {
        let mut uc = use_case(StubCamera::streaming(), vec![vec![face()]]);
        uc.start().unwrap();
        uc.tab_event(TabEvent::Hidden);
        uc.restart().unwrap();
        assert_eq!(uc.state(), LoopState::Idle);
        assert_eq!(uc.session_state(), SessionState::default());
        assert!(!uc.is_camera_ready());
    }
}
