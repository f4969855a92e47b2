use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::domain::camera_source::{CameraSource, CaptureConstraints, StreamInfo};
use super::domain::capture_error::CaptureError;
use super::domain::video_surface::{ReadyState, VideoSurface};

/// Camera permission as last observed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Prompt,
    Granted,
    Denied,
    Unknown,
}

/// Token for the active stream. Stopping with a handle whose stream has
/// already been replaced or stopped does nothing.
#[derive(Debug, PartialEq)]
pub struct CaptureHandle {
    id: u64,
    info: StreamInfo,
}

impl CaptureHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn info(&self) -> &StreamInfo {
        &self.info
    }
}

/// Sole owner of the camera stream.
pub struct CaptureManager {
    source: Box<dyn CameraSource>,
    surface: VideoSurface,
    constraints: CaptureConstraints,
    startup_timeout: Duration,
    ready: Arc<AtomicBool>,
    active: Option<u64>,
    next_id: u64,
    permission: PermissionState,
}

impl CaptureManager {
    pub fn new(
        source: Box<dyn CameraSource>,
        constraints: CaptureConstraints,
        startup_timeout: Duration,
    ) -> Self {
        Self {
            source,
            surface: VideoSurface::new(),
            constraints,
            startup_timeout,
            ready: Arc::new(AtomicBool::new(false)),
            active: None,
            next_id: 1,
            permission: PermissionState::Prompt,
        }
    }

    pub fn surface(&self) -> &VideoSurface {
        &self.surface
    }

    /// Shared "camera ready" flag, observed by the detection loop.
    pub fn ready_flag(&self) -> Arc<AtomicBool> {
        self.ready.clone()
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn permission(&self) -> PermissionState {
        self.permission
    }

    pub fn active_stream(&self) -> Option<u64> {
        self.active
    }

    /// Acquires the camera and blocks until the surface shows a frame.
    pub fn start(&mut self) -> Result<CaptureHandle, CaptureError> {
        self.release();

        let info = match self.source.acquire(&self.constraints) {
            Ok(info) => {
                self.permission = PermissionState::Granted;
                info
            }
            Err(e) => {
                self.permission = match e {
                    CaptureError::PermissionDenied => PermissionState::Denied,
                    CaptureError::UnsupportedApi => PermissionState::Unknown,
                    _ => self.permission,
                };
                log::warn!("Camera acquisition failed: {e}");
                return Err(e);
            }
        };

        let id = self.next_id;
        self.next_id += 1;
        self.surface.attach(id);

        if let Err(e) = self.source.play(&self.surface) {
            self.release();
            return Err(match e {
                CaptureError::PlaybackError(_) => e,
                other => CaptureError::PlaybackError(other.to_string()),
            });
        }

        if !self
            .surface
            .wait_for(ReadyState::HaveCurrentData, self.startup_timeout)
        {
            self.release();
            return Err(CaptureError::PlaybackError(format!(
                "no frames within {} ms",
                self.startup_timeout.as_millis()
            )));
        }

        self.active = Some(id);
        self.ready.store(true, Ordering::Release);
        log::info!(
            "Camera started: {} ({}x{} @ {:.1} fps)",
            info.label,
            info.width,
            info.height,
            info.fps
        );
        Ok(CaptureHandle { id, info })
    }

    pub fn stop(&mut self, handle: &CaptureHandle) {
        if self.active != Some(handle.id) {
            return;
        }
        self.release();
        log::info!("Camera stopped");
    }

    fn release(&mut self) {
        self.ready.store(false, Ordering::Release);
        self.active = None;
        self.source.stop_tracks();
        self.surface.detach();
    }
}

impl Drop for CaptureManager {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::shared::frame::Frame;
    use std::sync::atomic::AtomicUsize;

    /// Camera that pushes `frames` frames synchronously on `play`.
    pub(crate) struct StubCamera {
        pub acquire_error: Option<CaptureError>,
        pub frames: usize,
        pub stops: Arc<AtomicUsize>,
    }

    impl StubCamera {
        pub(crate) fn streaming() -> Self {
            Self {
                acquire_error: None,
                frames: 3,
                stops: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl CameraSource for StubCamera {
        fn acquire(&mut self, _: &CaptureConstraints) -> Result<StreamInfo, CaptureError> {
            match &self.acquire_error {
                Some(e) => Err(e.clone()),
                None => Ok(StreamInfo {
                    label: "stub".into(),
                    width: 8,
                    height: 8,
                    fps: 30.0,
                }),
            }
        }

        fn play(&mut self, surface: &VideoSurface) -> Result<(), CaptureError> {
            let id = surface.stream_id().ok_or(CaptureError::Other("detached".into()))?;
            for i in 0..self.frames {
                surface.push_frame(id, Frame::new(vec![0u8; 8 * 8 * 3], 8, 8, 3, i));
            }
            Ok(())
        }

        fn stop_tracks(&mut self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn manager(camera: StubCamera) -> CaptureManager {
        CaptureManager::new(
            Box::new(camera),
            CaptureConstraints::default(),
            Duration::from_millis(50),
        )
    }

    #[test]
    fn test_start_sets_ready_flag() {
        let mut m = manager(StubCamera::streaming());
        assert_eq!(m.permission(), PermissionState::Prompt);
        let handle = m.start().unwrap();
        assert!(m.is_ready());
        assert!(m.surface().is_decodable());
        assert_eq!(m.permission(), PermissionState::Granted);
        assert_eq!(m.active_stream(), Some(handle.id()));
    }

    #[test]
    fn test_ready_flag_follows_stop() {
        let mut m = manager(StubCamera::streaming());
        let flag = m.ready_flag();
        let handle = m.start().unwrap();
        assert!(flag.load(Ordering::Acquire));
        m.stop(&handle);
        assert!(!flag.load(Ordering::Acquire));
    }

    #[test]
    fn test_permission_denied_is_surfaced() {
        let mut m = manager(StubCamera {
            acquire_error: Some(CaptureError::PermissionDenied),
            ..StubCamera::streaming()
        });
        assert_eq!(m.start().unwrap_err(), CaptureError::PermissionDenied);
        assert_eq!(m.permission(), PermissionState::Denied);
        assert!(!m.is_ready());
    }

    #[test]
    fn test_silent_camera_is_playback_error() {
        let mut m = manager(StubCamera {
            frames: 0,
            ..StubCamera::streaming()
        });
        let err = m.start().unwrap_err();
        assert!(matches!(err, CaptureError::PlaybackError(_)));
        assert!(!m.is_ready());
        assert_eq!(m.surface().ready_state(), ReadyState::HaveNothing);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let camera = StubCamera::streaming();
        let stops = camera.stops.clone();
        let mut m = manager(camera);
        let handle = m.start().unwrap();
        let before = stops.load(Ordering::SeqCst);

        m.stop(&handle);
        m.stop(&handle);
        assert_eq!(stops.load(Ordering::SeqCst), before + 1);
        assert!(!m.is_ready());
        assert_eq!(m.surface().ready_state(), ReadyState::HaveNothing);
    }

    #[test]
    fn test_restart_replaces_stream_and_stale_handle_is_noop() {
        let mut m = manager(StubCamera::streaming());
        let first = m.start().unwrap();
        let second = m.start().unwrap();
        assert_ne!(first.id(), second.id());

        m.stop(&first);
        assert!(m.is_ready(), "stale handle must not stop the new stream");
        m.stop(&second);
        assert!(!m.is_ready());
    }
}
