use super::capture_error::CaptureError;
use super::video_surface::VideoSurface;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FacingMode {
    #[default]
    User,
    Environment,
}

/// Requested stream shape. Width and height are ideals, not requirements.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub facing_mode: FacingMode,
    pub audio: bool,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            ideal_width: crate::shared::constants::DEFAULT_CAPTURE_WIDTH,
            ideal_height: crate::shared::constants::DEFAULT_CAPTURE_HEIGHT,
            facing_mode: FacingMode::User,
            audio: false,
        }
    }
}

/// Negotiated stream properties reported by the device.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamInfo {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

/// A platform camera.
///
/// `acquire` opens the device, `play` starts pushing frames onto the surface
/// (typically from a background thread) and `stop_tracks` releases the
/// device. `stop_tracks` must be safe to call at any time, repeatedly.
pub trait CameraSource: Send {
    fn acquire(&mut self, constraints: &CaptureConstraints) -> Result<StreamInfo, CaptureError>;

    fn play(&mut self, surface: &VideoSurface) -> Result<(), CaptureError>;

    fn stop_tracks(&mut self);
}
