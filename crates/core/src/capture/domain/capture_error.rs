use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("camera permission denied")]
    PermissionDenied,

    #[error("no camera device found")]
    DeviceNotFound,

    #[error("camera capture is not supported on this platform")]
    UnsupportedApi,

    #[error("camera stream failed to play: {0}")]
    PlaybackError(String),

    #[error("camera error: {0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_detail() {
        let e = CaptureError::PlaybackError("timed out".into());
        assert_eq!(e.to_string(), "camera stream failed to play: timed out");
    }
}
