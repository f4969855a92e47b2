use crate::detection::domain::detection_result::DetectionResult;
use crate::shared::frame::Frame;

/// Domain interface for the external face analysis capability.
///
/// One call returns every face in the frame, each with landmarks and
/// expression scores where the backend produced them. Implementations may
/// hold inference state, hence `&mut self`; callers never invoke `detect`
/// concurrently on one instance.
pub trait FaceDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<DetectionResult>, Box<dyn std::error::Error>>;
}
