use std::path::Path;

use crate::detection::domain::detection_result::DetectionResult;
use crate::detection::domain::face_detector::FaceDetector;
use crate::shared::frame::Frame;

/// Replays pre-recorded detection results, one step per call, looping.
///
/// The script is a JSON array of steps; each step is the array of faces the
/// detector reports for that call. Used by hosts without model files and by
/// tests that need a deterministic face sequence.
pub struct ScriptedFaceDetector {
    steps: Vec<Vec<DetectionResult>>,
    calls: usize,
}

impl ScriptedFaceDetector {
    pub fn new(steps: Vec<Vec<DetectionResult>>) -> Self {
        Self { steps, calls: 0 }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    pub fn from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
        Ok(Self::from_json(&json)?)
    }

    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl FaceDetector for ScriptedFaceDetector {
    fn detect(
        &mut self,
        _frame: &Frame,
    ) -> Result<Vec<DetectionResult>, Box<dyn std::error::Error>> {
        let step = if self.steps.is_empty() {
            Vec::new()
        } else {
            self.steps[self.calls % self.steps.len()].clone()
        };
        self.calls += 1;
        Ok(step)
    }
}
