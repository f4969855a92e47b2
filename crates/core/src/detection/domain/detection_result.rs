use serde::{Deserialize, Serialize};

use super::expression::ExpressionScores;
use super::face_landmarks::FaceLandmarks;

/// Axis-aligned face box in frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    pub score: f64,
}

impl BoundingBox {
    pub fn width(&self) -> f64 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f64 {
        (self.y2 - self.y1).max(0.0)
    }
}

/// One detected face for one tick.
///
/// Landmarks and expressions are optional because a backend may drop either
/// for a face it could only localize.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landmarks: Option<FaceLandmarks>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expressions: Option<ExpressionScores>,
}

impl DetectionResult {
    pub fn new(landmarks: FaceLandmarks, expressions: ExpressionScores) -> Self {
        Self {
            bbox: None,
            landmarks: Some(landmarks),
            expressions: Some(expressions),
        }
    }

    pub fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = Some(bbox);
        self
    }
}
