use crate::detection::domain::detection_result::DetectionResult;
use crate::detection::domain::expression::Expression;

use super::gaze::GazeEstimator;
use super::liveness::{first_missing_group, is_plausibly_live};

/// Signals derived from the single face in frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FaceAnalysis {
    pub dominant_expression: Option<Expression>,
    pub looking_at_screen: Option<bool>,
    pub is_live: Option<bool>,
}

/// Classifies a tick's results. Only single-face ticks carrying both
/// landmarks and expressions are analyzed; anything else yields
/// [`FaceAnalysis::default`].
#[derive(Clone, Copy, Debug)]
pub struct HeuristicsEngine {
    gaze: GazeEstimator,
}

impl HeuristicsEngine {
    pub fn new(gaze_threshold: f64) -> Self {
        Self {
            gaze: GazeEstimator::new(gaze_threshold),
        }
    }

    pub fn analyze(&self, results: &[DetectionResult]) -> FaceAnalysis {
        let [face] = results else {
            return FaceAnalysis::default();
        };
        let (Some(landmarks), Some(expressions)) = (&face.landmarks, &face.expressions) else {
            return FaceAnalysis::default();
        };

        let is_live = is_plausibly_live(landmarks);
        if !is_live {
            log::debug!(
                "Landmark fit missing {:?}; treating face as a still image",
                first_missing_group(landmarks)
            );
        }

        FaceAnalysis {
            dominant_expression: expressions.dominant(),
            looking_at_screen: self.gaze.is_looking_at_screen(landmarks),
            is_live: Some(is_live),
        }
    }
}
