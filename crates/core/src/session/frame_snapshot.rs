use serde::Serialize;

use crate::detection::domain::expression::Expression;
use crate::heuristics::heuristics_engine::FaceAnalysis;

use super::failure::SessionFailure;

/// Per-tick view of what the camera sees, as rendered by the host.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FrameSnapshot {
    pub face_count: usize,
    pub face_detected: bool,
    pub dominant_expression: Option<Expression>,
    pub looking_at_screen: Option<bool>,
    pub is_real_face: Option<bool>,
    pub multi_face_sustained: bool,
    pub failure: Option<SessionFailure>,
}

impl FrameSnapshot {
    /// Snapshot for a completed detection. Face-level signals are only kept
    /// for exactly one face.
    pub fn from_tick(face_count: usize, analysis: FaceAnalysis) -> Self {
        let single = face_count == 1;
        Self {
            face_count,
            face_detected: face_count > 0,
            dominant_expression: analysis.dominant_expression.filter(|_| single),
            looking_at_screen: analysis.looking_at_screen.filter(|_| single),
            is_real_face: analysis.is_live.filter(|_| single),
            multi_face_sustained: false,
            failure: None,
        }
    }

    pub fn failure_reason(&self) -> Option<String> {
        self.failure.map(|f| f.reason())
    }
}
