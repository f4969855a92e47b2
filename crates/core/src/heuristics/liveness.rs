use crate::detection::domain::face_landmarks::{FaceLandmarks, LandmarkGroup};

/// Regions a live face must present for the landmark fit to be plausible.
pub const REQUIRED_GROUPS: [LandmarkGroup; 4] = [
    LandmarkGroup::JawOutline,
    LandmarkGroup::LeftEye,
    LandmarkGroup::RightEye,
    LandmarkGroup::Nose,
];

/// Plausibility check: true iff every required region has at least one point.
pub fn is_plausibly_live(landmarks: &FaceLandmarks) -> bool {
    REQUIRED_GROUPS
        .iter()
        .all(|&group| !landmarks.group(group).is_empty())
}

/// First required region that came back empty, for diagnostics.
pub fn first_missing_group(landmarks: &FaceLandmarks) -> Option<LandmarkGroup> {
    REQUIRED_GROUPS
        .iter()
        .copied()
        .find(|&group| landmarks.group(group).is_empty())
}
