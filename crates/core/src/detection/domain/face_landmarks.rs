//! 68-point facial landmarks grouped by facial region.
//!
//! Index layout follows the iBUG 300-W annotation used by common 68-point
//! regressors. Backends that produce fewer points yield empty groups for the
//! regions they do not cover.

use std::ops::Range;

use serde::{Deserialize, Serialize};

pub const LANDMARK_COUNT: usize = 68;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LandmarkGroup {
    JawOutline,
    LeftEyebrow,
    RightEyebrow,
    Nose,
    LeftEye,
    RightEye,
    Mouth,
}

impl LandmarkGroup {
    pub const ALL: [LandmarkGroup; 7] = [
        LandmarkGroup::JawOutline,
        LandmarkGroup::LeftEyebrow,
        LandmarkGroup::RightEyebrow,
        LandmarkGroup::Nose,
        LandmarkGroup::LeftEye,
        LandmarkGroup::RightEye,
        LandmarkGroup::Mouth,
    ];

    pub fn range(self) -> Range<usize> {
        match self {
            LandmarkGroup::JawOutline => 0..17,
            LandmarkGroup::LeftEyebrow => 17..22,
            LandmarkGroup::RightEyebrow => 22..27,
            LandmarkGroup::Nose => 27..36,
            LandmarkGroup::LeftEye => 36..42,
            LandmarkGroup::RightEye => 42..48,
            LandmarkGroup::Mouth => 48..68,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FaceLandmarks {
    points: Vec<Point>,
}

impl FaceLandmarks {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Points of one region, truncated to what the backend supplied.
    pub fn group(&self, group: LandmarkGroup) -> &[Point] {
        let range = group.range();
        let end = range.end.min(self.points.len());
        let start = range.start.min(end);
        &self.points[start..end]
    }

    pub fn jaw_outline(&self) -> &[Point] {
        self.group(LandmarkGroup::JawOutline)
    }

    pub fn nose(&self) -> &[Point] {
        self.group(LandmarkGroup::Nose)
    }

    pub fn left_eye(&self) -> &[Point] {
        self.group(LandmarkGroup::LeftEye)
    }

    pub fn right_eye(&self) -> &[Point] {
        self.group(LandmarkGroup::RightEye)
    }
}
