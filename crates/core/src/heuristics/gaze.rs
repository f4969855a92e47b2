//! Coarse gaze estimate from eye landmark aspect ratios.
//!
//! A wide, narrow eye outline (high width/height ratio) reads as the subject
//! facing the screen; a taller outline reads as looking away or down. This is
//! deliberately rough: it only needs to flag obvious disengagement.

use crate::detection::domain::face_landmarks::{FaceLandmarks, Point};
use crate::shared::constants::MIN_EYE_POINTS;

/// Horizontal corner distance (p0–p3) over vertical lid distance (p1–p5).
///
/// Returns `None` when fewer than [`MIN_EYE_POINTS`] points are available.
pub fn eye_aspect_ratio(eye: &[Point]) -> Option<f64> {
    if eye.len() < MIN_EYE_POINTS {
        return None;
    }
    let width = eye[0].distance(&eye[3]);
    let height = eye[1].distance(&eye[5]);
    Some(width / height)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GazeEstimator {
    threshold: f64,
}

impl GazeEstimator {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Average eye aspect ratio over both eyes, if both have enough points.
    ///
    /// Shut lids give an infinite ratio and a fully collapsed eye gives NaN;
    /// both are returned as-is.
    pub fn average_ratio(&self, landmarks: &FaceLandmarks) -> Option<f64> {
        let left = eye_aspect_ratio(landmarks.left_eye())?;
        let right = eye_aspect_ratio(landmarks.right_eye())?;
        Some((left + right) / 2.0)
    }

    /// `Some(true)` looking at screen, `Some(false)` looking away,
    /// `None` when an eye has too few points. A NaN average is not above the
    /// threshold and so counts as looking away.
    pub fn is_looking_at_screen(&self, landmarks: &FaceLandmarks) -> Option<bool> {
        self.average_ratio(landmarks)
            .map(|avg| avg > self.threshold)
    }
}
