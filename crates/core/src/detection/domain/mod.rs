pub mod detection_result;
pub mod expression;
pub mod face_detector;
pub mod face_landmarks;
