pub mod gaze;
pub mod heuristics_engine;
pub mod liveness;
pub mod multi_face_sustain;
