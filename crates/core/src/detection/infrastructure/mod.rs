pub mod math;
pub mod model_loader;
pub mod model_resolver;
pub mod onnx_face_analyzer;
pub mod onnx_session;
pub mod scripted_face_detector;
