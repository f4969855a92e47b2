pub const DETECTOR_MODEL_NAME: &str = "face_detector.onnx";
pub const LANDMARK_MODEL_NAME: &str = "face_landmark_68.onnx";
pub const EXPRESSION_MODEL_NAME: &str = "face_expression.onnx";

/// Served next to the binary, mirroring a web app's `/models` folder.
pub const DEFAULT_MODEL_BASE_URI: &str = "models";

pub const DEFAULT_TICK_INTERVAL_MS: u64 = 200;
pub const DEFAULT_MULTI_FACE_SUSTAIN_MS: u64 = 5000;
pub const DEFAULT_TAB_INACTIVE_LIMIT: u32 = 3;

/// Average eye aspect ratio above which the subject counts as looking at the screen.
pub const DEFAULT_GAZE_THRESHOLD: f64 = 3.0;

pub const DEFAULT_CAPTURE_WIDTH: u32 = 640;
pub const DEFAULT_CAPTURE_HEIGHT: u32 = 480;
pub const DEFAULT_CAMERA_STARTUP_TIMEOUT_MS: u64 = 5000;

/// Minimum landmark points per eye for a gaze estimate.
pub const MIN_EYE_POINTS: usize = 6;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
