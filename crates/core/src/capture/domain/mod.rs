pub mod camera_source;
pub mod capture_error;
pub mod video_surface;
