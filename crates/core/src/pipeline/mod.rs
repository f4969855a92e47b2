pub mod detection_loop;
pub mod monitor_use_case;
pub mod session_event;
pub mod session_logger;
