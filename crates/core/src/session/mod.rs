pub mod failure;
pub mod frame_snapshot;
pub mod monitor_session;
pub mod session_guard;
pub mod session_state;
