use serde::Serialize;

use crate::session::failure::SessionFailure;
use crate::session::frame_snapshot::FrameSnapshot;
use crate::session::session_guard::TabEvent;
use crate::session::session_state::SessionState;

/// Notifications for the host, in the order they happened.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    CameraReady {
        label: String,
        width: u32,
        height: u32,
    },
    /// A completed tick (or a state change that rewrote the snapshot).
    Snapshot {
        snapshot: FrameSnapshot,
        session: SessionState,
    },
    TabChanged {
        tab: TabEvent,
        inactive_count: u32,
    },
    Failed {
        failure: SessionFailure,
        reason: String,
    },
    Stopped,
}

impl SessionEvent {
    pub fn failed(failure: SessionFailure) -> Self {
        Self::Failed {
            failure,
            reason: failure.reason(),
        }
    }
}
