use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::shared::frame::Frame;

/// How much of the stream the surface can currently present, in increasing
/// order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadyState {
    HaveNothing,
    HaveMetadata,
    HaveCurrentData,
    HaveFutureData,
    HaveEnoughData,
}

#[derive(Debug)]
struct SurfaceState {
    stream_id: Option<u64>,
    ready: ReadyState,
    frame: Option<Arc<Frame>>,
    frames_received: usize,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<SurfaceState>,
    changed: Condvar,
}

/// The element a camera stream is attached to. Producers push decoded frames;
/// the detection loop samples the latest one.
///
/// Cloning yields another handle to the same surface.
#[derive(Clone, Debug)]
pub struct VideoSurface {
    shared: Arc<Shared>,
}

impl Default for VideoSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoSurface {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(SurfaceState {
                    stream_id: None,
                    ready: ReadyState::HaveNothing,
                    frame: None,
                    frames_received: 0,
                }),
                changed: Condvar::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SurfaceState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Binds a stream. Any previous stream's frames are discarded.
    pub fn attach(&self, stream_id: u64) {
        let mut state = self.lock();
        state.stream_id = Some(stream_id);
        state.ready = ReadyState::HaveMetadata;
        state.frame = None;
        state.frames_received = 0;
        self.shared.changed.notify_all();
    }

    pub fn detach(&self) {
        let mut state = self.lock();
        state.stream_id = None;
        state.ready = ReadyState::HaveNothing;
        state.frame = None;
        state.frames_received = 0;
        self.shared.changed.notify_all();
    }

    /// Called by a producer whose stream ended on its own (device unplugged,
    /// end of input). Ignored when `stream_id` has already been replaced.
    pub fn end_stream(&self, stream_id: u64) -> bool {
        let mut state = self.lock();
        if state.stream_id != Some(stream_id) {
            return false;
        }
        state.stream_id = None;
        state.ready = ReadyState::HaveNothing;
        state.frame = None;
        state.frames_received = 0;
        self.shared.changed.notify_all();
        true
    }

    pub fn stream_id(&self) -> Option<u64> {
        self.lock().stream_id
    }

    /// Publishes a decoded frame. Returns false when `stream_id` is no longer
    /// attached, which tells the producer to stop.
    pub fn push_frame(&self, stream_id: u64, frame: Frame) -> bool {
        let mut state = self.lock();
        if state.stream_id != Some(stream_id) {
            return false;
        }
        state.frames_received += 1;
        state.ready = match state.frames_received {
            1 => ReadyState::HaveCurrentData,
            2 => ReadyState::HaveFutureData,
            _ => ReadyState::HaveEnoughData,
        };
        state.frame = Some(Arc::new(frame));
        self.shared.changed.notify_all();
        true
    }

    pub fn ready_state(&self) -> ReadyState {
        self.lock().ready
    }

    /// Whether a tick may sample the surface.
    pub fn is_decodable(&self) -> bool {
        self.ready_state() >= ReadyState::HaveEnoughData
    }

    pub fn current_frame(&self) -> Option<Arc<Frame>> {
        self.lock().frame.clone()
    }

    /// Blocks until the ready state reaches `target` or `timeout` elapses.
    pub fn wait_for(&self, target: ReadyState, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if state.ready >= target {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .shared
                .changed
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
    }
}
