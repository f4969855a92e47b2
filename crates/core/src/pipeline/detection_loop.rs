//! Runtime for the periodic detection tick.
//!
//! One dedicated thread selects over the tick timer, the one-shot sustain
//! timer and a control channel. Detection runs on that thread without holding
//! the session lock, so at most one call is in flight and ticks that arrive
//! meanwhile are dropped by the tick channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{after, never, select, tick, Receiver, Sender};

use crate::capture::domain::video_surface::VideoSurface;
use crate::detection::domain::face_detector::FaceDetector;
use crate::heuristics::multi_face_sustain::SustainAction;
use crate::session::monitor_session::{Epoch, MonitorSession};

use super::session_event::SessionEvent;
use super::session_logger::SessionLogger;

pub(crate) fn lock_session(session: &Mutex<MonitorSession>) -> MutexGuard<'_, MonitorSession> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

enum LoopCommand {
    Stop,
}

/// Ownership handed back when the loop thread ends.
pub struct LoopParts {
    pub detector: Box<dyn FaceDetector>,
    pub logger: Box<dyn SessionLogger>,
}

pub struct DetectionLoopHandle {
    control: Sender<LoopCommand>,
    thread: JoinHandle<LoopParts>,
}

impl DetectionLoopHandle {
    /// Stops the loop and waits for it. Returns `Err` if the loop panicked,
    /// in which case the detector is lost.
    pub fn stop(self) -> thread::Result<LoopParts> {
        let _ = self.control.send(LoopCommand::Stop);
        self.thread.join()
    }

    /// True once the loop has halted on its own (stale epoch or failure).
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }
}

struct LoopContext {
    session: Arc<Mutex<MonitorSession>>,
    epoch: Epoch,
    surface: VideoSurface,
    camera_ready: Arc<AtomicBool>,
    detector: Box<dyn FaceDetector>,
    logger: Box<dyn SessionLogger>,
    events: Sender<SessionEvent>,
    completed: usize,
    sustain: Option<(Receiver<Instant>, u64)>,
}

enum Flow {
    Continue,
    Halt,
}

/// Starts ticking for a session already moved to `Running` under `epoch`.
pub fn spawn(
    session: Arc<Mutex<MonitorSession>>,
    epoch: Epoch,
    surface: VideoSurface,
    camera_ready: Arc<AtomicBool>,
    detector: Box<dyn FaceDetector>,
    logger: Box<dyn SessionLogger>,
    events: Sender<SessionEvent>,
) -> std::io::Result<DetectionLoopHandle> {
    let interval = lock_session(&session).config().tick_interval;
    let (control, control_rx) = crossbeam_channel::bounded(1);

    let ctx = LoopContext {
        session,
        epoch,
        surface,
        camera_ready,
        detector,
        logger,
        events,
        completed: 0,
        sustain: None,
    };
    let thread = thread::Builder::new()
        .name("detection-loop".into())
        .spawn(move || run(ctx, interval, control_rx))?;

    Ok(DetectionLoopHandle { control, thread })
}

fn run(mut ctx: LoopContext, interval: Duration, control: Receiver<LoopCommand>) -> LoopParts {
    let ticker = tick(interval);
    log::debug!(
        "Detection loop started (epoch {}, every {} ms)",
        ctx.epoch,
        interval.as_millis()
    );

    loop {
        let sustain_rx = match &ctx.sustain {
            Some((rx, _)) => rx.clone(),
            None => never(),
        };
        let flow = select! {
            recv(control) -> msg => match msg {
                Ok(LoopCommand::Stop) | Err(_) => Flow::Halt,
            },
            recv(ticker) -> _ => ctx.on_tick(),
            recv(sustain_rx) -> _ => ctx.on_sustain_expired(),
        };
        if let Flow::Halt = flow {
            break;
        }
    }

    ctx.logger.summary();
    log::debug!("Detection loop ended (epoch {})", ctx.epoch);
    LoopParts {
        detector: ctx.detector,
        logger: ctx.logger,
    }
}

impl LoopContext {
    fn on_tick(&mut self) -> Flow {
        if !lock_session(&self.session).accepts(self.epoch) {
            return Flow::Halt;
        }
        if !self.camera_ready.load(Ordering::Acquire) {
            self.logger.skipped("camera_not_ready");
            return Flow::Continue;
        }
        if !self.surface.is_decodable() {
            self.logger.skipped("not_decodable");
            return Flow::Continue;
        }
        let Some(frame) = self.surface.current_frame() else {
            self.logger.skipped("no_frame");
            return Flow::Continue;
        };

        let started = Instant::now();
        let detected = self.detector.detect(&frame);
        self.logger
            .timing("detect", started.elapsed().as_secs_f64() * 1000.0);

        let results = match detected {
            Ok(results) => results,
            Err(e) => {
                log::warn!("Detection failed, skipping tick: {e}");
                self.logger.skipped("detector_error");
                return Flow::Continue;
            }
        };
        self.logger.metric("faces", results.len() as f64);

        let (outcome, snapshot, state) = {
            let mut session = lock_session(&self.session);
            let outcome = session.apply_detections(self.epoch, &results, Instant::now());
            (
                outcome,
                session.snapshot().clone(),
                session.session_state().clone(),
            )
        };
        if !outcome.applied {
            return Flow::Halt;
        }
        self.completed += 1;
        self.logger.tick(self.completed);

        match outcome.sustain {
            SustainAction::Armed(ticket) => {
                let wait = ticket.deadline.saturating_duration_since(Instant::now());
                self.sustain = Some((after(wait), ticket.generation));
            }
            SustainAction::Cancelled => self.sustain = None,
            SustainAction::Unchanged => {}
        }

        self.emit(SessionEvent::Snapshot {
            snapshot,
            session: state,
        });
        match outcome.failure {
            Some(failure) => {
                self.emit(SessionEvent::failed(failure));
                Flow::Halt
            }
            None => Flow::Continue,
        }
    }

    fn on_sustain_expired(&mut self) -> Flow {
        let Some((_, generation)) = self.sustain.take() else {
            return Flow::Continue;
        };
        let (failure, snapshot, state) = {
            let mut session = lock_session(&self.session);
            let failure = session.expire_sustain(self.epoch, generation);
            (
                failure,
                session.snapshot().clone(),
                session.session_state().clone(),
            )
        };
        match failure {
            Some(failure) => {
                self.emit(SessionEvent::Snapshot {
                    snapshot,
                    session: state,
                });
                self.emit(SessionEvent::failed(failure));
                Flow::Halt
            }
            None => Flow::Continue,
        }
    }

    fn emit(&self, event: SessionEvent) {
        // The host may have dropped its receiver; the session state is still
        // readable through the facade.
        let _ = self.events.send(event);
    }
}
