//! Debounce for multiple faces in frame.
//!
//! A momentary double detection is common (reflections, a face on a poster
//! entering and leaving the crop). Only a count above one that holds for the
//! whole sustain window is treated as a failure.

use std::time::{Duration, Instant};

/// Identifies one arming of the sustain timer. Expiries carrying an older
/// generation are ignored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SustainTicket {
    pub generation: u64,
    pub deadline: Instant,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SustainAction {
    /// A new one-shot timer must be scheduled for the ticket's deadline.
    Armed(SustainTicket),
    /// The pending timer must be dropped.
    Cancelled,
    Unchanged,
}

#[derive(Clone, Copy, Debug)]
struct Armed {
    generation: u64,
    started_at: Instant,
}

#[derive(Debug)]
pub struct MultiFaceSustain {
    duration: Duration,
    armed: Option<Armed>,
    next_generation: u64,
}

impl MultiFaceSustain {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            armed: None,
            next_generation: 0,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// When the currently armed timer started, if any.
    pub fn started_at(&self) -> Option<Instant> {
        self.armed.map(|a| a.started_at)
    }

    /// Feeds the face count of a completed tick.
    pub fn observe(&mut self, face_count: usize, now: Instant) -> SustainAction {
        match (face_count > 1, self.armed) {
            (true, None) => {
                let generation = self.next_generation;
                self.next_generation += 1;
                self.armed = Some(Armed {
                    generation,
                    started_at: now,
                });
                SustainAction::Armed(SustainTicket {
                    generation,
                    deadline: now + self.duration,
                })
            }
            (false, Some(_)) => {
                self.armed = None;
                SustainAction::Cancelled
            }
            _ => SustainAction::Unchanged,
        }
    }

    /// Handles a timer firing. Returns true when the ticket is the live one;
    /// the timer is consumed either way.
    pub fn expire(&mut self, generation: u64) -> bool {
        match self.armed {
            Some(armed) if armed.generation == generation => {
                self.armed = None;
                true
            }
            _ => false,
        }
    }

    /// Drops any pending timer; its ticket becomes stale.
    pub fn cancel(&mut self) {
        self.armed = None;
    }
}
