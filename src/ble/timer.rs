//! Fast Advertising Timer
//!
//! Deadline bookkeeping for the fast advertising window. The sleeping itself
//! happens in the manager's timer task; this only tracks which expiry is live.

use embassy_time::{Duration, Instant};

/// Instruction for the timer task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerCommand {
    /// Sleep until `deadline`, then report expiry tagged with `generation`
    Arm { deadline: Instant, generation: u32 },
    /// Drop any pending deadline
    Cancel,
}

/// Fast advertising deadline plus a generation counter
#[derive(Debug, Clone)]
pub struct AdvertiseTimer {
    duration: Duration,
    deadline: Option<Instant>,
    generation: u32,
}

impl AdvertiseTimer {
    pub const fn new(duration: Duration) -> Self {
        Self {
            duration,
            deadline: None,
            generation: 0,
        }
    }

    /// Start a new window from `now`. Any expiry already in flight becomes stale.
    pub fn restart(&mut self, now: Instant) -> TimerCommand {
        self.generation = self.generation.wrapping_add(1);
        let deadline = now + self.duration;
        self.deadline = Some(deadline);
        TimerCommand::Arm {
            deadline,
            generation: self.generation,
        }
    }

    pub fn cancel(&mut self) -> TimerCommand {
        self.generation = self.generation.wrapping_add(1);
        self.deadline = None;
        TimerCommand::Cancel
    }

    /// Consume an expiry. Returns `true` only for the live generation.
    pub fn expire(&mut self, generation: u32) -> bool {
        if self.is_current(generation) {
            self.deadline = None;
            true
        } else {
            false
        }
    }

    pub fn is_current(&self, generation: u32) -> bool {
        self.deadline.is_some() && generation == self.generation
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}
