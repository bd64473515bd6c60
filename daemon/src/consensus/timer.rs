//! Vote re-propagation pacing.
//!
//! The engine schedules its next voting attempt through the runtime's
//! delayed dispatch; the timer only carries the configured delay and a
//! denied flag set when a round is closed, which stops further schedules
//! without cancelling in-flight handlers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

pub struct Timer {
    delay: Duration,
    denied: AtomicBool,
}

impl Timer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            denied: AtomicBool::new(false),
        }
    }

    pub fn get_delay(&self) -> Duration {
        self.delay
    }

    /// Closes the current round for scheduling.
    pub fn deny(&self) {
        self.denied.store(true, Ordering::Release);
    }

    /// Re-opens scheduling when a new round starts.
    pub fn reset(&self) {
        self.denied.store(false, Ordering::Release);
    }

    pub fn is_denied(&self) -> bool {
        self.denied.load(Ordering::Acquire)
    }
}
