//! ## availsim-core::time
//! **Simulated time and the shared progress clock**

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Simulated time in abstract, caller-defined units (minutes, hours, ...).
pub type SimTime = u64;

/// Simulated clock shared between the scheduler and observers.
///
/// Only the scheduler advances it; everyone else reads.
#[derive(Clone, Debug, Default)]
pub struct SimClock {
    now: Arc<AtomicU64>,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn now(&self) -> SimTime {
        self.now.load(Ordering::Acquire)
    }

    /// Moves the clock forward to `time`. Never moves it backwards.
    #[inline]
    pub fn advance_to(&self, time: SimTime) {
        self.now.fetch_max(time, Ordering::Release);
    }
}
