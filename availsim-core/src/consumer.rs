//! Terminal observers of the event stream.

use crate::error::ConsumerError;
use crate::events::{Event, EventType};
use crate::time::SimTime;

/// Folds a filtered event stream into a running statistic.
///
/// The router calls [`Consumer::consume`] one event at a time, in
/// non-decreasing time order; a consumer never sees concurrent folds.
pub trait Consumer: Send + 'static {
    fn id(&self) -> &str;

    /// Checks the consumer's configuration once, when it is subscribed.
    fn initialize(&mut self) -> Result<(), ConsumerError> {
        Ok(())
    }

    /// Filter applied before delivery. Accepts everything by default.
    fn accepts(&self, kind: EventType) -> bool {
        let _ = kind;
        true
    }

    fn consume(&mut self, event: &Event);

    /// Called once when the run completes, with the end of simulated time.
    fn close(&mut self, end_time: SimTime) {
        let _ = end_time;
    }
}
