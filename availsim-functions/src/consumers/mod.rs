//! ## availsim-functions::consumers
//! **Stock consumers**
//!
//! - `availability`: fraction of observed time a producer reported Up
//! - `periodic_sum`: fixed-length bins of summed numeric payloads
//! - `recording`: the raw delivered sequence

pub mod availability;
pub mod periodic_sum;
pub mod recording;

pub use availability::AvailabilityConsumer;
pub use periodic_sum::PeriodicSumConsumer;
pub use recording::RecordingConsumer;
