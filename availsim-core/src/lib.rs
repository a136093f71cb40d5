//! # availsim-core
//!
//! Foundation layer of the availsim discrete-event kernel: the event model,
//! the producer evaluation protocol, consumers, deterministic random streams
//! and the statistics consumers fold into.
//!
//! ### Key Submodules:
//! - `events`: immutable events with open type tags
//! - `producer`: the `Producer` trait and its init/evaluation contexts
//! - `consumer`: terminal observers of routed events
//! - `random`: per-producer ChaCha8 streams and interval distributions
//! - `statistics`: constant-memory running statistics
//! - `time`: simulated time and the shared progress clock

pub mod consumer;
pub mod error;
pub mod events;
pub mod producer;
pub mod random;
pub mod statistics;
pub mod time;

pub mod prelude {
    pub use crate::consumer::Consumer;
    pub use crate::error::{ConsumerError, DistributionError, ProducerError};
    pub use crate::events::{Event, EventType, Payload, ProducerId};
    pub use crate::producer::{
        EvalContext, Evaluation, InitContext, Phase, Producer, UpstreamEvent,
    };
    pub use crate::random::{Distribution, DistributionProvider, RandomProvider, RandomStream};
    pub use crate::statistics::SampledStatistic;
    pub use crate::time::{SimClock, SimTime};
}

pub use error::{ConsumerError, DistributionError, ProducerError};
