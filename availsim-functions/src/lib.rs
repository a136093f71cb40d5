//! # availsim-functions
//!
//! Producer variants and stock consumers built on `availsim-core`.
//!
//! ### Key Submodules:
//! - `failure`: stochastic failure/repair generator
//! - `kofn`: K-of-N availability gate
//! - `periodic`: fixed-period value emitter
//! - `consumers`: availability, binned sums and raw recording
//! - `relationships`: MTBF / MTTR / availability conversions

pub mod consumers;
pub mod failure;
pub mod kofn;
pub mod periodic;
pub mod relationships;

pub use consumers::{AvailabilityConsumer, PeriodicSumConsumer, RecordingConsumer};
pub use failure::FailureGenerator;
pub use kofn::KofNGate;
pub use periodic::PeriodicEmitter;
