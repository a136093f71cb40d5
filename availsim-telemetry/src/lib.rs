//! # availsim-telemetry
//!
//! Logging setup and run metrics shared by the availsim crates.

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, init_logging_from, LoggingError};
pub use metrics::MetricsRecorder;
