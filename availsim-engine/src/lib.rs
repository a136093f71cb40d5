//! # availsim-engine
//!
//! Builds producer graphs and runs them forward in simulated time on a
//! worker pool, delivering the resulting events to consumers. Runs are
//! reproducible: a fixed seed yields the same event stream for any thread
//! count.
//!
//! ### Key Submodules:
//! - `builder`: graph construction, placeholders and duplication
//! - `scheduler`: coordinator and worker pool
//! - `router`: ordered delivery to consumers
//! - `simulation`: start / join / destroy lifecycle

pub mod builder;
pub mod error;
mod graph;
mod router;
mod scheduler;
pub mod simulation;

pub use builder::{GraphBuilder, ProducerRef};
pub use error::{BuildError, SimulationError, TeardownError};
pub use simulation::{CancelHandle, ConsumerHandle, RunReport, Simulation};

pub mod prelude {
    pub use crate::builder::{GraphBuilder, ProducerRef};
    pub use crate::error::{BuildError, SimulationError, TeardownError};
    pub use crate::simulation::{CancelHandle, ConsumerHandle, RunReport, Simulation};
    pub use availsim_core::prelude::*;
}
