//! Simulation engine parameters.
//!
//! Thread count, global seed, run horizon and the depth of the queue that
//! hands completed time steps to the consumer delivery thread.

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

use crate::validation;

#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
pub struct EngineConfig {
    /// Worker threads evaluating producers. One evaluates inline.
    #[serde(default = "default_threads")]
    #[validate(range(min = 1, max = 1024))]
    pub threads: usize,

    /// Global seed every producer's random stream is derived from.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Last simulated time unit evaluated (inclusive).
    #[serde(default = "default_horizon")]
    #[validate(range(min = 1))]
    pub horizon: u64,

    /// Completed steps buffered ahead of consumer delivery (must be a power of two).
    #[serde(default = "default_delivery_buffer_capacity")]
    #[validate(range(min = 16, max = 1048576))]
    #[validate(custom(function = validation::validate_power_of_two))]
    pub delivery_buffer_capacity: usize,
}

fn default_threads() -> usize {
    num_cpus::get()
}

fn default_seed() -> u64 {
    101_010_101
}

fn default_horizon() -> u64 {
    // One year in minutes.
    525_600
}

fn default_delivery_buffer_capacity() -> usize {
    1024
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            seed: default_seed(),
            horizon: default_horizon(),
            delivery_buffer_capacity: default_delivery_buffer_capacity(),
        }
    }
}
