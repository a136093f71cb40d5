use thiserror::Error;

use crate::time::SimTime;

/// Faults raised by a producer during initialisation or evaluation.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ProducerError {
    #[error("wake time {requested} is not after current time {now}")]
    InvalidWakeTime { requested: SimTime, now: SimTime },

    #[error("wake time overflows simulated time (now {now}, interval {interval})")]
    WakeOverflow { now: SimTime, interval: SimTime },

    #[error("sampling failed: {0}")]
    Sampling(String),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("{0}")]
    Fault(String),
}

/// A consumer refused its configuration when subscribed.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ConsumerError {
    #[error("invalid configuration: {0}")]
    Configuration(String),
}

/// Invalid distribution parameters.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("invalid {distribution} distribution: {reason}")]
pub struct DistributionError {
    pub distribution: &'static str,
    pub reason: String,
}

impl DistributionError {
    pub(crate) fn new(distribution: &'static str, reason: impl Into<String>) -> Self {
        Self {
            distribution,
            reason: reason.into(),
        }
    }
}
