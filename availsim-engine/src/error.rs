use availsim_core::events::ProducerId;
use availsim_core::time::SimTime;
use availsim_core::{ConsumerError, ProducerError};
use thiserror::Error;

/// Graph configuration errors, raised before a simulation exists.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("producer id `{0}` is already registered")]
    DuplicateId(ProducerId),

    #[error("no producer with id `{0}`")]
    UnknownProducer(String),

    #[error("placeholder `{0}` was declared but never bound")]
    Unbound(ProducerId),

    #[error("placeholder `{0}` is already bound")]
    AlreadyBound(ProducerId),

    #[error("reference to `{0}` belongs to a different builder")]
    ForeignReference(ProducerId),

    #[error("dependency cycle through {}", format_ids(.0))]
    Cycle(Vec<ProducerId>),

    #[error("producer `{producer}` rejected its configuration: {source}")]
    Initialization {
        producer: ProducerId,
        #[source]
        source: ProducerError,
    },

    #[error("a simulation needs at least one worker thread")]
    ZeroThreads,

    #[error("delivery buffer capacity must be at least 1")]
    ZeroBufferCapacity,

    #[error("metrics registry setup failed: {0}")]
    Metrics(String),
}

fn format_ids(ids: &[ProducerId]) -> String {
    ids.iter()
        .map(ProducerId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Terminal failure of a run, or misuse of the simulation lifecycle.
///
/// `Clone` so every `join` after the first returns the same status.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum SimulationError {
    #[error("producer `{producer}` failed at time {time}: {source}")]
    ProducerFault {
        producer: ProducerId,
        time: SimTime,
        #[source]
        source: ProducerError,
    },

    #[error("producer `{producer}` broke the scheduling contract at time {time}: {reason}")]
    ContractViolation {
        producer: ProducerId,
        time: SimTime,
        reason: String,
    },

    #[error("{context} panicked: {message}")]
    Panicked { context: String, message: String },

    #[error("simulation was cancelled")]
    Cancelled,

    #[error("no producer with id `{0}` to subscribe to")]
    UnknownProducer(String),

    #[error("consumer `{consumer}` rejected its configuration: {source}")]
    ConsumerRejected {
        consumer: String,
        #[source]
        source: ConsumerError,
    },

    #[error("simulation was already started")]
    AlreadyStarted,

    #[error("simulation was never started")]
    NotStarted,

    #[error("no horizon configured")]
    NoConfiguredHorizon,

    #[error("failed to spawn {thread} thread: {reason}")]
    Spawn { thread: String, reason: String },

    #[error("event delivery stopped before the run finished")]
    DeliveryStopped,

    #[error("worker pool disconnected")]
    WorkersDisconnected,
}

/// Problems found while tearing a simulation down. Never replaces the
/// status already returned by `join`.
#[derive(Debug, Error)]
pub enum TeardownError {
    #[error("threads panicked during shutdown: {}", .0.join(", "))]
    ThreadsPanicked(Vec<String>),
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
