//! ## availsim-core::events
//! **Immutable event records raised by producers**
//!
//! An event is identified by `(producer, time, ordinal)`. Types are an open
//! set of string tags so domain crates can add their own without touching the
//! kernel; consumers dispatch on the tag, never on the concrete producer.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::time::SimTime;

/// Stable, cheaply clonable producer identifier.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProducerId(Arc<str>);

impl ProducerId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ProducerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl fmt::Display for ProducerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProducerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ProducerId {
    fn from(id: String) -> Self {
        Self(Arc::from(id))
    }
}

impl Borrow<str> for ProducerId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ProducerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Open event type tag.
///
/// Domain crates declare their own types as constants:
///
/// ```
/// use availsim_core::events::EventType;
///
/// const COST: EventType = EventType::new("cost");
/// assert_ne!(COST, EventType::STATE_CHANGE);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventType(&'static str);

impl EventType {
    /// Up/down transition, carries [`Payload::State`].
    pub const STATE_CHANGE: EventType = EventType::new("state change");
    /// Periodic numeric sample, carries [`Payload::Value`].
    pub const PERIODIC_VALUE: EventType = EventType::new("periodic value");

    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Typed event payload.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Empty,
    /// `true` means up/available.
    State(bool),
    Value(f64),
    Count(i64),
    /// Opaque domain-specific data.
    Raw(Bytes),
}

impl Payload {
    pub fn as_state(&self) -> Option<bool> {
        match self {
            Payload::State(up) => Some(*up),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Option<f64> {
        match self {
            Payload::Value(v) => Some(*v),
            Payload::Count(c) => Some(*c as f64),
            _ => None,
        }
    }
}

/// A single occurrence raised by a producer.
///
/// Events are only minted through [`crate::producer::EvalContext::raise`],
/// which stamps the evaluating producer's id, the current time and the next
/// ordinal of that producer.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    producer: ProducerId,
    kind: EventType,
    time: SimTime,
    ordinal: u64,
    payload: Payload,
}

impl Event {
    pub(crate) fn new(
        producer: ProducerId,
        kind: EventType,
        time: SimTime,
        ordinal: u64,
        payload: Payload,
    ) -> Self {
        Self {
            producer,
            kind,
            time,
            ordinal,
            payload,
        }
    }

    #[inline]
    pub fn producer(&self) -> &ProducerId {
        &self.producer
    }

    #[inline]
    pub fn kind(&self) -> EventType {
        self.kind
    }

    #[inline]
    pub fn time(&self) -> SimTime {
        self.time
    }

    #[inline]
    pub fn ordinal(&self) -> u64 {
        self.ordinal
    }

    #[inline]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Two events are the same occurrence iff producer, time and ordinal match.
    pub fn same_occurrence(&self, other: &Event) -> bool {
        self.producer == other.producer && self.time == other.time && self.ordinal == other.ordinal
    }
}
