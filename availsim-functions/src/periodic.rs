//! ## availsim-functions::periodic
//! **Fixed-period value emitter**
//!
//! Fires at `P, 2P, 3P, ...` and raises a value-bearing event each time.
//! Ignores its dependencies entirely; typically used for cost and usage
//! accounting ticks.

use availsim_core::prelude::*;
use tracing::trace;

pub struct PeriodicEmitter {
    id: String,
    value: f64,
    period: SimTime,
    kind: EventType,
    next_fire: Option<SimTime>,
}

impl PeriodicEmitter {
    pub fn new(id: impl Into<String>, value: f64, period: SimTime) -> Self {
        Self {
            id: id.into(),
            value,
            period,
            kind: EventType::PERIODIC_VALUE,
            next_fire: None,
        }
    }

    /// Emit under a domain event type instead of [`EventType::PERIODIC_VALUE`].
    pub fn with_event_type(mut self, kind: EventType) -> Self {
        self.kind = kind;
        self
    }

    pub fn period(&self) -> SimTime {
        self.period
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn next_fire(&self) -> Option<SimTime> {
        self.next_fire
    }
}

impl Producer for PeriodicEmitter {
    fn id(&self) -> &str {
        &self.id
    }

    fn initialize(&mut self, ctx: &InitContext<'_>) -> Result<(), ProducerError> {
        if self.period == 0 {
            return Err(ProducerError::Configuration(format!(
                "{}: period must be at least one time unit",
                ctx.id()
            )));
        }
        self.next_fire = None;
        Ok(())
    }

    fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> Result<(), ProducerError> {
        if ctx.is_setup() {
            self.next_fire = Some(ctx.wake_after(self.period)?);
            return Ok(());
        }
        let Some(fire) = self.next_fire else {
            return Ok(());
        };
        if fire != ctx.now() {
            return Ok(());
        }
        trace!(producer = %ctx.id(), time = fire, value = self.value, "periodic fire");
        ctx.raise(self.kind, Payload::Value(self.value));
        self.next_fire = Some(ctx.wake_after(self.period)?);
        Ok(())
    }

    fn duplicate(&self) -> Box<dyn Producer> {
        Box::new(
            PeriodicEmitter::new(self.id.clone(), self.value, self.period)
                .with_event_type(self.kind),
        )
    }
}
