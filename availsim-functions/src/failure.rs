//! ## availsim-functions::failure
//! **Stochastic failure/repair generator**
//!
//! Two-state machine starting Up. Entering Up draws a time-to-failure from
//! the failure distribution; entering Down draws a time-to-repair from the
//! repair distribution. Each transition raises a state-change event carrying
//! the new state, so events strictly alternate Down, Up, Down, ...

use availsim_core::prelude::*;
use tracing::trace;

pub struct FailureGenerator {
    id: String,
    failure: Distribution,
    repair: Distribution,
    stream: Option<RandomStream>,
    up: bool,
    next_transition: Option<SimTime>,
}

impl FailureGenerator {
    pub fn new(id: impl Into<String>, failure: Distribution, repair: Distribution) -> Self {
        Self {
            id: id.into(),
            failure,
            repair,
            stream: None,
            up: true,
            next_transition: None,
        }
    }

    pub fn is_up(&self) -> bool {
        self.up
    }

    pub fn next_transition(&self) -> Option<SimTime> {
        self.next_transition
    }

    /// Draws the sojourn time of the current state and registers its end.
    fn schedule_transition(&mut self, ctx: &mut EvalContext<'_>) -> Result<(), ProducerError> {
        let distribution = if self.up { &self.failure } else { &self.repair };
        let stream = self.stream.as_mut().ok_or_else(|| {
            ProducerError::Configuration(format!("failure generator {} was not initialized", self.id))
        })?;
        let interval = distribution.sample_interval(stream)?;
        self.next_transition = Some(ctx.wake_after(interval)?);
        Ok(())
    }
}

impl Producer for FailureGenerator {
    fn id(&self) -> &str {
        &self.id
    }

    fn initialize(&mut self, ctx: &InitContext<'_>) -> Result<(), ProducerError> {
        self.stream = Some(ctx.random_stream());
        self.up = true;
        self.next_transition = None;
        Ok(())
    }

    fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> Result<(), ProducerError> {
        if ctx.is_setup() {
            self.up = true;
            return self.schedule_transition(ctx);
        }
        if self.next_transition != Some(ctx.now()) {
            // Woken by an upstream event; our own clock is unaffected.
            return Ok(());
        }
        self.up = !self.up;
        trace!(producer = %ctx.id(), time = ctx.now(), up = self.up, "state transition");
        ctx.raise(EventType::STATE_CHANGE, Payload::State(self.up));
        self.schedule_transition(ctx)
    }

    fn duplicate(&self) -> Box<dyn Producer> {
        Box::new(FailureGenerator::new(
            self.id.clone(),
            self.failure.clone(),
            self.repair.clone(),
        ))
    }
}
