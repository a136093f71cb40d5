//! ## availsim-core::producer
//! **Graph nodes and their time-stepped evaluation protocol**
//!
//! A scheduler evaluates a producer at time `T` only when the producer
//! registered `T` as a wake time, or when a dependency raised an event at
//! `T`. The very first evaluation happens at time 0 in [`Phase::Setup`],
//! which lets stochastic producers draw their first interval without
//! backdating an event.

use crate::error::ProducerError;
use crate::events::{Event, EventType, Payload, ProducerId};
use crate::random::{RandomProvider, RandomStream};
use crate::time::SimTime;

/// A node of the dependency graph.
///
/// Runtime state is only ever touched from inside [`Producer::evaluate`],
/// which the scheduler never runs concurrently for the same producer.
pub trait Producer: Send + 'static {
    /// Default id used when the producer is added to a graph.
    fn id(&self) -> &str;

    /// Called once, at graph build time, after all dependency edges are known.
    /// Returning an error rejects the graph.
    fn initialize(&mut self, ctx: &InitContext<'_>) -> Result<(), ProducerError> {
        let _ = ctx;
        Ok(())
    }

    fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> Result<(), ProducerError>;

    /// A fresh instance with the same configuration and reset runtime state.
    fn duplicate(&self) -> Box<dyn Producer>;
}

/// What a producer sees when it is wired into a graph.
pub struct InitContext<'a> {
    id: &'a ProducerId,
    dependencies: &'a [ProducerId],
    random: &'a RandomProvider,
}

impl<'a> InitContext<'a> {
    pub fn new(
        id: &'a ProducerId,
        dependencies: &'a [ProducerId],
        random: &'a RandomProvider,
    ) -> Self {
        Self {
            id,
            dependencies,
            random,
        }
    }

    /// Id the graph knows this producer by. Differs from [`Producer::id`] for duplicates.
    pub fn id(&self) -> &ProducerId {
        self.id
    }

    /// Dependencies in the order they were added.
    pub fn dependencies(&self) -> &[ProducerId] {
        self.dependencies
    }

    /// This producer's private stream.
    pub fn random_stream(&self) -> RandomStream {
        self.random.stream_for(self.id.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// First evaluation, at time 0.
    Setup,
    Tick,
}

/// An event raised by a dependency at the current time.
#[derive(Clone, Debug, PartialEq)]
pub struct UpstreamEvent {
    /// Position of the dependency in the producer's dependency list.
    pub dependency: usize,
    pub event: Event,
}

/// Output of one evaluation.
#[derive(Debug, Default, PartialEq)]
pub struct Evaluation {
    pub events: Vec<Event>,
    pub wakes: Vec<SimTime>,
}

/// Evaluation-time view handed to [`Producer::evaluate`].
///
/// Collects raised events and wake registrations. A non-future wake time is
/// remembered even if the producer swallows the returned error, so the
/// scheduler can abort the run.
pub struct EvalContext<'a> {
    id: &'a ProducerId,
    now: SimTime,
    phase: Phase,
    upstream: &'a [UpstreamEvent],
    states: &'a [Option<bool>],
    last_ordinal: &'a mut u64,
    output: Evaluation,
    violation: Option<ProducerError>,
}

impl<'a> EvalContext<'a> {
    /// `last_ordinal` is the producer's ordinal counter; it is advanced for
    /// every raised event and must persist between evaluations.
    pub fn new(
        id: &'a ProducerId,
        now: SimTime,
        phase: Phase,
        upstream: &'a [UpstreamEvent],
        last_ordinal: &'a mut u64,
    ) -> Self {
        Self {
            id,
            now,
            phase,
            upstream,
            states: &[],
            last_ordinal,
            output: Evaluation::default(),
            violation: None,
        }
    }

    /// Latest known up/down state of each dependency, by dependency position.
    /// `None` for a dependency that never raised a state change.
    pub fn with_dependency_states(mut self, states: &'a [Option<bool>]) -> Self {
        self.states = states;
        self
    }

    pub fn id(&self) -> &ProducerId {
        self.id
    }

    #[inline]
    pub fn now(&self) -> SimTime {
        self.now
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[inline]
    pub fn is_setup(&self) -> bool {
        self.phase == Phase::Setup
    }

    /// Events raised by dependencies at [`EvalContext::now`], ordered by
    /// dependency position, then ordinal.
    pub fn upstream(&self) -> &[UpstreamEvent] {
        self.upstream
    }

    /// Latest state-change payload raised by the dependency at `position`,
    /// including events raised at [`EvalContext::now`].
    pub fn dependency_state(&self, position: usize) -> Option<bool> {
        self.states.get(position).copied().flatten()
    }

    /// Raises an event at the current time and returns its ordinal.
    pub fn raise(&mut self, kind: EventType, payload: Payload) -> u64 {
        *self.last_ordinal += 1;
        let ordinal = *self.last_ordinal;
        self.output
            .events
            .push(Event::new(self.id.clone(), kind, self.now, ordinal, payload));
        ordinal
    }

    /// Registers a future time at which this producer must be evaluated.
    pub fn register_wake(&mut self, at: SimTime) -> Result<(), ProducerError> {
        if at <= self.now {
            let err = ProducerError::InvalidWakeTime {
                requested: at,
                now: self.now,
            };
            self.violation.get_or_insert_with(|| err.clone());
            return Err(err);
        }
        self.output.wakes.push(at);
        Ok(())
    }

    /// Registers a wake `interval` units from now and returns the absolute time.
    pub fn wake_after(&mut self, interval: SimTime) -> Result<SimTime, ProducerError> {
        let at = self
            .now
            .checked_add(interval)
            .ok_or(ProducerError::WakeOverflow {
                now: self.now,
                interval,
            })?;
        self.register_wake(at)?;
        Ok(at)
    }

    /// Closes the evaluation. Fails if a contract violation was recorded.
    pub fn finish(self) -> Result<Evaluation, ProducerError> {
        match self.violation {
            Some(err) => Err(err),
            None => Ok(self.output),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raise_stamps_id_time_and_ordinal() {
        let id = ProducerId::from("p");
        let mut ordinal = 4;
        let mut ctx = EvalContext::new(&id, 30, Phase::Tick, &[], &mut ordinal);
        assert_eq!(ctx.raise(EventType::PERIODIC_VALUE, Payload::Value(1.0)), 5);
        assert_eq!(ctx.raise(EventType::PERIODIC_VALUE, Payload::Value(2.0)), 6);
        let out = ctx.finish().unwrap();
        assert_eq!(out.events.len(), 2);
        assert_eq!(out.events[0].producer().as_str(), "p");
        assert_eq!(out.events[1].time(), 30);
        assert_eq!(out.events[1].ordinal(), 6);
        assert_eq!(ordinal, 6);
    }

    #[test]
    fn past_or_present_wake_is_rejected_and_remembered() {
        let id = ProducerId::from("p");
        let mut ordinal = 0;
        let mut ctx = EvalContext::new(&id, 10, Phase::Tick, &[], &mut ordinal);
        assert!(ctx.register_wake(10).is_err());
        assert!(ctx.register_wake(11).is_ok());
        assert_eq!(
            ctx.finish(),
            Err(ProducerError::InvalidWakeTime {
                requested: 10,
                now: 10
            })
        );
    }

    #[test]
    fn wake_after_is_relative_to_now() {
        let id = ProducerId::from("p");
        let mut ordinal = 0;
        let mut ctx = EvalContext::new(&id, 100, Phase::Setup, &[], &mut ordinal);
        assert!(ctx.is_setup());
        assert_eq!(ctx.wake_after(5), Ok(105));
        assert!(ctx.wake_after(0).is_err());
        assert!(matches!(
            ctx.wake_after(SimTime::MAX),
            Err(ProducerError::WakeOverflow { .. })
        ));
    }

    #[test]
    fn init_context_streams_follow_graph_id() {
        let provider = RandomProvider::new(1);
        let id = ProducerId::from("copy");
        let ctx = InitContext::new(&id, &[], &provider);
        assert_eq!(ctx.random_stream().key(), provider.stream_for("copy").key());
    }

    #[test]
    fn dependency_states_default_to_unknown() {
        let id = ProducerId::from("gate");
        let mut ordinal = 0;
        let ctx = EvalContext::new(&id, 3, Phase::Tick, &[], &mut ordinal);
        assert_eq!(ctx.dependency_state(0), None);

        let states = [Some(false), None, Some(true)];
        let ctx = EvalContext::new(&id, 3, Phase::Tick, &[], &mut ordinal)
            .with_dependency_states(&states);
        assert_eq!(ctx.dependency_state(0), Some(false));
        assert_eq!(ctx.dependency_state(1), None);
        assert_eq!(ctx.dependency_state(2), Some(true));
        assert_eq!(ctx.dependency_state(3), None);
    }
}
