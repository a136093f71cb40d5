//! ## availsim-engine::scheduler
//! **Deterministic time-stepped dataflow scheduler**
//!
//! Simulated time advances in discrete steps. At each step `T` the
//! coordinator pops the producers that registered `T` as a wake time, and
//! computes their downstream cone: every producer that could observe an
//! event raised at `T`. A cone member becomes ready once all of its cone
//! dependencies completed `T`. Ready members run on the worker pool; a ready
//! member that was not woken and received no upstream event completes
//! without being evaluated.
//!
//! Each producer's inputs are a pure function of its dependencies' outputs
//! at `T` (sorted by dependency position) and its own state, and every
//! producer draws from a private random stream. The event sequence is thus
//! independent of how many workers run the step and in which order they
//! finish.
//!
//! The very first step evaluates every producer at time 0 in setup phase.

use std::collections::{BTreeMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use availsim_core::prelude::*;
use availsim_telemetry::MetricsRecorder;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::error::{panic_message, SimulationError};
use crate::graph::Graph;
use crate::router::StepBatch;

/// How often a blocked coordinator or router re-checks the cancellation flag.
pub(crate) const CANCEL_POLL: Duration = Duration::from_millis(20);

/// A producer and the runtime bookkeeping the scheduler keeps for it.
pub(crate) struct Slot {
    producer: Box<dyn Producer>,
    last_ordinal: u64,
    time_processed: Option<SimTime>,
}

impl Slot {
    pub(crate) fn new(producer: Box<dyn Producer>) -> Self {
        Self {
            producer,
            last_ordinal: 0,
            time_processed: None,
        }
    }
}

/// Topology plus producer slots, shared read-only with the workers. A slot
/// is locked only by the worker evaluating it, and at most one evaluation
/// per producer is in flight.
pub(crate) struct Shared {
    pub(crate) graph: Graph,
    slots: Vec<Mutex<Slot>>,
}

impl Shared {
    pub(crate) fn new(graph: Graph, slots: Vec<Slot>) -> Self {
        Self {
            graph,
            slots: slots.into_iter().map(Mutex::new).collect(),
        }
    }
}

struct Task {
    node: usize,
    time: SimTime,
    phase: Phase,
    upstream: Vec<UpstreamEvent>,
    states: Vec<Option<bool>>,
}

struct Completion {
    node: usize,
    result: Result<Evaluation, SimulationError>,
}

/// Runs one producer evaluation, converting faults and panics into
/// [`SimulationError`]s.
fn evaluate(shared: &Shared, task: Task) -> Completion {
    let Task {
        node,
        time,
        phase,
        upstream,
        states,
    } = task;
    let id = shared.graph.id(node);
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let mut guard = shared.slots[node].lock();
        let slot = &mut *guard;
        if let Some(processed) = slot.time_processed {
            if processed >= time {
                return Err(SimulationError::ContractViolation {
                    producer: id.clone(),
                    time,
                    reason: format!("already evaluated at time {processed}"),
                });
            }
        }
        let mut ctx = EvalContext::new(id, time, phase, &upstream, &mut slot.last_ordinal)
            .with_dependency_states(&states);
        let evaluated = slot.producer.evaluate(&mut ctx);
        let finished = ctx.finish();
        slot.time_processed = Some(time);
        match (evaluated, finished) {
            (_, Err(violation)) => Err(SimulationError::ContractViolation {
                producer: id.clone(),
                time,
                reason: violation.to_string(),
            }),
            (Err(source), Ok(_)) => Err(SimulationError::ProducerFault {
                producer: id.clone(),
                time,
                source,
            }),
            (Ok(()), Ok(evaluation)) => Ok(evaluation),
        }
    }));
    let result = outcome.unwrap_or_else(|payload| {
        Err(SimulationError::Panicked {
            context: format!("producer `{id}`"),
            message: panic_message(payload.as_ref()),
        })
    });
    trace!(producer = %id, time, ok = result.is_ok(), "evaluated");
    Completion { node, result }
}

struct WorkerPool {
    tasks: Option<Sender<Task>>,
    completions: Receiver<Completion>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    fn spawn(shared: &Arc<Shared>, threads: usize) -> Result<Self, SimulationError> {
        let (task_tx, task_rx) = channel::unbounded::<Task>();
        let (done_tx, done_rx) = channel::unbounded::<Completion>();
        let mut workers = Vec::with_capacity(threads);
        for n in 0..threads {
            let shared = Arc::clone(shared);
            let tasks = task_rx.clone();
            let done = done_tx.clone();
            let name = format!("availsim-worker-{n}");
            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || {
                    for task in tasks.iter() {
                        if done.send(evaluate(&shared, task)).is_err() {
                            break;
                        }
                    }
                })
                .map_err(|e| SimulationError::Spawn {
                    thread: name,
                    reason: e.to_string(),
                })?;
            workers.push(handle);
        }
        Ok(Self {
            tasks: Some(task_tx),
            completions: done_rx,
            workers,
        })
    }

    fn dispatch(&self, task: Task) -> Result<(), SimulationError> {
        let tasks = self
            .tasks
            .as_ref()
            .ok_or(SimulationError::WorkersDisconnected)?;
        tasks
            .send(task)
            .map_err(|_| SimulationError::WorkersDisconnected)
    }

    fn next(&self, cancel: &AtomicBool) -> Result<Completion, SimulationError> {
        loop {
            if cancel.load(Ordering::Acquire) {
                return Err(SimulationError::Cancelled);
            }
            match self.completions.recv_timeout(CANCEL_POLL) {
                Ok(completion) => return Ok(completion),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(SimulationError::WorkersDisconnected)
                }
            }
        }
    }

    /// Closes the task queue and joins every worker. Returns the names of
    /// workers that panicked.
    fn shutdown(mut self) -> Vec<String> {
        drop(self.tasks.take());
        let mut panicked = Vec::new();
        for handle in self.workers.drain(..) {
            let name = handle.thread().name().unwrap_or("availsim-worker").to_string();
            if handle.join().is_err() {
                warn!(thread = %name, "worker panicked during shutdown");
                panicked.push(name);
            }
        }
        panicked
    }
}

/// Per-step working memory, sized to the graph and reset after each step
/// for the cone members only.
struct Scratch {
    in_cone: Vec<bool>,
    woken: Vec<bool>,
    pending: Vec<usize>,
    inbox: Vec<Vec<UpstreamEvent>>,
    members: Vec<usize>,
    stack: Vec<usize>,
}

impl Scratch {
    fn new(n: usize) -> Self {
        Self {
            in_cone: vec![false; n],
            woken: vec![false; n],
            pending: vec![0; n],
            inbox: vec![Vec::new(); n],
            members: Vec::new(),
            stack: Vec::new(),
        }
    }

    fn open(&mut self, graph: &Graph, woken: &[usize]) {
        for &node in woken {
            self.woken[node] = true;
            if !self.in_cone[node] {
                self.in_cone[node] = true;
                self.members.push(node);
                self.stack.push(node);
            }
        }
        while let Some(node) = self.stack.pop() {
            for &(dependent, _) in graph.dependents(node) {
                if !self.in_cone[dependent] {
                    self.in_cone[dependent] = true;
                    self.members.push(dependent);
                    self.stack.push(dependent);
                }
            }
        }
        for &member in &self.members {
            self.pending[member] = graph
                .dependencies(member)
                .iter()
                .filter(|&&dep| self.in_cone[dep])
                .count();
        }
    }

    /// Hands `events` of a completed `node` to its cone dependents.
    fn release(&mut self, graph: &Graph, node: usize, events: &[Event], ready: &mut VecDeque<usize>) {
        for &(dependent, position) in graph.dependents(node) {
            if !self.in_cone[dependent] {
                continue;
            }
            self.inbox[dependent].extend(events.iter().map(|event| UpstreamEvent {
                dependency: position,
                event: event.clone(),
            }));
            self.pending[dependent] -= 1;
            if self.pending[dependent] == 0 {
                ready.push_back(dependent);
            }
        }
    }

    fn close(&mut self) {
        for &member in &self.members {
            self.in_cone[member] = false;
            self.woken[member] = false;
            self.pending[member] = 0;
            self.inbox[member].clear();
        }
        self.members.clear();
        self.stack.clear();
    }
}

/// Counters accumulated over a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Totals {
    pub(crate) steps: u64,
    pub(crate) evaluations: u64,
    pub(crate) events: u64,
}

/// Drives the graph forward in time. Lives on the coordinator thread.
pub(crate) struct Coordinator {
    shared: Arc<Shared>,
    pool: Option<WorkerPool>,
    agenda: BTreeMap<SimTime, Vec<usize>>,
    last_emitted: Vec<Option<(SimTime, u64)>>,
    /// Latest state-change payload raised by each producer.
    states: Vec<Option<bool>>,
    scratch: Scratch,
    cancel: Arc<AtomicBool>,
    clock: SimClock,
    metrics: Option<Arc<MetricsRecorder>>,
    totals: Totals,
    started: bool,
}

impl Coordinator {
    /// With one thread every evaluation runs inline on the coordinator.
    pub(crate) fn new(
        shared: Arc<Shared>,
        threads: usize,
        cancel: Arc<AtomicBool>,
        clock: SimClock,
        metrics: Option<Arc<MetricsRecorder>>,
    ) -> Result<Self, SimulationError> {
        let pool = if threads > 1 {
            Some(WorkerPool::spawn(&shared, threads)?)
        } else {
            None
        };
        let n = shared.graph.len();
        Ok(Self {
            shared,
            pool,
            agenda: BTreeMap::new(),
            last_emitted: vec![None; n],
            states: vec![None; n],
            scratch: Scratch::new(n),
            cancel,
            clock,
            metrics,
            totals: Totals::default(),
            started: false,
        })
    }

    pub(crate) fn totals(&self) -> Totals {
        self.totals
    }

    /// Earliest registered wake time.
    pub(crate) fn next_time(&self) -> Option<SimTime> {
        self.agenda.keys().next().copied()
    }

    /// Runs the next step: the setup step on first call, then the earliest
    /// wake time if it is within `horizon`. Returns `None` once there is
    /// nothing left to do up to `horizon`.
    pub(crate) fn advance(&mut self, horizon: SimTime) -> Result<Option<StepBatch>, SimulationError> {
        if self.cancel.load(Ordering::Acquire) {
            return Err(SimulationError::Cancelled);
        }
        if !self.started {
            self.started = true;
            let everyone: Vec<usize> = (0..self.shared.graph.len()).collect();
            return self.step(0, Phase::Setup, &everyone).map(Some);
        }
        let Some(time) = self.next_time().filter(|&t| t <= horizon) else {
            return Ok(None);
        };
        let mut woken = self.agenda.remove(&time).unwrap_or_default();
        woken.sort_unstable();
        woken.dedup();
        self.clock.advance_to(time);
        self.step(time, Phase::Tick, &woken).map(Some)
    }

    fn step(&mut self, time: SimTime, phase: Phase, woken: &[usize]) -> Result<StepBatch, SimulationError> {
        let shared = Arc::clone(&self.shared);
        let graph = &shared.graph;
        self.scratch.open(graph, woken);

        let mut ready: VecDeque<usize> = self
            .scratch
            .members
            .iter()
            .copied()
            .filter(|&m| self.scratch.pending[m] == 0)
            .collect();
        let mut remaining = self.scratch.members.len();
        let mut in_flight = 0usize;
        let mut evaluations = 0u64;
        let mut produced: Vec<(usize, Vec<Event>)> = Vec::new();
        let mut failure: Option<SimulationError> = None;

        while remaining > 0 {
            while failure.is_none() {
                let Some(node) = ready.pop_front() else {
                    break;
                };
                let due = phase == Phase::Setup
                    || self.scratch.woken[node]
                    || !self.scratch.inbox[node].is_empty();
                if !due {
                    remaining -= 1;
                    self.scratch.release(graph, node, &[], &mut ready);
                    continue;
                }
                let mut upstream = std::mem::take(&mut self.scratch.inbox[node]);
                upstream.sort_by_key(|u| u.dependency);
                let states = graph
                    .dependencies(node)
                    .iter()
                    .map(|&dep| self.states[dep])
                    .collect();
                let task = Task {
                    node,
                    time,
                    phase,
                    upstream,
                    states,
                };
                evaluations += 1;
                if let Some(pool) = self.pool.as_ref() {
                    if let Err(e) = pool.dispatch(task) {
                        failure = Some(e);
                        break;
                    }
                    in_flight += 1;
                } else {
                    remaining -= 1;
                    let completion = evaluate(&shared, task);
                    if let Err(e) = self.absorb(graph, time, completion, &mut ready, &mut produced) {
                        failure = Some(e);
                    }
                }
            }
            if in_flight == 0 {
                break;
            }
            let completion = match self.pool.as_ref() {
                Some(pool) => pool.next(&self.cancel),
                None => Err(SimulationError::WorkersDisconnected),
            };
            let completion = match completion {
                Ok(completion) => completion,
                Err(e) => {
                    // In-flight evaluations finish on their own; nobody waits for them.
                    self.scratch.close();
                    return Err(failure.unwrap_or(e));
                }
            };
            in_flight -= 1;
            remaining -= 1;
            if failure.is_none() {
                if let Err(e) = self.absorb(graph, time, completion, &mut ready, &mut produced) {
                    failure = Some(e);
                }
            }
        }
        self.scratch.close();

        if let Some(failure) = failure {
            return Err(failure);
        }

        let events: u64 = produced.iter().map(|(_, e)| e.len() as u64).sum();
        self.totals.steps += 1;
        self.totals.evaluations += evaluations;
        self.totals.events += events;
        if let Some(metrics) = &self.metrics {
            metrics.record_step(evaluations, events);
        }
        debug!(time, ?phase, evaluations, events, "step complete");

        produced.sort_unstable_by_key(|(node, _)| *node);
        Ok(StepBatch {
            time,
            events: produced,
        })
    }

    /// Validates a completion, registers its wake times and releases its
    /// dependents.
    fn absorb(
        &mut self,
        graph: &Graph,
        time: SimTime,
        completion: Completion,
        ready: &mut VecDeque<usize>,
        produced: &mut Vec<(usize, Vec<Event>)>,
    ) -> Result<(), SimulationError> {
        let Completion { node, result } = completion;
        let evaluation = result?;
        let id = graph.id(node);

        for event in &evaluation.events {
            let ordered = match self.last_emitted[node] {
                Some((last_time, last_ordinal)) => {
                    event.time() >= last_time && event.ordinal() > last_ordinal
                }
                None => true,
            };
            if event.time() != time || !ordered || event.producer() != id {
                return Err(SimulationError::ContractViolation {
                    producer: id.clone(),
                    time,
                    reason: format!(
                        "event ({}, t={}, #{}) out of order",
                        event.producer(),
                        event.time(),
                        event.ordinal()
                    ),
                });
            }
            self.last_emitted[node] = Some((event.time(), event.ordinal()));
            if event.kind() == EventType::STATE_CHANGE {
                if let Some(up) = event.payload().as_state() {
                    self.states[node] = Some(up);
                }
            }
        }

        for &wake in &evaluation.wakes {
            if wake <= time {
                return Err(SimulationError::ContractViolation {
                    producer: id.clone(),
                    time,
                    reason: format!("wake time {wake} is not in the future"),
                });
            }
            self.agenda.entry(wake).or_default().push(node);
        }

        self.scratch.release(graph, node, &evaluation.events, ready);
        if !evaluation.events.is_empty() {
            produced.push((node, evaluation.events));
        }
        Ok(())
    }

    /// Stops the worker pool and releases the producers. Returns the names
    /// of threads that panicked, the coordinator's own included when
    /// releasing a producer panics.
    pub(crate) fn shutdown(mut self) -> Vec<String> {
        let mut panicked = match self.pool.take() {
            Some(pool) => pool.shutdown(),
            None => Vec::new(),
        };
        let Coordinator { shared, .. } = self;
        if let Err(payload) = catch_unwind(AssertUnwindSafe(move || drop(shared))) {
            let message = panic_message(payload.as_ref());
            warn!(%message, "releasing producers panicked");
            panicked.push(
                thread::current()
                    .name()
                    .unwrap_or("availsim-coordinator")
                    .to_string(),
            );
        }
        panicked
    }
}
