//! ## availsim-engine::simulation
//! **Runnable simulation lifecycle**
//!
//! `start` moves the producers onto a coordinator thread, which owns the
//! worker pool and feeds a dedicated delivery thread through a bounded
//! channel. `join` blocks for the terminal status and caches it; `destroy`
//! releases everything and reports threads that died during shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use availsim_core::prelude::*;
use availsim_telemetry::MetricsRecorder;
use crossbeam::channel::{self, SendTimeoutError, Sender};
use parking_lot::{Mutex, MutexGuard};
use tracing::{error, info, instrument, warn};

use crate::error::{panic_message, SimulationError, TeardownError};
use crate::graph::Graph;
use crate::router::{Delivery, Router};
use crate::scheduler::{Coordinator, Shared, Slot, CANCEL_POLL};

pub(crate) struct SimulationSettings {
    pub(crate) threads: usize,
    pub(crate) delivery_buffer_capacity: usize,
    pub(crate) horizon: Option<SimTime>,
    pub(crate) metrics: Option<Arc<MetricsRecorder>>,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            threads: 1,
            delivery_buffer_capacity: 1024,
            horizon: None,
            metrics: None,
        }
    }
}

/// Summary of a completed run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunReport {
    /// The horizon the run was started with.
    pub end_time: SimTime,
    /// Time steps executed, the setup step included.
    pub steps: u64,
    pub evaluations: u64,
    /// Events raised by all producers.
    pub events: u64,
    /// Events handed to consumers, counted once per consumer.
    pub deliveries: u64,
    /// No wake time was left registered when the run ended.
    pub quiesced: bool,
}

/// Cancels a running simulation from any thread.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Caller-side access to a subscribed consumer.
///
/// Locking while the simulation runs blocks delivery to that consumer.
pub struct ConsumerHandle<C> {
    inner: Arc<Mutex<C>>,
}

impl<C> Clone for ConsumerHandle<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Consumer> ConsumerHandle<C> {
    pub fn lock(&self) -> MutexGuard<'_, C> {
        self.inner.lock()
    }

    /// The consumer itself, once the simulation has been destroyed and no
    /// other handle is alive.
    pub fn into_inner(self) -> Option<C> {
        Arc::try_unwrap(self.inner).ok().map(Mutex::into_inner)
    }
}

struct Prepared {
    shared: Shared,
    router: Router,
}

struct RunOutcome {
    result: Result<RunReport, SimulationError>,
    panicked: Vec<String>,
}

enum Lifecycle {
    Ready(Box<Prepared>),
    Running(JoinHandle<RunOutcome>),
    Done,
}

pub struct Simulation {
    settings: SimulationSettings,
    lifecycle: Lifecycle,
    outcome: Option<Result<RunReport, SimulationError>>,
    teardown: Vec<String>,
    cancel: Arc<AtomicBool>,
    clock: SimClock,
    producers: usize,
}

impl Simulation {
    pub(crate) fn new(graph: Graph, slots: Vec<Slot>, settings: SimulationSettings) -> Self {
        let producers = graph.len();
        Self {
            settings,
            lifecycle: Lifecycle::Ready(Box::new(Prepared {
                shared: Shared::new(graph, slots),
                router: Router::default(),
            })),
            outcome: None,
            teardown: Vec::new(),
            cancel: Arc::new(AtomicBool::new(false)),
            clock: SimClock::new(),
            producers,
        }
    }

    pub fn threads(&self) -> usize {
        self.settings.threads
    }

    pub fn producer_count(&self) -> usize {
        self.producers
    }

    pub fn consumer_count(&self) -> usize {
        match &self.lifecycle {
            Lifecycle::Ready(prepared) => prepared.router.len(),
            _ => 0,
        }
    }

    pub fn metrics(&self) -> Option<&Arc<MetricsRecorder>> {
        self.settings.metrics.as_ref()
    }

    /// Records scheduler and delivery counters into `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<MetricsRecorder>) -> Self {
        self.settings.metrics = Some(metrics);
        self
    }

    /// Delivers events of `producers` to `consumer`, in the order the ids are
    /// listed whenever several of them raise events at the same time.
    pub fn subscribe<C, I, S>(
        &mut self,
        mut consumer: C,
        producers: I,
    ) -> Result<ConsumerHandle<C>, SimulationError>
    where
        C: Consumer,
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let Lifecycle::Ready(prepared) = &mut self.lifecycle else {
            return Err(SimulationError::AlreadyStarted);
        };
        let nodes = producers
            .into_iter()
            .map(|id| {
                let id = id.as_ref();
                prepared
                    .shared
                    .graph
                    .lookup(id)
                    .ok_or_else(|| SimulationError::UnknownProducer(id.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        consumer
            .initialize()
            .map_err(|source| SimulationError::ConsumerRejected {
                consumer: consumer.id().to_string(),
                source,
            })?;
        let inner = Arc::new(Mutex::new(consumer));
        prepared.router.subscribe(inner.clone(), nodes);
        Ok(ConsumerHandle { inner })
    }

    /// Runs the graph from time 0 through `horizon` (inclusive) in the background.
    #[instrument(skip(self), fields(threads = self.settings.threads))]
    pub fn start(&mut self, horizon: SimTime) -> Result<(), SimulationError> {
        let prepared = match std::mem::replace(&mut self.lifecycle, Lifecycle::Done) {
            Lifecycle::Ready(prepared) => prepared,
            other => {
                self.lifecycle = other;
                return Err(SimulationError::AlreadyStarted);
            }
        };

        let run = RunContext {
            threads: self.settings.threads,
            capacity: self.settings.delivery_buffer_capacity,
            horizon,
            cancel: Arc::clone(&self.cancel),
            clock: self.clock.clone(),
            metrics: self.settings.metrics.clone(),
        };
        let spawned = thread::Builder::new()
            .name("availsim-coordinator".into())
            .spawn(move || run.execute(*prepared));
        match spawned {
            Ok(handle) => {
                self.lifecycle = Lifecycle::Running(handle);
                Ok(())
            }
            Err(e) => {
                let err = SimulationError::Spawn {
                    thread: "availsim-coordinator".into(),
                    reason: e.to_string(),
                };
                self.outcome = Some(Err(err.clone()));
                Err(err)
            }
        }
    }

    /// Starts with the horizon from the configuration the graph was built with.
    pub fn start_configured(&mut self) -> Result<(), SimulationError> {
        let horizon = self
            .settings
            .horizon
            .ok_or(SimulationError::NoConfiguredHorizon)?;
        self.start(horizon)
    }

    /// Blocks until the run reaches a terminal state. Repeated calls return
    /// the same status.
    #[instrument(skip(self))]
    pub fn join(&mut self) -> Result<RunReport, SimulationError> {
        match std::mem::replace(&mut self.lifecycle, Lifecycle::Done) {
            Lifecycle::Running(handle) => {
                let outcome = handle.join().unwrap_or_else(|payload| RunOutcome {
                    result: Err(SimulationError::Panicked {
                        context: "coordinator".into(),
                        message: panic_message(payload.as_ref()),
                    }),
                    panicked: vec!["availsim-coordinator".into()],
                });
                self.teardown.extend(outcome.panicked);
                self.outcome = Some(outcome.result.clone());
                outcome.result
            }
            Lifecycle::Ready(prepared) => {
                self.lifecycle = Lifecycle::Ready(prepared);
                Err(SimulationError::NotStarted)
            }
            Lifecycle::Done => self
                .outcome
                .clone()
                .unwrap_or(Err(SimulationError::NotStarted)),
        }
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            flag: Arc::clone(&self.cancel),
        }
    }

    /// Latest simulated time the scheduler has reached.
    pub fn progress(&self) -> SimTime {
        self.clock.now()
    }

    pub fn clock(&self) -> SimClock {
        self.clock.clone()
    }

    /// True once `join` would return without blocking.
    pub fn is_finished(&self) -> bool {
        match &self.lifecycle {
            Lifecycle::Ready(_) => false,
            Lifecycle::Running(handle) => handle.is_finished(),
            Lifecycle::Done => true,
        }
    }

    /// Halts a running simulation and releases producers and subscriptions.
    /// Consumer handles stay readable.
    #[instrument(skip(self))]
    pub fn destroy(mut self) -> Result<(), TeardownError> {
        if matches!(self.lifecycle, Lifecycle::Running(_)) {
            self.cancel();
            let _ = self.join();
        }
        self.lifecycle = Lifecycle::Done;
        let panicked = std::mem::take(&mut self.teardown);
        if panicked.is_empty() {
            Ok(())
        } else {
            warn!(threads = ?panicked, "threads panicked during teardown");
            Err(TeardownError::ThreadsPanicked(panicked))
        }
    }
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.lifecycle {
            Lifecycle::Ready(_) => "ready",
            Lifecycle::Running(_) => "running",
            Lifecycle::Done => "done",
        };
        f.debug_struct("Simulation")
            .field("state", &state)
            .field("threads", &self.settings.threads)
            .field("producers", &self.producers)
            .field("progress", &self.clock.now())
            .finish()
    }
}

impl Drop for Simulation {
    fn drop(&mut self) {
        if let Lifecycle::Running(handle) = std::mem::replace(&mut self.lifecycle, Lifecycle::Done) {
            self.cancel.store(true, Ordering::Release);
            let _ = handle.join();
        }
    }
}

/// Everything the coordinator thread needs besides the graph itself.
struct RunContext {
    threads: usize,
    capacity: usize,
    horizon: SimTime,
    cancel: Arc<AtomicBool>,
    clock: SimClock,
    metrics: Option<Arc<MetricsRecorder>>,
}

impl RunContext {
    fn execute(self, prepared: Prepared) -> RunOutcome {
        let Prepared { shared, mut router } = prepared;
        let producers = shared.graph.len();
        info!(
            horizon = self.horizon,
            threads = self.threads,
            producers,
            consumers = router.len(),
            "simulation started"
        );
        router.set_metrics(self.metrics.clone());

        let (tx, rx) = channel::bounded(self.capacity);
        let router_cancel = Arc::clone(&self.cancel);
        let router_thread = match thread::Builder::new()
            .name("availsim-router".into())
            .spawn(move || router.run(rx, &router_cancel))
        {
            Ok(handle) => handle,
            Err(e) => {
                let err = SimulationError::Spawn {
                    thread: "availsim-router".into(),
                    reason: e.to_string(),
                };
                return self.finish(Err(err), Vec::new());
            }
        };

        let mut coordinator = match Coordinator::new(
            Arc::new(shared),
            self.threads,
            Arc::clone(&self.cancel),
            self.clock.clone(),
            self.metrics.clone(),
        ) {
            Ok(coordinator) => coordinator,
            Err(e) => {
                drop(tx);
                let _ = router_thread.join();
                return self.finish(Err(e), Vec::new());
            }
        };

        let mut driven = drive(&mut coordinator, self.horizon, &tx, &self.cancel);
        if driven.is_ok() {
            if let Err(e) = send_delivery(&tx, Delivery::Close(self.horizon), &self.cancel) {
                driven = Err(e);
            }
        }
        drop(tx);

        let totals = coordinator.totals();
        let panicked = coordinator.shutdown();
        let routed = router_thread.join().unwrap_or_else(|payload| {
            Err(SimulationError::Panicked {
                context: "event router".into(),
                message: panic_message(payload.as_ref()),
            })
        });

        let result = match (driven, routed) {
            (Err(SimulationError::DeliveryStopped), Err(cause)) => Err(cause),
            (Err(e), _) | (Ok(_), Err(e)) => Err(e),
            (Ok(quiesced), Ok(deliveries)) => Ok(RunReport {
                end_time: self.horizon,
                steps: totals.steps,
                evaluations: totals.evaluations,
                events: totals.events,
                deliveries,
                quiesced,
            }),
        };
        self.finish(result, panicked)
    }

    fn finish(&self, result: Result<RunReport, SimulationError>, panicked: Vec<String>) -> RunOutcome {
        match &result {
            Ok(report) => {
                self.clock.advance_to(report.end_time);
                info!(
                    end_time = report.end_time,
                    steps = report.steps,
                    events = report.events,
                    deliveries = report.deliveries,
                    quiesced = report.quiesced,
                    "simulation completed"
                );
            }
            Err(SimulationError::Cancelled) => info!(at = self.clock.now(), "simulation cancelled"),
            Err(e) => error!(error = %e, at = self.clock.now(), "simulation failed"),
        }
        RunOutcome { result, panicked }
    }
}

/// Steps until the horizon or quiescence. Returns whether the graph quiesced.
fn drive(
    coordinator: &mut Coordinator,
    horizon: SimTime,
    deliveries: &Sender<Delivery>,
    cancel: &AtomicBool,
) -> Result<bool, SimulationError> {
    while let Some(batch) = coordinator.advance(horizon)? {
        if batch.events.is_empty() {
            continue;
        }
        send_delivery(deliveries, Delivery::Step(batch), cancel)?;
    }
    Ok(coordinator.next_time().is_none())
}

/// Waits for room in the delivery buffer, giving up once `cancel` is set.
fn send_delivery(
    deliveries: &Sender<Delivery>,
    mut delivery: Delivery,
    cancel: &AtomicBool,
) -> Result<(), SimulationError> {
    loop {
        if cancel.load(Ordering::Acquire) {
            return Err(SimulationError::Cancelled);
        }
        match deliveries.send_timeout(delivery, CANCEL_POLL) {
            Ok(()) => return Ok(()),
            Err(SendTimeoutError::Timeout(returned)) => delivery = returned,
            Err(SendTimeoutError::Disconnected(_)) => {
                return Err(SimulationError::DeliveryStopped)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use availsim_core::random::RandomProvider;
    use tracing_test::traced_test;

    /// Wakes every five units and panics when it is released.
    struct Brittle;

    impl Producer for Brittle {
        fn id(&self) -> &str {
            "brittle"
        }

        fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> Result<(), ProducerError> {
            ctx.wake_after(5)?;
            Ok(())
        }

        fn duplicate(&self) -> Box<dyn Producer> {
            Box::new(Brittle)
        }
    }

    impl Drop for Brittle {
        fn drop(&mut self) {
            if !thread::panicking() {
                panic!("brittle producer refused to be released");
            }
        }
    }

    #[traced_test]
    #[test]
    fn release_panic_surfaces_on_destroy() {
        for threads in [1, 3] {
            let mut builder = GraphBuilder::new(RandomProvider::new(0));
            builder.add_producer(Brittle).unwrap();
            let mut simulation = builder.create_simulation(threads).unwrap();
            simulation.start(50).unwrap();

            let report = simulation.join().unwrap();
            assert_eq!(report.end_time, 50);
            match simulation.destroy() {
                Err(TeardownError::ThreadsPanicked(threads)) => {
                    assert_eq!(threads, vec!["availsim-coordinator".to_string()]);
                }
                other => panic!("expected a teardown error, got {other:?}"),
            }
        }
        assert!(logs_contain("threads panicked during teardown"));
    }
}
