//! ## availsim-telemetry::metrics
//! **Prometheus run metrics**
//!
//! Counters for the scheduler's work and a histogram of how many producers
//! each time step evaluates. Every recorder owns its registry, so several
//! simulations in one process never collide on metric names.

use prometheus::{exponential_buckets, Encoder, Histogram, HistogramOpts, IntCounter, Registry};

#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    pub registry: Registry,
    pub steps: IntCounter,
    pub evaluations: IntCounter,
    pub events: IntCounter,
    pub deliveries: IntCounter,
    pub step_width: Histogram,
}

impl MetricsRecorder {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let steps = IntCounter::new("availsim_time_steps_total", "Simulated time steps executed")?;
        let evaluations = IntCounter::new(
            "availsim_evaluations_total",
            "Producer evaluations performed",
        )?;
        let events = IntCounter::new("availsim_events_total", "Events raised by producers")?;
        let deliveries = IntCounter::new(
            "availsim_deliveries_total",
            "Events delivered to consumers",
        )?;
        let step_width = Histogram::with_opts(
            HistogramOpts::new(
                "availsim_step_evaluations",
                "Producers evaluated within one time step",
            )
            .buckets(exponential_buckets(1.0, 2.0, 12)?),
        )?;

        registry.register(Box::new(steps.clone()))?;
        registry.register(Box::new(evaluations.clone()))?;
        registry.register(Box::new(events.clone()))?;
        registry.register(Box::new(deliveries.clone()))?;
        registry.register(Box::new(step_width.clone()))?;

        Ok(Self {
            registry,
            steps,
            evaluations,
            events,
            deliveries,
            step_width,
        })
    }

    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    /// Records one completed time step.
    pub fn record_step(&self, evaluations: u64, events: u64) {
        self.steps.inc();
        self.evaluations.inc_by(evaluations);
        self.events.inc_by(events);
        self.step_width.observe(evaluations as f64);
    }

    pub fn record_deliveries(&self, count: u64) {
        self.deliveries.inc_by(count);
    }
}
