#![allow(dead_code)]

use availsim_engine::prelude::*;
use availsim_functions::relationships::{mean_time_between_failure, percent};
use availsim_functions::{
    AvailabilityConsumer, FailureGenerator, KofNGate, PeriodicEmitter, PeriodicSumConsumer,
    RecordingConsumer,
};

pub const MINUTES_PER_HOUR: SimTime = 60;
pub const MINUTES_PER_WEEK: SimTime = 60 * 24 * 7;
pub const MINUTES_PER_MONTH: SimTime = 730 * 60;
pub const MINUTES_PER_YEAR: SimTime = MINUTES_PER_WEEK * 52;

pub const COST: EventType = EventType::new("cost");

pub const DATABASE_HOURLY: f64 = 273.55 / 730.0;
pub const APP_SERVER_HOURLY: f64 = 0.189544;

pub fn failure(id: &str, mttf: f64, mttr: f64) -> FailureGenerator {
    let provider = DistributionProvider::new();
    FailureGenerator::new(
        id,
        provider.exponential(mttf).expect("valid mttf"),
        provider.exponential(mttr).expect("valid mttr"),
    )
}

/// Multi-tier web application: a database and an application server host,
/// an application server that needs both, and hourly costs for each tier.
pub fn cloud_web_app(seed: u64) -> GraphBuilder {
    let mut builder = GraphBuilder::new(RandomProvider::new(seed));

    let repair = 120.0;
    let database = builder
        .add_producer(failure(
            "database",
            mean_time_between_failure(percent(99.95), repair),
            repair,
        ))
        .unwrap();
    builder
        .add_producer(
            PeriodicEmitter::new("database cost", DATABASE_HOURLY, MINUTES_PER_HOUR)
                .with_event_type(COST),
        )
        .unwrap();

    let host = builder
        .add_producer(failure(
            "application server host",
            mean_time_between_failure(percent(99.9), repair),
            repair,
        ))
        .unwrap();
    let app = builder
        .add_producer(KofNGate::new("application server", 2, 2))
        .unwrap();
    builder
        .add_dependency(&app, &host)
        .unwrap()
        .add_dependency(&app, &database)
        .unwrap();
    builder
        .add_producer(
            PeriodicEmitter::new("application server cost", APP_SERVER_HOURLY, MINUTES_PER_HOUR)
                .with_event_type(COST),
        )
        .unwrap();
    builder
}

pub const CLOUD_PRODUCERS: [&str; 5] = [
    "database",
    "database cost",
    "application server host",
    "application server",
    "application server cost",
];

pub struct CloudRun {
    pub report: RunReport,
    pub events: Vec<Event>,
    pub availability: f64,
    pub weekly_cost: SampledStatistic,
    pub monthly_cost: SampledStatistic,
}

/// Runs the web application graph and collects every consumer's view.
pub fn run_cloud(seed: u64, threads: usize, horizon: SimTime) -> CloudRun {
    let mut simulation = cloud_web_app(seed).create_simulation(threads).unwrap();
    let recording = simulation
        .subscribe(RecordingConsumer::new("everything"), CLOUD_PRODUCERS)
        .unwrap();
    let availability = simulation
        .subscribe(
            AvailabilityConsumer::new("system availability"),
            ["application server"],
        )
        .unwrap();
    let weekly = simulation
        .subscribe(
            PeriodicSumConsumer::new("weekly cost", MINUTES_PER_WEEK).with_event_type(COST),
            ["application server cost", "database cost"],
        )
        .unwrap();
    let monthly = simulation
        .subscribe(
            PeriodicSumConsumer::new("monthly cost", MINUTES_PER_MONTH).with_event_type(COST),
            ["application server cost", "database cost"],
        )
        .unwrap();

    simulation.start(horizon).unwrap();
    let report = simulation.join().unwrap();
    simulation.destroy().unwrap();

    let events = recording.lock().events().to_vec();
    let availability = availability.lock().availability().unwrap();
    let weekly_cost = weekly.lock().totals().clone();
    let monthly_cost = monthly.lock().totals().clone();
    CloudRun {
        report,
        events,
        availability,
        weekly_cost,
        monthly_cost,
    }
}

/// Runs `builder` to `horizon` and returns what a recorder subscribed to
/// `producers` saw.
pub fn record(
    builder: GraphBuilder,
    threads: usize,
    horizon: SimTime,
    producers: &[&str],
) -> (RunReport, Vec<Event>) {
    let mut simulation = builder.create_simulation(threads).unwrap();
    let recording = simulation
        .subscribe(RecordingConsumer::new("recording"), producers)
        .unwrap();
    simulation.start(horizon).unwrap();
    let report = simulation.join().unwrap();
    simulation.destroy().unwrap();
    let events = recording.lock().events().to_vec();
    (report, events)
}
