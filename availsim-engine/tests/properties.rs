mod common;

use std::collections::BTreeMap;

use availsim_engine::prelude::*;
use availsim_functions::{
    AvailabilityConsumer, KofNGate, PeriodicEmitter, PeriodicSumConsumer, RecordingConsumer,
};
use common::{failure, record};

fn two_host_gate(seed: u64) -> GraphBuilder {
    let mut builder = GraphBuilder::new(RandomProvider::new(seed));
    let a = builder.add_producer(failure("a", 6.0, 3.0)).unwrap();
    let b = builder.add_producer(failure("b", 5.0, 4.0)).unwrap();
    let gate = builder.add_producer(KofNGate::new("gate", 2, 2)).unwrap();
    builder
        .add_dependency(&gate, &a)
        .unwrap()
        .add_dependency(&gate, &b)
        .unwrap();
    builder
}

#[test]
fn two_of_two_gate_tracks_conjunction_of_its_inputs() {
    let (_, events) = record(two_host_gate(5), 4, 5_000, &["a", "b", "gate"]);

    let mut by_time: BTreeMap<SimTime, Vec<&Event>> = BTreeMap::new();
    for event in &events {
        by_time.entry(event.time()).or_default().push(event);
    }
    assert!(by_time.len() > 100, "expected a busy run");

    let (mut a, mut b, mut gate) = (true, true, true);
    for (time, step) in by_time {
        for event in step {
            let up = event.payload().as_state().unwrap();
            match event.producer().as_str() {
                "a" => a = up,
                "b" => b = up,
                "gate" => {
                    assert_ne!(up, gate, "gate repeated its state at {time}");
                    gate = up;
                }
                other => panic!("unexpected producer {other}"),
            }
        }
        assert_eq!(gate, a && b, "gate disagrees with its inputs at {time}");
    }
}

#[test]
fn periodic_emitter_fires_on_every_multiple_within_horizon() {
    let mut builder = GraphBuilder::new(RandomProvider::new(0));
    builder
        .add_producer(PeriodicEmitter::new("tick", 1.5, 7))
        .unwrap();
    let (report, events) = record(builder, 2, 1000, &["tick"]);

    assert_eq!(events.len(), 142);
    for (i, event) in events.iter().enumerate() {
        assert_eq!(event.time(), 7 * (i as SimTime + 1));
        assert_eq!(event.ordinal(), i as u64 + 1);
        assert_eq!(event.payload(), &Payload::Value(1.5));
    }
    assert_eq!(report.events, 142);
    assert!(!report.quiesced);
}

#[test]
fn failure_generator_alternates_down_and_up() {
    let mut builder = GraphBuilder::new(RandomProvider::new(99));
    builder.add_producer(failure("host", 20.0, 5.0)).unwrap();
    let (_, events) = record(builder, 1, 20_000, &["host"]);

    assert!(events.len() > 100);
    for (i, event) in events.iter().enumerate() {
        assert_eq!(event.kind(), EventType::STATE_CHANGE);
        assert_eq!(event.payload().as_state(), Some(i % 2 == 1));
    }
    for pair in events.windows(2) {
        assert!(pair[0].time() < pair[1].time());
    }
}

#[test]
fn sparse_events_leave_empty_bins() {
    let mut builder = GraphBuilder::new(RandomProvider::new(0));
    builder
        .add_producer(PeriodicEmitter::new("sparse", 4.0, 30))
        .unwrap();
    let mut simulation = builder.create_simulation(1).unwrap();
    let bins = simulation
        .subscribe(PeriodicSumConsumer::new("bins", 10), ["sparse"])
        .unwrap();
    simulation.start(90).unwrap();
    simulation.join().unwrap();
    simulation.destroy().unwrap();

    let bins = bins.lock();
    let totals = bins.totals();
    assert_eq!(totals.count(), 9);
    assert_eq!(totals.min(), Some(0.0));
    assert_eq!(totals.max(), Some(4.0));
    assert_eq!(totals.sum(), 12.0);
}

#[test]
fn binned_costs_add_up_per_period() {
    const COST: EventType = EventType::new("cost");

    let mut builder = GraphBuilder::new(RandomProvider::new(0));
    builder
        .add_producer(PeriodicEmitter::new("every four", 3.0, 4).with_event_type(COST))
        .unwrap();
    builder
        .add_producer(PeriodicEmitter::new("every six", 5.0, 6).with_event_type(COST))
        .unwrap();
    let mut simulation = builder.create_simulation(2).unwrap();
    let daily = simulation
        .subscribe(
            PeriodicSumConsumer::new("daily", 24).with_event_type(COST),
            ["every four", "every six"],
        )
        .unwrap();
    simulation.start(240).unwrap();
    simulation.join().unwrap();
    simulation.destroy().unwrap();

    let daily = daily.lock();
    let totals = daily.totals();
    assert_eq!(totals.count(), 10);
    assert_eq!(totals.min(), Some(38.0));
    assert_eq!(totals.max(), Some(38.0));
    assert_eq!(daily.running(), 0.0);
}

#[test]
fn availability_converges_to_its_closed_form() {
    let (mttf, mttr) = (100.0, 10.0);
    let mut builder = GraphBuilder::new(RandomProvider::new(17));
    builder.add_producer(failure("component", mttf, mttr)).unwrap();
    let mut simulation = builder.create_simulation(2).unwrap();
    let availability = simulation
        .subscribe(AvailabilityConsumer::new("availability"), ["component"])
        .unwrap();
    simulation.start(1_100_000).unwrap();
    simulation.join().unwrap();
    simulation.destroy().unwrap();

    let consumer = availability.lock();
    let observed = consumer.availability().unwrap();
    let expected = availsim_functions::relationships::availability(mttf, mttr);
    assert!(
        (observed - expected).abs() < 0.01,
        "observed {observed}, expected {expected}"
    );
    assert_eq!(consumer.observed_time(), 1_100_000);
    let mean_outage = consumer.outages().mean().unwrap();
    assert!((mean_outage - mttr).abs() < 1.0, "mean outage {mean_outage}");
}

#[test]
fn one_of_one_gate_reproduces_its_input() {
    let (mttf, mttr) = (300.0, 20.0);
    let horizon = 3_200_000;
    let mut builder = GraphBuilder::new(RandomProvider::new(23));
    let host = builder.add_producer(failure("host", mttf, mttr)).unwrap();
    let gate = builder
        .add_producer(KofNGate::new("pass-through", 1, 1))
        .unwrap();
    builder.add_dependency(&gate, &host).unwrap();

    let mut simulation = builder.create_simulation(3).unwrap();
    let availability = simulation
        .subscribe(AvailabilityConsumer::new("availability"), ["pass-through"])
        .unwrap();
    let recording = simulation
        .subscribe(RecordingConsumer::new("both"), ["host", "pass-through"])
        .unwrap();
    simulation.start(horizon).unwrap();
    simulation.join().unwrap();
    simulation.destroy().unwrap();

    let recording = recording.lock();
    let transitions = |id: &str| -> Vec<(SimTime, bool)> {
        recording
            .events()
            .iter()
            .filter(|e| e.producer().as_str() == id)
            .map(|e| (e.time(), e.payload().as_state().unwrap()))
            .collect()
    };
    let (host, gate) = (transitions("host"), transitions("pass-through"));
    assert!(host.len() > 1_000, "expected a busy run");
    assert_eq!(gate, host);

    let consumer = availability.lock();
    let observed = consumer.availability().unwrap();
    let expected = availsim_functions::relationships::availability(mttf, mttr);
    assert!(
        (observed - expected).abs() < 0.01,
        "observed {observed}, expected {expected}"
    );
    assert_eq!(consumer.observed_time(), horizon);
}

#[test]
fn duplicates_run_independent_streams() {
    let mut builder = GraphBuilder::new(RandomProvider::new(3));
    let original = builder.add_producer(failure("original", 10.0, 2.0)).unwrap();
    builder.add_duplicate(&original, "copy").unwrap();
    let (_, events) = record(builder, 2, 2_000, &["original", "copy"]);

    let times = |id: &str| -> Vec<SimTime> {
        events
            .iter()
            .filter(|e| e.producer().as_str() == id)
            .map(Event::time)
            .collect()
    };
    let (original, copy) = (times("original"), times("copy"));
    assert!(!original.is_empty() && !copy.is_empty());
    assert_ne!(original, copy);
}

#[test]
fn recorder_filter_drops_other_event_types() {
    let mut builder = GraphBuilder::new(RandomProvider::new(8));
    builder.add_producer(failure("host", 10.0, 2.0)).unwrap();
    builder
        .add_producer(PeriodicEmitter::new("meter", 1.0, 10))
        .unwrap();
    let mut simulation = builder.create_simulation(2).unwrap();
    let states = simulation
        .subscribe(
            RecordingConsumer::new("states").accepting(EventType::STATE_CHANGE),
            ["host", "meter"],
        )
        .unwrap();
    simulation.start(500).unwrap();
    simulation.join().unwrap();
    simulation.destroy().unwrap();

    let states = states.into_inner().unwrap();
    assert_eq!(states.closed_at(), Some(500));
    assert!(states
        .events()
        .iter()
        .all(|e| e.kind() == EventType::STATE_CHANGE));
    assert!(!states.events().is_empty());
}
