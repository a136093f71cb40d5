//! ## availsim-engine::router
//! **Ordered event delivery to consumers**
//!
//! Runs on its own thread and receives one batch per completed time step.
//! Batches arrive in time order, so each consumer sees non-decreasing
//! times. Within a step a consumer receives its subscribed producers' events
//! in subscription order, each producer's events in ordinal order.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use availsim_core::prelude::*;
use availsim_telemetry::MetricsRecorder;
use crossbeam::channel::Receiver;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::{panic_message, SimulationError};

/// Events produced during one time step, grouped by producer index in
/// ascending order.
#[derive(Debug, Default)]
pub(crate) struct StepBatch {
    pub(crate) time: SimTime,
    pub(crate) events: Vec<(usize, Vec<Event>)>,
}

impl StepBatch {
    fn events_of(&self, node: usize) -> &[Event] {
        match self.events.binary_search_by_key(&node, |(n, _)| *n) {
            Ok(i) => &self.events[i].1,
            Err(_) => &[],
        }
    }
}

pub(crate) enum Delivery {
    Step(StepBatch),
    /// The run completed; `end_time` is the horizon.
    Close(SimTime),
}

struct Subscription {
    label: String,
    consumer: Arc<Mutex<dyn Consumer>>,
    producers: Vec<usize>,
}

#[derive(Default)]
pub(crate) struct Router {
    subscriptions: Vec<Subscription>,
    metrics: Option<Arc<MetricsRecorder>>,
}

impl Router {
    pub(crate) fn set_metrics(&mut self, metrics: Option<Arc<MetricsRecorder>>) {
        self.metrics = metrics;
    }

    /// `producers` must already be resolved to indices; repeats are dropped.
    pub(crate) fn subscribe(&mut self, consumer: Arc<Mutex<dyn Consumer>>, producers: Vec<usize>) {
        let mut unique = Vec::with_capacity(producers.len());
        for node in producers {
            if !unique.contains(&node) {
                unique.push(node);
            }
        }
        let label = consumer.lock().id().to_string();
        debug!(consumer = %label, producers = unique.len(), "consumer subscribed");
        self.subscriptions.push(Subscription {
            label,
            consumer,
            producers: unique,
        });
    }

    pub(crate) fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Delivers one step to every consumer. Returns how many events were consumed.
    pub(crate) fn deliver(&self, batch: &StepBatch) -> Result<u64, SimulationError> {
        let mut delivered = 0;
        for subscription in &self.subscriptions {
            let mut consumer = subscription.consumer.lock();
            for &node in &subscription.producers {
                for event in batch.events_of(node) {
                    if !consumer.accepts(event.kind()) {
                        continue;
                    }
                    trace!(consumer = %subscription.label, producer = %event.producer(), time = batch.time, ordinal = event.ordinal(), "deliver");
                    catch_unwind(AssertUnwindSafe(|| consumer.consume(event))).map_err(|payload| {
                        SimulationError::Panicked {
                            context: format!("consumer `{}`", subscription.label),
                            message: panic_message(payload.as_ref()),
                        }
                    })?;
                    delivered += 1;
                }
            }
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_deliveries(delivered);
        }
        Ok(delivered)
    }

    pub(crate) fn close(&self, end_time: SimTime) -> Result<(), SimulationError> {
        for subscription in &self.subscriptions {
            let mut consumer = subscription.consumer.lock();
            catch_unwind(AssertUnwindSafe(|| consumer.close(end_time))).map_err(|payload| {
                SimulationError::Panicked {
                    context: format!("consumer `{}`", subscription.label),
                    message: panic_message(payload.as_ref()),
                }
            })?;
        }
        Ok(())
    }

    /// Delivery loop. Ends on `Close`, or with `Ok` when the sender goes away
    /// without one (the run failed or was cancelled).
    /// Delivers until `Close` arrives or the channel disconnects. Buffered
    /// batches are abandoned once `cancel` is set.
    pub(crate) fn run(
        self,
        deliveries: Receiver<Delivery>,
        cancel: &AtomicBool,
    ) -> Result<u64, SimulationError> {
        let mut total = 0;
        for delivery in deliveries.iter() {
            if cancel.load(Ordering::Acquire) {
                debug!(deliveries = total, "delivery cancelled");
                return Err(SimulationError::Cancelled);
            }
            match delivery {
                Delivery::Step(batch) => total += self.deliver(&batch)?,
                Delivery::Close(end_time) => {
                    self.close(end_time)?;
                    debug!(deliveries = total, end_time, "consumers closed");
                    break;
                }
            }
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use availsim_core::producer::{EvalContext, Phase};

    #[derive(Default)]
    struct Log {
        seen: Vec<(String, SimTime, u64)>,
        closed: Option<SimTime>,
    }

    impl Consumer for Log {
        fn id(&self) -> &str {
            "log"
        }

        fn accepts(&self, kind: EventType) -> bool {
            kind == EventType::STATE_CHANGE
        }

        fn consume(&mut self, event: &Event) {
            self.seen
                .push((event.producer().to_string(), event.time(), event.ordinal()));
        }

        fn close(&mut self, end_time: SimTime) {
            self.closed = Some(end_time);
        }
    }

    struct Exploding;

    impl Consumer for Exploding {
        fn id(&self) -> &str {
            "exploding"
        }

        fn consume(&mut self, _event: &Event) {
            panic!("fold failed");
        }
    }

    fn raise(producer: &str, time: SimTime, kinds: &[EventType]) -> Vec<Event> {
        let id = ProducerId::from(producer);
        let mut ordinal = 0;
        let mut ctx = EvalContext::new(&id, time, Phase::Tick, &[], &mut ordinal);
        for kind in kinds {
            ctx.raise(*kind, Payload::State(true));
        }
        ctx.finish().unwrap().events
    }

    #[test]
    fn subscription_order_then_ordinal() {
        let log = Arc::new(Mutex::new(Log::default()));
        let mut router = Router::default();
        // Subscribed to node 2 before node 0, node 0 twice.
        router.subscribe(log.clone(), vec![2, 0, 0]);

        let batch = StepBatch {
            time: 5,
            events: vec![
                (0, raise("a", 5, &[EventType::STATE_CHANGE, EventType::STATE_CHANGE])),
                (1, raise("b", 5, &[EventType::STATE_CHANGE])),
                (2, raise("c", 5, &[EventType::PERIODIC_VALUE, EventType::STATE_CHANGE])),
            ],
        };
        assert_eq!(router.deliver(&batch).unwrap(), 3);
        router.close(9).unwrap();

        let log = log.lock();
        let order: Vec<_> = log.seen.iter().map(|(p, _, o)| (p.as_str(), *o)).collect();
        assert_eq!(order, vec![("c", 2), ("a", 1), ("a", 2)]);
        assert_eq!(log.closed, Some(9));
    }

    #[test]
    fn consumer_panic_becomes_error() {
        let mut router = Router::default();
        router.subscribe(Arc::new(Mutex::new(Exploding)), vec![0]);
        let batch = StepBatch {
            time: 1,
            events: vec![(0, raise("a", 1, &[EventType::STATE_CHANGE]))],
        };
        let err = router.deliver(&batch).unwrap_err();
        assert!(matches!(err, SimulationError::Panicked { ref message, .. } if message == "fold failed"));
    }

    #[test]
    fn run_stops_at_close() {
        let log = Arc::new(Mutex::new(Log::default()));
        let mut router = Router::default();
        router.subscribe(log.clone(), vec![0]);
        let (tx, rx) = crossbeam::channel::bounded(4);
        tx.send(Delivery::Step(StepBatch {
            time: 1,
            events: vec![(0, raise("a", 1, &[EventType::STATE_CHANGE]))],
        }))
        .unwrap();
        tx.send(Delivery::Close(10)).unwrap();
        drop(tx);
        assert_eq!(router.run(rx, &AtomicBool::new(false)).unwrap(), 1);
        assert_eq!(log.lock().closed, Some(10));
    }

    #[test]
    fn run_abandons_buffered_batches_once_cancelled() {
        let log = Arc::new(Mutex::new(Log::default()));
        let mut router = Router::default();
        router.subscribe(log.clone(), vec![0]);
        let (tx, rx) = crossbeam::channel::bounded(4);
        tx.send(Delivery::Step(StepBatch {
            time: 1,
            events: vec![(0, raise("a", 1, &[EventType::STATE_CHANGE]))],
        }))
        .unwrap();
        tx.send(Delivery::Close(10)).unwrap();
        drop(tx);
        assert_eq!(
            router.run(rx, &AtomicBool::new(true)),
            Err(SimulationError::Cancelled)
        );
        assert!(log.lock().seen.is_empty());
        assert_eq!(log.lock().closed, None);
    }
}
