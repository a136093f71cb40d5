use availsim_core::prelude::*;
use tracing::trace;

/// Sums numeric payloads into consecutive bins of fixed length.
///
/// Bin `k` covers `((k - 1) * period, k * period]`: an event exactly on a
/// boundary belongs to the bin that boundary closes. Bins with no event
/// contribute a zero sample. Only bins ending at or before the `close` time
/// are flushed, a trailing partial bin is dropped.
pub struct PeriodicSumConsumer {
    id: String,
    period: SimTime,
    kind: EventType,
    bin_end: Option<SimTime>,
    running: f64,
    totals: SampledStatistic,
}

impl PeriodicSumConsumer {
    /// A zero `period` is rejected when the consumer is subscribed; until
    /// then it never opens a bin.
    pub fn new(id: impl Into<String>, period: SimTime) -> Self {
        Self {
            id: id.into(),
            period,
            kind: EventType::PERIODIC_VALUE,
            bin_end: (period > 0).then_some(period),
            running: 0.0,
            totals: SampledStatistic::new(),
        }
    }

    /// Sum events of `kind` instead of [`EventType::PERIODIC_VALUE`].
    pub fn with_event_type(mut self, kind: EventType) -> Self {
        self.kind = kind;
        self
    }

    pub fn period(&self) -> SimTime {
        self.period
    }

    /// One sample per completed bin.
    pub fn totals(&self) -> &SampledStatistic {
        &self.totals
    }

    /// Sum accumulated in the bin still open.
    pub fn running(&self) -> f64 {
        self.running
    }

    fn flush(&mut self) {
        self.totals.add(self.running);
        self.running = 0.0;
        self.bin_end = self.bin_end.and_then(|end| end.checked_add(self.period));
    }
}

impl Consumer for PeriodicSumConsumer {
    fn id(&self) -> &str {
        &self.id
    }

    fn initialize(&mut self) -> Result<(), ConsumerError> {
        if self.period == 0 {
            return Err(ConsumerError::Configuration(
                "bin period must be at least one time unit".into(),
            ));
        }
        Ok(())
    }

    fn accepts(&self, kind: EventType) -> bool {
        kind == self.kind
    }

    fn consume(&mut self, event: &Event) {
        let Some(value) = event.payload().as_value() else {
            return;
        };
        while let Some(end) = self.bin_end {
            if event.time() <= end {
                break;
            }
            self.flush();
        }
        self.running += value;
    }

    fn close(&mut self, end_time: SimTime) {
        while let Some(end) = self.bin_end {
            if end > end_time {
                break;
            }
            self.flush();
        }
        trace!(consumer = %self.id, bins = self.totals.count(), "bins flushed");
    }
}
