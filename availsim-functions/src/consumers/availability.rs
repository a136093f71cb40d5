use availsim_core::prelude::*;

/// Folds state-change events into up-time and outage statistics.
///
/// Starts Up at time 0. Repeated events carrying the current state are
/// ignored. The observed window ends at the `close` time; an outage still
/// open at that point is counted with its truncated duration.
pub struct AvailabilityConsumer {
    id: String,
    up: bool,
    since: SimTime,
    up_time: SimTime,
    observed: SimTime,
    outages: SampledStatistic,
    closed: bool,
}

impl AvailabilityConsumer {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            up: true,
            since: 0,
            up_time: 0,
            observed: 0,
            outages: SampledStatistic::new(),
            closed: false,
        }
    }

    /// Up-time over observed time, `None` before any time was observed.
    pub fn availability(&self) -> Option<f64> {
        let (up_time, observed) = self.totals();
        (observed > 0).then(|| up_time as f64 / observed as f64)
    }

    pub fn up_time(&self) -> SimTime {
        self.totals().0
    }

    pub fn observed_time(&self) -> SimTime {
        self.totals().1
    }

    /// Durations of every outage seen so far.
    pub fn outages(&self) -> &SampledStatistic {
        &self.outages
    }

    pub fn is_up(&self) -> bool {
        self.up
    }

    /// Before `close`, the window ends at the last delivered event.
    fn totals(&self) -> (SimTime, SimTime) {
        if self.closed {
            (self.up_time, self.observed)
        } else {
            (self.up_time, self.since)
        }
    }

    fn transition(&mut self, time: SimTime, up: bool) {
        let time = time.max(self.since);
        let elapsed = time - self.since;
        if self.up {
            self.up_time += elapsed;
        } else {
            self.outages.add(elapsed as f64);
        }
        self.since = time;
        self.up = up;
    }
}

impl Consumer for AvailabilityConsumer {
    fn id(&self) -> &str {
        &self.id
    }

    fn accepts(&self, kind: EventType) -> bool {
        kind == EventType::STATE_CHANGE
    }

    fn consume(&mut self, event: &Event) {
        let Some(up) = event.payload().as_state() else {
            return;
        };
        if up != self.up {
            self.transition(event.time(), up);
        }
    }

    fn close(&mut self, end_time: SimTime) {
        if self.closed {
            return;
        }
        let end = end_time.max(self.since);
        let elapsed = end - self.since;
        if self.up {
            self.up_time += elapsed;
        } else if elapsed > 0 {
            self.outages.add(elapsed as f64);
        }
        self.since = end;
        self.observed = end;
        self.closed = true;
    }
}
