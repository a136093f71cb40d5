use availsim_core::prelude::*;

/// Keeps every delivered event, in delivery order.
///
/// Unbounded; meant for tests and short debugging runs.
pub struct RecordingConsumer {
    id: String,
    kinds: Vec<EventType>,
    events: Vec<Event>,
    closed_at: Option<SimTime>,
}

impl RecordingConsumer {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kinds: Vec::new(),
            events: Vec::new(),
            closed_at: None,
        }
    }

    /// Restrict recording to the given event types. Repeatable.
    pub fn accepting(mut self, kind: EventType) -> Self {
        self.kinds.push(kind);
        self
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }

    pub fn closed_at(&self) -> Option<SimTime> {
        self.closed_at
    }
}

impl Consumer for RecordingConsumer {
    fn id(&self) -> &str {
        &self.id
    }

    fn accepts(&self, kind: EventType) -> bool {
        self.kinds.is_empty() || self.kinds.contains(&kind)
    }

    fn consume(&mut self, event: &Event) {
        self.events.push(event.clone());
    }

    fn close(&mut self, end_time: SimTime) {
        self.closed_at = Some(end_time);
    }
}
