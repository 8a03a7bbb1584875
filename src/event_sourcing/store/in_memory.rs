use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::event_sourcing::core::{
    AggregateId, EventSourcingError, EventTypeMatcher, GenericEvent, Result,
};
use crate::messaging::EventSink;

use super::source::{EventCursor, EventSource, TimeRange};

// ============================================================================
// In-Memory Event Store
// ============================================================================
//
// Reference store for tests and demos:
// 1. Append events per aggregate (append-only, arrival order kept)
// 2. Optional optimistic concurrency check on append
// 3. Replay through lazy cursors over a snapshot of the stream
//
// ============================================================================

#[derive(Default)]
pub struct InMemoryEventStore {
    streams: RwLock<HashMap<AggregateId, Arc<Vec<GenericEvent>>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append events to one aggregate's stream.
    /// Returns the new version (number of stored events) after appending.
    pub fn append_events(
        &self,
        aggregate_id: &AggregateId,
        expected_version: Option<u64>,
        events: Vec<GenericEvent>,
    ) -> Result<u64> {
        if let Some(event) = events.iter().find(|e| &e.aggregate_id != aggregate_id) {
            return Err(EventSourcingError::AggregateMismatch {
                expected: aggregate_id.clone(),
                actual: event.aggregate_id.clone(),
            });
        }

        let mut streams = self.streams.write();
        let stream = streams.entry(aggregate_id.clone()).or_default();

        let current_version = stream.len() as u64;
        if let Some(expected) = expected_version {
            if expected != current_version {
                return Err(EventSourcingError::ConcurrencyConflict {
                    aggregate_id: aggregate_id.clone(),
                    expected,
                    actual: current_version,
                });
            }
        }

        let event_count = events.len();
        Arc::make_mut(stream).extend(events);
        let new_version = stream.len() as u64;

        tracing::debug!(
            aggregate_id = %aggregate_id,
            new_version = new_version,
            event_count = event_count,
            "Appended events to event store"
        );

        Ok(new_version)
    }

    /// All events for an aggregate, in arrival order
    pub fn load_events(&self, aggregate_id: &AggregateId) -> Vec<GenericEvent> {
        self.snapshot(aggregate_id).as_ref().clone()
    }

    pub fn current_version(&self, aggregate_id: &AggregateId) -> u64 {
        self.streams
            .read()
            .get(aggregate_id)
            .map(|s| s.len() as u64)
            .unwrap_or(0)
    }

    pub fn aggregate_exists(&self, aggregate_id: &AggregateId) -> bool {
        self.current_version(aggregate_id) > 0
    }

    fn snapshot(&self, aggregate_id: &AggregateId) -> Arc<Vec<GenericEvent>> {
        self.streams
            .read()
            .get(aggregate_id)
            .cloned()
            .unwrap_or_default()
    }
}

impl EventSink for InMemoryEventStore {
    fn accept(&self, batch: &[GenericEvent]) -> Result<()> {
        let mut grouped: Vec<(AggregateId, Vec<GenericEvent>)> = Vec::new();
        for event in batch {
            match grouped.iter_mut().find(|(id, _)| id == &event.aggregate_id) {
                Some((_, events)) => events.push(event.clone()),
                None => grouped.push((event.aggregate_id.clone(), vec![event.clone()])),
            }
        }

        for (aggregate_id, events) in grouped {
            self.append_events(&aggregate_id, None, events)?;
        }
        Ok(())
    }
}

struct StoreCursor {
    events: Arc<Vec<GenericEvent>>,
    matcher: EventTypeMatcher,
    range: TimeRange,
}

impl EventCursor for StoreCursor {
    fn events(&self) -> Box<dyn Iterator<Item = GenericEvent> + '_> {
        Box::new(
            self.events
                .iter()
                .filter(move |e| self.matcher.matches_event(e) && self.range.contains(e.timestamp))
                .cloned(),
        )
    }
}

impl EventSource for InMemoryEventStore {
    fn replaying(
        &self,
        matcher: &EventTypeMatcher,
        aggregate_id: &AggregateId,
        range: TimeRange,
    ) -> Result<Arc<dyn EventCursor>> {
        Ok(Arc::new(StoreCursor {
            events: self.snapshot(aggregate_id),
            matcher: matcher.clone(),
            range,
        }))
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
