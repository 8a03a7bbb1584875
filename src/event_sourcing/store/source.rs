use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use crate::event_sourcing::core::{AggregateId, EventTypeMatcher, GenericEvent, Result};

// ============================================================================
// Event Source Boundary
// ============================================================================
//
// How the core reads events back. Any store (in-memory, Cassandra, Redis...)
// can back replays by implementing `EventSource`; the core only needs a lazy
// cursor in storage order.
//
// ============================================================================

/// Half-open time window: `from` inclusive, `to` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn from(from: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            to: None,
        }
    }

    pub fn to(to: DateTime<Utc>) -> Self {
        Self {
            from: None,
            to: Some(to),
        }
    }

    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }

    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| timestamp >= from) && self.to.map_or(true, |to| timestamp < to)
    }
}

/// A replayable stream of one aggregate's events.
pub trait EventCursor: Send + Sync {
    /// Events in storage order, pulled lazily so consumers can stop early
    fn events(&self) -> Box<dyn Iterator<Item = GenericEvent> + '_>;

    /// Ordering used for ascending/descending replay
    fn storage_order(&self, a: &GenericEvent, b: &GenericEvent) -> Ordering {
        a.timestamp.cmp(&b.timestamp)
    }
}

pub trait EventSource: Send + Sync {
    fn replaying(
        &self,
        matcher: &EventTypeMatcher,
        aggregate_id: &AggregateId,
        range: TimeRange,
    ) -> Result<Arc<dyn EventCursor>>;

    fn get_events(
        &self,
        matcher: &EventTypeMatcher,
        aggregate_id: &AggregateId,
        range: TimeRange,
    ) -> Result<Vec<GenericEvent>> {
        let cursor = self.replaying(matcher, aggregate_id, range)?;
        let events = cursor.events().collect();
        Ok(events)
    }

    /// Load a fixed set of aggregates once, for cheap repeated replay
    fn preload(
        &self,
        matcher: &EventTypeMatcher,
        aggregate_type: &str,
        ids: &[String],
        range: TimeRange,
    ) -> Result<CachedEventSource> {
        let mut events = HashMap::with_capacity(ids.len());
        for id in ids {
            let aggregate_id = AggregateId::of(aggregate_type, id.as_str());
            events.insert(id.clone(), Arc::new(self.get_events(matcher, &aggregate_id, range)?));
        }

        tracing::debug!(
            aggregate_type = aggregate_type,
            aggregate_count = ids.len(),
            "Preloaded events"
        );

        Ok(CachedEventSource {
            aggregate_type: aggregate_type.to_string(),
            events,
        })
    }
}

/// Cursor over an already-loaded event list, cloning each event as it is pulled.
pub struct LoadedCursor {
    events: Arc<Vec<GenericEvent>>,
    range: TimeRange,
}

impl LoadedCursor {
    pub fn new(events: Arc<Vec<GenericEvent>>, range: TimeRange) -> Self {
        Self { events, range }
    }
}

impl EventCursor for LoadedCursor {
    fn events(&self) -> Box<dyn Iterator<Item = GenericEvent> + '_> {
        Box::new(
            self.events
                .iter()
                .filter(move |e| self.range.contains(e.timestamp))
                .cloned(),
        )
    }
}

/// Events for a fixed set of aggregate ids, loaded once.
pub struct CachedEventSource {
    aggregate_type: String,
    events: HashMap<String, Arc<Vec<GenericEvent>>>,
}

impl CachedEventSource {
    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn aggregate_ids(&self) -> impl Iterator<Item = &String> {
        self.events.keys()
    }

    /// Ids that were not preloaded yield an empty stream
    pub fn replaying(&self, id: &str, range: TimeRange) -> Arc<dyn EventCursor> {
        let events = self.events.get(id).cloned().unwrap_or_default();
        Arc::new(LoadedCursor::new(events, range))
    }

    pub fn get_events(&self, id: &str, range: TimeRange) -> Vec<GenericEvent> {
        self.replaying(id, range).events().collect()
    }
}
