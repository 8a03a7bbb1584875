use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::tuple::Tuple;

// ============================================================================
// Event Identity - Aggregate, Name and Type
// ============================================================================

/// Identifies one aggregate instance's event stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AggregateId {
    pub aggregate_type: String,
    pub id: String,
}

impl AggregateId {
    pub fn of(aggregate_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            aggregate_type: aggregate_type.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for AggregateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.aggregate_type, self.id)
    }
}

/// Event name plus schema version, so evolved variants can live side by side.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VersionedName {
    pub name: String,
    pub version: String,
}

impl VersionedName {
    pub fn of(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for VersionedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.name, self.version)
    }
}

/// Composite key used by matchers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventType {
    pub aggregate_type: String,
    pub event_name: VersionedName,
}

impl EventType {
    pub fn of(aggregate_type: impl Into<String>, event_name: VersionedName) -> Self {
        Self {
            aggregate_type: aggregate_type.into(),
            event_name,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.aggregate_type, self.event_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EventCharacteristics {
    pub is_initial: bool,
    pub is_terminal: bool,
}

// ============================================================================
// Generic Event - storage-neutral representation of every variant
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct GenericEvent {
    pub aggregate_id: AggregateId,
    pub timestamp: DateTime<Utc>,
    pub event_name: VersionedName,
    pub tuple: Tuple,
    pub characteristics: EventCharacteristics,
}

impl GenericEvent {
    pub fn event_type(&self) -> EventType {
        EventType::of(self.aggregate_id.aggregate_type.clone(), self.event_name.clone())
    }
}

impl fmt::Display for GenericEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.aggregate_id,
            self.timestamp.to_rfc3339(),
            self.event_name,
            self.tuple
        )
    }
}

// ============================================================================
// Timestamped Event - a decoded, typed event in context
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct TimestampedEvent<E> {
    pub timestamp: DateTime<Utc>,
    pub aggregate_id: String,
    pub data: E,
}

impl<E> TimestampedEvent<E> {
    pub fn new(timestamp: DateTime<Utc>, aggregate_id: impl Into<String>, data: E) -> Self {
        Self {
            timestamp,
            aggregate_id: aggregate_id.into(),
            data,
        }
    }
}
