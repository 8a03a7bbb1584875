use super::event::{AggregateId, VersionedName};
use super::tuple::SlotType;

// ============================================================================
// Event Sourcing Errors
// ============================================================================
//
// Every failure aborts the enclosing encode/decode/replay/fold. Nothing here
// is retried or skipped by the core.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EventSourcingError {
    #[error("Unknown event variant {event_name} for aggregate type '{aggregate_type}'")]
    UnknownEventVariant {
        aggregate_type: String,
        event_name: VersionedName,
    },

    #[error("Tuple for schema {schema} has no slot named '{slot}'")]
    SchemaMismatch { schema: String, slot: String },

    #[error("Aggregate type '{aggregate_type}' is derived by both {first} and {second}")]
    AmbiguousAggregateType {
        aggregate_type: String,
        first: &'static str,
        second: &'static str,
    },

    #[error("Cannot start state from event {event} at {timestamp}")]
    InvalidInitialState { event: String, timestamp: String },

    #[error("Event name {event_name} is registered twice for aggregate type '{aggregate_type}'")]
    DuplicateEventName {
        aggregate_type: String,
        event_name: VersionedName,
    },

    #[error("Variant {data_type} is registered twice in hierarchy {hierarchy}")]
    DuplicateVariant {
        hierarchy: &'static str,
        data_type: &'static str,
    },

    #[error("Schema {schema} declares slot '{slot}' more than once")]
    DuplicateSlot { schema: String, slot: String },

    #[error("Slot '{slot}' of schema {schema} expects {expected}, got {value}")]
    SlotTypeMismatch {
        schema: String,
        slot: String,
        expected: SlotType,
        value: String,
    },

    #[error("Tuple does not fill schema {schema}: missing {missing:?}, unexpected {unexpected:?}")]
    IncompleteTuple {
        schema: String,
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    #[error("Variant {data_type} is not registered in hierarchy {hierarchy}")]
    UnregisteredVariant {
        hierarchy: &'static str,
        data_type: &'static str,
    },

    #[error("Event for {actual} cannot be applied to {expected}")]
    AggregateMismatch {
        expected: AggregateId,
        actual: AggregateId,
    },

    #[error("Concurrency conflict on {aggregate_id}: expected version {expected}, but current is {actual}")]
    ConcurrencyConflict {
        aggregate_id: AggregateId,
        expected: u64,
        actual: u64,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Event sink rejected batch: {0}")]
    Sink(String),
}

impl EventSourcingError {
    /// Reducers return this when the first event of a stream cannot start state.
    pub fn invalid_initial_state<T: std::fmt::Debug>(
        timestamp: chrono::DateTime<chrono::Utc>,
        data: &T,
    ) -> Self {
        EventSourcingError::InvalidInitialState {
            event: format!("{:?}", data),
            timestamp: timestamp.to_rfc3339(),
        }
    }

    /// Short label used for metrics
    pub fn reason(&self) -> &'static str {
        match self {
            EventSourcingError::UnknownEventVariant { .. } => "unknown_event_variant",
            EventSourcingError::SchemaMismatch { .. } => "schema_mismatch",
            EventSourcingError::AmbiguousAggregateType { .. } => "ambiguous_aggregate_type",
            EventSourcingError::InvalidInitialState { .. } => "invalid_initial_state",
            EventSourcingError::DuplicateEventName { .. } => "duplicate_event_name",
            EventSourcingError::DuplicateVariant { .. } => "duplicate_variant",
            EventSourcingError::DuplicateSlot { .. } => "duplicate_slot",
            EventSourcingError::SlotTypeMismatch { .. } => "slot_type_mismatch",
            EventSourcingError::IncompleteTuple { .. } => "incomplete_tuple",
            EventSourcingError::UnregisteredVariant { .. } => "unregistered_variant",
            EventSourcingError::AggregateMismatch { .. } => "aggregate_mismatch",
            EventSourcingError::ConcurrencyConflict { .. } => "concurrency_conflict",
            EventSourcingError::Serialization(_) => "serialization",
            EventSourcingError::Sink(_) => "sink",
        }
    }
}

impl From<serde_json::Error> for EventSourcingError {
    fn from(e: serde_json::Error) -> Self {
        EventSourcingError::Serialization(e.to_string())
    }
}

pub type Result<T, E = EventSourcingError> = std::result::Result<T, E>;
