// ============================================================================
// Event Sourcing Core - Generic Infrastructure Abstractions
// ============================================================================
//
// GENERIC building blocks that work with ANY event hierarchy:
// - identity and value types (AggregateId, VersionedName, GenericEvent)
// - the tuple/schema codec
// - variant registration and the memoizing type registry
// - the Transitions reducer
//
// No domain-specific code lives here.
//
// ============================================================================

pub mod error;
pub mod event;
pub mod registry;
pub mod transitions;
pub mod tuple;
pub mod variant;

// Re-export core types for convenience
pub use error::{EventSourcingError, Result};
pub use event::{
    AggregateId, EventCharacteristics, EventType, GenericEvent, TimestampedEvent, VersionedName,
};
pub use registry::{EventTypeMatcher, Registry, RegistryCache, VariantDescriptor};
pub use transitions::Transitions;
pub use tuple::{Schema, Slot, SlotType, Tuple, TupleWriter};
pub use variant::{derive_aggregate_type, EventHierarchy, Rank, VariantSpec};
