// ============================================================================
// Event Sourcing Store - External Collaborator Boundary
// ============================================================================
//
// The durable store is not part of the core. This module defines the narrow
// interfaces the core reads through, plus an in-memory reference store.
//
// ============================================================================

pub mod in_memory;
pub mod source;

pub use in_memory::InMemoryEventStore;
pub use source::{CachedEventSource, EventCursor, EventSource, LoadedCursor, TimeRange};
