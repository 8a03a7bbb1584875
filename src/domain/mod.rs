// ============================================================================
// Domain Layer - Event Hierarchies and Their Transitions
// ============================================================================
//
// Each aggregate has its own subdirectory with:
// - Events (the hierarchy enum and its variant registrations)
// - State (the Transitions reducer)
//
// This layer only depends on the public event sourcing API.
//
// ============================================================================

pub mod lightbulb;
pub mod parcel;
