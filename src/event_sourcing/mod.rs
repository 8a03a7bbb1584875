// ============================================================================
// Event Sourcing Infrastructure
// ============================================================================
//
// Generic, reusable event sourcing infrastructure.
// Domain-specific code is in src/domain/
//
// ============================================================================

// Core abstractions (GENERIC - works with any event hierarchy)
pub mod core;
pub mod store;

// Reading and projecting event streams
pub mod replay;
pub mod state;

// Re-export infrastructure
pub use self::core::*;
pub use self::replay::{Replay, TypedCachedEventSource};
pub use self::state::{InMemoryStateUpdater, StateManager, StateUpdater};
pub use self::store::*;
