// ============================================================================
// Parcel Domain - parcel delivery tracking
// ============================================================================

pub mod events;
pub mod state;

pub use events::*;
pub use state::*;
