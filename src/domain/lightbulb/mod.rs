// ============================================================================
// Lightbulb Domain
// ============================================================================
//
// Lightbulbs are created with a wattage, screwed into and out of locations,
// and switched on and off. State tracks accumulated active time so energy use
// can be computed at any instant.
//
// ============================================================================

pub mod events;
pub mod state;

pub use events::*;
pub use state::*;
