pub mod event_bus;

pub use event_bus::{EventBatch, EventBus, EventSink, LoggingSink, RejectingSink};
