use std::sync::Arc;

use crate::event_sourcing::core::{
    EventHierarchy, EventSourcingError, GenericEvent, Registry, Result, TimestampedEvent,
};
use crate::metrics::Metrics;

// ============================================================================
// Event Bus - batch dispatch to sinks
// ============================================================================
//
// Callers fill an append-only batch inside `dispatch`; the batch is handed to
// every sink only after the callback succeeds, so a failing callback
// publishes nothing.
//
// ============================================================================

/// Accepts batches of generic events for storage or forwarding
pub trait EventSink: Send + Sync {
    fn accept(&self, batch: &[GenericEvent]) -> Result<()>;
}

/// Append-only accumulator handed to `EventBus::dispatch` callbacks
#[derive(Debug, Default)]
pub struct EventBatch {
    events: Vec<GenericEvent>,
}

impl EventBatch {
    pub fn accept(&mut self, event: GenericEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GenericEvent> {
        self.events.iter()
    }
}

#[derive(Default)]
pub struct EventBus {
    sinks: Vec<Arc<dyn EventSink>>,
    metrics: Option<Arc<Metrics>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bus forwarding every batch to one sink
    pub fn processing_with(sink: Arc<dyn EventSink>) -> Self {
        Self::new().with_sink(sink)
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn dispatch<F>(&self, fill: F) -> Result<()>
    where
        F: FnOnce(&mut EventBatch) -> Result<()>,
    {
        let mut batch = EventBatch::default();
        fill(&mut batch)?;

        if batch.is_empty() {
            return Ok(());
        }

        for sink in &self.sinks {
            sink.accept(&batch.events)?;
        }

        if let Some(metrics) = &self.metrics {
            for event in &batch.events {
                metrics
                    .events_published
                    .with_label_values(&[event.aggregate_id.aggregate_type.as_str()])
                    .inc();
            }
        }

        tracing::debug!(
            event_count = batch.len(),
            sink_count = self.sinks.len(),
            "Dispatched event batch"
        );

        Ok(())
    }

    /// Encode typed events and dispatch them as a single batch
    pub fn dispatch_events<E: EventHierarchy>(
        &self,
        registry: &Registry<E>,
        events: &[TimestampedEvent<E>],
    ) -> Result<()> {
        self.dispatch(|batch| {
            for event in events {
                batch.accept(registry.encode_event(event)?);
            }
            Ok(())
        })
    }
}

/// Sink that writes every event to the log
#[derive(Debug, Default)]
pub struct LoggingSink;

impl EventSink for LoggingSink {
    fn accept(&self, batch: &[GenericEvent]) -> Result<()> {
        for event in batch {
            tracing::info!(
                aggregate_id = %event.aggregate_id,
                event_name = %event.event_name,
                timestamp = %event.timestamp.to_rfc3339(),
                payload = %event.tuple,
                "Event published"
            );
        }
        Ok(())
    }
}

/// Sink that refuses every batch; used to check that failed publishes leave
/// no trace
#[derive(Debug, Default)]
pub struct RejectingSink;

impl EventSink for RejectingSink {
    fn accept(&self, batch: &[GenericEvent]) -> Result<()> {
        Err(EventSourcingError::Sink(format!(
            "rejected batch of {} events",
            batch.len()
        )))
    }
}
