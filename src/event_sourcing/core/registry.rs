use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, OnceLock};

use crate::metrics::Metrics;

use super::error::{EventSourcingError, Result};
use super::event::{
    AggregateId, EventCharacteristics, EventType, GenericEvent, TimestampedEvent, VersionedName,
};
use super::tuple::{Schema, TupleWriter};
use super::variant::{derive_aggregate_type, DecodeFn, EventHierarchy, Rank};

// ============================================================================
// Type Registry
// ============================================================================
//
// Maps variant type <-> name <-> schema <-> codec <-> causal rank for one
// event hierarchy. Built once, immutable afterwards.
//
// ============================================================================

pub struct VariantDescriptor<E> {
    pub data_type: &'static str,
    pub rank: i32,
    pub aggregate_type: String,
    pub event_name: VersionedName,
    pub schema: Arc<Schema>,
    decode: DecodeFn<E>,
}

impl<E: EventHierarchy> VariantDescriptor<E> {
    pub fn characteristics(&self) -> EventCharacteristics {
        EventCharacteristics {
            is_initial: self.rank == Rank::INITIAL,
            is_terminal: self.rank == Rank::TERMINAL,
        }
    }

    fn encode(&self, data: &E, aggregate_id: &str, timestamp: DateTime<Utc>) -> Result<GenericEvent> {
        let mut writer = TupleWriter::new(Arc::clone(&self.schema));
        data.write_fields(&mut writer)?;

        Ok(GenericEvent {
            aggregate_id: AggregateId::of(self.aggregate_type.clone(), aggregate_id),
            timestamp,
            event_name: self.event_name.clone(),
            tuple: writer.finish()?,
            characteristics: self.characteristics(),
        })
    }

    fn decode(&self, event: &GenericEvent) -> Result<TimestampedEvent<E>> {
        // Zero-field variants ignore the tuple and yield their marker value.
        let data = (self.decode)(&event.tuple)?;
        Ok(TimestampedEvent::new(event.timestamp, event.aggregate_id.id.clone(), data))
    }
}

/// The set of event types a replay or query accepts, with their schemas.
#[derive(Debug, Clone, Default)]
pub struct EventTypeMatcher {
    schemas: HashMap<EventType, Arc<Schema>>,
}

impl EventTypeMatcher {
    pub fn matching_against(schemas: HashMap<EventType, Arc<Schema>>) -> Self {
        Self { schemas }
    }

    pub fn matches(&self, event_type: &EventType) -> bool {
        self.schemas.contains_key(event_type)
    }

    pub fn matches_event(&self, event: &GenericEvent) -> bool {
        self.matches(&event.event_type())
    }

    pub fn schema_for(&self, event_type: &EventType) -> Option<&Arc<Schema>> {
        self.schemas.get(event_type)
    }

    pub fn event_types(&self) -> impl Iterator<Item = &EventType> {
        self.schemas.keys()
    }
}

pub struct Registry<E: EventHierarchy> {
    aggregate_type: String,
    by_name: HashMap<VersionedName, Arc<VariantDescriptor<E>>>,
    by_type: HashMap<&'static str, Arc<VariantDescriptor<E>>>,
    matcher: EventTypeMatcher,
    metrics: Option<Arc<Metrics>>,
}

impl<E: EventHierarchy> Registry<E> {
    /// Build a registry outside any cache. Prefer `RegistryCache::resolve`,
    /// which also checks aggregate types across hierarchies.
    pub fn build() -> Result<Self> {
        Self::build_with(None)
    }

    fn build_with(metrics: Option<Arc<Metrics>>) -> Result<Self> {
        let aggregate_type = E::AGGREGATE_TYPE
            .map(str::to_string)
            .unwrap_or_else(|| derive_aggregate_type(E::HIERARCHY_NAME));

        let mut by_name = HashMap::new();
        let mut by_type = HashMap::new();
        let mut schemas = HashMap::new();

        for spec in E::variants() {
            let event_name = VersionedName::of(spec.event_name(), spec.version);
            let schema = Arc::new(Schema::of(
                format!("{}:{}", aggregate_type, event_name),
                spec.fields.clone(),
            )?);

            let descriptor = Arc::new(VariantDescriptor {
                data_type: spec.data_type,
                rank: spec.rank.value(),
                aggregate_type: aggregate_type.clone(),
                event_name: event_name.clone(),
                schema: Arc::clone(&schema),
                decode: spec.decode,
            });

            if by_type.insert(spec.data_type, Arc::clone(&descriptor)).is_some() {
                return Err(EventSourcingError::DuplicateVariant {
                    hierarchy: E::HIERARCHY_NAME,
                    data_type: spec.data_type,
                });
            }
            if by_name.insert(event_name.clone(), descriptor).is_some() {
                return Err(EventSourcingError::DuplicateEventName {
                    aggregate_type,
                    event_name,
                });
            }

            schemas.insert(EventType::of(aggregate_type.clone(), event_name), schema);
        }

        tracing::info!(
            hierarchy = E::HIERARCHY_NAME,
            aggregate_type = %aggregate_type,
            variant_count = by_name.len(),
            "Built event type registry"
        );

        Ok(Self {
            aggregate_type,
            by_name,
            by_type,
            matcher: EventTypeMatcher::matching_against(schemas),
            metrics,
        })
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn aggregate_id(&self, id: &str) -> AggregateId {
        AggregateId::of(self.aggregate_type.clone(), id)
    }

    pub fn matcher(&self) -> &EventTypeMatcher {
        &self.matcher
    }

    pub(crate) fn metrics(&self) -> Option<&Arc<Metrics>> {
        self.metrics.as_ref()
    }

    pub fn descriptor_for_name(&self, name: &VersionedName) -> Option<&Arc<VariantDescriptor<E>>> {
        self.by_name.get(name)
    }

    pub fn descriptor_for(&self, data: &E) -> Result<&Arc<VariantDescriptor<E>>> {
        self.by_type
            .get(data.data_type())
            .ok_or(EventSourcingError::UnregisteredVariant {
                hierarchy: E::HIERARCHY_NAME,
                data_type: data.data_type(),
            })
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &Arc<VariantDescriptor<E>>> {
        self.by_type.values()
    }

    pub fn encode(&self, data: &E, aggregate_id: &str, timestamp: DateTime<Utc>) -> Result<GenericEvent> {
        let event = self.descriptor_for(data)?.encode(data, aggregate_id, timestamp)?;

        tracing::debug!(
            aggregate_id = %event.aggregate_id,
            event_name = %event.event_name,
            "Encoded event"
        );
        if let Some(metrics) = &self.metrics {
            metrics
                .events_encoded
                .with_label_values(&[self.aggregate_type.as_str()])
                .inc();
        }

        Ok(event)
    }

    pub fn encode_event(&self, event: &TimestampedEvent<E>) -> Result<GenericEvent> {
        self.encode(&event.data, &event.aggregate_id, event.timestamp)
    }

    pub fn decode(&self, event: &GenericEvent) -> Result<TimestampedEvent<E>> {
        let result = self.decode_uncounted(event);

        if let Some(metrics) = &self.metrics {
            match &result {
                Ok(_) => metrics
                    .events_decoded
                    .with_label_values(&[self.aggregate_type.as_str()])
                    .inc(),
                Err(e) => metrics
                    .decode_failures
                    .with_label_values(&[self.aggregate_type.as_str(), e.reason()])
                    .inc(),
            }
        }
        if let Err(e) = &result {
            tracing::warn!(
                aggregate_id = %event.aggregate_id,
                event_name = %event.event_name,
                error = %e,
                "Failed to decode event"
            );
        }

        result
    }

    fn decode_uncounted(&self, event: &GenericEvent) -> Result<TimestampedEvent<E>> {
        let unknown = || EventSourcingError::UnknownEventVariant {
            aggregate_type: event.aggregate_id.aggregate_type.clone(),
            event_name: event.event_name.clone(),
        };

        if event.aggregate_id.aggregate_type != self.aggregate_type {
            return Err(unknown());
        }

        self.by_name
            .get(&event.event_name)
            .ok_or_else(unknown)?
            .decode(event)
    }

    /// Rank of the event's variant; unregistered names rank as preterminal
    pub fn rank_of(&self, event: &GenericEvent) -> i32 {
        self.by_name
            .get(&event.event_name)
            .map(|d| d.rank)
            .unwrap_or(Rank::PRETERMINAL)
    }

    /// Causal order: rank first, then timestamp. Callers sort stably so that
    /// arrival order breaks the remaining ties.
    pub fn causal_order(&self, a: &GenericEvent, b: &GenericEvent) -> Ordering {
        self.rank_of(a)
            .cmp(&self.rank_of(b))
            .then_with(|| a.timestamp.cmp(&b.timestamp))
    }
}

// ============================================================================
// Registry Cache - lazy, at-most-once build per hierarchy
// ============================================================================

type RegistryCell<E> = OnceLock<Result<Arc<Registry<E>>>>;

#[derive(Default)]
pub struct RegistryCache {
    cells: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
    claimed: Mutex<HashMap<String, (TypeId, &'static str)>>,
    builds: AtomicUsize,
    metrics: Option<Arc<Metrics>>,
}

impl RegistryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metrics(metrics: Arc<Metrics>) -> Self {
        Self {
            metrics: Some(metrics),
            ..Self::default()
        }
    }

    /// Resolve the registry for `E`, building it on first use. Concurrent
    /// first calls wait for a single build; failures are memoized too.
    pub fn resolve<E: EventHierarchy>(&self) -> Result<Arc<Registry<E>>> {
        let entry = {
            let mut cells = self.cells.lock();
            Arc::clone(
                cells
                    .entry(TypeId::of::<E>())
                    .or_insert_with(|| Arc::new(RegistryCell::<E>::new())),
            )
        };

        let cell = match entry.downcast_ref::<RegistryCell<E>>() {
            Some(cell) => cell,
            None => unreachable!("registry cells are keyed by TypeId"),
        };

        cell.get_or_init(|| self.build::<E>()).clone()
    }

    /// Number of registry builds performed by this cache
    pub fn builds(&self) -> usize {
        self.builds.load(AtomicOrdering::SeqCst)
    }

    fn build<E: EventHierarchy>(&self) -> Result<Arc<Registry<E>>> {
        self.builds.fetch_add(1, AtomicOrdering::SeqCst);
        if let Some(metrics) = &self.metrics {
            metrics.registry_builds.inc();
        }

        let registry = Registry::<E>::build_with(self.metrics.clone())?;

        let mut claimed = self.claimed.lock();
        match claimed.get(registry.aggregate_type()) {
            Some((type_id, other)) if *type_id != TypeId::of::<E>() => {
                tracing::error!(
                    aggregate_type = %registry.aggregate_type(),
                    first = other,
                    second = E::HIERARCHY_NAME,
                    "Aggregate type claimed by two hierarchies"
                );
                return Err(EventSourcingError::AmbiguousAggregateType {
                    aggregate_type: registry.aggregate_type().to_string(),
                    first: *other,
                    second: E::HIERARCHY_NAME,
                });
            }
            Some(_) => {}
            None => {
                claimed.insert(
                    registry.aggregate_type().to_string(),
                    (TypeId::of::<E>(), E::HIERARCHY_NAME),
                );
            }
        }

        Ok(Arc::new(registry))
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
