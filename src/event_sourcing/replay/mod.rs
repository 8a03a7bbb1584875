use std::cmp::Ordering;
use std::sync::Arc;

use crate::event_sourcing::core::{
    EventHierarchy, GenericEvent, Registry, Result, TimestampedEvent, Transitions,
};
use crate::event_sourcing::store::{CachedEventSource, EventCursor, EventSource, TimeRange};

// ============================================================================
// Replay / Projection Engine
// ============================================================================
//
// An immutable query over one aggregate's event stream. Ordering and
// filtering calls return a new builder; materializers decode every event
// through the registry and abort on the first failure.
//
// ============================================================================

pub type EventPredicate = Arc<dyn Fn(&GenericEvent) -> bool + Send + Sync>;
pub type EventComparator = Arc<dyn Fn(&GenericEvent, &GenericEvent) -> Ordering + Send + Sync>;

pub struct Replay<E: EventHierarchy> {
    registry: Arc<Registry<E>>,
    cursor: Arc<dyn EventCursor>,
    order: Option<EventComparator>,
    filters: Vec<EventPredicate>,
}

impl<E: EventHierarchy> Clone for Replay<E> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            cursor: Arc::clone(&self.cursor),
            order: self.order.clone(),
            filters: self.filters.clone(),
        }
    }
}

impl<E: EventHierarchy> Replay<E> {
    pub fn new(registry: Arc<Registry<E>>, cursor: Arc<dyn EventCursor>) -> Self {
        Self {
            registry,
            cursor,
            order: None,
            filters: Vec::new(),
        }
    }

    pub fn registry(&self) -> &Arc<Registry<E>> {
        &self.registry
    }

    // ------------------------------------------------------------------------
    // Ordering and filtering
    // ------------------------------------------------------------------------

    pub fn ascending_by<F>(&self, order: F) -> Self
    where
        F: Fn(&GenericEvent, &GenericEvent) -> Ordering + Send + Sync + 'static,
    {
        let mut replay = self.clone();
        replay.order = Some(Arc::new(order));
        replay
    }

    pub fn descending_by<F>(&self, order: F) -> Self
    where
        F: Fn(&GenericEvent, &GenericEvent) -> Ordering + Send + Sync + 'static,
    {
        self.ascending_by(move |a, b| order(a, b).reverse())
    }

    /// Storage order, as defined by the underlying cursor
    pub fn ascending(&self) -> Self {
        let cursor = Arc::clone(&self.cursor);
        self.ascending_by(move |a, b| cursor.storage_order(a, b))
    }

    pub fn descending(&self) -> Self {
        let cursor = Arc::clone(&self.cursor);
        self.descending_by(move |a, b| cursor.storage_order(a, b))
    }

    /// Variant rank, then timestamp, then arrival
    pub fn ascending_causal(&self) -> Self {
        let registry = Arc::clone(&self.registry);
        self.ascending_by(move |a, b| registry.causal_order(a, b))
    }

    pub fn descending_causal(&self) -> Self {
        let registry = Arc::clone(&self.registry);
        self.descending_by(move |a, b| registry.causal_order(a, b))
    }

    pub fn filter<F>(&self, predicate: F) -> Self
    where
        F: Fn(&GenericEvent) -> bool + Send + Sync + 'static,
    {
        let mut replay = self.clone();
        replay.filters.push(Arc::new(predicate));
        replay
    }

    // ------------------------------------------------------------------------
    // Materializers
    // ------------------------------------------------------------------------

    /// Decode and handle every event in the configured order
    pub fn for_each<F>(&self, mut handler: F) -> Result<()>
    where
        F: FnMut(TimestampedEvent<E>),
    {
        match &self.order {
            None => {
                for event in self.matching() {
                    handler(self.registry.decode(&event)?);
                }
            }
            Some(_) => {
                for event in self.ordered() {
                    handler(self.registry.decode(&event)?);
                }
            }
        }
        Ok(())
    }

    /// Decode and handle only the first event, without pulling the rest of
    /// an unordered stream
    pub fn first<T, F>(&self, handler: F) -> Result<Option<T>>
    where
        F: FnOnce(TimestampedEvent<E>) -> T,
    {
        let first = match &self.order {
            None => self.matching().next(),
            Some(order) => self.matching().min_by(|a, b| order(a, b)),
        };

        match first {
            Some(event) => Ok(Some(handler(self.registry.decode(&event)?))),
            None => Ok(None),
        }
    }

    pub fn map<T, F>(&self, mut f: F) -> Result<Vec<T>>
    where
        F: FnMut(TimestampedEvent<E>) -> T,
    {
        let mut results = Vec::new();
        self.for_each(|event| results.push(f(event)))?;
        Ok(results)
    }

    pub fn to_list(&self) -> Result<Vec<TimestampedEvent<E>>> {
        self.map(|event| event)
    }

    /// Fold the events, in ascending causal order, through `T` starting at `seed`
    pub fn fold<T>(&self, seed: Option<T::State>) -> Result<Option<T::State>>
    where
        T: Transitions<Event = E>,
    {
        let _timer = self.registry.metrics().map(|m| {
            m.replay_duration
                .with_label_values(&[self.registry.aggregate_type()])
                .start_timer()
        });

        let events = self.ascending_causal().to_list()?;

        tracing::debug!(
            aggregate_type = %self.registry.aggregate_type(),
            event_count = events.len(),
            "Folding events into state"
        );

        T::run_all(&events, seed)
    }

    fn matching(&self) -> impl Iterator<Item = GenericEvent> + '_ {
        self.cursor
            .events()
            .filter(move |event| self.filters.iter().all(|predicate| predicate(event)))
    }

    fn ordered(&self) -> Vec<GenericEvent> {
        let mut events: Vec<GenericEvent> = self.matching().collect();
        if let Some(order) = &self.order {
            // Stable, so arrival order breaks ties
            events.sort_by(|a, b| order(a, b));
        }
        events
    }
}

// ============================================================================
// Typed access to event sources
// ============================================================================

impl<E: EventHierarchy> Registry<E> {
    pub fn replaying(
        self: &Arc<Self>,
        source: &dyn EventSource,
        id: &str,
        range: TimeRange,
    ) -> Result<Replay<E>> {
        let cursor = source.replaying(self.matcher(), &self.aggregate_id(id), range)?;
        Ok(Replay::new(Arc::clone(self), cursor))
    }

    pub fn get_events(
        &self,
        source: &dyn EventSource,
        id: &str,
        range: TimeRange,
    ) -> Result<Vec<TimestampedEvent<E>>> {
        source
            .get_events(self.matcher(), &self.aggregate_id(id), range)?
            .iter()
            .map(|event| self.decode(event))
            .collect()
    }

    pub fn preload(
        self: &Arc<Self>,
        source: &dyn EventSource,
        ids: &[String],
        range: TimeRange,
    ) -> Result<TypedCachedEventSource<E>> {
        let cached = source.preload(self.matcher(), self.aggregate_type(), ids, range)?;
        Ok(TypedCachedEventSource {
            registry: Arc::clone(self),
            source: cached,
        })
    }
}

/// Preloaded events for a fixed set of aggregate ids, decoded on demand.
pub struct TypedCachedEventSource<E: EventHierarchy> {
    registry: Arc<Registry<E>>,
    source: CachedEventSource,
}

impl<E: EventHierarchy> TypedCachedEventSource<E> {
    pub fn get_events(&self, id: &str, range: TimeRange) -> Result<Vec<TimestampedEvent<E>>> {
        self.source
            .get_events(id, range)
            .iter()
            .map(|event| self.registry.decode(event))
            .collect()
    }

    pub fn replaying(&self, id: &str, range: TimeRange) -> Replay<E> {
        Replay::new(Arc::clone(&self.registry), self.source.replaying(id, range))
    }

    pub fn aggregate_ids(&self) -> impl Iterator<Item = &String> {
        self.source.aggregate_ids()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::lightbulb::{LightbulbEvent, LightbulbState};
    use crate::event_sourcing::core::{
        EventSourcingError, SlotType, Tuple, TupleWriter, VariantSpec, VersionedName,
    };
    use crate::event_sourcing::store::{InMemoryEventStore, LoadedCursor};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    #[derive(Debug, Clone, PartialEq)]
    enum ShipmentEvent {
        Booked,
        Packed { crates: i64 },
        Labelled,
        Noted { text: String },
        Closed,
    }

    impl EventHierarchy for ShipmentEvent {
        const HIERARCHY_NAME: &'static str = "ShipmentEvent";

        fn variants() -> Vec<VariantSpec<Self>> {
            vec![
                VariantSpec::new("Booked", |_| Ok(ShipmentEvent::Booked)).initial(),
                VariantSpec::new("Packed", |t: &Tuple| {
                    Ok(ShipmentEvent::Packed { crates: t.get("crates")? })
                })
                .ordered(1)
                .field("crates", SlotType::Integer),
                VariantSpec::new("Labelled", |_| Ok(ShipmentEvent::Labelled)).ordered(2),
                VariantSpec::new("Noted", |t: &Tuple| {
                    Ok(ShipmentEvent::Noted { text: t.get("text")? })
                })
                .field("text", SlotType::String),
                VariantSpec::new("Closed", |_| Ok(ShipmentEvent::Closed)).terminal(),
            ]
        }

        fn data_type(&self) -> &'static str {
            match self {
                ShipmentEvent::Booked => "Booked",
                ShipmentEvent::Packed { .. } => "Packed",
                ShipmentEvent::Labelled => "Labelled",
                ShipmentEvent::Noted { .. } => "Noted",
                ShipmentEvent::Closed => "Closed",
            }
        }

        fn write_fields(&self, tuple: &mut TupleWriter) -> Result<()> {
            match self {
                ShipmentEvent::Packed { crates } => {
                    tuple.put("crates", crates)?;
                }
                ShipmentEvent::Noted { text } => {
                    tuple.put("text", text)?;
                }
                ShipmentEvent::Booked | ShipmentEvent::Labelled | ShipmentEvent::Closed => {}
            }
            Ok(())
        }
    }

    struct CountingCursor {
        events: Vec<GenericEvent>,
        pulled: AtomicUsize,
    }

    impl EventCursor for CountingCursor {
        fn events(&self) -> Box<dyn Iterator<Item = GenericEvent> + '_> {
            Box::new(self.events.iter().map(move |e| {
                self.pulled.fetch_add(1, AtomicOrdering::SeqCst);
                e.clone()
            }))
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 1, 9, 0, 0).unwrap()
    }

    fn replay_of<E: EventHierarchy>(registry: &Arc<Registry<E>>, events: Vec<(Duration, E)>) -> Replay<E> {
        let generic = events
            .into_iter()
            .map(|(offset, e)| registry.encode(&e, "a-1", t0() + offset).unwrap())
            .collect();
        Replay::new(
            Arc::clone(registry),
            Arc::new(LoadedCursor::new(Arc::new(generic), TimeRange::unbounded())),
        )
    }

    fn lightbulb_lifecycle() -> Vec<(Duration, LightbulbEvent)> {
        vec![
            (Duration::milliseconds(1), LightbulbEvent::Created { wattage: 100 }),
            (
                Duration::zero(),
                LightbulbEvent::ScrewedIn {
                    location: "hallway".to_string(),
                },
            ),
            (Duration::milliseconds(2), LightbulbEvent::SwitchedOn),
            (Duration::hours(1), LightbulbEvent::SwitchedOff),
            (Duration::hours(3), LightbulbEvent::SwitchedOn),
        ]
    }

    fn data<E: Clone>(events: &[TimestampedEvent<E>]) -> Vec<E> {
        events.iter().map(|e| e.data.clone()).collect()
    }

    #[test]
    fn test_ascending_causal_order() {
        let registry = Arc::new(Registry::<ShipmentEvent>::build().unwrap());
        let replay = replay_of(
            &registry,
            vec![
                (Duration::seconds(1), ShipmentEvent::Closed),
                (Duration::seconds(5), ShipmentEvent::Noted { text: "late".to_string() }),
                (Duration::seconds(2), ShipmentEvent::Labelled),
                (Duration::seconds(4), ShipmentEvent::Booked),
                (Duration::seconds(3), ShipmentEvent::Packed { crates: 2 }),
                (Duration::seconds(0), ShipmentEvent::Noted { text: "early".to_string() }),
            ],
        );

        let ordered = replay.ascending_causal().to_list().unwrap();
        assert_eq!(
            data(&ordered),
            vec![
                ShipmentEvent::Booked,
                ShipmentEvent::Packed { crates: 2 },
                ShipmentEvent::Labelled,
                ShipmentEvent::Noted { text: "early".to_string() },
                ShipmentEvent::Noted { text: "late".to_string() },
                ShipmentEvent::Closed,
            ]
        );

        let reversed = replay.descending_causal().to_list().unwrap();
        assert_eq!(reversed.first().unwrap().data, ShipmentEvent::Closed);
        assert_eq!(reversed.last().unwrap().data, ShipmentEvent::Booked);
    }

    #[test]
    fn test_causal_ties_keep_arrival_order() {
        let registry = Arc::new(Registry::<ShipmentEvent>::build().unwrap());
        let replay = replay_of(
            &registry,
            vec![
                (Duration::zero(), ShipmentEvent::Noted { text: "b".to_string() }),
                (Duration::zero(), ShipmentEvent::Noted { text: "a".to_string() }),
                (Duration::zero(), ShipmentEvent::Noted { text: "c".to_string() }),
            ],
        );

        let texts: Vec<ShipmentEvent> = replay.ascending_causal().map(|e| e.data).unwrap();
        assert_eq!(
            texts,
            vec![
                ShipmentEvent::Noted { text: "b".to_string() },
                ShipmentEvent::Noted { text: "a".to_string() },
                ShipmentEvent::Noted { text: "c".to_string() },
            ]
        );
    }

    #[test]
    fn test_storage_order_ascending_and_descending() {
        let registry = Arc::new(Registry::<LightbulbEvent>::build().unwrap());
        let replay = replay_of(&registry, lightbulb_lifecycle());

        let ascending = replay.ascending().to_list().unwrap();
        let timestamps: Vec<_> = ascending.iter().map(|e| e.timestamp).collect();
        let mut sorted = timestamps.clone();
        sorted.sort();
        assert_eq!(timestamps, sorted);
        assert_eq!(
            ascending[0].data,
            LightbulbEvent::ScrewedIn {
                location: "hallway".to_string()
            }
        );

        let descending = replay.descending().to_list().unwrap();
        assert_eq!(descending[0].timestamp, t0() + Duration::hours(3));
        assert_eq!(descending.len(), 5);
    }

    #[test]
    fn test_builder_is_immutable() {
        let registry = Arc::new(Registry::<LightbulbEvent>::build().unwrap());
        let replay = replay_of(&registry, lightbulb_lifecycle());

        let _filtered = replay.filter(|e| e.event_name.name == "switchedOn");
        let _ordered = replay.descending();

        // The source replay still yields everything in arrival order
        let all = replay.to_list().unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].data, LightbulbEvent::Created { wattage: 100 });
    }

    #[test]
    fn test_filter_and_map() {
        let registry = Arc::new(Registry::<LightbulbEvent>::build().unwrap());
        let replay = replay_of(&registry, lightbulb_lifecycle());

        let switched_on = replay
            .filter(|e| e.event_name == VersionedName::of("switchedOn", "0"))
            .ascending()
            .map(|e| e.timestamp)
            .unwrap();

        assert_eq!(
            switched_on,
            vec![t0() + Duration::milliseconds(2), t0() + Duration::hours(3)]
        );
    }

    #[test]
    fn test_first_stops_pulling_unordered_cursor() {
        let registry = Arc::new(Registry::<LightbulbEvent>::build().unwrap());
        let events: Vec<GenericEvent> = lightbulb_lifecycle()
            .into_iter()
            .map(|(offset, e)| registry.encode(&e, "a-1", t0() + offset).unwrap())
            .collect();
        let cursor = Arc::new(CountingCursor {
            events,
            pulled: AtomicUsize::new(0),
        });

        let replay = Replay::new(Arc::clone(&registry), cursor.clone());
        let first = replay.first(|e| e.data).unwrap();

        assert_eq!(first, Some(LightbulbEvent::Created { wattage: 100 }));
        assert_eq!(cursor.pulled.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn test_first_respects_order() {
        let registry = Arc::new(Registry::<LightbulbEvent>::build().unwrap());
        let replay = replay_of(&registry, lightbulb_lifecycle());

        let latest = replay.descending().first(|e| e.timestamp).unwrap();
        assert_eq!(latest, Some(t0() + Duration::hours(3)));

        let none = replay.filter(|_| false).first(|e| e.timestamp).unwrap();
        assert_eq!(none, None);
    }

    #[test]
    fn test_decode_failure_aborts_materialization() {
        let registry = Arc::new(Registry::<LightbulbEvent>::build().unwrap());
        let mut events: Vec<GenericEvent> = lightbulb_lifecycle()
            .into_iter()
            .map(|(offset, e)| registry.encode(&e, "a-1", t0() + offset).unwrap())
            .collect();
        events[2].event_name = VersionedName::of("exploded", "0");

        let replay = Replay::new(
            Arc::clone(&registry),
            Arc::new(LoadedCursor::new(Arc::new(events), TimeRange::unbounded())),
        );

        let mut handled = 0;
        let result = replay.for_each(|_| handled += 1);
        assert!(matches!(result, Err(EventSourcingError::UnknownEventVariant { .. })));
        assert_eq!(handled, 2);

        assert!(replay.to_list().is_err());
        assert!(replay.fold::<LightbulbState>(None).is_err());
    }

    #[test]
    fn test_device_lifecycle_fold() {
        let registry = Arc::new(Registry::<LightbulbEvent>::build().unwrap());
        let replay = replay_of(&registry, lightbulb_lifecycle());

        let state = replay.fold::<LightbulbState>(None).unwrap().unwrap();

        assert!(state.is_switched_on);
        assert_eq!(state.wattage, 100);
        assert_eq!(state.location.as_deref(), Some("hallway"));
        assert_eq!(
            state.millis_active,
            (Duration::hours(1) - Duration::milliseconds(2)).num_milliseconds()
        );
        assert_eq!(state.switched_on_at, Some(t0() + Duration::hours(3)));
    }

    #[test]
    fn test_fold_rejects_invalid_start() {
        let registry = Arc::new(Registry::<LightbulbEvent>::build().unwrap());
        let replay = replay_of(
            &registry,
            vec![
                (Duration::zero(), LightbulbEvent::SwitchedOn),
                (Duration::seconds(1), LightbulbEvent::SwitchedOff),
            ],
        );

        let result = replay.fold::<LightbulbState>(None);
        assert!(matches!(
            result,
            Err(EventSourcingError::InvalidInitialState { .. })
        ));
    }

    #[test]
    fn test_typed_source_and_preload() {
        let registry = Arc::new(Registry::<LightbulbEvent>::build().unwrap());
        let store = InMemoryEventStore::new();

        for (offset, event) in lightbulb_lifecycle() {
            let generic = registry.encode(&event, "bulb-1", t0() + offset).unwrap();
            store
                .append_events(&registry.aggregate_id("bulb-1"), None, vec![generic])
                .unwrap();
        }

        let fetched = registry
            .get_events(&store, "bulb-1", TimeRange::unbounded())
            .unwrap();
        assert_eq!(fetched.len(), 5);

        let cached = registry
            .preload(&store, &["bulb-1".to_string(), "bulb-2".to_string()], TimeRange::unbounded())
            .unwrap();

        // Later writes are not visible through the preloaded source
        let late = registry
            .encode(&LightbulbEvent::SwitchedOff, "bulb-1", t0() + Duration::hours(4))
            .unwrap();
        store
            .append_events(&registry.aggregate_id("bulb-1"), None, vec![late])
            .unwrap();

        assert_eq!(cached.get_events("bulb-1", TimeRange::unbounded()).unwrap().len(), 5);
        assert!(cached.get_events("bulb-2", TimeRange::unbounded()).unwrap().is_empty());

        let state = cached
            .replaying("bulb-1", TimeRange::unbounded())
            .fold::<LightbulbState>(None)
            .unwrap()
            .unwrap();
        assert!(state.is_switched_on);

        let live = registry
            .replaying(&store, "bulb-1", TimeRange::unbounded())
            .unwrap()
            .fold::<LightbulbState>(None)
            .unwrap()
            .unwrap();
        assert!(!live.is_switched_on);
    }
}
