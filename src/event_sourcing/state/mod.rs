use parking_lot::Mutex;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::config::StateCacheConfig;
use crate::event_sourcing::core::{
    EventHierarchy, EventSourcingError, Registry, Result, TimestampedEvent, Transitions,
};
use crate::event_sourcing::store::{EventSource, TimeRange};
use crate::messaging::EventBus;
use crate::metrics::Metrics;

// ============================================================================
// State Manager - per-aggregate cached projections
// ============================================================================
//
// Each update runs inside a critical section scoped to one aggregate id:
// 1. Fold the new events onto the cached state
// 2. Publish the events through the event bus
// 3. Store and return the new state
//
// If either the fold or the publish fails, the cached state is left as it
// was. Updates for different aggregate ids never wait on each other.
//
// The cache is not the source of truth. A manager built with
// `rehydrating_from` replays the event source on a cache miss, so states
// evicted from a bounded cache are rebuilt before new events are folded in.
// Without a source, a bounded cache forgets evicted aggregates.
//
// ============================================================================

/// Atomic read-modify-write of one aggregate's cached state
pub trait StateUpdater<S>: Send + Sync {
    /// Replace the state for `aggregate_id` with the result of `update`.
    /// Calls for the same id are serialized; calls for different ids are not.
    fn update(
        &self,
        aggregate_id: &str,
        update: &mut dyn FnMut(Option<S>) -> Result<Option<S>>,
    ) -> Result<Option<S>>;

    /// Last stored state, if cached
    fn get(&self, aggregate_id: &str) -> Option<S>;
}

type Slot<S> = Arc<Mutex<Option<S>>>;

struct CacheEntry<S> {
    slot: Slot<S>,
    last_used: u64,
}

struct Cache<S> {
    entries: HashMap<String, CacheEntry<S>>,
    tick: u64,
}

/// In-memory `StateUpdater` with least-recently-used eviction
pub struct InMemoryStateUpdater<S> {
    cache: Mutex<Cache<S>>,
    config: StateCacheConfig,
    metrics: Option<Arc<Metrics>>,
}

impl<S> Default for InMemoryStateUpdater<S> {
    fn default() -> Self {
        Self::new(StateCacheConfig::default())
    }
}

impl<S> InMemoryStateUpdater<S> {
    pub fn new(config: StateCacheConfig) -> Self {
        Self {
            cache: Mutex::new(Cache {
                entries: HashMap::new(),
                tick: 0,
            }),
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Number of cached aggregate states
    pub fn len(&self) -> usize {
        self.cache.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Per-key slot, created on first use. The map lock is held only here.
    fn checkout(&self, aggregate_id: &str) -> Slot<S> {
        let mut cache = self.cache.lock();
        cache.tick += 1;
        let tick = cache.tick;

        let entry = cache
            .entries
            .entry(aggregate_id.to_string())
            .or_insert_with(|| CacheEntry {
                slot: Arc::new(Mutex::new(None)),
                last_used: tick,
            });
        entry.last_used = tick;
        Arc::clone(&entry.slot)
    }

    /// Drop the slot if it is idle and empty, then evict past capacity. Slots
    /// checked out by another caller are never removed, so per-key
    /// serialization holds.
    fn release(&self, aggregate_id: &str) {
        let mut cache = self.cache.lock();

        // Emptiness is read under the map lock: a later update may have
        // refilled the slot since this caller dropped it. An idle slot cannot
        // be locked by anyone else while the map lock is held.
        let idle_and_empty = cache
            .entries
            .get(aggregate_id)
            .is_some_and(|e| Arc::strong_count(&e.slot) == 1 && e.slot.lock().is_none());
        if idle_and_empty {
            cache.entries.remove(aggregate_id);
        }

        if let Some(capacity) = self.config.capacity {
            while cache.entries.len() > capacity {
                let victim = cache
                    .entries
                    .iter()
                    .filter(|(_, e)| Arc::strong_count(&e.slot) == 1)
                    .min_by_key(|(_, e)| e.last_used)
                    .map(|(id, _)| id.clone());

                let Some(victim) = victim else { break };
                cache.entries.remove(&victim);

                tracing::debug!(aggregate_id = %victim, "Evicted cached state");
                if let Some(metrics) = &self.metrics {
                    metrics.state_cache_evictions.inc();
                }
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.state_cache_entries.set(cache.entries.len() as i64);
        }
    }
}

impl<S: Clone + Send + 'static> StateUpdater<S> for InMemoryStateUpdater<S> {
    fn update(
        &self,
        aggregate_id: &str,
        update: &mut dyn FnMut(Option<S>) -> Result<Option<S>>,
    ) -> Result<Option<S>> {
        let slot = self.checkout(aggregate_id);

        let outcome = {
            let mut state = slot.lock();
            match update(state.clone()) {
                Ok(next) => {
                    *state = next.clone();
                    Ok(next)
                }
                Err(e) => Err(e),
            }
        };

        drop(slot);
        self.release(aggregate_id);

        outcome
    }

    fn get(&self, aggregate_id: &str) -> Option<S> {
        let slot = {
            let mut cache = self.cache.lock();
            cache.tick += 1;
            let tick = cache.tick;
            let entry = cache.entries.get_mut(aggregate_id)?;
            entry.last_used = tick;
            Arc::clone(&entry.slot)
        };
        let state = slot.lock().clone();
        state
    }
}

/// Folds, publishes and caches events for aggregates of one hierarchy
pub struct StateManager<T>
where
    T: Transitions,
    T::Event: EventHierarchy,
{
    updater: Arc<dyn StateUpdater<T::State>>,
    registry: Arc<Registry<T::Event>>,
    bus: Arc<EventBus>,
    source: Option<Arc<dyn EventSource>>,
    metrics: Option<Arc<Metrics>>,
    _transitions: PhantomData<fn() -> T>,
}

impl<T> StateManager<T>
where
    T: Transitions,
    T::State: Clone,
    T::Event: EventHierarchy,
{
    pub fn new(
        updater: Arc<dyn StateUpdater<T::State>>,
        registry: Arc<Registry<T::Event>>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            updater,
            registry,
            bus,
            source: None,
            metrics: None,
            _transitions: PhantomData,
        }
    }

    /// Rebuild uncached states by replaying `source`. Use the store the bus
    /// publishes to.
    pub fn rehydrating_from(mut self, source: Arc<dyn EventSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Fold `events` onto the cached state for `aggregate_id`, publish them,
    /// and store the result. Every event must belong to `aggregate_id`.
    pub fn update(
        &self,
        aggregate_id: &str,
        events: &[TimestampedEvent<T::Event>],
    ) -> Result<Option<T::State>> {
        if let Some(foreign) = events.iter().find(|e| e.aggregate_id != aggregate_id) {
            return Err(EventSourcingError::AggregateMismatch {
                expected: self.registry.aggregate_id(aggregate_id),
                actual: self.registry.aggregate_id(&foreign.aggregate_id),
            });
        }

        let result = self.updater.update(aggregate_id, &mut |cached| {
            let previous = match cached {
                Some(state) => Some(state),
                None => self.rehydrate(aggregate_id)?,
            };
            let next = T::run_all(events, previous)?;
            self.bus.dispatch_events(&self.registry, events)?;
            Ok(next)
        });

        if let Some(metrics) = &self.metrics {
            metrics.record_state_update(result.is_ok());
        }

        match &result {
            Ok(_) => tracing::debug!(
                aggregate_id = %aggregate_id,
                aggregate_type = %self.registry.aggregate_type(),
                event_count = events.len(),
                "Updated aggregate state"
            ),
            Err(e) => tracing::warn!(
                aggregate_id = %aggregate_id,
                aggregate_type = %self.registry.aggregate_type(),
                error = %e,
                "State update failed; cached state unchanged"
            ),
        }

        result
    }

    /// Last cached state for `aggregate_id`
    pub fn state(&self, aggregate_id: &str) -> Option<T::State> {
        self.updater.get(aggregate_id)
    }

    /// Replay the stored history of an aggregate that is not cached
    fn rehydrate(&self, aggregate_id: &str) -> Result<Option<T::State>> {
        let Some(source) = &self.source else {
            return Ok(None);
        };

        let state = self
            .registry
            .replaying(source.as_ref(), aggregate_id, TimeRange::unbounded())?
            .fold::<T>(None)?;

        if state.is_some() {
            tracing::debug!(
                aggregate_id = %aggregate_id,
                aggregate_type = %self.registry.aggregate_type(),
                "Rehydrated state from event source"
            );
        }
        Ok(state)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
