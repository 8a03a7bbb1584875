use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use typed_event_sourcing::config::StateCacheConfig;
use typed_event_sourcing::domain::lightbulb::{LightbulbEvent, LightbulbState};
use typed_event_sourcing::domain::parcel::{describe_event, ParcelEvent, ParcelState};
use typed_event_sourcing::event_sourcing::{
    InMemoryEventStore, InMemoryStateUpdater, RegistryCache, StateManager, TimeRange,
    TimestampedEvent,
};
use typed_event_sourcing::messaging::{EventBus, LoggingSink};
use typed_event_sourcing::metrics::Metrics;

fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,typed_event_sourcing=debug")),
        )
        .init();

    tracing::info!("🚀 Starting typed event sourcing demo");

    // === 1. Metrics and registries ===
    let metrics = Arc::new(Metrics::new()?);
    let registries = RegistryCache::with_metrics(Arc::clone(&metrics));

    // === 2. Store and bus ===
    let store = Arc::new(InMemoryEventStore::new());
    let bus = Arc::new(
        EventBus::new()
            .with_sink(store.clone())
            .with_sink(Arc::new(LoggingSink))
            .with_metrics(Arc::clone(&metrics)),
    );

    // === 3. Lightbulb lifecycle: publish, replay, fold ===
    let lightbulbs = registries.resolve::<LightbulbEvent>()?;
    let bulb_id = uuid::Uuid::new_v4().to_string();
    let start = Utc::now() - Duration::hours(4);

    bus.dispatch_events(
        &lightbulbs,
        &[
            TimestampedEvent::new(start, &bulb_id, LightbulbEvent::Created { wattage: 60 }),
            TimestampedEvent::new(
                start + Duration::minutes(1),
                &bulb_id,
                LightbulbEvent::ScrewedIn {
                    location: "hallway".to_string(),
                },
            ),
            TimestampedEvent::new(start + Duration::minutes(2), &bulb_id, LightbulbEvent::SwitchedOn),
            TimestampedEvent::new(start + Duration::hours(1), &bulb_id, LightbulbEvent::SwitchedOff),
            TimestampedEvent::new(start + Duration::hours(3), &bulb_id, LightbulbEvent::SwitchedOn),
        ],
    )?;

    let replay = lightbulbs.replaying(store.as_ref(), &bulb_id, TimeRange::unbounded())?;

    replay.descending().for_each(|event| {
        tracing::info!(timestamp = %event.timestamp, event = ?event.data, "Replayed lightbulb event");
    })?;

    if let Some(state) = replay.fold::<LightbulbState>(None)? {
        let now = Utc::now();
        tracing::info!(
            state = %serde_json::to_string(&state)?,
            kwh = state.kwh_at(now),
            "Lightbulb state"
        );
    }

    // === 4. Parcel delivery through the state manager ===
    let parcels = registries.resolve::<ParcelEvent>()?;
    let updater = Arc::new(
        InMemoryStateUpdater::<ParcelState>::new(StateCacheConfig::from_env())
            .with_metrics(Arc::clone(&metrics)),
    );
    let manager = StateManager::<ParcelState>::new(updater, Arc::clone(&parcels), Arc::clone(&bus))
        .rehydrating_from(store.clone())
        .with_metrics(Arc::clone(&metrics));

    let parcel_id = uuid::Uuid::new_v4().to_string();
    let journey = [
        ParcelEvent::ReceivedAtDepot {
            depot_id: "depot1".to_string(),
        },
        ParcelEvent::LoadedOntoTruck {
            truck_id: "truck1".to_string(),
        },
        ParcelEvent::DeliveryFailed,
        ParcelEvent::Delivered {
            destination_id: "42-high-street".to_string(),
        },
    ];

    for event in journey {
        tracing::info!("{}", describe_event(&event));
        let state = manager.update(&parcel_id, &[TimestampedEvent::new(Utc::now(), &parcel_id, event)])?;
        tracing::info!(parcel_id = %parcel_id, state = ?state, "Parcel state updated");
    }

    let history = parcels.get_events(store.as_ref(), &parcel_id, TimeRange::unbounded())?;
    tracing::info!(parcel_id = %parcel_id, event_count = history.len(), "Parcel history stored");

    // === 5. Metrics snapshot ===
    println!("{}", metrics.gather_text()?);

    tracing::info!("🎉 Demo complete!");

    Ok(())
}
