use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::event_sourcing::core::{EventSourcingError, Result, Transitions};
use super::events::ParcelEvent;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParcelState {
    pub delivery_attempts: u32,
    pub is_delivered: bool,
    /// `depot:<id>`, `truck:<id>` or `destination:<id>`
    pub current_location: String,
}

impl Transitions for ParcelState {
    type State = ParcelState;
    type Event = ParcelEvent;

    fn initial(timestamp: DateTime<Utc>, data: &ParcelEvent) -> Result<Option<Self>> {
        match data {
            ParcelEvent::ReceivedAtDepot { depot_id } => Ok(Some(ParcelState {
                delivery_attempts: 0,
                is_delivered: false,
                current_location: format!("depot:{}", depot_id),
            })),
            other => Err(EventSourcingError::invalid_initial_state(timestamp, other)),
        }
    }

    fn next(state: Self, _timestamp: DateTime<Utc>, data: &ParcelEvent) -> Self {
        match data {
            ParcelEvent::ReceivedAtDepot { depot_id } => ParcelState {
                current_location: format!("depot:{}", depot_id),
                ..state
            },
            ParcelEvent::LoadedOntoTruck { truck_id } => ParcelState {
                current_location: format!("truck:{}", truck_id),
                ..state
            },
            ParcelEvent::Delivered { destination_id } => ParcelState {
                is_delivered: true,
                current_location: format!("destination:{}", destination_id),
                ..state
            },
            ParcelEvent::DeliveryFailed => ParcelState {
                delivery_attempts: state.delivery_attempts + 1,
                ..state
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_sourcing::core::TimestampedEvent;
    use chrono::Duration;

    #[test]
    fn test_failed_then_delivered() {
        let now = Utc::now();
        let events = vec![
            TimestampedEvent::new(now, "p-1", ParcelEvent::ReceivedAtDepot { depot_id: "d1".to_string() }),
            TimestampedEvent::new(now + Duration::hours(1), "p-1", ParcelEvent::LoadedOntoTruck { truck_id: "t9".to_string() }),
            TimestampedEvent::new(now + Duration::hours(2), "p-1", ParcelEvent::DeliveryFailed),
            TimestampedEvent::new(now + Duration::hours(3), "p-1", ParcelEvent::ReceivedAtDepot { depot_id: "d1".to_string() }),
            TimestampedEvent::new(now + Duration::days(1), "p-1", ParcelEvent::Delivered { destination_id: "42-high-st".to_string() }),
        ];

        let state = ParcelState::run_all(&events, None).unwrap().unwrap();
        assert_eq!(
            state,
            ParcelState {
                delivery_attempts: 1,
                is_delivered: true,
                current_location: "destination:42-high-st".to_string(),
            }
        );
    }

    #[test]
    fn test_cannot_start_on_truck() {
        let result = ParcelState::initial(
            Utc::now(),
            &ParcelEvent::LoadedOntoTruck { truck_id: "t1".to_string() },
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_continues_from_seed() {
        let seed = ParcelState {
            delivery_attempts: 2,
            is_delivered: false,
            current_location: "truck:t1".to_string(),
        };
        let events = vec![TimestampedEvent::new(Utc::now(), "p-1", ParcelEvent::DeliveryFailed)];

        let state = ParcelState::run_all(&events, Some(seed)).unwrap().unwrap();
        assert_eq!(state.delivery_attempts, 3);
        assert_eq!(state.current_location, "truck:t1");
    }
}
