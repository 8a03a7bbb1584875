use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::event_sourcing::core::{EventSourcingError, Result, Transitions};
use super::events::LightbulbEvent;

// ============================================================================
// Lightbulb State - derived from LightbulbEvent history
// ============================================================================

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LightbulbState {
    pub wattage: i64,
    pub location: Option<String>,
    pub is_switched_on: bool,
    pub switched_on_at: Option<DateTime<Utc>>,

    /// Time spent switched on, up to the last switch-off
    pub millis_active: i64,
}

impl LightbulbState {
    /// Active time including the current switched-on period, if any
    pub fn millis_active_at(&self, at: DateTime<Utc>) -> i64 {
        match self.switched_on_at {
            Some(since) if self.is_switched_on => {
                self.millis_active + (at - since).num_milliseconds().max(0)
            }
            _ => self.millis_active,
        }
    }

    /// Energy drawn so far, in kilowatt-hours
    pub fn kwh_at(&self, at: DateTime<Utc>) -> f64 {
        let hours = self.millis_active_at(at) as f64 / MILLIS_PER_HOUR;
        self.wattage as f64 * hours / 1000.0
    }

    fn switch_off(&mut self, at: DateTime<Utc>) {
        self.millis_active = self.millis_active_at(at);
        self.is_switched_on = false;
        self.switched_on_at = None;
    }
}

impl Transitions for LightbulbState {
    type State = LightbulbState;
    type Event = LightbulbEvent;

    fn initial(timestamp: DateTime<Utc>, data: &LightbulbEvent) -> Result<Option<Self>> {
        match data {
            LightbulbEvent::Created { wattage } => Ok(Some(LightbulbState {
                wattage: *wattage,
                location: None,
                is_switched_on: false,
                switched_on_at: None,
                millis_active: 0,
            })),
            other => Err(EventSourcingError::invalid_initial_state(timestamp, other)),
        }
    }

    fn next(mut state: Self, timestamp: DateTime<Utc>, data: &LightbulbEvent) -> Self {
        match data {
            // Re-creation of an existing bulb changes nothing
            LightbulbEvent::Created { .. } => {}
            LightbulbEvent::ScrewedIn { location } => {
                state.location = Some(location.clone());
            }
            // A bulb taken out of its socket goes dark
            LightbulbEvent::Unscrewed => {
                state.location = None;
                state.switch_off(timestamp);
            }
            LightbulbEvent::SwitchedOn => {
                if !state.is_switched_on {
                    state.is_switched_on = true;
                    state.switched_on_at = Some(timestamp);
                }
            }
            LightbulbEvent::SwitchedOff => state.switch_off(timestamp),
        }
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_sourcing::core::TimestampedEvent;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 18, 0, 0).unwrap()
    }

    fn at(minutes: i64, data: LightbulbEvent) -> TimestampedEvent<LightbulbEvent> {
        TimestampedEvent::new(t0() + Duration::minutes(minutes), "bulb-1", data)
    }

    #[test]
    fn test_initial_requires_created() {
        let result = LightbulbState::initial(t0(), &LightbulbEvent::SwitchedOn);
        assert!(matches!(
            result,
            Err(EventSourcingError::InvalidInitialState { .. })
        ));
    }

    #[test]
    fn test_location_follows_screwing() {
        let state = LightbulbState::run_all(
            &[
                at(0, LightbulbEvent::Created { wattage: 40 }),
                at(1, LightbulbEvent::ScrewedIn { location: "porch".to_string() }),
                at(2, LightbulbEvent::Unscrewed),
            ],
            None,
        )
        .unwrap()
        .unwrap();

        assert_eq!(state.location, None);
        assert_eq!(state.wattage, 40);
    }

    #[test]
    fn test_active_time_and_energy() {
        let state = LightbulbState::run_all(
            &[
                at(0, LightbulbEvent::Created { wattage: 100 }),
                at(0, LightbulbEvent::SwitchedOn),
                at(30, LightbulbEvent::SwitchedOff),
                at(60, LightbulbEvent::SwitchedOn),
                // A second switch-on keeps the original start time
                at(75, LightbulbEvent::SwitchedOn),
            ],
            None,
        )
        .unwrap()
        .unwrap();

        assert_eq!(state.millis_active, Duration::minutes(30).num_milliseconds());
        assert_eq!(state.switched_on_at, Some(t0() + Duration::minutes(60)));

        let later = t0() + Duration::minutes(90);
        assert_eq!(state.millis_active_at(later), Duration::hours(1).num_milliseconds());
        assert!((state.kwh_at(later) - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_unscrewing_switches_off() {
        let state = LightbulbState::run_all(
            &[
                at(0, LightbulbEvent::Created { wattage: 100 }),
                at(1, LightbulbEvent::ScrewedIn { location: "lamp".to_string() }),
                at(10, LightbulbEvent::SwitchedOn),
                at(40, LightbulbEvent::Unscrewed),
            ],
            None,
        )
        .unwrap()
        .unwrap();

        assert!(!state.is_switched_on);
        assert_eq!(state.switched_on_at, None);
        assert_eq!(state.location, None);

        let later = t0() + Duration::hours(5);
        assert_eq!(state.millis_active_at(later), Duration::minutes(30).num_milliseconds());
        assert!((state.kwh_at(later) - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_switched_off_bulb_stops_accumulating() {
        let state = LightbulbState::run_all(
            &[
                at(0, LightbulbEvent::Created { wattage: 60 }),
                at(10, LightbulbEvent::SwitchedOn),
                at(20, LightbulbEvent::SwitchedOff),
            ],
            None,
        )
        .unwrap()
        .unwrap();

        let much_later = t0() + Duration::days(3);
        assert_eq!(state.millis_active_at(much_later), Duration::minutes(10).num_milliseconds());
    }
}
