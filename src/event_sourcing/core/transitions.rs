use chrono::{DateTime, Utc};

use super::error::Result;
use super::event::TimestampedEvent;

// ============================================================================
// Transitions - State Machine Reducer
// ============================================================================
//
// State is derived from events, never mutated in place:
// - `initial` starts state from the first event (or discards it with None)
// - `next` folds every later event into a new state
// - `run_all` is a strict left fold with no hidden state
//
// Implement `next` with an exhaustive `match` over the event enum so the
// compiler checks every variant is handled.
//
// ============================================================================

pub trait Transitions {
    type State;
    type Event;

    /// Start state from the first event. Return `Ok(None)` to discard it, or
    /// `EventSourcingError::InvalidInitialState` if the stream cannot start here.
    fn initial(timestamp: DateTime<Utc>, data: &Self::Event) -> Result<Option<Self::State>>;

    /// Apply a subsequent event
    fn next(state: Self::State, timestamp: DateTime<Utc>, data: &Self::Event) -> Self::State;

    fn update(
        previous: Option<Self::State>,
        event: &TimestampedEvent<Self::Event>,
    ) -> Result<Option<Self::State>> {
        match previous {
            None => Self::initial(event.timestamp, &event.data),
            Some(state) => Ok(Some(Self::next(state, event.timestamp, &event.data))),
        }
    }

    /// Fold `events`, in the order given, onto `seed`
    fn run_all(
        events: &[TimestampedEvent<Self::Event>],
        seed: Option<Self::State>,
    ) -> Result<Option<Self::State>> {
        events
            .iter()
            .try_fold(seed, |state, event| Self::update(state, event))
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_sourcing::core::error::EventSourcingError;
    use chrono::{Duration, TimeZone};

    #[derive(Debug, Clone, PartialEq)]
    enum CounterEvent {
        Started(i64),
        Added(i64),
        Ignored,
    }

    struct Counter;

    impl Transitions for Counter {
        type State = i64;
        type Event = CounterEvent;

        fn initial(timestamp: DateTime<Utc>, data: &CounterEvent) -> Result<Option<i64>> {
            match data {
                CounterEvent::Started(n) => Ok(Some(*n)),
                CounterEvent::Ignored => Ok(None),
                CounterEvent::Added(_) => Err(EventSourcingError::invalid_initial_state(timestamp, data)),
            }
        }

        fn next(state: i64, _timestamp: DateTime<Utc>, data: &CounterEvent) -> i64 {
            match data {
                CounterEvent::Started(_) | CounterEvent::Ignored => state,
                CounterEvent::Added(n) => state + n,
            }
        }
    }

    fn events(data: Vec<CounterEvent>) -> Vec<TimestampedEvent<CounterEvent>> {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        data.into_iter()
            .enumerate()
            .map(|(i, d)| TimestampedEvent::new(t0 + Duration::seconds(i as i64), "c-1", d))
            .collect()
    }

    #[test]
    fn test_run_all_folds_in_order() {
        let stream = events(vec![
            CounterEvent::Started(10),
            CounterEvent::Added(5),
            CounterEvent::Added(-3),
        ]);

        assert_eq!(Counter::run_all(&stream, None).unwrap(), Some(12));
    }

    #[test]
    fn test_run_all_is_pure() {
        let stream = events(vec![CounterEvent::Started(1), CounterEvent::Added(2)]);

        let first = Counter::run_all(&stream, Some(100)).unwrap();
        let second = Counter::run_all(&stream, Some(100)).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, Some(103));
    }

    #[test]
    fn test_empty_stream_returns_seed() {
        assert_eq!(Counter::run_all(&[], None).unwrap(), None);
        assert_eq!(Counter::run_all(&[], Some(7)).unwrap(), Some(7));
    }

    #[test]
    fn test_initial_may_discard() {
        let stream = events(vec![CounterEvent::Ignored, CounterEvent::Started(4)]);
        assert_eq!(Counter::run_all(&stream, None).unwrap(), Some(4));
    }

    #[test]
    fn test_invalid_initial_state_aborts_fold() {
        let stream = events(vec![CounterEvent::Added(1), CounterEvent::Started(4)]);
        let result = Counter::run_all(&stream, None);
        assert!(matches!(
            result,
            Err(EventSourcingError::InvalidInitialState { .. })
        ));
    }
}
