//! Bounded transition history.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Event, LifecycleError, State};

/// Default number of retained transitions.
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// One successful transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: State,
    pub to: State,
    pub event: Event,
    pub timestamp: DateTime<Utc>,
    /// Content of the error slot when the transition fired.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<LifecycleError>,
}

/// Ring buffer of transition records; the oldest entry is evicted first.
#[derive(Debug, Clone)]
pub struct TransitionHistory {
    records: VecDeque<TransitionRecord>,
    capacity: usize,
}

impl Default for TransitionHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl TransitionHistory {
    /// Create a history retaining at most `capacity` records.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity.min(64)),
            capacity,
        }
    }

    pub fn push(&mut self, record: TransitionRecord) {
        if self.capacity == 0 {
            return;
        }
        while self.records.len() >= self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Records oldest-first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<TransitionRecord> {
        self.records.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TransitionRecord> {
        self.records.iter()
    }

    #[must_use]
    pub fn last(&self) -> Option<&TransitionRecord> {
        self.records.back()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(from: State, to: State, event: Event) -> TransitionRecord {
        TransitionRecord {
            from,
            to,
            event,
            timestamp: Utc::now(),
            error: None,
        }
    }

    #[test]
    fn test_evicts_oldest_first() {
        let mut history = TransitionHistory::new(2);
        history.push(record(State::Uninitialized, State::Registering, Event::Start));
        history.push(record(State::Registering, State::Connecting, Event::Registered));
        history.push(record(State::Connecting, State::Ready, Event::Connected));

        let events: Vec<Event> = history.iter().map(|r| r.event).collect();
        assert_eq!(events, vec![Event::Registered, Event::Connected]);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let mut history = TransitionHistory::new(0);
        history.push(record(State::Uninitialized, State::Registering, Event::Start));
        assert!(history.is_empty());
        assert!(history.last().is_none());
    }

    #[test]
    fn test_record_serialization_omits_empty_error() {
        let json = serde_json::to_string(&record(
            State::Ready,
            State::Stopping,
            Event::Stop,
        ))
        .unwrap();
        assert!(json.contains("\"from\":\"ready\""));
        assert!(!json.contains("error"));
    }
}
