//! Event envelopes and delivery statistics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub use super::messages::{Event, EventType};

/// Internal event envelope for broadcasting
#[derive(Debug, Clone)]
pub struct EventEnvelope {
    /// Unique event ID
    pub id: String,
    /// Event timestamp
    pub timestamp: DateTime<Utc>,
    /// Event payload
    pub event: Event,
}

impl EventEnvelope {
    pub fn new(event: Event) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event,
        }
    }
}

/// Event statistics
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EventStats {
    pub total_events: u64,
    pub events_by_type: HashMap<String, u64>,
    pub last_event_time: Option<DateTime<Utc>>,
}

impl EventStats {
    /// Record a new event
    pub fn record_event(&mut self, event_type: EventType) {
        let name: &'static str = event_type.into();

        self.total_events += 1;
        *self.events_by_type.entry(name.to_string()).or_insert(0) += 1;
        self.last_event_time = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_stats() {
        let mut stats = EventStats::default();
        assert_eq!(stats.total_events, 0);

        stats.record_event(EventType::SearchUpdated);
        stats.record_event(EventType::SearchUpdated);
        stats.record_event(EventType::SearchCreated);

        assert_eq!(stats.total_events, 3);
        assert_eq!(stats.events_by_type["search_updated"], 2);
        assert!(stats.last_event_time.is_some());
    }
}
