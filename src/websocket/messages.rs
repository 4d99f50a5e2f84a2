//! WebSocket message protocol
//!
//! Messages are JSON-encoded. Clients subscribe with filters and receive
//! search lifecycle events as they are published.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{EnumIter, IntoStaticStr};
use uuid::Uuid;

use crate::models::Search;

/// Message sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Subscribe to specific event types
    Subscribe {
        subscription_id: String,
        #[serde(default)]
        filters: SubscriptionFilters,
    },
    /// Unsubscribe from events
    Unsubscribe { subscription_id: String },
    /// Ping to keep connection alive
    Ping { timestamp: DateTime<Utc> },
    /// Acknowledge receipt of server message
    Ack { message_id: String },
}

/// Message sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Welcome message on connection
    Welcome {
        session_id: String,
        server_time: DateTime<Utc>,
    },
    /// Subscription confirmed
    Subscribed {
        subscription_id: String,
        filters: SubscriptionFilters,
    },
    /// Unsubscription confirmed
    Unsubscribed { subscription_id: String },
    /// Pong response to ping
    Pong { timestamp: DateTime<Utc> },
    /// Event notification
    Event {
        message_id: String,
        event: Event,
        timestamp: DateTime<Utc>,
    },
    /// Error message
    Error { code: String, message: String },
    /// Connection is being closed
    Closing { reason: String },
}

/// Subscription filters to control which events are delivered
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SubscriptionFilters {
    /// Filter by event types (empty = all events)
    #[serde(default)]
    pub event_types: Vec<EventType>,
    /// Filter by search ids (empty = all searches)
    #[serde(default)]
    pub search_ids: Vec<Uuid>,
}

impl SubscriptionFilters {
    /// Check if an event type matches these filters
    pub fn matches_event_type(&self, event_type: &EventType) -> bool {
        self.event_types.is_empty() || self.event_types.contains(event_type)
    }

    /// Check if a search id matches these filters
    pub fn matches_search(&self, search_id: &Uuid) -> bool {
        self.search_ids.is_empty() || self.search_ids.contains(search_id)
    }

    pub fn matches(&self, event: &Event) -> bool {
        self.matches_event_type(&event.event_type()) && self.matches_search(&event.search_id())
    }
}

/// Type of event
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, EnumIter, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventType {
    /// A search was accepted and persisted
    SearchCreated,
    /// Live progress, a state change, or the final record
    SearchUpdated,
    /// A search was removed
    SearchDeleted,
}

/// Event payload. Searches are always sent without their responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum Event {
    SearchCreated { search: Search },
    SearchUpdated { search: Search },
    SearchDeleted { search: Search },
}

impl Event {
    /// Get the event type
    pub fn event_type(&self) -> EventType {
        match self {
            Event::SearchCreated { .. } => EventType::SearchCreated,
            Event::SearchUpdated { .. } => EventType::SearchUpdated,
            Event::SearchDeleted { .. } => EventType::SearchDeleted,
        }
    }

    pub fn search(&self) -> &Search {
        match self {
            Event::SearchCreated { search }
            | Event::SearchUpdated { search }
            | Event::SearchDeleted { search } => search,
        }
    }

    pub fn search_id(&self) -> Uuid {
        self.search().id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn search() -> Search {
        Search::new(Uuid::new_v4(), "artist .mp3".to_string(), 1, BTreeSet::new())
    }

    #[test]
    fn test_subscription_filters_event_type() {
        let event = Event::SearchUpdated { search: search() };

        let mut filters = SubscriptionFilters::default();
        assert!(filters.matches(&event)); // Empty filters match all

        filters.event_types = vec![EventType::SearchCreated];
        assert!(!filters.matches(&event));

        filters.event_types.push(EventType::SearchUpdated);
        assert!(filters.matches(&event));
    }

    #[test]
    fn test_subscription_filters_search_ids() {
        let search = search();
        let event = Event::SearchCreated {
            search: search.clone(),
        };

        let filters = SubscriptionFilters {
            search_ids: vec![Uuid::new_v4()],
            ..Default::default()
        };
        assert!(!filters.matches(&event));

        let filters = SubscriptionFilters {
            search_ids: vec![search.id],
            ..Default::default()
        };
        assert!(filters.matches(&event));
    }

    #[test]
    fn test_event_serialization() {
        let event = Event::SearchDeleted { search: search() };
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["event_type"], "search_deleted");
        assert_eq!(json["search"]["search_text"], "artist .mp3");
    }

    #[test]
    fn test_message_serialization() {
        let msg = ServerMessage::Welcome {
            session_id: "test-session".to_string(),
            server_time: Utc::now(),
        };

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("welcome"));
        assert!(json.contains("session_id"));
    }

    #[test]
    fn test_subscribe_without_filters() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"subscribe","subscription_id":"all"}"#).unwrap();
        match msg {
            ClientMessage::Subscribe { filters, .. } => assert_eq!(filters, SubscriptionFilters::default()),
            _ => panic!("Wrong message type"),
        }
    }
}
