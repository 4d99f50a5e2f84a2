//! WebSocket session management
//!
//! Session lifecycle and subscription tracking.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use strum::IntoEnumIterator;
use uuid::Uuid;

use super::messages::{Event, EventType, SubscriptionFilters};

/// WebSocket session
#[derive(Debug, Clone)]
pub struct Session {
    /// Unique session identifier
    pub id: String,
    /// Session creation time
    pub created_at: DateTime<Utc>,
    /// Last activity timestamp
    pub last_active: DateTime<Utc>,
    /// Active subscriptions
    pub subscriptions: HashMap<String, Subscription>,
    /// Message counter for tracking
    pub message_count: u64,
}

impl Session {
    /// Create a new session
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            last_active: now,
            subscriptions: HashMap::new(),
            message_count: 0,
        }
    }

    /// Update last activity timestamp
    pub fn touch(&mut self) {
        self.last_active = Utc::now();
        self.message_count += 1;
    }

    /// Check if session is expired
    pub fn is_expired(&self, timeout_secs: i64) -> bool {
        (Utc::now() - self.last_active).num_seconds() > timeout_secs
    }

    /// Add a subscription
    pub fn subscribe(&mut self, subscription_id: String, filters: SubscriptionFilters) {
        self.subscriptions.insert(
            subscription_id.clone(),
            Subscription {
                id: subscription_id,
                filters,
                created_at: Utc::now(),
                event_count: 0,
            },
        );
        self.touch();
    }

    /// Remove a subscription
    pub fn unsubscribe(&mut self, subscription_id: &str) -> bool {
        self.touch();
        self.subscriptions.remove(subscription_id).is_some()
    }

    /// Get all event types this session is interested in
    pub fn interested_event_types(&self) -> HashSet<EventType> {
        let mut types = HashSet::new();
        for sub in self.subscriptions.values() {
            if sub.filters.event_types.is_empty() {
                types.extend(EventType::iter());
            } else {
                types.extend(sub.filters.event_types.iter());
            }
        }
        types
    }

    /// Match `event` against every subscription, counting deliveries.
    ///
    /// Returns true if at least one subscription wants the event.
    pub fn accept(&mut self, event: &Event) -> bool {
        let mut accepted = false;
        for subscription in self.subscriptions.values_mut() {
            if subscription.filters.matches(event) {
                subscription.record_event();
                accepted = true;
            }
        }
        accepted
    }

    /// Check if session has any active subscriptions
    pub fn has_subscriptions(&self) -> bool {
        !self.subscriptions.is_empty()
    }

    /// Get idle time in seconds
    pub fn idle_seconds(&self) -> i64 {
        (Utc::now() - self.last_active).num_seconds()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Subscription to specific events
#[derive(Debug, Clone)]
pub struct Subscription {
    /// Subscription identifier
    pub id: String,
    /// Event filters
    pub filters: SubscriptionFilters,
    /// When subscription was created
    pub created_at: DateTime<Utc>,
    /// Number of events delivered via this subscription
    pub event_count: u64,
}

impl Subscription {
    /// Record that an event was delivered
    pub fn record_event(&mut self) {
        self.event_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Search;
    use std::collections::BTreeSet;

    #[test]
    fn test_session_creation() {
        let session = Session::new();
        assert!(!session.id.is_empty());
        assert!(session.subscriptions.is_empty());
        assert_eq!(session.message_count, 0);
    }

    #[test]
    fn test_session_expiration() {
        let mut session = Session::new();
        assert!(!session.is_expired(3600));

        session.last_active = Utc::now() - chrono::Duration::seconds(7200);
        assert!(session.is_expired(3600));
    }

    #[test]
    fn test_subscription_management() {
        let mut session = Session::new();
        assert!(!session.has_subscriptions());

        let filters = SubscriptionFilters {
            event_types: vec![EventType::SearchCreated],
            ..Default::default()
        };

        session.subscribe("sub1".to_string(), filters);
        assert!(session.has_subscriptions());

        assert!(session.unsubscribe("sub1"));
        assert!(!session.has_subscriptions());
        assert!(!session.unsubscribe("nonexistent"));
    }

    #[test]
    fn test_interested_event_types() {
        let mut session = Session::new();
        assert!(session.interested_event_types().is_empty());

        session.subscribe(
            "sub1".to_string(),
            SubscriptionFilters {
                event_types: vec![EventType::SearchCreated],
                ..Default::default()
            },
        );
        let types = session.interested_event_types();
        assert!(types.contains(&EventType::SearchCreated));
        assert!(!types.contains(&EventType::SearchDeleted));

        session.subscribe("all".to_string(), SubscriptionFilters::default());
        assert_eq!(session.interested_event_types().len(), 3);
    }

    #[test]
    fn test_accept_counts_matching_subscriptions() {
        let search = Search::new(Uuid::new_v4(), "x".to_string(), 1, BTreeSet::new());
        let mut session = Session::new();
        session.subscribe("all".to_string(), SubscriptionFilters::default());
        session.subscribe(
            "other".to_string(),
            SubscriptionFilters {
                search_ids: vec![Uuid::new_v4()],
                ..Default::default()
            },
        );

        assert!(session.accept(&Event::SearchUpdated { search }));
        assert_eq!(session.subscriptions["all"].event_count, 1);
        assert_eq!(session.subscriptions["other"].event_count, 0);
    }
}
