//! Event broadcasting
//!
//! Pub-sub distribution of search events to WebSocket connections and to
//! in-process subscribers.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use super::{
    connection::ConnectionManager,
    events::{EventEnvelope, EventStats},
    messages::Event,
};
use crate::metrics::WS_EVENTS_BROADCAST;
use crate::models::Search;
use crate::search::{BroadcastError, SearchBroadcaster};

/// Event broadcaster
pub struct EventBroadcaster {
    /// Broadcast channel for in-process consumers
    tx: broadcast::Sender<EventEnvelope>,
    connections: Arc<ConnectionManager>,
    stats: RwLock<EventStats>,
    capacity: usize,
    closed: AtomicBool,
}

impl EventBroadcaster {
    pub fn new(connections: Arc<ConnectionManager>, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            connections,
            stats: RwLock::new(EventStats::default()),
            capacity,
            closed: AtomicBool::new(false),
        }
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: Event) -> Result<u64, BroadcastError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BroadcastError::Closed);
        }

        let event_type = event.event_type();
        let envelope = EventEnvelope::new(event);

        debug!(
            event_type = ?event_type,
            search_id = %envelope.event.search_id(),
            "Publishing event"
        );

        self.stats.write().record_event(event_type);
        WS_EVENTS_BROADCAST.inc();

        // No in-process receivers is the normal case
        if self.tx.send(envelope.clone()).is_err() {
            debug!(event_type = ?event_type, "No in-process event subscribers");
        }

        Ok(self.connections.broadcast_event(&envelope))
    }

    /// Stop publishing and tell connected clients the server is going away
    pub fn close(&self, reason: &str) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.connections.close_all(reason);
        }
    }

    /// Subscribe to events (for internal consumers)
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }

    /// Get event statistics
    pub fn stats(&self) -> EventStats {
        self.stats.read().clone()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get number of in-process subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[async_trait]
impl SearchBroadcaster for EventBroadcaster {
    async fn on_create(&self, search: &Search) -> Result<(), BroadcastError> {
        self.publish(Event::SearchCreated {
            search: search.without_responses(),
        })
        .map(|_| ())
    }

    async fn on_update(&self, search: &Search) -> Result<(), BroadcastError> {
        self.publish(Event::SearchUpdated {
            search: search.without_responses(),
        })
        .map(|_| ())
    }

    async fn on_delete(&self, search: &Search) -> Result<(), BroadcastError> {
        self.publish(Event::SearchDeleted {
            search: search.without_responses(),
        })
        .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Response;
    use std::collections::BTreeSet;
    use uuid::Uuid;

    fn broadcaster() -> EventBroadcaster {
        EventBroadcaster::new(Arc::new(ConnectionManager::new()), 100)
    }

    fn search() -> Search {
        Search::new(Uuid::new_v4(), "x".to_string(), 1, BTreeSet::new())
    }

    #[tokio::test]
    async fn test_broadcaster_creation() {
        let broadcaster = broadcaster();
        assert_eq!(broadcaster.capacity(), 100);
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_update_strips_responses() {
        let broadcaster = broadcaster();
        let mut rx = broadcaster.subscribe();

        let mut search = search();
        search.responses.push(Response::default());
        broadcaster.on_update(&search).await.unwrap();

        let envelope = rx.recv().await.unwrap();
        match envelope.event {
            Event::SearchUpdated { search: sent } => {
                assert!(sent.responses.is_empty());
                assert_eq!(sent.id, search.id);
            }
            other => panic!("Wrong event type: {:?}", other),
        }
        assert_eq!(broadcaster.stats().total_events, 1);
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let broadcaster = broadcaster();
        let mut rx1 = broadcaster.subscribe();
        let mut rx2 = broadcaster.subscribe();

        broadcaster.on_create(&search()).await.unwrap();

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();
        assert_eq!(e1.id, e2.id);
    }

    #[tokio::test]
    async fn test_closed_broadcaster_fails() {
        let broadcaster = broadcaster();
        broadcaster.close("shutdown");

        let result = broadcaster.on_delete(&search()).await;
        assert!(matches!(result, Err(BroadcastError::Closed)));
    }
}
