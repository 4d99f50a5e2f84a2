//! WebSocket streaming module
//!
//! Real-time delivery of search lifecycle events:
//! - `search_created` when a search is accepted
//! - `search_updated` on state changes, throttled progress, and finalization
//! - `search_deleted` when a search is removed or pruned
//!
//! Payloads never carry response collections; clients page through
//! responses over HTTP.
//!
//! # Components
//!
//! - **Messages**: client/server protocol
//! - **Events**: envelopes and statistics
//! - **Session**: subscription tracking and expiry
//! - **Connection**: connection registry and delivery
//! - **Broadcaster**: publishing, implements the search broadcaster contract
//! - **Server**: the `/ws` endpoint

pub mod broadcaster;
pub mod connection;
pub mod events;
pub mod messages;
pub mod server;
pub mod session;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use broadcaster::EventBroadcaster;
pub use connection::ConnectionManager;
pub use messages::{ClientMessage, Event, EventType, ServerMessage, SubscriptionFilters};
pub use server::{cleanup_task, websocket_handler};
pub use session::Session;

/// WebSocket configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSocketConfig {
    /// Heartbeat interval in seconds
    pub heartbeat_interval_secs: u64,
    /// Session timeout in seconds
    pub session_timeout_secs: u64,
    /// Cleanup interval in seconds
    pub cleanup_interval_secs: u64,
    /// Broadcast channel capacity
    pub broadcast_capacity: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 30,
            session_timeout_secs: 300, // 5 minutes
            cleanup_interval_secs: 60,
            broadcast_capacity: 10000,
        }
    }
}

/// WebSocket state shared across connections
pub struct WebSocketState {
    pub config: WebSocketConfig,
    pub connections: Arc<ConnectionManager>,
    pub broadcaster: Arc<EventBroadcaster>,
}

impl WebSocketState {
    pub fn new(config: WebSocketConfig) -> Self {
        let connections = Arc::new(ConnectionManager::new());
        let broadcaster = Arc::new(EventBroadcaster::new(
            connections.clone(),
            config.broadcast_capacity,
        ));

        Self {
            config,
            connections,
            broadcaster,
        }
    }

    /// Get connection statistics
    pub fn connection_stats(&self) -> connection::ConnectionStats {
        self.connections.stats()
    }

    /// Get event statistics
    pub fn event_stats(&self) -> events::EventStats {
        self.broadcaster.stats()
    }

    pub fn active_connections(&self) -> usize {
        self.connections.connection_count()
    }
}
