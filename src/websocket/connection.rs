//! WebSocket connection management
//!
//! Registry of live connections and per-connection delivery.

use axum::extract::ws::{Message, WebSocket};
use dashmap::DashMap;
use futures::{stream::SplitSink, SinkExt};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{events::EventEnvelope, messages::ServerMessage, session::Session};
use crate::metrics::{WS_ACTIVE_CONNECTIONS, WS_EVENTS_DELIVERED};

/// Connection handle for sending messages
pub struct Connection {
    /// Session information
    pub session: Arc<RwLock<Session>>,
    /// Channel for sending messages to this connection
    tx: mpsc::UnboundedSender<ServerMessage>,
    remote_addr: Option<String>,
}

impl Connection {
    /// Create a new connection
    pub fn new(
        session: Session,
        remote_addr: Option<String>,
    ) -> (Self, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                session: Arc::new(RwLock::new(session)),
                tx,
                remote_addr,
            },
            rx,
        )
    }

    /// Send a message to this connection
    pub fn send(&self, message: ServerMessage) -> Result<(), ConnectionError> {
        self.tx.send(message).map_err(|_| ConnectionError::SendFailed)
    }

    /// Get session ID
    pub fn session_id(&self) -> String {
        self.session.read().id.clone()
    }

    pub fn remote_addr(&self) -> Option<&str> {
        self.remote_addr.as_deref()
    }
}

/// Connection manager
pub struct ConnectionManager {
    /// Active connections indexed by session ID
    connections: DashMap<String, Arc<Connection>>,
    stats: RwLock<ConnectionStats>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            stats: RwLock::new(ConnectionStats::default()),
        }
    }

    /// Register a new connection
    pub fn register(
        &self,
        session: Session,
        remote_addr: Option<String>,
    ) -> (Arc<Connection>, mpsc::UnboundedReceiver<ServerMessage>) {
        let session_id = session.id.clone();
        let (connection, rx) = Connection::new(session, remote_addr);
        let connection = Arc::new(connection);

        self.connections.insert(session_id.clone(), connection.clone());
        {
            let mut stats = self.stats.write();
            stats.total_connections += 1;
            stats.active_connections = self.connections.len() as u64;
        }
        WS_ACTIVE_CONNECTIONS.set(self.connections.len() as i64);

        info!(session_id = %session_id, "WebSocket connection registered");
        (connection, rx)
    }

    /// Unregister a connection
    pub fn unregister(&self, session_id: &str) {
        if self.connections.remove(session_id).is_some() {
            self.stats.write().active_connections = self.connections.len() as u64;
            WS_ACTIVE_CONNECTIONS.set(self.connections.len() as i64);
            info!(session_id = %session_id, "WebSocket connection unregistered");
        }
    }

    /// Get connection by session ID
    pub fn get(&self, session_id: &str) -> Option<Arc<Connection>> {
        self.connections.get(session_id).map(|e| e.value().clone())
    }

    /// Get number of active connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Deliver an event to every connection with a matching subscription.
    ///
    /// Returns the number of connections the event was queued for.
    pub fn broadcast_event(&self, envelope: &EventEnvelope) -> u64 {
        let event_type = envelope.event.event_type();
        let mut delivered = 0;
        let mut filtered = 0;

        for entry in self.connections.iter() {
            let connection = entry.value();

            let wanted = {
                let mut session = connection.session.write();
                session.interested_event_types().contains(&event_type)
                    && session.accept(&envelope.event)
            };

            if !wanted {
                filtered += 1;
                continue;
            }

            let message = ServerMessage::Event {
                message_id: envelope.id.clone(),
                event: envelope.event.clone(),
                timestamp: envelope.timestamp,
            };

            if let Err(e) = connection.send(message) {
                warn!(
                    session_id = %connection.session_id(),
                    error = ?e,
                    "Failed to send event to connection"
                );
            } else {
                delivered += 1;
            }
        }

        debug!(
            event_type = ?event_type,
            delivered = delivered,
            filtered = filtered,
            "Event broadcast completed"
        );

        {
            let mut stats = self.stats.write();
            stats.total_events_broadcast += 1;
            stats.total_events_delivered += delivered;
        }
        WS_EVENTS_DELIVERED.inc_by(delivered);

        delivered
    }

    /// Tell every client the server is going away
    pub fn close_all(&self, reason: &str) {
        for entry in self.connections.iter() {
            let _ = entry.value().send(ServerMessage::Closing {
                reason: reason.to_string(),
            });
        }
    }

    /// Get statistics
    pub fn stats(&self) -> ConnectionStats {
        self.stats.read().clone()
    }

    /// Cleanup expired sessions
    pub fn cleanup_expired(&self, timeout_secs: i64) -> usize {
        let expired: Vec<String> = self
            .connections
            .iter()
            .filter(|entry| entry.value().session.read().is_expired(timeout_secs))
            .map(|entry| entry.key().clone())
            .collect();

        for session_id in &expired {
            info!(session_id = %session_id, "Cleaning up expired session");
            if let Some(connection) = self.get(session_id) {
                let _ = connection.send(ServerMessage::Closing {
                    reason: "session expired".to_string(),
                });
            }
            self.unregister(session_id);
        }

        expired.len()
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Connection statistics
#[derive(Debug, Clone, Default)]
pub struct ConnectionStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_events_broadcast: u64,
    pub total_events_delivered: u64,
}

/// Connection errors
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Failed to send message to connection")]
    SendFailed,
}

/// WebSocket message writer
pub struct MessageWriter {
    sink: SplitSink<WebSocket, Message>,
}

impl MessageWriter {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self { sink }
    }

    /// Send a server message
    pub async fn send(&mut self, message: ServerMessage) -> Result<(), std::io::Error> {
        let json = serde_json::to_string(&message)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        self.sink
            .send(Message::Text(json))
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::BrokenPipe, e))
    }

    /// Close the connection
    pub async fn close(mut self) -> Result<(), std::io::Error> {
        self.sink
            .send(Message::Close(None))
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::BrokenPipe, e))
    }
}
