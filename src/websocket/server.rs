//! WebSocket endpoint and per-connection loop

use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, State, WebSocketUpgrade,
    },
    response::Response,
};
use chrono::Utc;
use futures::stream::StreamExt;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use super::{
    connection::{Connection, MessageWriter},
    messages::{ClientMessage, ServerMessage},
    session::Session,
    WebSocketState,
};

/// WebSocket endpoint handler
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<WebSocketState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Response {
    info!(remote_addr = %addr, "WebSocket connection request");

    ws.on_upgrade(move |socket| handle_socket(socket, state, addr))
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<WebSocketState>, addr: SocketAddr) {
    let (sender, mut receiver) = socket.split();
    let mut writer = MessageWriter::new(sender);

    let session = Session::new();
    let session_id = session.id.clone();

    info!(session_id = %session_id, remote_addr = %addr, "WebSocket session started");

    let (connection, mut message_rx) = state
        .connections
        .register(session, Some(addr.to_string()));

    let welcome = ServerMessage::Welcome {
        session_id: session_id.clone(),
        server_time: Utc::now(),
    };

    if let Err(e) = writer.send(welcome).await {
        error!(session_id = %session_id, error = ?e, "Failed to send welcome message");
        state.connections.unregister(&session_id);
        return;
    }

    // Outbound messages are written by one task
    let writer_session_id = session_id.clone();
    let sender_handle = tokio::spawn(async move {
        while let Some(message) = message_rx.recv().await {
            let closing = matches!(message, ServerMessage::Closing { .. });
            if let Err(e) = writer.send(message).await {
                error!(session_id = %writer_session_id, error = ?e, "Failed to send message");
                break;
            }
            if closing {
                break;
            }
        }

        let _ = writer.close().await;
    });

    let heartbeat_connection = connection.clone();
    let heartbeat_interval = state.config.heartbeat_interval_secs.max(1);
    let heartbeat_handle = tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(heartbeat_interval));
        ticker.tick().await;
        loop {
            ticker.tick().await;

            let pong = ServerMessage::Pong {
                timestamp: Utc::now(),
            };

            if heartbeat_connection.send(pong).is_err() {
                debug!("Heartbeat failed, connection closed");
                break;
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                error!(session_id = %session_id, error = ?e, "WebSocket error");
                break;
            }
        };

        match msg {
            Message::Text(text) => {
                if let Err(e) = handle_client_message(&text, &connection) {
                    warn!(session_id = %session_id, error = %e, "Failed to handle message");

                    let _ = connection.send(ServerMessage::Error {
                        code: "INVALID_MESSAGE".to_string(),
                        message: format!("Failed to process message: {}", e),
                    });
                }
            }
            Message::Binary(_) => {
                let _ = connection.send(ServerMessage::Error {
                    code: "UNSUPPORTED".to_string(),
                    message: "Binary messages are not supported".to_string(),
                });
            }
            Message::Ping(_) => {
                // Axum answers pings itself
                connection.session.write().touch();
            }
            Message::Pong(_) => {
                connection.session.write().touch();
            }
            Message::Close(_) => {
                info!(session_id = %session_id, "Client closed connection");
                break;
            }
        }
    }

    info!(session_id = %session_id, "WebSocket session ended");
    sender_handle.abort();
    heartbeat_handle.abort();
    state.connections.unregister(&session_id);
}

/// Handle a client message
fn handle_client_message(text: &str, connection: &Arc<Connection>) -> Result<(), String> {
    let message: ClientMessage =
        serde_json::from_str(text).map_err(|e| format!("Invalid JSON: {}", e))?;

    let session_id = connection.session_id();

    match message {
        ClientMessage::Subscribe {
            subscription_id,
            filters,
        } => {
            info!(
                session_id = %session_id,
                subscription_id = %subscription_id,
                "Client subscribing to events"
            );

            connection
                .session
                .write()
                .subscribe(subscription_id.clone(), filters.clone());

            connection
                .send(ServerMessage::Subscribed {
                    subscription_id,
                    filters,
                })
                .map_err(|e| e.to_string())?;
        }
        ClientMessage::Unsubscribe { subscription_id } => {
            let removed = connection.session.write().unsubscribe(&subscription_id);

            let response = if removed {
                ServerMessage::Unsubscribed { subscription_id }
            } else {
                ServerMessage::Error {
                    code: "NOT_FOUND".to_string(),
                    message: format!("Subscription {} not found", subscription_id),
                }
            };
            connection.send(response).map_err(|e| e.to_string())?;
        }
        ClientMessage::Ping { timestamp } => {
            connection.session.write().touch();
            connection
                .send(ServerMessage::Pong { timestamp })
                .map_err(|e| e.to_string())?;
        }
        ClientMessage::Ack { message_id } => {
            debug!(session_id = %session_id, message_id = %message_id, "Message acknowledged");
            connection.session.write().touch();
        }
    }

    Ok(())
}

/// Periodic cleanup task for expired sessions
pub async fn cleanup_task(state: Arc<WebSocketState>) {
    let mut ticker = interval(Duration::from_secs(state.config.cleanup_interval_secs.max(1)));

    loop {
        ticker.tick().await;

        let removed = state
            .connections
            .cleanup_expired(state.config.session_timeout_secs as i64);
        if removed > 0 {
            debug!(removed, "WebSocket cleanup removed expired sessions");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::messages::EventType;

    #[tokio::test]
    async fn test_subscribe_message_is_confirmed() {
        let (connection, mut rx) = Connection::new(Session::new(), None);
        let connection = Arc::new(connection);

        let json = r#"{"type":"subscribe","subscription_id":"sub1","filters":{"event_types":["search_updated"]}}"#;
        handle_client_message(json, &connection).unwrap();

        match rx.recv().await.unwrap() {
            ServerMessage::Subscribed {
                subscription_id,
                filters,
            } => {
                assert_eq!(subscription_id, "sub1");
                assert_eq!(filters.event_types, vec![EventType::SearchUpdated]);
            }
            other => panic!("Wrong message type: {:?}", other),
        }
        assert!(connection.session.read().has_subscriptions());
    }

    #[tokio::test]
    async fn test_unknown_unsubscribe_is_error() {
        let (connection, mut rx) = Connection::new(Session::new(), None);
        let connection = Arc::new(connection);

        handle_client_message(r#"{"type":"unsubscribe","subscription_id":"nope"}"#, &connection)
            .unwrap();

        assert!(matches!(
            rx.recv().await.unwrap(),
            ServerMessage::Error { .. }
        ));
    }

    #[test]
    fn test_invalid_json_rejected() {
        let (connection, _rx) = Connection::new(Session::new(), None);
        let connection = Arc::new(connection);

        assert!(handle_client_message("not json", &connection).is_err());
    }
}
