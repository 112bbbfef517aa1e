use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::ws::Message;
use serde::Serialize;
use shanty_core::types::{TenantId, Timestamp};
use tokio::sync::{mpsc, RwLock};

/// Channel sender half for pushing messages to a WebSocket connection.
pub type WsSender = mpsc::UnboundedSender<Message>;

/// What a socket is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SocketKind {
    /// Dashboard or chat notifier reading lifecycle events.
    Events,
    /// External bridge carrying the tenant's audio.
    Voice,
}

/// Metadata for a single WebSocket connection.
pub struct WsConnection {
    pub tenant_id: TenantId,
    pub kind: SocketKind,
    /// Channel sender for outbound messages to this connection.
    pub sender: WsSender,
    pub connected_at: Timestamp,
}

/// Manages all active WebSocket connections.
///
/// Thread-safe via interior `RwLock`; designed to be wrapped in `Arc` and
/// shared across the application.
pub struct WsManager {
    connections: RwLock<HashMap<String, WsConnection>>,
}

impl WsManager {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new connection.
    ///
    /// Returns both halves of its outbound channel: the sender for
    /// producers (event forwarder, voice connection) and the receiver the
    /// caller drains into the WebSocket sink.
    pub async fn add(
        &self,
        conn_id: String,
        tenant_id: &str,
        kind: SocketKind,
    ) -> (WsSender, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = WsConnection {
            tenant_id: tenant_id.to_string(),
            kind,
            sender: tx.clone(),
            connected_at: chrono::Utc::now(),
        };
        self.connections.write().await.insert(conn_id, conn);
        (tx, rx)
    }

    pub async fn remove(&self, conn_id: &str) {
        self.connections.write().await.remove(conn_id);
    }

    /// Return the current number of active connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Connections of one kind for one tenant.
    pub async fn tenant_count(&self, tenant_id: &str, kind: SocketKind) -> usize {
        self.connections
            .read()
            .await
            .values()
            .filter(|c| c.tenant_id == tenant_id && c.kind == kind)
            .count()
    }

    /// Send a Close frame to every connection, then clear the map.
    pub async fn shutdown_all(&self) {
        let mut conns = self.connections.write().await;
        let count = conns.len();
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Close(None));
        }
        conns.clear();
        tracing::info!(count, "Closed all WebSocket connections");
    }

    /// Send a Ping frame to every connected client and forget connections
    /// whose writer task is gone. Returns how many were dropped.
    pub async fn ping_all(&self) -> usize {
        let mut conns = self.connections.write().await;
        let before = conns.len();
        conns.retain(|_, conn| conn.sender.send(Message::Ping(Bytes::new())).is_ok());
        before - conns.len()
    }

    /// Live connections split into event feeds and voice bridges.
    pub async fn kind_counts(&self) -> (usize, usize) {
        let conns = self.connections.read().await;
        let voice = conns.values().filter(|c| c.kind == SocketKind::Voice).count();
        (conns.len() - voice, voice)
    }
}

impl Default for WsManager {
    fn default() -> Self {
        Self::new()
    }
}
