//! Voice bridge: an external process that owns the platform's voice
//! transport connects here and receives the tenant's audio.
//!
//! Outbound frames are binary messages of raw PCM (one 20 ms frame each)
//! interleaved with JSON text control messages:
//!
//! ```text
//! {"type":"speaking","speaking":true}
//! ```
//!
//! The bridge may report its own readiness with
//! `{"type":"status","ready":false}`; a socket starts out ready.
//!
//! At most [`MAX_BUFFERED_FRAMES`] frames wait for a slow bridge; further
//! frames are dropped until it catches up.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use shanty_player::{LiveConnection, PcmFrame, PipelineError};

use crate::state::AppState;
use crate::ws::manager::{SocketKind, WsSender};

/// Control messages sent to the bridge.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Outbound {
    Speaking { speaking: bool },
}

/// Control messages accepted from the bridge.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Inbound {
    Status { ready: bool },
}

/// Frames queued for one bridge before new ones are dropped (one second
/// of audio).
pub const MAX_BUFFERED_FRAMES: usize = 50;

/// A [`LiveConnection`] backed by a bridge socket.
pub struct WsVoiceConnection {
    sender: WsSender,
    ready: AtomicBool,
    /// Frames handed to the socket's channel but not yet written.
    buffered: AtomicUsize,
}

impl WsVoiceConnection {
    pub fn new(sender: WsSender) -> Self {
        Self {
            sender,
            ready: AtomicBool::new(true),
            buffered: AtomicUsize::new(0),
        }
    }

    /// Called by the socket writer after each binary frame goes out.
    pub fn frame_written(&self) {
        let _ = self
            .buffered
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    /// Record the bridge's readiness; returns the previous value.
    pub fn set_ready(&self, ready: bool) -> bool {
        self.ready.swap(ready, Ordering::SeqCst)
    }

    fn send(&self, message: Message) -> Result<(), PipelineError> {
        self.sender
            .send(message)
            .map_err(|_| PipelineError::ConnectionClosed)
    }
}

#[async_trait]
impl LiveConnection for WsVoiceConnection {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst) && !self.sender.is_closed()
    }

    async fn set_speaking(&self, speaking: bool) -> Result<(), PipelineError> {
        let text = serde_json::to_string(&Outbound::Speaking { speaking })
            .map_err(|e| PipelineError::Stream(e.to_string()))?;
        self.send(Message::Text(text.into()))
    }

    async fn send_frame(&self, frame: PcmFrame) -> Result<(), PipelineError> {
        if self.buffered.fetch_add(1, Ordering::SeqCst) >= MAX_BUFFERED_FRAMES {
            self.buffered.fetch_sub(1, Ordering::SeqCst);
            tracing::trace!("Voice bridge behind, frame dropped");
            return Ok(());
        }
        self.send(Message::Binary(Bytes::from(frame))).inspect_err(|_| {
            self.buffered.fetch_sub(1, Ordering::SeqCst);
        })
    }
}

/// GET /ws/{tenant}/voice -- upgrade and register the socket as the
/// tenant's live connection.
pub async fn voice_handler(
    ws: WebSocketUpgrade,
    Path(tenant_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, tenant_id, state))
}

async fn handle_socket(socket: WebSocket, tenant_id: String, state: AppState) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, tenant_id = %tenant_id, "Voice bridge connected");

    let (tx, mut rx) = state
        .ws_manager
        .add(conn_id.clone(), &tenant_id, SocketKind::Voice)
        .await;
    let conn = Arc::new(WsVoiceConnection::new(tx));
    let live: Arc<dyn LiveConnection> = conn.clone();

    let (mut sink, mut stream) = socket.split();

    let sender_conn_id = conn_id.clone();
    let writer = Arc::clone(&conn);
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let is_frame = matches!(msg, Message::Binary(_));
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "Voice bridge sink closed");
                break;
            }
            if is_frame {
                writer.frame_written();
            }
        }
    });

    state.voice.attach(&tenant_id, Arc::clone(&live)).await;
    state.jukebox.on_voice_ready(&tenant_id).await;

    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(Message::Text(text)) => match serde_json::from_str::<Inbound>(&text) {
                Ok(Inbound::Status { ready }) => {
                    let was_ready = conn.set_ready(ready);
                    tracing::info!(conn_id = %conn_id, tenant_id = %tenant_id, ready, "Voice bridge status");
                    if ready && !was_ready {
                        state.jukebox.on_voice_ready(&tenant_id).await;
                    }
                }
                Err(e) => {
                    tracing::debug!(conn_id = %conn_id, error = %e, "Ignoring unknown bridge message");
                }
            },
            Ok(Message::Pong(_)) => {
                tracing::trace!(conn_id = %conn_id, "Pong received");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    conn.set_ready(false);
    state.voice.detach(&tenant_id, &live).await;
    state.ws_manager.remove(&conn_id).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, tenant_id = %tenant_id, "Voice bridge disconnected");
}
