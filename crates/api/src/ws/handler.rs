use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};

use crate::state::AppState;
use crate::ws::manager::SocketKind;

/// GET /ws/{tenant}/events -- upgrade to a push feed of the tenant's queue
/// events.
pub async fn events_handler(
    ws: WebSocketUpgrade,
    Path(tenant_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, tenant_id, state))
}

/// Manage a single feed connection after upgrade.
///
///   1. Registers the connection with `WsManager` and subscribes to the
///      tenant's events on the `Broadcaster`.
///   2. Spawns a forwarder (events to JSON text frames) and a sender task
///      (channel to WebSocket sink).
///   3. Reads inbound frames until the client goes away.
///   4. Unsubscribes and cleans up.
async fn handle_socket(socket: WebSocket, tenant_id: String, state: AppState) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, tenant_id = %tenant_id, "Event feed connected");

    let (tx, mut rx) = state
        .ws_manager
        .add(conn_id.clone(), &tenant_id, SocketKind::Events)
        .await;
    let mut subscription = state.broadcaster.subscribe(&tenant_id).await;
    let handle = subscription.handle().clone();

    let (mut sink, mut stream) = socket.split();

    // Sender task: forward channel messages to the WebSocket sink.
    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
        }
    });

    // Forwarder: serialize every tenant event onto the outbound channel.
    let forward_task = tokio::spawn(async move {
        while let Some(event) = subscription.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(error = %e, kind = event.event.kind(), "Failed to serialize event");
                    continue;
                }
            };
            if tx.send(Message::Text(text.into())).is_err() {
                break;
            }
        }
    });

    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(conn_id = %conn_id, "Pong received");
            }
            Ok(_) => {
                // The feed is push-only.
            }
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    state.broadcaster.unsubscribe(&handle).await;
    state.ws_manager.remove(&conn_id).await;
    forward_task.abort();
    send_task.abort();
    tracing::info!(conn_id = %conn_id, tenant_id = %tenant_id, "Event feed disconnected");
}
