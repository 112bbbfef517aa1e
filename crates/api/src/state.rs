use std::sync::Arc;

use shanty_events::Broadcaster;
use shanty_player::{ConnectionTable, Jukebox};

use crate::config::ServerConfig;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything inside is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Per-tenant players and the queue store behind them.
    pub jukebox: Arc<Jukebox>,
    /// Per-tenant event fan-out for the dashboard feed.
    pub broadcaster: Arc<Broadcaster>,
    /// Live voice connections, attached by the voice-bridge socket.
    pub voice: Arc<ConnectionTable>,
    /// WebSocket connection manager (feeds and voice bridges).
    pub ws_manager: Arc<WsManager>,
}
