pub mod health;
pub mod tenant;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /tenants/{tenant}/...          queue operations (see tenant::router)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/tenants/{tenant}", tenant::router())
}

/// WebSocket endpoints (root level).
///
/// ```text
/// /ws/{tenant}/events            lifecycle event feed
/// /ws/{tenant}/voice             voice bridge
/// ```
pub fn ws_routes() -> Router<AppState> {
    Router::new()
        .route("/ws/{tenant}/events", get(ws::events_handler))
        .route("/ws/{tenant}/voice", get(ws::voice_handler))
}
