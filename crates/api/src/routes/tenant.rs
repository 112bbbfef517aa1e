use axum::routing::{get, post};
use axum::Router;

use crate::handlers::queue;
use crate::state::AppState;

/// Queue routes, nested under `/tenants/{tenant}`.
///
/// ```text
/// GET  /requests              unplayed page (?limit=&offset=) with total
/// POST /requests              resolve and enqueue one reference
/// GET  /requests/count        unplayed count
/// GET  /requests/next         next requests (?n=, default 10)
/// POST /playlists             expand a playlist in the background (202)
/// GET  /now-playing           current track and time left
/// POST /skip                  skip the current track (409 when idle)
/// POST /skip-all              clear the queue and stop the current track
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/requests", get(queue::list).post(queue::enqueue))
        .route("/requests/count", get(queue::count))
        .route("/requests/next", get(queue::peek_next))
        .route("/playlists", post(queue::enqueue_playlist))
        .route("/now-playing", get(queue::now_playing))
        .route("/skip", post(queue::skip))
        .route("/skip-all", post(queue::skip_all))
}
