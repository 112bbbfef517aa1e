//! Handlers for the `/tenants/{tenant}` queue resource.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use shanty_core::error::CoreError;
use shanty_core::humanize::{describe_remaining, format_duration};
use shanty_core::reference::TrackReference;
use shanty_core::types::Timestamp;
use shanty_db::models::track_request::QueuedTrack;
use shanty_player::{Jukebox, PlaybackState, Requester, SkipAllOutcome};

use crate::error::{AppError, AppResult};
use crate::query::{PaginationParams, PeekParams};
use crate::response::DataResponse;
use crate::state::AppState;

/// Body of `POST /requests` and `POST /playlists`.
#[derive(Debug, Deserialize)]
pub struct EnqueueInput {
    /// URL or search term.
    pub reference: String,
    pub user_id: String,
    pub display_name: String,
    /// Tenant display name at request time; defaults to the tenant id.
    pub tenant_name: Option<String>,
    /// Playlists only: queue entries in random order.
    #[serde(default)]
    pub shuffle: bool,
}

impl EnqueueInput {
    fn requester(&self, tenant_id: &str) -> Requester {
        Requester {
            user_id: self.user_id.clone(),
            display_name: self.display_name.clone(),
            tenant_name: self
                .tenant_name
                .clone()
                .unwrap_or_else(|| tenant_id.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RequestPage {
    pub items: Vec<QueuedTrack>,
    /// Unplayed requests in the whole queue.
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct PlaylistAccepted {
    pub tenant_id: String,
    pub reference: String,
    pub shuffle: bool,
}

#[derive(Debug, Serialize)]
pub struct NowPlayingResponse {
    pub state: PlaybackState,
    pub entry: Option<QueuedTrack>,
    pub started_at: Option<Timestamp>,
    pub duration_secs: Option<u64>,
    /// e.g. `"3 minutes, 5 seconds"`.
    pub duration: Option<String>,
    pub time_left_secs: Option<u64>,
    /// e.g. `"1 minute and 5 seconds"`.
    pub time_left: Option<String>,
}

/// GET /api/v1/tenants/{tenant}/requests
pub async fn list(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<DataResponse<RequestPage>>> {
    let (limit, offset) = params.resolve();
    let items = state.jukebox.list_unplayed(&tenant_id, limit, offset).await?;
    let total = state.jukebox.count(&tenant_id).await?;
    Ok(Json(DataResponse {
        data: RequestPage {
            items,
            total,
            limit,
            offset,
        },
    }))
}

/// GET /api/v1/tenants/{tenant}/requests/count
pub async fn count(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> AppResult<Json<DataResponse<CountResponse>>> {
    let count = state.jukebox.count(&tenant_id).await?;
    Ok(Json(DataResponse {
        data: CountResponse { count },
    }))
}

/// GET /api/v1/tenants/{tenant}/requests/next
pub async fn peek_next(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Query(params): Query<PeekParams>,
) -> AppResult<Json<DataResponse<Vec<QueuedTrack>>>> {
    let next = state.jukebox.peek_next(&tenant_id, params.resolve()).await?;
    Ok(Json(DataResponse { data: next }))
}

/// POST /api/v1/tenants/{tenant}/requests
pub async fn enqueue(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Json(input): Json<EnqueueInput>,
) -> AppResult<(StatusCode, Json<DataResponse<QueuedTrack>>)> {
    let requester = input.requester(&tenant_id);
    let entry = state
        .jukebox
        .enqueue_reference(&tenant_id, &input.reference, &requester)
        .await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: entry })))
}

/// POST /api/v1/tenants/{tenant}/playlists
///
/// Validates the reference, then expands the playlist in the background;
/// progress shows up on the event feed as `added` events.
pub async fn enqueue_playlist(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Json(input): Json<EnqueueInput>,
) -> AppResult<(StatusCode, Json<DataResponse<PlaylistAccepted>>)> {
    TrackReference::parse(&input.reference)?;
    let requester = input.requester(&tenant_id);

    tokio::spawn(expand_playlist(
        Arc::clone(&state.jukebox),
        tenant_id.clone(),
        input.reference.clone(),
        requester,
        input.shuffle,
    ));

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: PlaylistAccepted {
                tenant_id,
                reference: input.reference,
                shuffle: input.shuffle,
            },
        }),
    ))
}

async fn expand_playlist(
    jukebox: Arc<Jukebox>,
    tenant_id: String,
    reference: String,
    requester: Requester,
    shuffle: bool,
) {
    match jukebox
        .enqueue_playlist(&tenant_id, &reference, &requester, shuffle)
        .await
    {
        Ok(outcome) => tracing::info!(
            tenant_id = %tenant_id,
            queued = outcome.queued,
            failed = outcome.failed,
            total = outcome.total,
            "Playlist queued"
        ),
        Err(e) => tracing::warn!(
            tenant_id = %tenant_id,
            reference = %reference,
            error = %e,
            "Playlist expansion failed"
        ),
    }
}

/// GET /api/v1/tenants/{tenant}/now-playing
pub async fn now_playing(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> AppResult<Json<DataResponse<NowPlayingResponse>>> {
    let (playback, now) = match state.jukebox.get(&tenant_id).await {
        Some(player) => (player.state().await, player.now_playing().await),
        None => (PlaybackState::Idle, None),
    };

    let left = now.as_ref().and_then(|n| n.remaining());
    let data = NowPlayingResponse {
        state: playback,
        started_at: now.as_ref().map(|n| n.started_at),
        duration_secs: now.as_ref().and_then(|n| n.duration_secs),
        duration: now
            .as_ref()
            .and_then(|n| n.duration_secs)
            .map(format_duration),
        time_left_secs: left.map(|d| d.as_secs()),
        time_left: left.map(describe_remaining),
        entry: now.map(|n| n.entry),
    };
    Ok(Json(DataResponse { data }))
}

/// POST /api/v1/tenants/{tenant}/skip
pub async fn skip(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> AppResult<Json<DataResponse<QueuedTrack>>> {
    let skipped = state
        .jukebox
        .skip_current(&tenant_id)
        .await?
        .ok_or_else(|| AppError::Core(CoreError::Conflict("Nothing is playing".into())))?;
    Ok(Json(DataResponse { data: skipped }))
}

/// POST /api/v1/tenants/{tenant}/skip-all
pub async fn skip_all(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> AppResult<Json<DataResponse<SkipAllOutcome>>> {
    let outcome = state.jukebox.skip_all(&tenant_id).await?;
    Ok(Json(DataResponse { data: outcome }))
}
