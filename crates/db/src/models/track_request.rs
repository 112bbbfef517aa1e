//! Track request rows: one per user enqueue action.

use serde::{Deserialize, Serialize};
use shanty_core::types::{DbId, Timestamp};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};

use super::track::Track;

/// A row from the `track_requests` table.
///
/// The requester's name and the tenant's name are captured at enqueue time
/// and never looked up again.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct TrackRequest {
    pub id: DbId,
    pub tenant_id: String,
    pub track_id: String,
    pub title: String,
    pub requested_by_user_id: String,
    pub requested_by_name: String,
    pub tenant_name_at_time: String,
    pub enqueued_at: Timestamp,
    pub played: bool,
    pub played_at: Option<Timestamp>,
}

/// DTO for inserting a new request.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTrackRequest {
    pub tenant_id: String,
    pub track_id: String,
    pub title: String,
    pub requested_by_user_id: String,
    pub requested_by_name: String,
    pub tenant_name_at_time: String,
    /// Defaults to `NOW()` when absent.
    pub enqueued_at: Option<Timestamp>,
}

/// A request joined with its track, enough for a subscriber or the
/// pipeline to work without a follow-up query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedTrack {
    pub request: TrackRequest,
    pub track: Track,
}

/// Request columns followed by `t_`-prefixed track columns, matching the
/// manual [`FromRow`] impl below.
pub const QUEUED_TRACK_COLUMNS: &str = "\
    r.id, r.tenant_id, r.track_id, r.title, r.requested_by_user_id, \
    r.requested_by_name, r.tenant_name_at_time, r.enqueued_at, r.played, r.played_at, \
    t.url AS t_url, t.title AS t_title, t.artist AS t_artist, t.album AS t_album, \
    t.track_number AS t_track_number, t.duration_secs AS t_duration_secs, \
    t.thumbnail_url AS t_thumbnail_url, t.platform AS t_platform, \
    t.description AS t_description, t.is_stream AS t_is_stream, \
    t.created_at AS t_created_at, t.updated_at AS t_updated_at";

impl<'r> FromRow<'r, PgRow> for QueuedTrack {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let request = TrackRequest::from_row(row)?;
        let track = Track {
            id: request.track_id.clone(),
            url: row.try_get("t_url")?,
            title: row.try_get("t_title")?,
            artist: row.try_get("t_artist")?,
            album: row.try_get("t_album")?,
            track_number: row.try_get("t_track_number")?,
            duration_secs: row.try_get("t_duration_secs")?,
            thumbnail_url: row.try_get("t_thumbnail_url")?,
            platform: row.try_get("t_platform")?,
            description: row.try_get("t_description")?,
            is_stream: row.try_get("t_is_stream")?,
            created_at: row.try_get("t_created_at")?,
            updated_at: row.try_get("t_updated_at")?,
        };
        Ok(Self { request, track })
    }
}
