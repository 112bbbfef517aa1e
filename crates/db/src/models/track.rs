//! Resolved track metadata.

use serde::{Deserialize, Serialize};
use shanty_core::types::Timestamp;
use sqlx::FromRow;

/// A row from the `tracks` table.
///
/// Keyed by the source platform's identifier; re-resolving the same id
/// overwrites the metadata in place.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub url: String,
    pub title: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub track_number: Option<String>,
    /// Length in seconds; `None` when unknown (live streams, some extractors).
    pub duration_secs: Option<i32>,
    pub thumbnail_url: Option<String>,
    pub platform: Option<String>,
    pub description: Option<String>,
    pub is_stream: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO produced by the resolver and upserted before a request is inserted.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UpsertTrack {
    pub id: String,
    pub url: String,
    pub title: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub track_number: Option<String>,
    pub duration_secs: Option<i32>,
    pub thumbnail_url: Option<String>,
    pub platform: Option<String>,
    pub description: Option<String>,
    pub is_stream: bool,
}

impl UpsertTrack {
    /// Minimal metadata with every optional field empty.
    pub fn new(id: impl Into<String>, url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            title: title.into(),
            artist: None,
            album: None,
            track_number: None,
            duration_secs: None,
            thumbnail_url: None,
            platform: None,
            description: None,
            is_stream: false,
        }
    }

    /// Materialise a `Track` row with the given timestamps, used by stores
    /// that do not round-trip through Postgres.
    pub fn into_track(self, created_at: Timestamp, updated_at: Timestamp) -> Track {
        Track {
            id: self.id,
            url: self.url,
            title: self.title,
            artist: self.artist,
            album: self.album,
            track_number: self.track_number,
            duration_secs: self.duration_secs,
            thumbnail_url: self.thumbnail_url,
            platform: self.platform,
            description: self.description,
            is_stream: self.is_stream,
            created_at,
            updated_at,
        }
    }
}
