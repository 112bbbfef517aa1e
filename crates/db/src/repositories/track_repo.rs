//! Repository for the `tracks` table.

use sqlx::PgPool;

use crate::models::track::{Track, UpsertTrack};

/// Column list for `tracks` queries.
const COLUMNS: &str = "\
    id, url, title, artist, album, track_number, duration_secs, \
    thumbnail_url, platform, description, is_stream, created_at, updated_at";

/// Provides upsert and lookup for resolved track metadata.
pub struct TrackRepo;

impl TrackRepo {
    /// Insert a track or overwrite the metadata of an existing id.
    pub async fn upsert(pool: &PgPool, input: &UpsertTrack) -> Result<Track, sqlx::Error> {
        let query = format!(
            "INSERT INTO tracks \
                (id, url, title, artist, album, track_number, duration_secs, \
                 thumbnail_url, platform, description, is_stream) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             ON CONFLICT (id) DO UPDATE SET \
                url = EXCLUDED.url, title = EXCLUDED.title, artist = EXCLUDED.artist, \
                album = EXCLUDED.album, track_number = EXCLUDED.track_number, \
                duration_secs = EXCLUDED.duration_secs, thumbnail_url = EXCLUDED.thumbnail_url, \
                platform = EXCLUDED.platform, description = EXCLUDED.description, \
                is_stream = EXCLUDED.is_stream, updated_at = NOW() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Track>(&query)
            .bind(&input.id)
            .bind(&input.url)
            .bind(&input.title)
            .bind(&input.artist)
            .bind(&input.album)
            .bind(&input.track_number)
            .bind(input.duration_secs)
            .bind(&input.thumbnail_url)
            .bind(&input.platform)
            .bind(&input.description)
            .bind(input.is_stream)
            .fetch_one(pool)
            .await
    }

    /// Find a track by its platform identifier.
    pub async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Track>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tracks WHERE id = $1");
        sqlx::query_as::<_, Track>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}
