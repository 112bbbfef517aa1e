//! Repository for the `track_requests` table.
//!
//! The active queue of a tenant is its `played = false` rows ordered by
//! `(enqueued_at, id)` ascending. Every read here honours that order; the
//! `id` tie-break keeps it total under same-instant inserts.

use shanty_core::types::DbId;
use sqlx::PgPool;

use crate::models::track_request::{
    CreateTrackRequest, QueuedTrack, TrackRequest, QUEUED_TRACK_COLUMNS,
};

/// Column list for plain `track_requests` queries.
const COLUMNS: &str = "\
    id, tenant_id, track_id, title, requested_by_user_id, requested_by_name, \
    tenant_name_at_time, enqueued_at, played, played_at";

/// Maximum page size for queue listing.
pub const MAX_LIMIT: i64 = 250;

/// Default page size for queue listing.
pub const DEFAULT_LIMIT: i64 = 25;

/// Provides queue operations over track requests.
pub struct TrackRequestRepo;

impl TrackRequestRepo {
    /// Insert a new unplayed request.
    ///
    /// The referenced track must already exist (see `TrackRepo::upsert`).
    pub async fn create(
        pool: &PgPool,
        input: &CreateTrackRequest,
    ) -> Result<TrackRequest, sqlx::Error> {
        let query = format!(
            "INSERT INTO track_requests \
                (tenant_id, track_id, title, requested_by_user_id, requested_by_name, \
                 tenant_name_at_time, enqueued_at) \
             VALUES ($1, $2, $3, $4, $5, $6, COALESCE($7, NOW())) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, TrackRequest>(&query)
            .bind(&input.tenant_id)
            .bind(&input.track_id)
            .bind(&input.title)
            .bind(&input.requested_by_user_id)
            .bind(&input.requested_by_name)
            .bind(&input.tenant_name_at_time)
            .bind(input.enqueued_at)
            .fetch_one(pool)
            .await
    }

    /// Find a request (with its track) by id.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<QueuedTrack>, sqlx::Error> {
        let query = format!(
            "SELECT {QUEUED_TRACK_COLUMNS} \
             FROM track_requests r JOIN tracks t ON t.id = r.track_id \
             WHERE r.id = $1"
        );
        sqlx::query_as::<_, QueuedTrack>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// The oldest unplayed request for a tenant, or `None` when the queue
    /// is empty.
    pub async fn next_unplayed(
        pool: &PgPool,
        tenant_id: &str,
    ) -> Result<Option<QueuedTrack>, sqlx::Error> {
        let query = format!(
            "SELECT {QUEUED_TRACK_COLUMNS} \
             FROM track_requests r JOIN tracks t ON t.id = r.track_id \
             WHERE r.tenant_id = $1 AND r.played = FALSE \
             ORDER BY r.enqueued_at ASC, r.id ASC \
             LIMIT 1"
        );
        sqlx::query_as::<_, QueuedTrack>(&query)
            .bind(tenant_id)
            .fetch_optional(pool)
            .await
    }

    /// Up to `limit` unplayed requests in queue order.
    pub async fn peek_next(
        pool: &PgPool,
        tenant_id: &str,
        limit: i64,
    ) -> Result<Vec<QueuedTrack>, sqlx::Error> {
        Self::list_unplayed(pool, tenant_id, limit, 0).await
    }

    /// A page of the unplayed queue. `limit` is clamped to `1..=MAX_LIMIT`.
    pub async fn list_unplayed(
        pool: &PgPool,
        tenant_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<QueuedTrack>, sqlx::Error> {
        let query = format!(
            "SELECT {QUEUED_TRACK_COLUMNS} \
             FROM track_requests r JOIN tracks t ON t.id = r.track_id \
             WHERE r.tenant_id = $1 AND r.played = FALSE \
             ORDER BY r.enqueued_at ASC, r.id ASC \
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, QueuedTrack>(&query)
            .bind(tenant_id)
            .bind(limit.clamp(1, MAX_LIMIT))
            .bind(offset.max(0))
            .fetch_all(pool)
            .await
    }

    /// Number of unplayed requests for a tenant.
    pub async fn count_unplayed(pool: &PgPool, tenant_id: &str) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM track_requests WHERE tenant_id = $1 AND played = FALSE",
        )
        .bind(tenant_id)
        .fetch_one(pool)
        .await
    }

    /// Tenants with at least one unplayed request.
    pub async fn tenants_with_pending(pool: &PgPool) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT tenant_id FROM track_requests \
             WHERE played = FALSE ORDER BY tenant_id",
        )
        .fetch_all(pool)
        .await
    }

    /// Mark one request played. Returns `false` when it already was.
    ///
    /// `played_at` is only stamped on the first transition.
    pub async fn mark_played(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE track_requests SET played = TRUE, played_at = NOW() \
             WHERE id = $1 AND played = FALSE",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark every unplayed request of a tenant played, except `exclude_id`
    /// (the request currently streaming). Returns the number of rows changed.
    pub async fn bulk_mark_played(
        pool: &PgPool,
        tenant_id: &str,
        exclude_id: Option<DbId>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE track_requests SET played = TRUE, played_at = NOW() \
             WHERE tenant_id = $1 AND played = FALSE \
               AND ($2::BIGINT IS NULL OR id <> $2)",
        )
        .bind(tenant_id)
        .bind(exclude_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
