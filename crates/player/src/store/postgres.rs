use async_trait::async_trait;
use shanty_core::types::{DbId, TenantId};
use shanty_db::models::track::UpsertTrack;
use shanty_db::models::track_request::{CreateTrackRequest, QueuedTrack};
use shanty_db::repositories::{TenantRepo, TrackRepo, TrackRequestRepo};
use shanty_db::DbPool;

use super::QueueStore;
use crate::error::StoreError;

/// [`QueueStore`] over the Postgres repositories.
#[derive(Clone)]
pub struct PgQueueStore {
    pool: DbPool,
}

impl PgQueueStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl QueueStore for PgQueueStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(shanty_db::health_check(&self.pool).await?)
    }

    async fn enqueue(
        &self,
        track: &UpsertTrack,
        request: &CreateTrackRequest,
    ) -> Result<QueuedTrack, StoreError> {
        TenantRepo::ensure(&self.pool, &request.tenant_id, &request.tenant_name_at_time).await?;
        let track = TrackRepo::upsert(&self.pool, track).await?;
        let input = CreateTrackRequest {
            track_id: track.id.clone(),
            ..request.clone()
        };
        let request = TrackRequestRepo::create(&self.pool, &input).await?;
        Ok(QueuedTrack { request, track })
    }

    async fn next_unplayed(&self, tenant_id: &str) -> Result<Option<QueuedTrack>, StoreError> {
        Ok(TrackRequestRepo::next_unplayed(&self.pool, tenant_id).await?)
    }

    async fn mark_played(&self, request_id: DbId) -> Result<bool, StoreError> {
        Ok(TrackRequestRepo::mark_played(&self.pool, request_id).await?)
    }

    async fn bulk_mark_played(
        &self,
        tenant_id: &str,
        exclude: Option<DbId>,
    ) -> Result<u64, StoreError> {
        Ok(TrackRequestRepo::bulk_mark_played(&self.pool, tenant_id, exclude).await?)
    }

    async fn count(&self, tenant_id: &str) -> Result<i64, StoreError> {
        Ok(TrackRequestRepo::count_unplayed(&self.pool, tenant_id).await?)
    }

    async fn peek_next(&self, tenant_id: &str, n: i64) -> Result<Vec<QueuedTrack>, StoreError> {
        Ok(TrackRequestRepo::peek_next(&self.pool, tenant_id, n).await?)
    }

    async fn list_unplayed(
        &self,
        tenant_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<QueuedTrack>, StoreError> {
        Ok(TrackRequestRepo::list_unplayed(&self.pool, tenant_id, limit, offset).await?)
    }

    async fn tenants_with_pending(&self) -> Result<Vec<TenantId>, StoreError> {
        Ok(TrackRequestRepo::tenants_with_pending(&self.pool).await?)
    }

    async fn tenant_volume(&self, tenant_id: &str) -> Result<Option<f32>, StoreError> {
        Ok(TenantRepo::find_by_id(&self.pool, tenant_id)
            .await?
            .and_then(|t| t.music_volume))
    }
}
