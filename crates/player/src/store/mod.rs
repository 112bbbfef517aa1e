//! The durable per-tenant FIFO.
//!
//! Every implementation must honour the queue order: a tenant's unplayed
//! requests sorted by `(enqueued_at, id)` ascending. The scheduler keeps
//! no cache of the queue and re-reads it on every drain iteration.

use async_trait::async_trait;
use shanty_core::types::{DbId, TenantId};
use shanty_db::models::track::UpsertTrack;
use shanty_db::models::track_request::{CreateTrackRequest, QueuedTrack};

use crate::error::StoreError;

mod memory;
mod postgres;

pub use memory::MemoryQueueStore;
pub use postgres::PgQueueStore;

#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Verify the backing store is reachable.
    async fn health_check(&self) -> Result<(), StoreError>;

    /// Upsert `track` by id, then insert `request` referencing it.
    ///
    /// `request.track_id` is overwritten with `track.id`. Implementations
    /// that keep tenant rows record the tenant here.
    async fn enqueue(
        &self,
        track: &UpsertTrack,
        request: &CreateTrackRequest,
    ) -> Result<QueuedTrack, StoreError>;

    /// The oldest unplayed request of a tenant.
    async fn next_unplayed(&self, tenant_id: &str) -> Result<Option<QueuedTrack>, StoreError>;

    /// Mark one request played. Idempotent; returns whether it changed.
    async fn mark_played(&self, request_id: DbId) -> Result<bool, StoreError>;

    /// Mark every unplayed request of a tenant played except `exclude`.
    async fn bulk_mark_played(
        &self,
        tenant_id: &str,
        exclude: Option<DbId>,
    ) -> Result<u64, StoreError>;

    async fn count(&self, tenant_id: &str) -> Result<i64, StoreError>;

    /// Up to `n` unplayed requests in queue order.
    async fn peek_next(&self, tenant_id: &str, n: i64) -> Result<Vec<QueuedTrack>, StoreError>;

    /// A page of the unplayed queue; `limit` is clamped to `1..=250`.
    async fn list_unplayed(
        &self,
        tenant_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<QueuedTrack>, StoreError>;

    /// Every tenant with a non-empty queue, for resuming after a restart.
    async fn tenants_with_pending(&self) -> Result<Vec<TenantId>, StoreError>;

    /// The tenant's configured playback volume, if any.
    async fn tenant_volume(&self, tenant_id: &str) -> Result<Option<f32>, StoreError>;
}
