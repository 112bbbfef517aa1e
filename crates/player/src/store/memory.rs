use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use shanty_core::types::{DbId, TenantId};
use shanty_db::models::track::{Track, UpsertTrack};
use shanty_db::models::track_request::{CreateTrackRequest, QueuedTrack, TrackRequest};
use shanty_db::repositories::track_request_repo::MAX_LIMIT;
use tokio::sync::Mutex;

use super::QueueStore;
use crate::error::StoreError;

#[derive(Default)]
struct MemoryState {
    tracks: HashMap<String, Track>,
    requests: Vec<TrackRequest>,
    volumes: HashMap<String, f32>,
    last_id: DbId,
}

impl MemoryState {
    fn unplayed(&self, tenant_id: &str) -> Vec<&TrackRequest> {
        let mut rows: Vec<_> = self
            .requests
            .iter()
            .filter(|r| r.tenant_id == tenant_id && !r.played)
            .collect();
        rows.sort_by(|a, b| (a.enqueued_at, a.id).cmp(&(b.enqueued_at, b.id)));
        rows
    }

    fn joined(&self, request: &TrackRequest) -> Option<QueuedTrack> {
        self.tracks.get(&request.track_id).map(|track| QueuedTrack {
            request: request.clone(),
            track: track.clone(),
        })
    }
}

/// In-process [`QueueStore`] for tests and single-process deployments
/// without Postgres. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryQueueStore {
    state: Mutex<MemoryState>,
    unavailable: AtomicBool,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with [`StoreError::Unavailable`]
    /// until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn set_volume(&self, tenant_id: &str, volume: f32) {
        self.state
            .lock()
            .await
            .volumes
            .insert(tenant_id.to_string(), volume);
    }

    /// A request row by id, played or not.
    pub async fn request(&self, request_id: DbId) -> Option<TrackRequest> {
        self.state
            .lock()
            .await
            .requests
            .iter()
            .find(|r| r.id == request_id)
            .cloned()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store disabled".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        self.check()
    }

    async fn enqueue(
        &self,
        track: &UpsertTrack,
        request: &CreateTrackRequest,
    ) -> Result<QueuedTrack, StoreError> {
        self.check()?;
        let now = Utc::now();
        let mut state = self.state.lock().await;

        let created_at = state.tracks.get(&track.id).map_or(now, |t| t.created_at);
        let track = track.clone().into_track(created_at, now);
        state.tracks.insert(track.id.clone(), track.clone());

        state.last_id += 1;
        let request = TrackRequest {
            id: state.last_id,
            tenant_id: request.tenant_id.clone(),
            track_id: track.id.clone(),
            title: request.title.clone(),
            requested_by_user_id: request.requested_by_user_id.clone(),
            requested_by_name: request.requested_by_name.clone(),
            tenant_name_at_time: request.tenant_name_at_time.clone(),
            enqueued_at: request.enqueued_at.unwrap_or(now),
            played: false,
            played_at: None,
        };
        state.requests.push(request.clone());
        Ok(QueuedTrack { request, track })
    }

    async fn next_unplayed(&self, tenant_id: &str) -> Result<Option<QueuedTrack>, StoreError> {
        self.check()?;
        let state = self.state.lock().await;
        Ok(state
            .unplayed(tenant_id)
            .first()
            .and_then(|r| state.joined(r)))
    }

    async fn mark_played(&self, request_id: DbId) -> Result<bool, StoreError> {
        self.check()?;
        let mut state = self.state.lock().await;
        match state
            .requests
            .iter_mut()
            .find(|r| r.id == request_id && !r.played)
        {
            Some(row) => {
                row.played = true;
                row.played_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn bulk_mark_played(
        &self,
        tenant_id: &str,
        exclude: Option<DbId>,
    ) -> Result<u64, StoreError> {
        self.check()?;
        let now = Utc::now();
        let mut changed = 0;
        for row in self.state.lock().await.requests.iter_mut() {
            if row.tenant_id == tenant_id && !row.played && Some(row.id) != exclude {
                row.played = true;
                row.played_at = Some(now);
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn count(&self, tenant_id: &str) -> Result<i64, StoreError> {
        self.check()?;
        Ok(self.state.lock().await.unplayed(tenant_id).len() as i64)
    }

    async fn peek_next(&self, tenant_id: &str, n: i64) -> Result<Vec<QueuedTrack>, StoreError> {
        self.list_unplayed(tenant_id, n, 0).await
    }

    async fn list_unplayed(
        &self,
        tenant_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<QueuedTrack>, StoreError> {
        self.check()?;
        let state = self.state.lock().await;
        Ok(state
            .unplayed(tenant_id)
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.clamp(1, MAX_LIMIT) as usize)
            .filter_map(|r| state.joined(r))
            .collect())
    }

    async fn tenants_with_pending(&self) -> Result<Vec<TenantId>, StoreError> {
        self.check()?;
        let tenants: BTreeSet<_> = self
            .state
            .lock()
            .await
            .requests
            .iter()
            .filter(|r| !r.played)
            .map(|r| r.tenant_id.clone())
            .collect();
        Ok(tenants.into_iter().collect())
    }

    async fn tenant_volume(&self, tenant_id: &str) -> Result<Option<f32>, StoreError> {
        self.check()?;
        Ok(self.state.lock().await.volumes.get(tenant_id).copied())
    }
}
