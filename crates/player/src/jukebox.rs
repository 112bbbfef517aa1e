//! Registry of per-tenant players.
//!
//! [`Jukebox`] maps tenant ids to [`TenantPlayer`] handles, creating a
//! player and spawning its worker on first use. The registry lock is only
//! held to look up or insert a handle; everything else goes through the
//! player's own lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use shanty_core::reference::TrackReference;
use shanty_core::types::TenantId;
use shanty_db::models::track_request::QueuedTrack;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{PlayerError, ResolveError};
use crate::player::{PlayerContext, Requester, SkipAllOutcome, TenantPlayer};
use crate::session::NowPlaying;
use crate::store::QueueStore;

/// Result of expanding a playlist into the queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlaylistOutcome {
    /// Entries listed by the playlist.
    pub total: usize,
    /// Entries resolved and queued.
    pub queued: usize,
    /// Entries that failed to resolve or insert.
    pub failed: usize,
    /// Expansion stopped early because of a skip-all or shutdown.
    pub cancelled: bool,
}

/// Bookkeeping for one tenant's player.
struct ManagedPlayer {
    player: Arc<TenantPlayer>,
    task: JoinHandle<()>,
}

pub struct Jukebox {
    players: RwLock<HashMap<TenantId, ManagedPlayer>>,
    ctx: Arc<PlayerContext>,
    /// Master token; every tenant token is a child of it.
    cancel: CancellationToken,
}

impl Jukebox {
    pub fn new(ctx: PlayerContext) -> Self {
        Self {
            players: RwLock::new(HashMap::new()),
            ctx: Arc::new(ctx),
            cancel: CancellationToken::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn QueueStore> {
        &self.ctx.store
    }

    /// The tenant's player, created (and its worker spawned) on first use.
    pub async fn player(&self, tenant_id: &str) -> Arc<TenantPlayer> {
        if let Some(managed) = self.players.read().await.get(tenant_id) {
            return Arc::clone(&managed.player);
        }

        let mut players = self.players.write().await;
        let managed = players.entry(tenant_id.to_string()).or_insert_with(|| {
            let (player, wake_rx) = TenantPlayer::new(
                tenant_id,
                Arc::clone(&self.ctx),
                self.cancel.child_token(),
            );
            let task = tokio::spawn(Arc::clone(&player).run(wake_rx));
            tracing::debug!(tenant_id, "Player created");
            ManagedPlayer { player, task }
        });
        Arc::clone(&managed.player)
    }

    /// The tenant's player if one exists.
    pub async fn get(&self, tenant_id: &str) -> Option<Arc<TenantPlayer>> {
        self.players
            .read()
            .await
            .get(tenant_id)
            .map(|m| Arc::clone(&m.player))
    }

    pub async fn tenants(&self) -> Vec<TenantId> {
        self.players.read().await.keys().cloned().collect()
    }

    /// Nudge a player for every tenant with unplayed requests, so queues
    /// persisted before a restart resume. Returns how many were woken.
    pub async fn resume_pending(&self) -> Result<usize, PlayerError> {
        let tenants = self.ctx.store.tenants_with_pending().await?;
        for tenant_id in &tenants {
            self.player(tenant_id).await.start_if_idle();
        }
        Ok(tenants.len())
    }

    pub async fn start_if_idle(&self, tenant_id: &str) {
        self.player(tenant_id).await.start_if_idle();
    }

    /// A live connection became available for the tenant.
    pub async fn on_voice_ready(&self, tenant_id: &str) {
        tracing::debug!(tenant_id, "Voice ready, waking player");
        self.start_if_idle(tenant_id).await;
    }

    /// Resolve one URL or search term and queue it.
    ///
    /// Resolution watches the tenant's skip-all token, so a skip-all issued
    /// meanwhile aborts it.
    pub async fn enqueue_reference(
        &self,
        tenant_id: &str,
        raw: &str,
        requester: &Requester,
    ) -> Result<QueuedTrack, PlayerError> {
        let reference = TrackReference::parse(raw)?;
        let player = self.player(tenant_id).await;
        let skip_all = player.skip_all_token().await;

        let track = self.ctx.resolver.resolve(&reference, &skip_all).await?;
        player
            .enqueue_unless(track, requester, &skip_all)
            .await?
            .ok_or_else(|| ResolveError::Cancelled.into())
    }

    /// Expand a playlist and queue every entry in playlist order.
    ///
    /// Entries are resolved `playlist_concurrency` at a time. The skip-all
    /// token captured at the start is checked before every resolution and
    /// insertion; once it fires the expansion stops. Entry failures are
    /// counted, not fatal.
    pub async fn enqueue_playlist(
        &self,
        tenant_id: &str,
        raw: &str,
        requester: &Requester,
        shuffle: bool,
    ) -> Result<PlaylistOutcome, PlayerError> {
        let reference = TrackReference::parse(raw)?;
        let player = self.player(tenant_id).await;
        let skip_all = player.skip_all_token().await;

        let entries = self
            .ctx
            .resolver
            .resolve_playlist(&reference, shuffle, &skip_all)
            .await?;
        let mut outcome = PlaylistOutcome {
            total: entries.len(),
            ..Default::default()
        };
        tracing::info!(tenant_id, entries = outcome.total, shuffle, "Expanding playlist");

        let resolver = &self.ctx.resolver;
        let token = &skip_all;
        let mut resolved = stream::iter(entries)
            .map(|entry| async move {
                if token.is_cancelled() {
                    return (entry, Err(ResolveError::Cancelled));
                }
                let result = resolver
                    .resolve(&TrackReference::Url(entry.url.clone()), token)
                    .await;
                (entry, result)
            })
            .buffered(self.ctx.config.playlist_concurrency.max(1));

        while let Some((entry, result)) = resolved.next().await {
            if skip_all.is_cancelled() {
                outcome.cancelled = true;
                break;
            }
            match result {
                Ok(track) => match player.enqueue_unless(track, requester, &skip_all).await {
                    Ok(Some(_)) => outcome.queued += 1,
                    Ok(None) => {
                        outcome.cancelled = true;
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(tenant_id, url = %entry.url, error = %e, "Failed to queue playlist entry");
                        outcome.failed += 1;
                    }
                },
                Err(ResolveError::Cancelled) => {
                    outcome.cancelled = true;
                    break;
                }
                Err(e) => {
                    tracing::warn!(tenant_id, url = %entry.url, error = %e, "Failed to resolve playlist entry");
                    outcome.failed += 1;
                }
            }
        }

        tracing::info!(
            tenant_id,
            queued = outcome.queued,
            failed = outcome.failed,
            cancelled = outcome.cancelled,
            "Playlist expansion done"
        );
        Ok(outcome)
    }

    /// Skip the current track. `None` when nothing is playing.
    pub async fn skip_current(&self, tenant_id: &str) -> Result<Option<QueuedTrack>, PlayerError> {
        match self.get(tenant_id).await {
            Some(player) => player.skip_current().await,
            None => Ok(None),
        }
    }

    pub async fn skip_all(&self, tenant_id: &str) -> Result<SkipAllOutcome, PlayerError> {
        self.player(tenant_id).await.skip_all().await
    }

    pub async fn count(&self, tenant_id: &str) -> Result<i64, PlayerError> {
        Ok(self.ctx.store.count(tenant_id).await?)
    }

    pub async fn peek_next(&self, tenant_id: &str, n: i64) -> Result<Vec<QueuedTrack>, PlayerError> {
        Ok(self.ctx.store.peek_next(tenant_id, n).await?)
    }

    pub async fn list_unplayed(
        &self,
        tenant_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<QueuedTrack>, PlayerError> {
        Ok(self.ctx.store.list_unplayed(tenant_id, limit, offset).await?)
    }

    pub async fn now_playing(&self, tenant_id: &str) -> Option<NowPlaying> {
        self.get(tenant_id).await?.now_playing().await
    }

    pub async fn time_left(&self, tenant_id: &str) -> Option<Duration> {
        self.get(tenant_id).await?.time_left().await
    }

    /// Stop a tenant's worker and forget its player. The streaming request,
    /// if any, stays unplayed.
    pub async fn remove_tenant(&self, tenant_id: &str) -> bool {
        let Some(managed) = self.players.write().await.remove(tenant_id) else {
            return false;
        };
        managed.player.cancel_token().cancel();
        match tokio::time::timeout(self.ctx.config.shutdown_timeout, managed.task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(tenant_id, error = %e, "Player worker panicked"),
            Err(_) => tracing::warn!(tenant_id, "Player worker did not stop in time"),
        }
        tracing::info!(tenant_id, "Player removed");
        true
    }

    /// Cancel every worker and wait (bounded) for each to exit.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down jukebox");
        self.cancel.cancel();

        let drained: Vec<_> = self.players.write().await.drain().collect();
        for (tenant_id, managed) in drained {
            match tokio::time::timeout(self.ctx.config.shutdown_timeout, managed.task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(tenant_id = %tenant_id, error = %e, "Player worker panicked"),
                Err(_) => tracing::warn!(tenant_id = %tenant_id, "Player worker did not stop in time"),
            }
        }

        tracing::info!("Jukebox shut down complete");
    }
}
