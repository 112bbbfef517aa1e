//! The per-tenant drain worker.
//!
//! A [`TenantPlayer`] owns its tenant's [`PlaybackSession`] behind one lock
//! and runs a single worker task that drains the queue. Enqueue, skip and
//! skip-all only touch the store, the session tokens and the wake channel,
//! so they return quickly; stream teardown happens inside the worker.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shanty_core::types::TenantId;
use shanty_db::models::track::UpsertTrack;
use shanty_db::models::track_request::{CreateTrackRequest, QueuedTrack};
use shanty_events::{EventBus, QueueEvent};
use tokio::sync::{mpsc, Mutex};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::PlayerConfig;
use crate::error::{PipelineError, PlayerError, ResolveError, StoreError};
use crate::pipeline::{AudioPipeline, StreamOutcome};
use crate::resolver::TrackResolver;
use crate::session::{NowPlaying, PlaybackSession, PlaybackState};
use crate::store::QueueStore;
use crate::voice::VoiceGateway;

/// Collaborators shared by every tenant's player.
pub struct PlayerContext {
    pub store: Arc<dyn QueueStore>,
    pub resolver: Arc<dyn TrackResolver>,
    pub pipeline: Arc<dyn AudioPipeline>,
    pub voice: Arc<dyn VoiceGateway>,
    pub events: Arc<EventBus>,
    pub config: PlayerConfig,
}

/// Who asked for a track, captured at enqueue time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requester {
    pub user_id: String,
    pub display_name: String,
    /// The tenant's display name when the request was made.
    pub tenant_name: String,
}

/// Result of a skip-all.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkipAllOutcome {
    /// Waiting requests marked played.
    pub cleared: u64,
    /// The request that was streaming and got skipped, if any.
    pub current: Option<QueuedTrack>,
}

/// What the drain loop does after one iteration.
enum Step {
    /// Look at the queue again.
    Continue,
    /// End this drain cycle and go Idle.
    Stop,
}

pub struct TenantPlayer {
    tenant_id: TenantId,
    ctx: Arc<PlayerContext>,
    session: Mutex<PlaybackSession>,
    wake_tx: mpsc::Sender<()>,
    /// Tenant lifetime; cancelled on removal or shutdown.
    cancel: CancellationToken,
}

impl TenantPlayer {
    /// Create a player and the receiving end of its wake channel, which
    /// must be handed to [`run`](Self::run).
    pub fn new(
        tenant_id: impl Into<TenantId>,
        ctx: Arc<PlayerContext>,
        cancel: CancellationToken,
    ) -> (Arc<Self>, mpsc::Receiver<()>) {
        // Capacity 1: a pending wake absorbs every further one.
        let (wake_tx, wake_rx) = mpsc::channel(1);
        let player = Arc::new(Self {
            tenant_id: tenant_id.into(),
            ctx,
            session: Mutex::new(PlaybackSession::new(cancel.clone())),
            wake_tx,
            cancel,
        });
        (player, wake_rx)
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Worker loop: one drain cycle per wake signal or fallback tick,
    /// until the tenant token is cancelled.
    pub async fn run(self: Arc<Self>, mut wake_rx: mpsc::Receiver<()>) {
        let mut ticker = self.ctx.config.tick.map(|period| {
            let mut t = tokio::time::interval_at(Instant::now() + period, period);
            t.set_missed_tick_behavior(MissedTickBehavior::Delay);
            t
        });
        tracing::info!(tenant_id = %self.tenant_id, "Player worker started");

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                woke = wake_rx.recv() => {
                    if woke.is_none() {
                        break;
                    }
                }
                _ = next_tick(&mut ticker) => {
                    tracing::trace!(tenant_id = %self.tenant_id, "Fallback tick");
                }
            }
            self.drain().await;
        }

        tracing::info!(tenant_id = %self.tenant_id, "Player worker stopped");
    }

    /// Wake the worker if it is idle. Never blocks; a wake that is already
    /// pending absorbs this one.
    pub fn start_if_idle(&self) {
        match self.wake_tx.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => {}
            Err(mpsc::error::TrySendError::Closed(())) => {
                tracing::debug!(tenant_id = %self.tenant_id, "Wake ignored, worker stopped");
            }
        }
    }

    /// Persist a resolved track as a new request, announce it and wake the
    /// worker.
    pub async fn enqueue(
        &self,
        track: UpsertTrack,
        requester: &Requester,
    ) -> Result<QueuedTrack, PlayerError> {
        let entry = self.insert(track, requester, None).await?;
        // Without a guard token the insert always happens.
        entry.ok_or_else(|| ResolveError::Cancelled.into())
    }

    /// Like [`enqueue`](Self::enqueue), but inserts nothing and returns
    /// `None` if `guard` (a skip-all token) has fired. The check and the
    /// insert are atomic with respect to skip-all.
    pub async fn enqueue_unless(
        &self,
        track: UpsertTrack,
        requester: &Requester,
        guard: &CancellationToken,
    ) -> Result<Option<QueuedTrack>, PlayerError> {
        self.insert(track, requester, Some(guard)).await
    }

    async fn insert(
        &self,
        track: UpsertTrack,
        requester: &Requester,
        guard: Option<&CancellationToken>,
    ) -> Result<Option<QueuedTrack>, PlayerError> {
        let request = CreateTrackRequest {
            tenant_id: self.tenant_id.clone(),
            track_id: track.id.clone(),
            title: track.title.clone(),
            requested_by_user_id: requester.user_id.clone(),
            requested_by_name: requester.display_name.clone(),
            tenant_name_at_time: requester.tenant_name.clone(),
            enqueued_at: None,
        };

        // `Added` goes out before the lock is released: the worker publishes
        // `Playing` under the same lock, so it can never overtake it.
        let entry = {
            let _session = self.session.lock().await;
            if guard.is_some_and(CancellationToken::is_cancelled) {
                tracing::debug!(tenant_id = %self.tenant_id, track_id = %track.id, "Insert dropped after skip-all");
                return Ok(None);
            }
            let entry = self.ctx.store.enqueue(&track, &request).await?;
            self.ctx.events.publish(
                self.tenant_id.clone(),
                QueueEvent::Added {
                    entry: entry.clone(),
                },
            );
            entry
        };

        tracing::info!(
            tenant_id = %self.tenant_id,
            request_id = entry.request.id,
            track_id = %entry.track.id,
            "Request queued"
        );
        self.start_if_idle();
        Ok(Some(entry))
    }

    /// Skip the streaming request: mark it played, then cancel its token.
    /// Returns `None` (and does nothing) when nothing is playing.
    pub async fn skip_current(&self) -> Result<Option<QueuedTrack>, PlayerError> {
        let snapshot = {
            let session = self.session.lock().await;
            match (&session.current, &session.track_cancel) {
                (Some(now), Some(token)) => Some((now.entry.clone(), token.clone())),
                _ => None,
            }
        };
        let Some((entry, token)) = snapshot else {
            return Ok(None);
        };

        // The worker marks it again after the stream returns, so a failed
        // write here only costs the early mark.
        if let Err(e) = self.ctx.store.mark_played(entry.request.id).await {
            tracing::error!(
                tenant_id = %self.tenant_id,
                request_id = entry.request.id,
                error = %e,
                "Failed to mark skipped request played"
            );
        }
        token.cancel();
        tracing::info!(
            tenant_id = %self.tenant_id,
            request_id = entry.request.id,
            "Skip requested"
        );
        Ok(Some(entry))
    }

    /// Clear the whole queue and stop the current track.
    ///
    /// The skip-all token is replaced first, so in-flight resolution
    /// started earlier stops; the bulk mark is committed before
    /// `SkippedAll` is published and before the current track is cancelled.
    pub async fn skip_all(&self) -> Result<SkipAllOutcome, PlayerError> {
        let cleared = {
            // Held across the bulk mark so the worker cannot start a
            // request this sweep is about to mark.
            let mut session = self.session.lock().await;
            session.replace_skip_all();
            let exclude = session.current.as_ref().map(|now| now.entry.request.id);
            let cleared = self
                .ctx
                .store
                .bulk_mark_played(&self.tenant_id, exclude)
                .await?;
            self.ctx
                .events
                .publish(self.tenant_id.clone(), QueueEvent::SkippedAll { cleared });
            cleared
        };
        tracing::info!(tenant_id = %self.tenant_id, cleared, "Queue cleared");

        let current = self.skip_current().await?;
        Ok(SkipAllOutcome { cleared, current })
    }

    /// The token in-flight bulk work should watch; replaced by skip-all.
    pub async fn skip_all_token(&self) -> CancellationToken {
        self.session.lock().await.skip_all.clone()
    }

    pub async fn state(&self) -> PlaybackState {
        self.session.lock().await.state
    }

    pub async fn now_playing(&self) -> Option<NowPlaying> {
        self.session.lock().await.current.clone()
    }

    /// Time left in the current track; `None` when idle or unknown.
    pub async fn time_left(&self) -> Option<Duration> {
        self.now_playing().await.and_then(|now| now.remaining())
    }

    // ---- drain loop ----

    /// One drain cycle: play requests until the queue is empty, a request
    /// cannot be started, or the store fails.
    async fn drain(&self) {
        if !self.session.lock().await.try_begin() {
            tracing::debug!(tenant_id = %self.tenant_id, "Drain already running");
            return;
        }

        while !self.cancel.is_cancelled() {
            match self.play_next().await {
                Ok(Step::Continue) => continue,
                Ok(Step::Stop) => break,
                Err(e) => {
                    tracing::error!(
                        tenant_id = %self.tenant_id,
                        error = %e,
                        "Queue store failed, drain cycle aborted"
                    );
                    break;
                }
            }
        }

        self.session.lock().await.finish_cycle();
    }

    async fn play_next(&self) -> Result<Step, StoreError> {
        let skip_all = self.session.lock().await.skip_all.clone();

        let Some(entry) = self.ctx.store.next_unplayed(&self.tenant_id).await? else {
            tracing::debug!(tenant_id = %self.tenant_id, "Queue empty");
            return Ok(Step::Stop);
        };
        let request_id = entry.request.id;

        let conn = match self.ctx.voice.connection(&self.tenant_id).await {
            Some(conn) if conn.is_ready() => conn,
            _ => {
                self.report_voice_wait(entry).await;
                return Ok(Step::Stop);
            }
        };

        let volume = match self.ctx.store.tenant_volume(&self.tenant_id).await {
            Ok(v) => v.unwrap_or(self.ctx.config.default_volume),
            Err(e) => {
                tracing::warn!(tenant_id = %self.tenant_id, error = %e, "Volume lookup failed");
                self.ctx.config.default_volume
            }
        };

        let token = self.cancel.child_token();
        {
            let mut session = self.session.lock().await;
            if skip_all.is_cancelled() {
                // Swept by a skip-all after it was dequeued.
                return Ok(Step::Continue);
            }
            session.start_track(entry.clone(), token.clone());
            self.ctx.events.publish(
                self.tenant_id.clone(),
                QueueEvent::Playing {
                    entry: entry.clone(),
                },
            );
        }
        tracing::info!(
            tenant_id = %self.tenant_id,
            request_id,
            track_id = %entry.track.id,
            volume,
            "Now playing"
        );

        let result = self
            .ctx
            .pipeline
            .stream(&entry.track, conn, token.clone(), volume)
            .await;

        if self.cancel.is_cancelled() {
            // Interrupted by shutdown: the request was not really played.
            self.session.lock().await.end_track();
            tracing::info!(tenant_id = %self.tenant_id, request_id, "Playback interrupted by shutdown");
            return Ok(Step::Stop);
        }

        let skipped = token.is_cancelled();
        match result {
            Err(e) if !skipped => return self.handle_failure(entry, e).await,
            Err(e) => {
                tracing::debug!(tenant_id = %self.tenant_id, request_id, error = %e, "Stream error after skip");
            }
            Ok(StreamOutcome::Cancelled) | Ok(StreamOutcome::Finished) => {}
        }

        {
            let mut session = self.session.lock().await;
            session.end_track();
            session.clear_failures(request_id);
        }
        self.ctx.store.mark_played(request_id).await?;

        let event = if skipped {
            tracing::info!(tenant_id = %self.tenant_id, request_id, "Track skipped");
            QueueEvent::Skipped { entry }
        } else {
            tracing::info!(tenant_id = %self.tenant_id, request_id, "Track finished");
            QueueEvent::Finished { entry }
        };
        self.ctx.events.publish(self.tenant_id.clone(), event);
        Ok(Step::Continue)
    }

    /// The voice link is down: leave the request queued for the next wake,
    /// reporting it once per request.
    async fn report_voice_wait(&self, entry: QueuedTrack) {
        tracing::warn!(
            tenant_id = %self.tenant_id,
            request_id = entry.request.id,
            "Voice connection not ready, request stays queued"
        );
        let mut session = self.session.lock().await;
        if session.note_voice_wait(entry.request.id) {
            self.ctx.events.publish(
                self.tenant_id.clone(),
                QueueEvent::PlaybackFailed {
                    entry,
                    reason: PipelineError::NotReady.to_string(),
                },
            );
        }
    }

    /// A stream failed on its own. The request stays queued until it has
    /// failed `max_playback_attempts` times in a row, then it is skipped.
    async fn handle_failure(&self, entry: QueuedTrack, err: PipelineError) -> Result<Step, StoreError> {
        let request_id = entry.request.id;
        let attempts = {
            let mut session = self.session.lock().await;
            session.end_track();
            session.record_failure(request_id)
        };
        let max = self.ctx.config.max_playback_attempts;
        tracing::warn!(
            tenant_id = %self.tenant_id,
            request_id,
            attempts,
            max_attempts = max,
            error = %err,
            "Playback failed"
        );
        self.ctx.events.publish(
            self.tenant_id.clone(),
            QueueEvent::PlaybackFailed {
                entry: entry.clone(),
                reason: err.to_string(),
            },
        );

        if attempts < max {
            return Ok(Step::Stop);
        }

        self.ctx.store.mark_played(request_id).await?;
        self.session.lock().await.clear_failures(request_id);
        tracing::warn!(tenant_id = %self.tenant_id, request_id, "Giving up on request");
        self.ctx
            .events
            .publish(self.tenant_id.clone(), QueueEvent::Skipped { entry });
        Ok(Step::Continue)
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending().await,
    }
}
