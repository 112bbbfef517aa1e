//! Scripted collaborators for scheduler tests: no Postgres, no subprocesses.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use shanty_core::reference::TrackReference;
use shanty_db::models::track::{Track, UpsertTrack};
use shanty_events::{EventBus, QueueEvent, TenantEvent};
use shanty_player::{
    AudioPipeline, ConnectionTable, Jukebox, LiveConnection, MemoryQueueStore, PcmFrame,
    PipelineError, PlayerConfig, PlayerContext, PlaylistEntry, Requester, ResolveError,
    StreamOutcome, TrackResolver,
};
use tokio::sync::{broadcast, oneshot};
use tokio_util::sync::CancellationToken;

pub const TENANT: &str = "guild-1";
const WAIT: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Resolves any reference to a track whose id is the reference's last path
/// segment (or the search term itself). References containing `missing`
/// fail; playlists come from [`FakeResolver::add_playlist`].
#[derive(Default)]
pub struct FakeResolver {
    playlists: Mutex<HashMap<String, Vec<String>>>,
    delays: Mutex<HashMap<String, Duration>>,
    pub calls: AtomicUsize,
}

impl FakeResolver {
    pub fn add_playlist(&self, url: &str, track_ids: &[&str]) {
        self.playlists.lock().unwrap().insert(
            url.to_string(),
            track_ids.iter().map(|s| s.to_string()).collect(),
        );
    }

    /// Delay the resolution of one track id.
    pub fn delay(&self, track_id: &str, delay: Duration) {
        self.delays
            .lock()
            .unwrap()
            .insert(track_id.to_string(), delay);
    }
}

pub fn track_id_of(reference: &str) -> String {
    reference
        .rsplit('/')
        .next()
        .unwrap_or(reference)
        .to_string()
}

#[async_trait]
impl TrackResolver for FakeResolver {
    async fn resolve(
        &self,
        reference: &TrackReference,
        cancel: &CancellationToken,
    ) -> Result<UpsertTrack, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let raw = reference.as_str();
        if raw.contains("missing") {
            return Err(ResolveError::NotFound(raw.to_string()));
        }
        let id = track_id_of(raw);
        let delay = self.delays.lock().unwrap().get(&id).copied();
        if let Some(delay) = delay {
            tokio::select! {
                _ = cancel.cancelled() => return Err(ResolveError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
        let mut track = UpsertTrack::new(&id, format!("https://youtu.be/{id}"), format!("Title {id}"));
        track.duration_secs = Some(180);
        Ok(track)
    }

    async fn resolve_playlist(
        &self,
        reference: &TrackReference,
        _shuffle: bool,
        _cancel: &CancellationToken,
    ) -> Result<Vec<PlaylistEntry>, ResolveError> {
        self.playlists
            .lock()
            .unwrap()
            .get(reference.as_str())
            .map(|ids| {
                ids.iter()
                    .map(|id| PlaylistEntry {
                        url: format!("https://youtu.be/{id}"),
                        title: None,
                    })
                    .collect()
            })
            .ok_or_else(|| ResolveError::NotFound(reference.as_str().to_string()))
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Streams until told to finish or cancelled. Track ids registered with
/// [`ScriptedPipeline::fail`] error out immediately.
#[derive(Default)]
pub struct ScriptedPipeline {
    running: Mutex<HashMap<String, oneshot::Sender<()>>>,
    failing: Mutex<HashSet<String>>,
    started: Mutex<Vec<String>>,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
}

impl ScriptedPipeline {
    pub fn fail(&self, track_id: &str) {
        self.failing.lock().unwrap().insert(track_id.to_string());
    }

    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    /// Let the stream of `track_id` reach its natural end.
    pub async fn finish(&self, track_id: &str) {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            if let Some(tx) = self.running.lock().unwrap().remove(track_id) {
                let _ = tx.send(());
                return;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "{track_id} never started streaming"
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl AudioPipeline for ScriptedPipeline {
    async fn stream(
        &self,
        track: &Track,
        conn: Arc<dyn LiveConnection>,
        cancel: CancellationToken,
        _volume: f32,
    ) -> Result<StreamOutcome, PipelineError> {
        self.started.lock().unwrap().push(track.id.clone());
        if self.failing.lock().unwrap().contains(&track.id) {
            return Err(PipelineError::Stream("decoder exited".into()));
        }

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        conn.set_speaking(true).await?;

        let (tx, rx) = oneshot::channel();
        self.running.lock().unwrap().insert(track.id.clone(), tx);
        let outcome = tokio::select! {
            _ = cancel.cancelled() => StreamOutcome::Cancelled,
            _ = rx => StreamOutcome::Finished,
        };

        self.running.lock().unwrap().remove(&track.id);
        conn.set_speaking(false).await?;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(outcome)
    }
}

// ---------------------------------------------------------------------------
// Voice
// ---------------------------------------------------------------------------

pub struct FakeConnection {
    pub ready: AtomicBool,
    pub speaking: AtomicBool,
}

impl FakeConnection {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            ready: AtomicBool::new(true),
            speaking: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl LiveConnection for FakeConnection {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn set_speaking(&self, speaking: bool) -> Result<(), PipelineError> {
        self.speaking.store(speaking, Ordering::SeqCst);
        Ok(())
    }

    async fn send_frame(&self, _frame: PcmFrame) -> Result<(), PipelineError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub jukebox: Arc<Jukebox>,
    pub store: Arc<MemoryQueueStore>,
    pub resolver: Arc<FakeResolver>,
    pub pipeline: Arc<ScriptedPipeline>,
    pub voice: Arc<ConnectionTable>,
    pub bus: Arc<EventBus>,
    pub events: broadcast::Receiver<TenantEvent>,
}

pub fn requester() -> Requester {
    Requester {
        user_id: "u1".into(),
        display_name: "DJ".into(),
        tenant_name: "The Guild".into(),
    }
}

/// Fallback ticker disabled: progress must come from wake signals alone.
pub fn test_config() -> PlayerConfig {
    PlayerConfig {
        tick: None,
        max_playback_attempts: 2,
        shutdown_timeout: Duration::from_secs(2),
        ..PlayerConfig::default()
    }
}

pub fn harness() -> Harness {
    harness_with(test_config())
}

pub fn harness_with(config: PlayerConfig) -> Harness {
    let store = Arc::new(MemoryQueueStore::new());
    let resolver = Arc::new(FakeResolver::default());
    let pipeline = Arc::new(ScriptedPipeline::default());
    let voice = Arc::new(ConnectionTable::new());
    let events = Arc::new(EventBus::default());
    let rx = events.subscribe();

    let jukebox = Arc::new(Jukebox::new(PlayerContext {
        store: store.clone(),
        resolver: resolver.clone(),
        pipeline: pipeline.clone(),
        voice: voice.clone(),
        events: events.clone(),
        config,
    }));

    Harness {
        jukebox,
        store,
        resolver,
        pipeline,
        voice,
        bus: events,
        events: rx,
    }
}

impl Harness {
    pub async fn connect_voice(&self) -> Arc<FakeConnection> {
        let conn = FakeConnection::new();
        self.voice.attach(TENANT, conn.clone()).await;
        conn
    }

    pub async fn enqueue(&self, reference: &str) -> i64 {
        self.jukebox
            .enqueue_reference(TENANT, reference, &requester())
            .await
            .expect("enqueue")
            .request
            .id
    }

    /// Next event, failing the test after a timeout.
    pub async fn next_event(&mut self) -> QueueEvent {
        tokio::time::timeout(WAIT, self.events.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("event bus open")
            .event
    }

    /// Skip events until one matches `pred`; returns it.
    pub async fn wait_for(&mut self, pred: impl Fn(&QueueEvent) -> bool) -> QueueEvent {
        loop {
            let event = self.next_event().await;
            if pred(&event) {
                return event;
            }
        }
    }

    pub async fn wait_playing(&mut self, request_id: i64) {
        self.wait_for(|e| matches!(e, QueueEvent::Playing { entry } if entry.request.id == request_id))
            .await;
    }

    /// Everything published so far, without waiting.
    pub fn drain_events(&mut self) -> Vec<QueueEvent> {
        let mut out = Vec::new();
        while let Ok(e) = self.events.try_recv() {
            out.push(e.event);
        }
        out
    }

    /// Events arriving over `window`.
    pub async fn collect_for(&mut self, window: Duration) -> Vec<QueueEvent> {
        tokio::time::sleep(window).await;
        self.drain_events()
    }
}
