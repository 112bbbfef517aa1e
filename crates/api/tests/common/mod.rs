//! Test application over the in-memory queue store and scripted
//! collaborators; no Postgres and no subprocesses.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use shanty_api::config::ServerConfig;
use shanty_api::router::build_app_router;
use shanty_api::state::AppState;
use shanty_api::ws::WsManager;
use shanty_core::reference::TrackReference;
use shanty_db::models::track::{Track, UpsertTrack};
use shanty_events::{Broadcaster, EventBus};
use shanty_player::voice::FRAME_BYTES;
use shanty_player::{
    AudioPipeline, ConnectionTable, Jukebox, LiveConnection, MemoryQueueStore, PipelineError,
    PlayerConfig, PlayerContext, PlaylistEntry, Requester, ResolveError, StreamOutcome, TrackResolver,
};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

pub const TENANT: &str = "guild-1";

/// Resolves a reference to a 185 s track named after its last path
/// segment. References containing `missing` are not found; a reference
/// containing `list=` is a three-entry playlist.
pub struct FakeResolver;

#[async_trait]
impl TrackResolver for FakeResolver {
    async fn resolve(
        &self,
        reference: &TrackReference,
        _cancel: &CancellationToken,
    ) -> Result<UpsertTrack, ResolveError> {
        let raw = reference.as_str();
        if raw.contains("missing") {
            return Err(ResolveError::NotFound(raw.to_string()));
        }
        let id = raw.rsplit('/').next().unwrap_or(raw);
        let mut track = UpsertTrack::new(id, format!("https://youtu.be/{id}"), format!("Title {id}"));
        track.duration_secs = Some(185);
        Ok(track)
    }

    async fn resolve_playlist(
        &self,
        reference: &TrackReference,
        _shuffle: bool,
        _cancel: &CancellationToken,
    ) -> Result<Vec<PlaylistEntry>, ResolveError> {
        if !reference.as_str().contains("list=") {
            return Err(ResolveError::NotFound(reference.as_str().to_string()));
        }
        Ok(["p1", "p2", "p3"]
            .iter()
            .map(|id| PlaylistEntry {
                url: format!("https://youtu.be/{id}"),
                title: None,
            })
            .collect())
    }
}

/// Raises the speaking flag, sends one silent frame, then holds the track
/// until it is cancelled.
pub struct HoldingPipeline;

#[async_trait]
impl AudioPipeline for HoldingPipeline {
    async fn stream(
        &self,
        _track: &Track,
        conn: Arc<dyn LiveConnection>,
        cancel: CancellationToken,
        _volume: f32,
    ) -> Result<StreamOutcome, PipelineError> {
        conn.set_speaking(true).await?;
        conn.send_frame(vec![0; FRAME_BYTES]).await?;
        cancel.cancelled().await;
        let _ = conn.set_speaking(false).await;
        Ok(StreamOutcome::Cancelled)
    }
}

pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        heartbeat_interval: None,
        player: PlayerConfig {
            tick: None,
            shutdown_timeout: Duration::from_secs(2),
            ..PlayerConfig::default()
        },
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryQueueStore>,
}

/// Build the full application router with all middleware layers, the
/// event fan-out task running.
pub fn build_test_app() -> TestApp {
    let config = test_config();
    let store = Arc::new(MemoryQueueStore::new());
    let voice = Arc::new(ConnectionTable::new());
    let events = Arc::new(EventBus::default());
    let broadcaster = Arc::new(Broadcaster::default());
    tokio::spawn(Arc::clone(&broadcaster).run(events.subscribe()));

    let jukebox = Arc::new(Jukebox::new(PlayerContext {
        store: store.clone(),
        resolver: Arc::new(FakeResolver),
        pipeline: Arc::new(HoldingPipeline),
        voice: voice.clone(),
        events,
        config: config.player.clone(),
    }));

    let state = AppState {
        config: Arc::new(config.clone()),
        jukebox,
        broadcaster,
        voice,
        ws_manager: Arc::new(WsManager::new()),
    };

    TestApp {
        router: build_app_router(state.clone(), &config),
        state,
        store,
    }
}

impl TestApp {
    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    /// Poll `now-playing` until its state matches.
    pub async fn wait_state(&self, tenant: &str, expected: &str) -> Value {
        let uri = format!("/api/v1/tenants/{tenant}/now-playing");
        for _ in 0..200 {
            let (_, body) = self.get(&uri).await;
            if body["data"]["state"] == expected {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{tenant} never reached state {expected}");
    }
}

pub fn requester() -> Requester {
    Requester {
        user_id: "u1".into(),
        display_name: "DJ".into(),
        tenant_name: "The Guild".into(),
    }
}

pub fn request_body(reference: &str) -> Value {
    serde_json::json!({
        "reference": reference,
        "user_id": "u1",
        "display_name": "DJ",
        "tenant_name": "The Guild",
    })
}

/// A voice connection that is always ready and drops what it is sent.
pub struct NullConnection;

#[async_trait]
impl LiveConnection for NullConnection {
    fn is_ready(&self) -> bool {
        true
    }

    async fn set_speaking(&self, _speaking: bool) -> Result<(), PipelineError> {
        Ok(())
    }

    async fn send_frame(&self, _frame: Vec<u8>) -> Result<(), PipelineError> {
        Ok(())
    }
}
