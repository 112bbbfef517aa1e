use std::sync::Arc;

use shanty_events::{Broadcaster, EventBus};
use shanty_player::{
    ConnectionTable, FfmpegPipeline, Jukebox, PgQueueStore, PlayerContext, YtDlpResolver,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shanty_api::config::ServerConfig;
use shanty_api::router::build_app_router;
use shanty_api::state::AppState;
use shanty_api::ws;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "shanty_api=debug,shanty_player=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = shanty_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    shanty_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    shanty_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Event bus + per-tenant fan-out ---
    let event_bus = Arc::new(EventBus::default());
    let broadcaster = Arc::new(Broadcaster::default());
    let broadcaster_handle = tokio::spawn(Arc::clone(&broadcaster).run(event_bus.subscribe()));
    tracing::info!("Event broadcaster started");

    // --- Scheduler ---
    let voice = Arc::new(ConnectionTable::new());
    let jukebox = Arc::new(Jukebox::new(PlayerContext {
        store: Arc::new(PgQueueStore::new(pool.clone())),
        resolver: Arc::new(YtDlpResolver::new(config.player.ytdlp_path.clone())),
        pipeline: Arc::new(FfmpegPipeline::new(
            config.player.ytdlp_path.clone(),
            config.player.ffmpeg_path.clone(),
        )),
        voice: voice.clone(),
        events: Arc::clone(&event_bus),
        config: config.player.clone(),
    }));

    // Resume queues persisted before the last restart.
    match jukebox.resume_pending().await {
        Ok(count) => tracing::info!(count, "Resumed tenant players"),
        Err(e) => tracing::error!(error = %e, "Failed to find pending queues, none resumed"),
    }

    // --- WebSocket manager + heartbeat ---
    let ws_manager = Arc::new(ws::WsManager::new());
    let heartbeat_shutdown = CancellationToken::new();
    let heartbeat_handle = config.heartbeat_interval.map(|period| {
        ws::start_heartbeat(Arc::clone(&ws_manager), period, heartbeat_shutdown.clone())
    });

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        jukebox: Arc::clone(&jukebox),
        broadcaster: Arc::clone(&broadcaster),
        voice,
        ws_manager: Arc::clone(&ws_manager),
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = config.bind_addr().expect("Invalid HOST address");
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // Stop every tenant worker; current requests stay unplayed.
    jukebox.shutdown().await;

    broadcaster_handle.abort();
    tracing::info!("Event broadcaster stopped");

    let ws_count = ws_manager.connection_count().await;
    tracing::info!(ws_count, "Closing remaining WebSocket connections");
    ws_manager.shutdown_all().await;

    heartbeat_shutdown.cancel();
    if let Some(handle) = heartbeat_handle {
        let _ = handle.await;
        tracing::info!("Heartbeat task stopped");
    }

    pool.close().await;
    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
