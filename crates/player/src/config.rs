use std::time::Duration;

/// Scheduler configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// Fallback re-check period; `None` disables the ticker so only wake
    /// signals drive playback.
    pub tick: Option<Duration>,
    /// Pipeline failures tolerated for one request before it is skipped.
    pub max_playback_attempts: u32,
    /// Concurrent resolutions while expanding a playlist.
    pub playlist_concurrency: usize,
    /// Volume used when a tenant has none configured.
    pub default_volume: f32,
    /// Path or name of the `yt-dlp` binary.
    pub ytdlp_path: String,
    /// Path or name of the `ffmpeg` binary.
    pub ffmpeg_path: String,
    /// How long shutdown waits for each tenant worker.
    pub shutdown_timeout: Duration,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            tick: Some(Duration::from_secs(30)),
            max_playback_attempts: 3,
            playlist_concurrency: 2,
            default_volume: 0.5,
            ytdlp_path: "yt-dlp".into(),
            ffmpeg_path: "ffmpeg".into(),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl PlayerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default  |
    /// |-------------------------|----------|
    /// | `QUEUE_TICK_SECS`       | `30` (`0` disables) |
    /// | `MAX_PLAYBACK_ATTEMPTS` | `3`      |
    /// | `PLAYLIST_CONCURRENCY`  | `2`      |
    /// | `DEFAULT_VOLUME`        | `0.5`    |
    /// | `YTDLP_PATH`            | `yt-dlp` |
    /// | `FFMPEG_PATH`           | `ffmpeg` |
    /// | `SHUTDOWN_TIMEOUT_SECS` | `10`     |
    ///
    /// Panics on malformed numbers; called once at startup.
    pub fn from_env() -> Self {
        let tick_secs: u64 = std::env::var("QUEUE_TICK_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("QUEUE_TICK_SECS must be a valid u64");

        let max_playback_attempts: u32 = std::env::var("MAX_PLAYBACK_ATTEMPTS")
            .unwrap_or_else(|_| "3".into())
            .parse()
            .expect("MAX_PLAYBACK_ATTEMPTS must be a valid u32");

        let playlist_concurrency: usize = std::env::var("PLAYLIST_CONCURRENCY")
            .unwrap_or_else(|_| "2".into())
            .parse()
            .expect("PLAYLIST_CONCURRENCY must be a valid usize");

        let default_volume: f32 = std::env::var("DEFAULT_VOLUME")
            .unwrap_or_else(|_| "0.5".into())
            .parse()
            .expect("DEFAULT_VOLUME must be a valid f32");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        Self {
            tick: (tick_secs > 0).then(|| Duration::from_secs(tick_secs)),
            max_playback_attempts: max_playback_attempts.max(1),
            playlist_concurrency: playlist_concurrency.max(1),
            default_volume: default_volume.clamp(0.0, 2.0),
            ytdlp_path: std::env::var("YTDLP_PATH").unwrap_or_else(|_| "yt-dlp".into()),
            ffmpeg_path: std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".into()),
            shutdown_timeout: Duration::from_secs(shutdown_timeout_secs),
        }
    }
}
