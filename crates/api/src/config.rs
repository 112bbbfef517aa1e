use std::net::{AddrParseError, IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use shanty_player::PlayerConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Dashboard origins allowed to call the API, deduplicated in order.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`). WebSocket routes
    /// are exempt.
    pub request_timeout_secs: u64,
    /// Ping period for event feeds and voice bridges; `None` disables it.
    pub heartbeat_interval: Option<Duration>,
    /// Scheduler settings (tick, retry limit, subprocess paths, shutdown wait).
    pub player: PlayerConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                 |
    /// |---------------------------|-------------------------|
    /// | `HOST`                    | `0.0.0.0`               |
    /// | `PORT`                    | `3000`                  |
    /// | `CORS_ORIGINS`            | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`    | `30`                    |
    /// | `HEARTBEAT_INTERVAL_SECS` | `30` (`0` disables)     |
    ///
    /// Scheduler variables are read by [`PlayerConfig::from_env`].
    pub fn from_env() -> Self {
        let heartbeat_secs: u64 = env_or("HEARTBEAT_INTERVAL_SECS", 30);

        Self {
            host: env_or("HOST", "0.0.0.0".to_string()),
            port: env_or("PORT", 3000),
            cors_origins: split_origins(
                &std::env::var("CORS_ORIGINS").unwrap_or_else(|_| "http://localhost:5173".into()),
            ),
            request_timeout_secs: env_or::<u64>("REQUEST_TIMEOUT_SECS", 30).max(1),
            heartbeat_interval: (heartbeat_secs > 0).then(|| Duration::from_secs(heartbeat_secs)),
            player: PlayerConfig::from_env(),
        }
    }

    /// Socket address the listener binds to.
    pub fn bind_addr(&self) -> Result<SocketAddr, AddrParseError> {
        let ip: IpAddr = self.host.parse()?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Read `key` or fall back to `default`. Panics on a value that does not
/// parse; only called at startup.
fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{key} is invalid ({raw:?}): {e}")),
        Err(_) => default,
    }
}

/// Comma-separated origins, trimmed, without blanks or repeats.
fn split_origins(raw: &str) -> Vec<String> {
    let mut origins: Vec<String> = Vec::new();
    for origin in raw.split(',').map(|s| s.trim().trim_end_matches('/')) {
        if !origin.is_empty() && !origins.iter().any(|o| o == origin) {
            origins.push(origin.to_string());
        }
    }
    origins
}
