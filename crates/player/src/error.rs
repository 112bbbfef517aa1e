//! Error types for the scheduler and its collaborators.

use shanty_core::error::CoreError;

/// Persistence failures. Operational: logged, never shown per user.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Queue store unavailable: {0}")]
    Unavailable(String),
}

/// A reference could not be turned into playable metadata.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("No playable result for {0}")]
    NotFound(String),

    #[error("Resolver binary could not be started: {0}")]
    Spawn(std::io::Error),

    #[error("Resolver failed (exit code {exit_code:?}): {stderr}")]
    Failed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Failed to parse resolver output: {0}")]
    Parse(String),

    #[error("Resolution cancelled")]
    Cancelled,
}

/// Decode or delivery failures while streaming a track.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Voice connection is not ready")]
    NotReady,

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: &'static str,
        source: std::io::Error,
    },

    #[error("Audio stream failed: {0}")]
    Stream(String),

    #[error("Voice connection closed")]
    ConnectionClosed,
}

/// Errors surfaced to the command layer by [`Jukebox`](crate::Jukebox)
/// and [`TenantPlayer`](crate::TenantPlayer).
#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    #[error(transparent)]
    Invalid(#[from] CoreError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
