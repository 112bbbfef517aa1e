//! Queue lifecycle events.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use shanty_core::types::{DbId, TenantId, Timestamp};
use shanty_db::models::track_request::QueuedTrack;

/// A single lifecycle transition of a tenant's queue.
///
/// Every variant that concerns one request carries the request together
/// with its track, so a subscriber can render a message without querying
/// the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEvent {
    /// A request was appended to the queue.
    Added { entry: QueuedTrack },
    /// A request started streaming.
    Playing { entry: QueuedTrack },
    /// A request streamed to its natural end.
    Finished { entry: QueuedTrack },
    /// A request was cut short, either by a skip or by giving up on it.
    Skipped { entry: QueuedTrack },
    /// The whole queue was cleared. `cleared` counts the waiting requests
    /// that were marked played.
    SkippedAll { cleared: u64 },
    /// Streaming a request failed. Not terminal: the request stays queued
    /// until it plays or is skipped.
    PlaybackFailed { entry: QueuedTrack, reason: String },
}

impl QueueEvent {
    /// Short stable name, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Added { .. } => "added",
            Self::Playing { .. } => "playing",
            Self::Finished { .. } => "finished",
            Self::Skipped { .. } => "skipped",
            Self::SkippedAll { .. } => "skipped_all",
            Self::PlaybackFailed { .. } => "playback_failed",
        }
    }

    /// Id of the request this event is about, if it concerns one.
    pub fn request_id(&self) -> Option<DbId> {
        match self {
            Self::Added { entry }
            | Self::Playing { entry }
            | Self::Finished { entry }
            | Self::Skipped { entry }
            | Self::PlaybackFailed { entry, .. } => Some(entry.request.id),
            Self::SkippedAll { .. } => None,
        }
    }

    /// Whether this event ends a `Playing` event for the same request.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished { .. } | Self::Skipped { .. })
    }
}

/// A [`QueueEvent`] addressed to one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantEvent {
    pub tenant_id: TenantId,
    #[serde(flatten)]
    pub event: QueueEvent,
    pub timestamp: Timestamp,
}

impl TenantEvent {
    pub fn new(tenant_id: impl Into<TenantId>, event: QueueEvent) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            event,
            timestamp: Utc::now(),
        }
    }
}
