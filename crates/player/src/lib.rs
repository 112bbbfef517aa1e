//! Per-tenant playback scheduling.
//!
//! [`Jukebox`] owns one [`TenantPlayer`] per tenant. Each player runs a
//! drain worker that pulls the oldest unplayed request from the
//! [`QueueStore`], streams it through the [`AudioPipeline`] into the
//! tenant's [`LiveConnection`], marks it played and publishes lifecycle
//! events on the shared [`EventBus`](shanty_events::EventBus).
//!
//! The external collaborators (store, resolver, pipeline, voice gateway)
//! are traits so the scheduler can be exercised without Postgres or
//! subprocesses.

pub mod config;
pub mod error;
pub mod jukebox;
pub mod pipeline;
pub mod player;
pub mod resolver;
pub mod session;
pub mod store;
pub mod voice;

#[cfg(test)]
mod test_support;

pub use config::PlayerConfig;
pub use error::{PipelineError, PlayerError, ResolveError, StoreError};
pub use jukebox::{Jukebox, PlaylistOutcome};
pub use pipeline::{AudioPipeline, FfmpegPipeline, StreamOutcome};
pub use player::{PlayerContext, Requester, SkipAllOutcome, TenantPlayer};
pub use resolver::{PlaylistEntry, TrackResolver, YtDlpResolver};
pub use session::{NowPlaying, PlaybackState};
pub use store::{MemoryQueueStore, PgQueueStore, QueueStore};
pub use voice::{ConnectionTable, LiveConnection, PcmFrame, VoiceGateway};
