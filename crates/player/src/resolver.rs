//! Turning user references into track metadata.
//!
//! [`YtDlpResolver`] shells out to `yt-dlp` in simulate mode and parses its
//! JSON output. Resolution can take tens of seconds, so every call runs
//! under a cancellation token and the child is killed when it fires.

use std::borrow::Cow;
use std::process::Stdio;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde::Deserialize;
use shanty_core::reference::{youtube_short_url, TrackReference, YOUTUBE_EXTRACTOR_KEY};
use shanty_db::models::track::UpsertTrack;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::ResolveError;

/// One entry of a flat playlist listing, not yet resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistEntry {
    pub url: String,
    pub title: Option<String>,
}

#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Resolve one URL or search term to its first playable result.
    async fn resolve(
        &self,
        reference: &TrackReference,
        cancel: &CancellationToken,
    ) -> Result<UpsertTrack, ResolveError>;

    /// List the entries of a playlist, optionally shuffled.
    async fn resolve_playlist(
        &self,
        reference: &TrackReference,
        shuffle: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<PlaylistEntry>, ResolveError>;
}

// ---------------------------------------------------------------------------
// yt-dlp JSON output
// ---------------------------------------------------------------------------

/// The subset of a `yt-dlp --print-json` object we keep.
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: Option<String>,
    #[serde(rename = "_type")]
    kind: Option<String>,
    ie_key: Option<String>,
    extractor_key: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
    title: Option<String>,
    artist: Option<String>,
    creator: Option<String>,
    album: Option<String>,
    track_number: Option<serde_json::Value>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    description: Option<String>,
    is_live: Option<bool>,
}

impl YtDlpInfo {
    fn into_track(self, reference: &str) -> Result<UpsertTrack, ResolveError> {
        let id = self
            .id
            .ok_or_else(|| ResolveError::NotFound(reference.to_string()))?;
        let url = self
            .webpage_url
            .or(self.url)
            .unwrap_or_else(|| reference.to_string());

        Ok(UpsertTrack {
            title: self.title.unwrap_or_else(|| id.clone()),
            artist: self.artist.or(self.creator),
            album: self.album,
            track_number: self.track_number.map(|n| match n {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            }),
            duration_secs: self.duration.map(|d| d.round() as i32),
            thumbnail_url: self.thumbnail,
            platform: self.extractor_key,
            description: self.description,
            is_stream: self.is_live.unwrap_or(false),
            id,
            url,
        })
    }

    fn into_entry(self) -> Option<PlaylistEntry> {
        let is_youtube_ref = self.kind.as_deref() == Some("url")
            && self.ie_key.as_deref() == Some(YOUTUBE_EXTRACTOR_KEY);
        let url = if is_youtube_ref {
            youtube_short_url(self.id.as_deref().or(self.url.as_deref())?)
        } else {
            self.url.or(self.webpage_url)?
        };
        Some(PlaylistEntry {
            url,
            title: self.title,
        })
    }
}

/// Parse a single-track JSON document.
fn parse_track(stdout: &[u8], reference: &str) -> Result<UpsertTrack, ResolveError> {
    let text = String::from_utf8_lossy(stdout);
    // A search prints one object per hit; only the first is wanted.
    let first = text
        .lines()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| ResolveError::NotFound(reference.to_string()))?;
    serde_json::from_str::<YtDlpInfo>(first)
        .map_err(|e| ResolveError::Parse(e.to_string()))?
        .into_track(reference)
}

/// Parse flat-playlist output: one JSON object per line. Lines that fail
/// to decode are skipped.
fn parse_playlist(stdout: &[u8]) -> Vec<PlaylistEntry> {
    String::from_utf8_lossy(stdout)
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| match serde_json::from_str::<YtDlpInfo>(l) {
            Ok(info) => info.into_entry(),
            Err(e) => {
                tracing::debug!(error = %e, "Skipping undecodable playlist entry");
                None
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// YtDlpResolver
// ---------------------------------------------------------------------------

/// yt-dlp query prefix for "first search hit".
const SEARCH_PREFIX: &str = "ytsearch1:";

/// The positional argument handed to yt-dlp. Always passed after `--`, so
/// user text can never be read as an option.
fn ytdlp_target(reference: &TrackReference) -> Cow<'_, str> {
    match reference {
        TrackReference::Url(url) => Cow::Borrowed(url),
        TrackReference::Search(term) => Cow::Owned(format!("{SEARCH_PREFIX}{term}")),
    }
}

/// [`TrackResolver`] backed by the `yt-dlp` binary.
#[derive(Debug, Clone)]
pub struct YtDlpResolver {
    program: String,
}

impl YtDlpResolver {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Run yt-dlp with `args`, returning stdout. The child is killed if
    /// `cancel` fires first.
    async fn run(&self, args: &[&str], cancel: &CancellationToken) -> Result<Vec<u8>, ResolveError> {
        let child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(ResolveError::Spawn)?;

        // Dropping the in-flight `wait_with_output` future drops the child,
        // which kills it.
        let output = tokio::select! {
            _ = cancel.cancelled() => return Err(ResolveError::Cancelled),
            output = child.wait_with_output() => output.map_err(ResolveError::Spawn)?,
        };

        if !output.status.success() {
            return Err(ResolveError::Failed {
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }
}

impl Default for YtDlpResolver {
    fn default() -> Self {
        Self::new("yt-dlp")
    }
}

#[async_trait]
impl TrackResolver for YtDlpResolver {
    async fn resolve(
        &self,
        reference: &TrackReference,
        cancel: &CancellationToken,
    ) -> Result<UpsertTrack, ResolveError> {
        let target = ytdlp_target(reference);
        tracing::debug!(reference = %reference.as_str(), "Resolving track");
        let stdout = self
            .run(
                &[
                    "--simulate",
                    "--print-json",
                    "--no-progress",
                    "--no-playlist",
                    "--no-mtime",
                    "--",
                    target.as_ref(),
                ],
                cancel,
            )
            .await?;
        parse_track(&stdout, target.as_ref())
    }

    async fn resolve_playlist(
        &self,
        reference: &TrackReference,
        shuffle: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<PlaylistEntry>, ResolveError> {
        let target = ytdlp_target(reference);
        tracing::debug!(reference = %reference.as_str(), shuffle, "Listing playlist");
        let stdout = self
            .run(
                &[
                    "--simulate",
                    "--dump-json",
                    "--no-progress",
                    "--flat-playlist",
                    "--no-mtime",
                    "--",
                    target.as_ref(),
                ],
                cancel,
            )
            .await?;

        let mut entries = parse_playlist(&stdout);
        if entries.is_empty() {
            return Err(ResolveError::NotFound(reference.as_str().to_string()));
        }
        if shuffle {
            entries.shuffle(&mut rand::rng());
        }
        Ok(entries)
    }
}
