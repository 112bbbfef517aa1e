//! Classification of user-supplied track references.
//!
//! A reference is whatever a user typed after the play command: either a
//! URL to a track, video, stream or playlist, or a free-text search term
//! that the resolver turns into the first search hit.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Maximum accepted length of a reference, URL or search term.
pub const MAX_REFERENCE_LEN: usize = 2048;

/// Extractor key reported by the resolver for YouTube entries.
pub const YOUTUBE_EXTRACTOR_KEY: &str = "Youtube";

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.-]*://[^\s/?#]+\S*$").expect("valid regex"));

static PLAYLIST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([?&]list=[^&\s]+)|(/playlist(s)?(/|\?|$))|(/sets/)").expect("valid regex"));

/// A parsed, non-empty track reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TrackReference {
    /// An absolute URL.
    Url(String),
    /// A free-text search term.
    Search(String),
}

impl TrackReference {
    /// Parse raw user input.
    ///
    /// Leading and trailing whitespace is ignored; empty or oversized input
    /// is rejected with [`CoreError::Validation`].
    pub fn parse(input: &str) -> Result<Self, CoreError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(CoreError::Validation(
                "A URL or search term is required".to_string(),
            ));
        }
        if trimmed.len() > MAX_REFERENCE_LEN {
            return Err(CoreError::Validation(format!(
                "Reference exceeds {MAX_REFERENCE_LEN} characters"
            )));
        }
        if URL_RE.is_match(trimmed) {
            Ok(Self::Url(trimmed.to_string()))
        } else {
            Ok(Self::Search(trimmed.to_string()))
        }
    }

    /// The raw string handed to the resolver.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Url(s) | Self::Search(s) => s,
        }
    }

    /// Whether the reference points at a playlist rather than one track.
    pub fn is_playlist(&self) -> bool {
        match self {
            Self::Url(url) => PLAYLIST_RE.is_match(url),
            Self::Search(_) => false,
        }
    }
}

/// Canonical short link for a YouTube video id.
pub fn youtube_short_url(video_id: &str) -> String {
    format!("https://youtu.be/{video_id}")
}
