//! In-memory playback state of one tenant.

use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use shanty_core::types::{DbId, Timestamp};
use shanty_db::models::track_request::QueuedTrack;
use tokio_util::sync::CancellationToken;

/// Where a tenant's drain worker is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    /// Nothing streaming and no drain cycle running.
    Idle,
    /// A request was dequeued and the pipeline is being started.
    Loading,
    /// The pipeline is streaming the current request.
    Playing,
    /// The stream ended; the request is being marked played.
    Draining,
}

/// Snapshot of the request currently streaming.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NowPlaying {
    pub entry: QueuedTrack,
    pub started_at: Timestamp,
    /// Track length when known.
    pub duration_secs: Option<u64>,
}

impl NowPlaying {
    pub fn new(entry: QueuedTrack) -> Self {
        let duration_secs = entry
            .track
            .duration_secs
            .and_then(|d| u64::try_from(d).ok());
        Self {
            entry,
            started_at: Utc::now(),
            duration_secs,
        }
    }

    /// Time left at `now`, saturating at zero. `None` for unknown
    /// durations (live streams).
    pub fn remaining_at(&self, now: Timestamp) -> Option<Duration> {
        let total = Duration::from_secs(self.duration_secs?);
        let elapsed = (now - self.started_at).to_std().unwrap_or_default();
        Some(total.saturating_sub(elapsed))
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.remaining_at(Utc::now())
    }
}

/// Consecutive pipeline failures of one request.
#[derive(Debug, Default)]
struct FailureCount {
    request_id: Option<DbId>,
    attempts: u32,
}

/// Mutable per-tenant session, guarded by the player's lock.
///
/// Cancellation tokens are replaced, never reused: `track_cancel` on every
/// track start, `skip_all` on every skip-all.
#[derive(Debug)]
pub(crate) struct PlaybackSession {
    pub(crate) state: PlaybackState,
    pub(crate) current: Option<NowPlaying>,
    pub(crate) track_cancel: Option<CancellationToken>,
    pub(crate) skip_all: CancellationToken,
    /// Parent of every skip-all token; the tenant's lifetime token.
    parent: CancellationToken,
    failures: FailureCount,
    /// Request whose voice-not-ready failure was already reported.
    voice_wait: Option<DbId>,
}

impl PlaybackSession {
    pub(crate) fn new(parent: CancellationToken) -> Self {
        Self {
            state: PlaybackState::Idle,
            current: None,
            track_cancel: None,
            skip_all: parent.child_token(),
            parent,
            failures: FailureCount::default(),
            voice_wait: None,
        }
    }

    /// Test-and-set Idle -> Loading. Only the caller that gets `true`
    /// runs a drain cycle.
    pub(crate) fn try_begin(&mut self) -> bool {
        if self.state != PlaybackState::Idle {
            return false;
        }
        self.state = PlaybackState::Loading;
        true
    }

    pub(crate) fn start_track(&mut self, entry: QueuedTrack, token: CancellationToken) {
        self.voice_wait = None;
        self.state = PlaybackState::Playing;
        self.current = Some(NowPlaying::new(entry));
        self.track_cancel = Some(token);
    }

    /// Leave Playing for Draining, dropping the current track.
    pub(crate) fn end_track(&mut self) {
        self.state = PlaybackState::Draining;
        self.current = None;
        self.track_cancel = None;
    }

    /// Back to Idle after a drain cycle.
    pub(crate) fn finish_cycle(&mut self) {
        self.state = PlaybackState::Idle;
        self.current = None;
        self.track_cancel = None;
    }

    /// Count one more failure of `request_id` and return the total.
    pub(crate) fn record_failure(&mut self, request_id: DbId) -> u32 {
        if self.failures.request_id != Some(request_id) {
            self.failures = FailureCount {
                request_id: Some(request_id),
                attempts: 0,
            };
        }
        self.failures.attempts += 1;
        self.failures.attempts
    }

    pub(crate) fn clear_failures(&mut self, request_id: DbId) {
        if self.failures.request_id == Some(request_id) {
            self.failures = FailureCount::default();
        }
    }

    /// Remember that `request_id` is waiting on voice. Returns `false` if
    /// it was already waiting, so the wait is reported once.
    pub(crate) fn note_voice_wait(&mut self, request_id: DbId) -> bool {
        self.voice_wait.replace(request_id) != Some(request_id)
    }

    /// Cancel the current skip-all token and install a fresh one.
    pub(crate) fn replace_skip_all(&mut self) -> CancellationToken {
        let fresh = self.parent.child_token();
        let old = std::mem::replace(&mut self.skip_all, fresh.clone());
        old.cancel();
        fresh
    }
}

#[cfg(test)]
mod tests {
    use shanty_db::models::track::UpsertTrack;
    use shanty_db::models::track_request::TrackRequest;

    use super::*;

    fn entry(id: DbId, duration: Option<i32>) -> QueuedTrack {
        let now = Utc::now();
        let mut track = UpsertTrack::new("a", "https://youtu.be/a", "a");
        track.duration_secs = duration;
        QueuedTrack {
            request: TrackRequest {
                id,
                tenant_id: "g1".into(),
                track_id: "a".into(),
                title: "a".into(),
                requested_by_user_id: "u".into(),
                requested_by_name: "u".into(),
                tenant_name_at_time: "g".into(),
                enqueued_at: now,
                played: false,
                played_at: None,
            },
            track: track.into_track(now, now),
        }
    }

    #[test]
    fn try_begin_is_single_flight() {
        let mut s = PlaybackSession::new(CancellationToken::new());
        assert!(s.try_begin());
        assert!(!s.try_begin());
        s.finish_cycle();
        assert!(s.try_begin());
    }

    #[test]
    fn replace_skip_all_cancels_old_token() {
        let mut s = PlaybackSession::new(CancellationToken::new());
        let old = s.skip_all.clone();
        let fresh = s.replace_skip_all();
        assert!(old.is_cancelled());
        assert!(!fresh.is_cancelled());
        assert!(!s.skip_all.is_cancelled());
    }

    #[test]
    fn skip_all_tokens_follow_the_parent() {
        let parent = CancellationToken::new();
        let mut s = PlaybackSession::new(parent.clone());
        let token = s.replace_skip_all();
        parent.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn failures_count_per_request() {
        let mut s = PlaybackSession::new(CancellationToken::new());
        assert_eq!(s.record_failure(1), 1);
        assert_eq!(s.record_failure(1), 2);
        assert_eq!(s.record_failure(2), 1);
        s.clear_failures(2);
        assert_eq!(s.record_failure(2), 1);
    }

    #[test]
    fn voice_wait_reported_once_per_request() {
        let mut s = PlaybackSession::new(CancellationToken::new());
        assert!(s.note_voice_wait(1));
        assert!(!s.note_voice_wait(1));
        assert!(s.note_voice_wait(2));
    }

    #[test]
    fn remaining_time() {
        let np = NowPlaying::new(entry(1, Some(100)));
        let later = np.started_at + chrono::Duration::seconds(40);
        assert_eq!(np.remaining_at(later), Some(Duration::from_secs(60)));

        let past_end = np.started_at + chrono::Duration::seconds(500);
        assert_eq!(np.remaining_at(past_end), Some(Duration::ZERO));

        let stream = NowPlaying::new(entry(2, None));
        assert_eq!(stream.remaining(), None);
    }
}
