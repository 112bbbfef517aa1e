//! Decoding a track and streaming it into a live connection.
//!
//! [`FfmpegPipeline`] pipes `yt-dlp -o -` into `ffmpeg`, which emits raw
//! 48 kHz stereo s16le on stdout. Frames are read off ffmpeg's stdout and
//! paced at one per [`FRAME_DURATION`]. Both children are spawned with
//! `kill_on_drop`, so every exit path tears them down.

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use shanty_db::models::track::Track;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;
use crate::voice::{LiveConnection, FRAME_BYTES, FRAME_DURATION};

/// How a stream ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The source reached end of stream.
    Finished,
    /// The cancellation token fired first.
    Cancelled,
}

#[async_trait]
pub trait AudioPipeline: Send + Sync {
    /// Stream `track` into `conn` until end of stream, failure or
    /// cancellation. Implementations must leave the speaking indicator
    /// off on every exit path.
    async fn stream(
        &self,
        track: &Track,
        conn: Arc<dyn LiveConnection>,
        cancel: CancellationToken,
        volume: f32,
    ) -> Result<StreamOutcome, PipelineError>;
}

/// Read up to one frame. Returns the number of bytes read; fewer than
/// [`FRAME_BYTES`] means the source is exhausted.
async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    frame: &mut [u8],
) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < frame.len() {
        let n = reader.read(&mut frame[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Pump PCM from `reader` into `conn`, with the speaking indicator on for
/// the duration. A trailing partial frame is dropped.
pub async fn play_pcm<R: AsyncRead + Unpin>(
    reader: &mut R,
    conn: &dyn LiveConnection,
    cancel: &CancellationToken,
) -> Result<StreamOutcome, PipelineError> {
    conn.set_speaking(true).await?;
    let result = pump_frames(reader, conn, cancel).await;
    if let Err(e) = conn.set_speaking(false).await {
        tracing::warn!(error = %e, "Failed to clear speaking indicator");
    }
    result
}

async fn pump_frames<R: AsyncRead + Unpin>(
    reader: &mut R,
    conn: &dyn LiveConnection,
    cancel: &CancellationToken,
) -> Result<StreamOutcome, PipelineError> {
    let mut pacer = tokio::time::interval(FRAME_DURATION);
    pacer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut frames: u64 = 0;

    loop {
        let mut frame = vec![0u8; FRAME_BYTES];
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(StreamOutcome::Cancelled),
            read = read_frame(reader, &mut frame) => {
                read.map_err(|e| PipelineError::Stream(e.to_string()))?
            }
        };
        if read < FRAME_BYTES {
            tracing::debug!(frames, "Audio source exhausted");
            return Ok(StreamOutcome::Finished);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(StreamOutcome::Cancelled),
            _ = pacer.tick() => {}
        }
        if !conn.is_ready() {
            return Err(PipelineError::ConnectionClosed);
        }
        conn.send_frame(frame).await?;
        frames += 1;
    }
}

// ---------------------------------------------------------------------------
// FfmpegPipeline
// ---------------------------------------------------------------------------

/// [`AudioPipeline`] built on `yt-dlp` and `ffmpeg` subprocesses.
#[derive(Debug, Clone)]
pub struct FfmpegPipeline {
    ytdlp_path: String,
    ffmpeg_path: String,
}

impl FfmpegPipeline {
    pub fn new(ytdlp_path: impl Into<String>, ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ytdlp_path: ytdlp_path.into(),
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    fn spawn_download(&self, url: &str) -> Result<Child, PipelineError> {
        Command::new(&self.ytdlp_path)
            .args([
                "--no-progress",
                "--default-search",
                "ytsearch",
                "--no-playlist",
                "--no-mtime",
                "--format",
                "bestaudio/worstvideo/best",
                "--quiet",
                "-o",
                "-",
                "--",
            ])
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| PipelineError::Spawn {
                program: "yt-dlp",
                source,
            })
    }

    fn spawn_decoder(&self, input: Stdio, volume: f32) -> Result<Child, PipelineError> {
        Command::new(&self.ffmpeg_path)
            .args([
                "-hide_banner",
                "-loglevel",
                "error",
                "-i",
                "pipe:0",
                "-vn",
                "-acodec",
                "pcm_s16le",
                "-f",
                "s16le",
                "-ar",
                "48000",
                "-ac",
                "2",
                "-af",
            ])
            .arg(format!("volume={volume:.3}"))
            .arg("pipe:1")
            .stdin(input)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| PipelineError::Spawn {
                program: "ffmpeg",
                source,
            })
    }
}

impl Default for FfmpegPipeline {
    fn default() -> Self {
        Self::new("yt-dlp", "ffmpeg")
    }
}

#[async_trait]
impl AudioPipeline for FfmpegPipeline {
    async fn stream(
        &self,
        track: &Track,
        conn: Arc<dyn LiveConnection>,
        cancel: CancellationToken,
        volume: f32,
    ) -> Result<StreamOutcome, PipelineError> {
        let mut download = self.spawn_download(&track.url)?;
        let source: Stdio = download
            .stdout
            .take()
            .ok_or_else(|| PipelineError::Stream("yt-dlp stdout unavailable".into()))?
            .try_into()
            .map_err(|e: std::io::Error| PipelineError::Stream(e.to_string()))?;

        let mut decoder = self.spawn_decoder(source, volume)?;
        let stdout = decoder
            .stdout
            .take()
            .ok_or_else(|| PipelineError::Stream("ffmpeg stdout unavailable".into()))?;
        let mut reader = BufReader::with_capacity(16 * 1024, stdout);

        tracing::debug!(track_id = %track.id, volume, "Audio pipeline started");
        let result = play_pcm(&mut reader, conn.as_ref(), &cancel).await;

        match result {
            Ok(StreamOutcome::Finished) => {
                let _ = download.wait().await;
                // A failed download reaches ffmpeg as empty or truncated
                // input, so the decoder's status decides.
                match decoder.wait().await {
                    Ok(status) if !status.success() => {
                        return Err(PipelineError::Stream(format!("ffmpeg exited with {status}")));
                    }
                    Ok(_) => {}
                    Err(e) => return Err(PipelineError::Stream(e.to_string())),
                }
            }
            _ => {
                let _ = decoder.kill().await;
                let _ = download.kill().await;
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    use assert_matches::assert_matches;

    use super::*;
    use crate::test_support::StubProgram;
    use crate::voice::PcmFrame;

    #[derive(Default)]
    struct Recorder {
        closed: AtomicBool,
        frames: AtomicUsize,
        speaking: Mutex<Vec<bool>>,
    }

    #[async_trait]
    impl LiveConnection for Recorder {
        fn is_ready(&self) -> bool {
            !self.closed.load(Ordering::SeqCst)
        }
        async fn set_speaking(&self, speaking: bool) -> Result<(), PipelineError> {
            self.speaking.lock().unwrap().push(speaking);
            Ok(())
        }
        async fn send_frame(&self, frame: PcmFrame) -> Result<(), PipelineError> {
            assert_eq!(frame.len(), FRAME_BYTES);
            self.frames.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn sends_whole_frames_and_drops_the_tail() {
        let pcm = vec![0u8; FRAME_BYTES * 3 + 100];
        let conn = Recorder::default();

        let outcome = play_pcm(&mut pcm.as_slice(), &conn, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome, StreamOutcome::Finished);
        assert_eq!(conn.frames.load(Ordering::SeqCst), 3);
        assert_eq!(*conn.speaking.lock().unwrap(), vec![true, false]);
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_sending() {
        let pcm = vec![0u8; FRAME_BYTES * 50];
        let conn = Recorder::default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = play_pcm(&mut pcm.as_slice(), &conn, &cancel).await.unwrap();

        assert_eq!(outcome, StreamOutcome::Cancelled);
        assert_eq!(conn.frames.load(Ordering::SeqCst), 0);
        assert_eq!(*conn.speaking.lock().unwrap(), vec![true, false]);
    }

    #[tokio::test]
    async fn closed_connection_fails_and_clears_speaking() {
        let pcm = vec![0u8; FRAME_BYTES * 2];
        let conn = Recorder::default();
        conn.closed.store(true, Ordering::SeqCst);

        let result = play_pcm(&mut pcm.as_slice(), &conn, &CancellationToken::new()).await;

        assert_matches!(result, Err(PipelineError::ConnectionClosed));
        assert_eq!(*conn.speaking.lock().unwrap(), vec![true, false]);
    }

    #[tokio::test]
    async fn download_url_follows_option_terminator() {
        let stub = StubProgram::new("download", "");
        let pipeline = FfmpegPipeline::new(stub.path(), "ffmpeg");

        let mut child = pipeline.spawn_download("--batch-file=/etc/passwd").unwrap();
        assert!(child.wait().await.unwrap().success());

        let argv = stub.argv();
        assert_eq!(argv[argv.len() - 2..], ["--", "--batch-file=/etc/passwd"]);
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let pipeline = FfmpegPipeline::new("/nonexistent/yt-dlp", "/nonexistent/ffmpeg");
        let track = shanty_db::models::track::UpsertTrack::new("a", "https://youtu.be/a", "a")
            .into_track(chrono::Utc::now(), chrono::Utc::now());
        let conn: Arc<dyn LiveConnection> = Arc::new(Recorder::default());

        let result = pipeline
            .stream(&track, conn, CancellationToken::new(), 0.5)
            .await;
        assert_matches!(result, Err(PipelineError::Spawn { program: "yt-dlp", .. }));
    }
}
