//! Recording pipeline and file sinks
//!
//! A recording session owns one open file for one track. Frames are written
//! in arrival order; a frame that fails to write never leaves the file
//! unreadable. The file is finalized on every exit path:
//! explicit stop, source end, or a fatal write error.

pub mod avi;
pub mod wav;

pub use avi::AviRecordingSink;
pub use wav::WavRecordingSink;

use crate::config::RecordingConfig;
use crate::error::{MediaError, MediaResult};
use crate::pipeline::{FinishReason, PipelineContext, PipelineId, PipelineRole};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncSeekExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use tracksink_core::{AudioFormat, FrameSource, MediaFrame, TrackKind};

/// Outcome of a finalized recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingSummary {
    /// Recording file
    pub path: PathBuf,
    /// Frames persisted
    pub frames_written: u64,
    /// Samples persisted (audio only)
    pub samples_written: u64,
    /// Frames rejected or rolled back
    pub frames_failed: u64,
}

/// Durable destination of one recording session
#[async_trait]
pub trait RecordingSink: Send {
    /// File being written
    fn path(&self) -> &Path;

    /// Append one frame
    ///
    /// On error the file stays well-formed. Recoverable errors leave the
    /// sink usable.
    async fn write_frame(&mut self, frame: &MediaFrame) -> MediaResult<()>;

    /// Write trailers, fix up headers and close the file
    async fn finalize(self: Box<Self>) -> MediaResult<RecordingSummary>;
}

/// Opens recording sinks for tracks
#[async_trait]
pub trait SinkFactory: Send + Sync {
    /// Open an audio recording for `track_id` at the subscription's format
    async fn open_audio(
        &self,
        track_id: &str,
        format: AudioFormat,
    ) -> MediaResult<Box<dyn RecordingSink>>;

    /// Open a video recording for `track_id`
    async fn open_video(&self, track_id: &str) -> MediaResult<Box<dyn RecordingSink>>;
}

/// Sink factory writing WAV and AVI files into the configured directories
#[derive(Debug, Clone)]
pub struct FileSinkFactory {
    config: RecordingConfig,
}

impl FileSinkFactory {
    /// Create a factory
    pub fn new(config: RecordingConfig) -> Self {
        Self { config }
    }

    /// Recording configuration in use
    pub fn config(&self) -> &RecordingConfig {
        &self.config
    }
}

#[async_trait]
impl SinkFactory for FileSinkFactory {
    async fn open_audio(
        &self,
        track_id: &str,
        format: AudioFormat,
    ) -> MediaResult<Box<dyn RecordingSink>> {
        let (path, file) =
            create_recording_file(&self.config.audio_dir, "audio", track_id, "wav").await?;
        let sink = WavRecordingSink::from_file(path, file, format.sample_rate).await?;
        Ok(Box::new(sink))
    }

    async fn open_video(&self, track_id: &str) -> MediaResult<Box<dyn RecordingSink>> {
        let (path, file) =
            create_recording_file(&self.config.video_dir, "video", track_id, "avi").await?;
        let sink = AviRecordingSink::from_file(path, file, self.config.video_fps).await?;
        Ok(Box::new(sink))
    }
}

/// `<prefix>_<track_id>_<YYYYMMDD_HHMMSS>`
pub fn recording_stem(prefix: &str, track_id: &str, started: DateTime<Local>) -> String {
    let safe_id: String = track_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}_{}_{}", prefix, safe_id, started.format("%Y%m%d_%H%M%S"))
}

/// Create a fresh recording file, never overwriting an earlier session
async fn create_recording_file(
    dir: &Path,
    prefix: &str,
    track_id: &str,
    extension: &str,
) -> MediaResult<(PathBuf, File)> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| open_failed(dir, e))?;

    let stem = recording_stem(prefix, track_id, Local::now());
    for attempt in 0..100u32 {
        let name = if attempt == 0 {
            format!("{}.{}", stem, extension)
        } else {
            format!("{}_{}.{}", stem, attempt, extension)
        };
        let path = dir.join(name);
        match OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => {
                debug!(path = %path.display(), "Created recording file");
                return Ok((path, file));
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(open_failed(&path, e)),
        }
    }

    Err(MediaError::RecordingFailed {
        path: dir.join(&stem).display().to_string(),
        reason: "no free file name".to_string(),
    })
}

pub(crate) fn open_failed(path: &Path, err: std::io::Error) -> MediaError {
    MediaError::RecordingFailed {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}

/// Truncate `file` back to `offset` after a failed frame write
pub(crate) async fn rollback(file: &mut File, offset: u64, path: &Path) -> MediaResult<()> {
    let result = async {
        file.set_len(offset).await?;
        file.seek(SeekFrom::Start(offset)).await?;
        Ok::<_, std::io::Error>(())
    }
    .await;

    result.map_err(|e| MediaError::RecordingFailed {
        path: path.display().to_string(),
        reason: format!("rollback to offset {} failed: {}", offset, e),
    })
}

/// Persists one track's frames to a [`RecordingSink`]
#[derive(Debug)]
pub struct RecordingPipeline {
    ctx: PipelineContext,
    kind: TrackKind,
    path: PathBuf,
    cancel: CancellationToken,
    task: Option<JoinHandle<MediaResult<RecordingSummary>>>,
    join_timeout: Duration,
}

impl RecordingPipeline {
    /// Start recording `source` into `sink`
    pub fn start<S>(
        ctx: PipelineContext,
        kind: TrackKind,
        source: S,
        sink: Box<dyn RecordingSink>,
        config: &RecordingConfig,
    ) -> Self
    where
        S: FrameSource + 'static,
    {
        let path = sink.path().to_path_buf();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(record_frames(ctx.clone(), source, sink, cancel.clone()));

        info!(
            track_id = %ctx.track_id,
            id = %ctx.id,
            path = %path.display(),
            "⏺️ Recording {} track",
            kind
        );

        Self {
            ctx,
            kind,
            path,
            cancel,
            task: Some(task),
            join_timeout: config.join_timeout(),
        }
    }

    /// Pipeline instance id
    pub fn id(&self) -> PipelineId {
        self.ctx.id
    }

    /// Track being recorded
    pub fn track_id(&self) -> &str {
        &self.ctx.track_id
    }

    /// Kind of the recorded track
    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    /// Recording file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stop recording and wait for the file to be finalized
    pub async fn stop(mut self) -> MediaResult<RecordingSummary> {
        self.cancel.cancel();
        let Some(task) = self.task.take() else {
            return Err(MediaError::InvalidState {
                message: "recording already stopped".to_string(),
            });
        };

        match tokio::time::timeout(self.join_timeout, task).await {
            Ok(Ok(summary)) => summary,
            Ok(Err(_)) => Err(MediaError::WorkerPanicked {
                track_id: self.ctx.track_id.clone(),
            }),
            Err(_) => {
                warn!(
                    track_id = %self.ctx.track_id,
                    "Recording did not finalize within {:?}", self.join_timeout
                );
                Err(MediaError::JoinTimeout {
                    track_id: self.ctx.track_id.clone(),
                    timeout: self.join_timeout,
                })
            }
        }
    }
}

impl Drop for RecordingPipeline {
    fn drop(&mut self) {
        // The task still finalizes the file after cancellation
        self.cancel.cancel();
    }
}

async fn record_frames<S>(
    ctx: PipelineContext,
    mut source: S,
    mut sink: Box<dyn RecordingSink>,
    cancel: CancellationToken,
) -> MediaResult<RecordingSummary>
where
    S: FrameSource,
{
    let finish = loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            item = source.next_frame() => Some(item),
        };
        let Some(item) = next else {
            break None;
        };

        match item {
            None => break Some(FinishReason::SourceEnded),
            Some(Err(e)) => warn!(track_id = %ctx.track_id, "Skipping frame: {}", e),
            Some(Ok(frame)) => match sink.write_frame(&frame).await {
                Ok(()) => trace!(track_id = %ctx.track_id, ts = frame.timestamp_us(), "Frame recorded"),
                Err(e) if e.is_recoverable() => {
                    warn!(track_id = %ctx.track_id, "Recording frame skipped: {}", e)
                }
                Err(e) => {
                    error!(track_id = %ctx.track_id, "Recording failed: {}", e);
                    break Some(FinishReason::Fatal(e));
                }
            },
        }
    };

    source.close().await;

    let summary = sink.finalize().await;
    match &summary {
        Ok(summary) => info!(
            track_id = %ctx.track_id,
            path = %summary.path.display(),
            frames = summary.frames_written,
            failed = summary.frames_failed,
            "💾 Recording saved"
        ),
        Err(e) => error!(track_id = %ctx.track_id, "Failed to finalize recording: {}", e),
    }

    if let Some(reason) = finish {
        ctx.report(PipelineRole::Recording, reason);
    }
    summary
}
