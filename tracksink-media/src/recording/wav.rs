//! WAV audio recording
//!
//! Mono 16-bit PCM at the subscription's sample rate, written through
//! [`hound::WavWriter`]. The writer is flushed after every frame so the
//! header always describes the samples on disk, even if the process dies
//! before the recording is finalized.

use super::{open_failed, RecordingSink, RecordingSummary};
use crate::error::{MediaError, MediaResult};
use async_trait::async_trait;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tracing::{debug, info};
use tracksink_core::{MediaFrame, TrackKind};

/// Size of the PCM header hound writes for mono 16-bit files
pub const WAV_HEADER_LEN: u64 = 44;

/// Most samples a RIFF size field can describe at 16 bits
const MAX_SAMPLES: u64 = (u32::MAX as u64 - (WAV_HEADER_LEN - 8)) / 2;

type Writer = hound::WavWriter<BufWriter<std::fs::File>>;

/// Records audio frames into a WAV file
pub struct WavRecordingSink {
    path: PathBuf,
    /// `None` only while a blocking write holds it, or after it was lost
    writer: Option<Writer>,
    spec: hound::WavSpec,
    frames_written: u64,
    samples_written: u64,
    frames_failed: u64,
}

impl std::fmt::Debug for WavRecordingSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WavRecordingSink")
            .field("path", &self.path)
            .field("spec", &self.spec)
            .field("frames_written", &self.frames_written)
            .field("samples_written", &self.samples_written)
            .field("frames_failed", &self.frames_failed)
            .finish_non_exhaustive()
    }
}

impl WavRecordingSink {
    /// Create (or truncate) `path` and write the header
    pub async fn create(path: impl Into<PathBuf>, sample_rate: u32) -> MediaResult<Self> {
        let path = path.into();
        let file = File::create(&path)
            .await
            .map_err(|e| open_failed(&path, e))?;
        Self::from_file(path, file, sample_rate).await
    }

    pub(crate) async fn from_file(path: PathBuf, file: File, sample_rate: u32) -> MediaResult<Self> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let file = file.into_std().await;
        let writer = blocking(&path, move || {
            hound::WavWriter::new(BufWriter::new(file), spec)
        })
        .await?
        .map_err(|e| MediaError::RecordingFailed {
            path: path.display().to_string(),
            reason: format!("failed to write WAV header: {}", e),
        })?;

        info!(
            path = %path.display(),
            sample_rate,
            "🎙️ Started audio recording"
        );

        Ok(Self {
            path,
            writer: Some(writer),
            spec,
            frames_written: 0,
            samples_written: 0,
            frames_failed: 0,
        })
    }

    /// Format of the recorded stream
    pub fn spec(&self) -> hound::WavSpec {
        self.spec
    }

    /// Samples persisted so far
    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }

    fn writer_lost(&self) -> MediaError {
        MediaError::RecordingFailed {
            path: self.path.display().to_string(),
            reason: "WAV writer was lost after a failed write".to_string(),
        }
    }
}

#[async_trait]
impl RecordingSink for WavRecordingSink {
    fn path(&self) -> &Path {
        &self.path
    }

    async fn write_frame(&mut self, frame: &MediaFrame) -> MediaResult<()> {
        let audio = match frame {
            MediaFrame::Audio(audio) => audio,
            other => {
                self.frames_failed += 1;
                return Err(MediaError::KindMismatch {
                    expected: TrackKind::Audio,
                    actual: other.kind(),
                });
            }
        };

        if audio.sample_rate() != self.spec.sample_rate {
            self.frames_failed += 1;
            return Err(MediaError::SampleRateMismatch {
                expected: self.spec.sample_rate,
                actual: audio.sample_rate(),
            });
        }

        let mono = audio.to_mono();
        if self.samples_written + mono.len() as u64 > MAX_SAMPLES {
            return Err(MediaError::RecordingFailed {
                path: self.path.display().to_string(),
                reason: "WAV size limit reached".to_string(),
            });
        }

        let Some(mut writer) = self.writer.take() else {
            return Err(self.writer_lost());
        };
        let (writer, written, result) = blocking(&self.path, move || {
            let mut written = 0u64;
            let mut result = Ok(());
            for sample in mono {
                if let Err(e) = writer.write_sample(sample) {
                    result = Err(e);
                    break;
                }
                written += 1;
            }
            if result.is_ok() {
                result = writer.flush();
            }
            (writer, written, result)
        })
        .await?;

        self.writer = Some(writer);
        self.samples_written += written;
        if let Err(e) = result {
            self.frames_failed += 1;
            return Err(wav_error(&self.path, e));
        }
        self.frames_written += 1;
        Ok(())
    }

    async fn finalize(mut self: Box<Self>) -> MediaResult<RecordingSummary> {
        let Some(writer) = self.writer.take() else {
            return Err(self.writer_lost());
        };
        let path = self.path.clone();

        blocking(&path, move || writer.finalize())
            .await?
            .map_err(|e| MediaError::RecordingFailed {
                path: path.display().to_string(),
                reason: format!("failed to finalize WAV file: {}", e),
            })?;

        debug!(
            path = %path.display(),
            samples = self.samples_written,
            "WAV file finalized"
        );

        Ok(RecordingSummary {
            path,
            frames_written: self.frames_written,
            samples_written: self.samples_written,
            frames_failed: self.frames_failed,
        })
    }
}

/// Run file work off the async workers
async fn blocking<T, F>(path: &Path, work: F) -> MediaResult<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| MediaError::RecordingFailed {
            path: path.display().to_string(),
            reason: format!("WAV writer task failed: {}", e),
        })
}

fn wav_error(path: &Path, err: hound::Error) -> MediaError {
    match err {
        hound::Error::IoError(source) => MediaError::Io { source },
        other => MediaError::RecordingFailed {
            path: path.display().to_string(),
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracksink_core::{AudioFormat, AudioFrame, VideoFrame};

    #[tokio::test]
    async fn test_header_is_valid_before_finalize() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("live.wav");
        let mut sink = Box::new(WavRecordingSink::create(&path, 48_000).await.unwrap());

        for seq in 0..3 {
            let frame = AudioFrame::new(vec![seq; 960], AudioFormat::mono_48k(), 0).unwrap();
            sink.write_frame(&frame.into()).await.unwrap();
        }

        // Readable while still open, as after a crash
        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec(), sink.spec());
        assert_eq!(reader.duration(), 3 * 960);

        let summary = sink.finalize().await.unwrap();
        assert_eq!(summary.frames_written, 3);
        assert_eq!(
            std::fs::metadata(&path).unwrap().len(),
            WAV_HEADER_LEN + 3 * 960 * 2
        );
    }

    #[tokio::test]
    async fn test_stereo_frames_are_downmixed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let mut sink = Box::new(WavRecordingSink::create(&path, 48_000).await.unwrap());

        let frame = AudioFrame::new(vec![100i16, 300, -100, -300], AudioFormat::new(48_000, 2), 0)
            .unwrap();
        sink.write_frame(&frame.into()).await.unwrap();
        let summary = sink.finalize().await.unwrap();
        assert_eq!(summary.samples_written, 2);

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 1);
        let samples: Vec<i16> = reader.into_samples().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![200, -200]);
    }

    #[tokio::test]
    async fn test_mismatched_frames_are_rejected_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mismatch.wav");
        let mut sink = Box::new(WavRecordingSink::create(&path, 48_000).await.unwrap());

        let wrong_rate = AudioFrame::new(vec![1i16; 160], AudioFormat::new(16_000, 1), 0).unwrap();
        let err = sink.write_frame(&wrong_rate.into()).await.unwrap_err();
        assert!(matches!(err, MediaError::SampleRateMismatch { .. }));
        assert!(err.is_recoverable());

        let video = VideoFrame::new(2, 2, vec![0u8; 12], 0);
        let err = sink.write_frame(&video.into()).await.unwrap_err();
        assert!(matches!(err, MediaError::KindMismatch { .. }));

        let summary = sink.finalize().await.unwrap();
        assert_eq!(summary.frames_written, 0);
        assert_eq!(summary.frames_failed, 2);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), WAV_HEADER_LEN);
    }
}
