//! Track kinds and media frame types

use crate::error::TrackSinkError;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

/// Track kind enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum TrackKind {
    /// Audio track
    Audio,
    /// Video track
    Video,
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackKind::Audio => write!(f, "audio"),
            TrackKind::Video => write!(f, "video"),
        }
    }
}

/// Sample rate and channel layout shared by every frame of one subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct AudioFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of interleaved channels
    pub channels: u16,
}

impl AudioFormat {
    /// Create a new audio format
    pub const fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// 48 kHz mono, the reference subscription format
    pub const fn mono_48k() -> Self {
        Self::new(48_000, 1)
    }

    /// Samples per channel in one frame of the given duration
    pub fn samples_per_channel(&self, duration: Duration) -> u32 {
        (self.sample_rate as u128 * duration.as_micros() / 1_000_000) as u32
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::mono_48k()
    }
}

/// Audio frame of interleaved 16-bit PCM
#[derive(Debug, Clone)]
pub struct AudioFrame {
    samples: Arc<[i16]>,
    sample_rate: u32,
    channels: u16,
    samples_per_channel: u32,
    /// Capture timestamp in microseconds
    pub timestamp_us: u64,
}

impl AudioFrame {
    /// Create a frame from interleaved samples
    ///
    /// The sample count must be a non-zero multiple of the channel count.
    pub fn new(
        samples: impl Into<Arc<[i16]>>,
        format: AudioFormat,
        timestamp_us: u64,
    ) -> Result<Self, TrackSinkError> {
        let samples = samples.into();
        if format.channels == 0 || format.sample_rate == 0 {
            return Err(TrackSinkError::frame_delivery(format!(
                "invalid audio format {}Hz/{}ch",
                format.sample_rate, format.channels
            )));
        }
        if samples.is_empty() {
            return Err(TrackSinkError::frame_delivery("audio frame has no samples"));
        }
        if samples.len() % format.channels as usize != 0 {
            return Err(TrackSinkError::frame_delivery(format!(
                "{} samples do not divide into {} channels",
                samples.len(),
                format.channels
            )));
        }
        let samples_per_channel = (samples.len() / format.channels as usize) as u32;
        Ok(Self {
            samples,
            sample_rate: format.sample_rate,
            channels: format.channels,
            samples_per_channel,
            timestamp_us,
        })
    }

    /// Interleaved samples
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of channels
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Samples per channel
    pub fn samples_per_channel(&self) -> u32 {
        self.samples_per_channel
    }

    /// Format of this frame
    pub fn format(&self) -> AudioFormat {
        AudioFormat::new(self.sample_rate, self.channels)
    }

    /// Playback duration of this frame
    pub fn duration(&self) -> Duration {
        Duration::from_micros(self.samples_per_channel as u64 * 1_000_000 / self.sample_rate as u64)
    }

    /// Down-mix to mono by averaging channels
    pub fn to_mono(&self) -> Vec<i16> {
        if self.channels == 1 {
            return self.samples.to_vec();
        }
        self.samples
            .chunks_exact(self.channels as usize)
            .map(|chunk| {
                let sum: i32 = chunk.iter().map(|&s| s as i32).sum();
                (sum / chunk.len() as i32) as i16
            })
            .collect()
    }
}

/// Raw RGB24 video frame
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Packed RGB24 pixels, row-major, top row first
    pub data: Bytes,
    /// Capture timestamp in microseconds
    pub timestamp_us: u64,
}

impl VideoFrame {
    /// Bytes per RGB24 pixel
    pub const BYTES_PER_PIXEL: usize = 3;

    /// Create a new RGB24 frame
    pub fn new(width: u32, height: u32, data: impl Into<Bytes>, timestamp_us: u64) -> Self {
        Self {
            width,
            height,
            data: data.into(),
            timestamp_us,
        }
    }

    /// Expected buffer length for the frame dimensions
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * Self::BYTES_PER_PIXEL
    }

    /// Check that the buffer matches the dimensions
    pub fn validate(&self) -> Result<(), TrackSinkError> {
        if self.width == 0 || self.height == 0 {
            return Err(TrackSinkError::frame_delivery(format!(
                "empty video frame {}x{}",
                self.width, self.height
            )));
        }
        if self.data.len() != self.expected_len() {
            return Err(TrackSinkError::frame_delivery(format!(
                "video frame {}x{} carries {} bytes, expected {}",
                self.width,
                self.height,
                self.data.len(),
                self.expected_len()
            )));
        }
        Ok(())
    }
}

/// Media frame types
#[derive(Debug, Clone)]
pub enum MediaFrame {
    /// Audio frame
    Audio(AudioFrame),
    /// Video frame
    Video(VideoFrame),
}

impl MediaFrame {
    /// Kind of track this frame belongs to
    pub fn kind(&self) -> TrackKind {
        match self {
            MediaFrame::Audio(_) => TrackKind::Audio,
            MediaFrame::Video(_) => TrackKind::Video,
        }
    }

    /// Capture timestamp in microseconds
    pub fn timestamp_us(&self) -> u64 {
        match self {
            MediaFrame::Audio(frame) => frame.timestamp_us,
            MediaFrame::Video(frame) => frame.timestamp_us,
        }
    }
}

impl From<AudioFrame> for MediaFrame {
    fn from(frame: AudioFrame) -> Self {
        MediaFrame::Audio(frame)
    }
}

impl From<VideoFrame> for MediaFrame {
    fn from(frame: VideoFrame) -> Self {
        MediaFrame::Video(frame)
    }
}
