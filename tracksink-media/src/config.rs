//! Pipeline configuration types and defaults
//!
//! Durations are stored as milliseconds so the structs round-trip through
//! JSON unchanged; use the accessor methods to get [`Duration`]s.

use crate::error::{MediaError, MediaResult};
use crate::video_render::DisplayFormat;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracksink_core::AudioFormat;

/// Audio playback configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Playback buffer capacity in frames (10 frames is ~200ms at 20ms/frame)
    pub buffer_capacity: usize,
    /// How long the frame-delivery task waits for buffer space before dropping
    pub push_timeout_ms: u64,
    /// How long the playback thread blocks on an empty buffer before re-checking
    pub poll_timeout_ms: u64,
    /// Time allowed for the output device to open
    pub device_open_timeout_ms: u64,
    /// Time allowed for the playback thread to join on stop
    pub join_timeout_ms: u64,
    /// Output device name (None for the default device)
    pub device_name: Option<String>,
    /// Audio queued inside the device before writes block
    pub output_latency_ms: u64,
    /// Format assumed when the subscription does not report one
    pub default_format: AudioFormat,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 10,
            push_timeout_ms: 20,
            poll_timeout_ms: 100,
            device_open_timeout_ms: 2_000,
            join_timeout_ms: 2_000,
            device_name: None,
            output_latency_ms: 60,
            default_format: AudioFormat::mono_48k(),
        }
    }
}

impl PlaybackConfig {
    /// Buffer push timeout
    pub fn push_timeout(&self) -> Duration {
        Duration::from_millis(self.push_timeout_ms)
    }

    /// Playback thread poll timeout
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    /// Device open timeout
    pub fn device_open_timeout(&self) -> Duration {
        Duration::from_millis(self.device_open_timeout_ms)
    }

    /// Thread join timeout
    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    /// Device-side queue length
    pub fn output_latency(&self) -> Duration {
        Duration::from_millis(self.output_latency_ms)
    }

    /// Reject unusable values
    pub fn validate(&self) -> MediaResult<()> {
        if self.buffer_capacity == 0 {
            return Err(invalid("playback.buffer_capacity must be at least 1"));
        }
        if self.push_timeout_ms == 0 || self.poll_timeout_ms == 0 {
            return Err(invalid("playback push and poll timeouts must be non-zero"));
        }
        if self.device_open_timeout_ms == 0 || self.join_timeout_ms == 0 {
            return Err(invalid(
                "playback device-open and join timeouts must be non-zero",
            ));
        }
        if self.default_format.sample_rate == 0 || self.default_format.channels == 0 {
            return Err(invalid("playback.default_format must be non-empty"));
        }
        Ok(())
    }
}

/// Video render configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Pixel layout expected by the display
    pub display_format: DisplayFormat,
    /// Pause after each rendered frame (0 yields to the scheduler only)
    pub yield_interval_ms: u64,
    /// Time allowed for the render task to stop
    pub join_timeout_ms: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            display_format: DisplayFormat::Bgr24,
            yield_interval_ms: 10,
            join_timeout_ms: 2_000,
        }
    }
}

impl RenderConfig {
    /// Pause after each frame
    pub fn yield_interval(&self) -> Duration {
        Duration::from_millis(self.yield_interval_ms)
    }

    /// Task join timeout
    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    /// Reject unusable values
    pub fn validate(&self) -> MediaResult<()> {
        if self.join_timeout_ms == 0 {
            return Err(invalid("render.join_timeout_ms must be non-zero"));
        }
        Ok(())
    }
}

/// Recording configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Directory for audio recordings, created on demand
    pub audio_dir: PathBuf,
    /// Directory for video recordings, created on demand
    pub video_dir: PathBuf,
    /// Nominal frame rate written into video headers
    pub video_fps: u32,
    /// Time allowed for a recording task to finalize on stop
    pub join_timeout_ms: u64,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            audio_dir: PathBuf::from("recorded_audio"),
            video_dir: PathBuf::from("recorded_video"),
            video_fps: 30,
            join_timeout_ms: 2_000,
        }
    }
}

impl RecordingConfig {
    /// Task join timeout
    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    /// Reject unusable values
    pub fn validate(&self) -> MediaResult<()> {
        if self.audio_dir.as_os_str().is_empty() || self.video_dir.as_os_str().is_empty() {
            return Err(invalid("recording directories must not be empty"));
        }
        if self.video_fps == 0 {
            return Err(invalid("recording.video_fps must be at least 1"));
        }
        if self.join_timeout_ms == 0 {
            return Err(invalid("recording.join_timeout_ms must be non-zero"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> MediaError {
    MediaError::InvalidConfiguration {
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playback_defaults() {
        let config = PlaybackConfig::default();
        assert_eq!(config.buffer_capacity, 10);
        assert_eq!(config.push_timeout(), Duration::from_millis(20));
        assert_eq!(config.poll_timeout(), Duration::from_millis(100));
        assert_eq!(config.default_format, AudioFormat::mono_48k());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = PlaybackConfig {
            buffer_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(MediaError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_recording_defaults() {
        let config = RecordingConfig::default();
        assert_eq!(config.audio_dir, PathBuf::from("recorded_audio"));
        assert_eq!(config.video_dir, PathBuf::from("recorded_video"));
        assert!(RecordingConfig {
            video_fps: 0,
            ..Default::default()
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: RenderConfig = serde_json::from_str(r#"{"yield_interval_ms": 0}"#).unwrap();
        assert_eq!(config.yield_interval(), Duration::ZERO);
        assert_eq!(config.display_format, DisplayFormat::Bgr24);
    }
}
