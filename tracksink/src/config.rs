//! Configuration types and defaults

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracksink_core::{TrackSinkError, TrackSinkResult};
use tracksink_media::{PlaybackConfig, RecordingConfig, RenderConfig};

/// Session configuration
///
/// Every field has a default, so partial JSON documents are accepted:
///
/// ```
/// use tracksink::SessionConfig;
///
/// let config = SessionConfig::from_json_str(r#"{ "auto_subscribe": true }"#)?;
/// assert!(config.auto_subscribe);
/// assert_eq!(config.playback.buffer_capacity, 10);
/// # Ok::<(), tracksink::TrackSinkError>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Audio playback settings
    pub playback: PlaybackConfig,
    /// Video render settings
    pub render: RenderConfig,
    /// Recording settings
    pub recording: RecordingConfig,
    /// Subscribe to every track as soon as it is published
    pub auto_subscribe: bool,
}

impl SessionConfig {
    /// Parse a JSON document
    pub fn from_json_str(json: &str) -> TrackSinkResult<Self> {
        serde_json::from_str(json).map_err(|e| TrackSinkError::InvalidConfiguration {
            reason: format!("Failed to parse session config: {}", e),
        })
    }

    /// Read and parse a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> TrackSinkResult<Self> {
        let path = path.as_ref();
        let json =
            std::fs::read_to_string(path).map_err(|e| TrackSinkError::InvalidConfiguration {
                reason: format!("Failed to read {}: {}", path.display(), e),
            })?;
        Self::from_json_str(&json)
    }

    /// Reject unusable values
    pub fn validate(&self) -> TrackSinkResult<()> {
        self.playback.validate()?;
        self.render.validate()?;
        self.recording.validate()?;
        Ok(())
    }
}
