//! Media pipeline error types and handling
//!
//! Pipelines report [`MediaError`]s internally. Whether an error ends a
//! pipeline is decided by [`MediaError::is_recoverable`]; the conversion into
//! the public [`TrackSinkError`] taxonomy happens at the controller boundary.

use std::time::Duration;
use thiserror::Error;
use tracksink_core::{TrackKind, TrackSinkError};

/// Main error type for media pipeline operations
#[derive(Error, Debug)]
pub enum MediaError {
    /// I/O operation failed
    #[error("I/O error: {source}")]
    Io {
        #[from]
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Invalid configuration provided
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        /// Error message
        message: String,
    },

    /// Output device not found
    #[error("Device not found: {device}")]
    DeviceNotFound {
        /// Device name that was not found
        device: String,
    },

    /// Output device could not be opened at the requested format
    #[error("Failed to open output device: {reason}")]
    DeviceOpenFailed {
        /// Failure reason
        reason: String,
    },

    /// Output device did not open in time
    #[error("Output device did not open within {timeout:?}")]
    DeviceOpenTimeout {
        /// Timeout that expired
        timeout: Duration,
    },

    /// Writing to an open output device failed
    #[error("Device write failed: {reason}")]
    DeviceWrite {
        /// Failure reason
        reason: String,
    },

    /// Unsupported sample or pixel format
    #[error("Unsupported format: {format}")]
    UnsupportedFormat {
        /// Format description
        format: String,
    },

    /// Invalid frame data error
    #[error("Invalid frame data: expected {expected} bytes, got {actual}")]
    InvalidFrameData {
        /// Expected data size
        expected: usize,
        /// Actual data size
        actual: usize,
    },

    /// Frame dimensions differ from the ones fixed by the first frame
    #[error("Frame dimensions changed: expected {expected_width}x{expected_height}, got {width}x{height}")]
    DimensionMismatch {
        /// Width fixed by the first frame
        expected_width: u32,
        /// Height fixed by the first frame
        expected_height: u32,
        /// Width of the offending frame
        width: u32,
        /// Height of the offending frame
        height: u32,
    },

    /// Sample rate mismatch
    #[error("Sample rate mismatch: expected {expected}, got {actual}")]
    SampleRateMismatch {
        /// Expected sample rate
        expected: u32,
        /// Actual sample rate
        actual: u32,
    },

    /// Frame of the wrong kind for the pipeline
    #[error("Invalid media type: expected {expected}, got {actual}")]
    KindMismatch {
        /// Kind the pipeline handles
        expected: TrackKind,
        /// Kind of the frame received
        actual: TrackKind,
    },

    /// Display callback rejected a frame
    #[error("Render error: {message}")]
    Render {
        /// Error message
        message: String,
    },

    /// Recording file became unusable
    #[error("Recording failed for {path}: {reason}")]
    RecordingFailed {
        /// Recording file
        path: String,
        /// Failure reason
        reason: String,
    },

    /// Pipeline did not stop within its join timeout
    #[error("Pipeline for {track_id} did not stop within {timeout:?}")]
    JoinTimeout {
        /// Track whose pipeline is stuck
        track_id: String,
        /// Join timeout that expired
        timeout: Duration,
    },

    /// Pipeline worker panicked
    #[error("Pipeline worker for {track_id} panicked")]
    WorkerPanicked {
        /// Track whose worker panicked
        track_id: String,
    },

    /// Invalid state for operation
    #[error("Invalid state: {message}")]
    InvalidState {
        /// State error message
        message: String,
    },
}

/// Result type alias for media operations
pub type MediaResult<T> = Result<T, MediaError>;

impl MediaError {
    /// Check if error is recoverable
    ///
    /// Recoverable errors affect a single frame; the pipeline moves on.
    pub fn is_recoverable(&self) -> bool {
        match self {
            MediaError::Io { source } => is_transient_io(source),
            MediaError::DeviceWrite { .. } => true,
            MediaError::InvalidFrameData { .. } => true,
            MediaError::DimensionMismatch { .. } => true,
            MediaError::SampleRateMismatch { .. } => true,
            MediaError::KindMismatch { .. } => true,
            MediaError::Render { .. } => true,
            _ => false,
        }
    }

    /// Get error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            MediaError::Io { .. } => ErrorCategory::System,
            MediaError::InvalidConfiguration { .. } => ErrorCategory::Configuration,
            MediaError::DeviceNotFound { .. } => ErrorCategory::Device,
            MediaError::DeviceOpenFailed { .. } => ErrorCategory::Device,
            MediaError::DeviceOpenTimeout { .. } => ErrorCategory::Device,
            MediaError::DeviceWrite { .. } => ErrorCategory::Device,
            MediaError::UnsupportedFormat { .. } => ErrorCategory::Format,
            MediaError::InvalidFrameData { .. } => ErrorCategory::Data,
            MediaError::DimensionMismatch { .. } => ErrorCategory::Data,
            MediaError::SampleRateMismatch { .. } => ErrorCategory::Audio,
            MediaError::KindMismatch { .. } => ErrorCategory::Format,
            MediaError::Render { .. } => ErrorCategory::Video,
            MediaError::RecordingFailed { .. } => ErrorCategory::System,
            MediaError::JoinTimeout { .. } => ErrorCategory::State,
            MediaError::WorkerPanicked { .. } => ErrorCategory::State,
            MediaError::InvalidState { .. } => ErrorCategory::State,
        }
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// System-level errors (I/O, files)
    System,
    /// Configuration and parameter errors
    Configuration,
    /// Output device errors
    Device,
    /// Format errors
    Format,
    /// Data validation errors
    Data,
    /// Audio-specific errors
    Audio,
    /// Video-specific errors
    Video,
    /// Lifecycle errors
    State,
}

/// Interrupted, would-block and timed-out writes may succeed on retry;
/// everything else (storage full, permission, closed handle) is fatal.
pub fn is_transient_io(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::Interrupted
            | std::io::ErrorKind::WouldBlock
            | std::io::ErrorKind::TimedOut
    )
}

impl From<MediaError> for TrackSinkError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::DeviceNotFound { .. }
            | MediaError::DeviceOpenFailed { .. }
            | MediaError::DeviceOpenTimeout { .. }
            | MediaError::UnsupportedFormat { .. } => TrackSinkError::DeviceUnavailable {
                reason: err.to_string(),
            },
            MediaError::JoinTimeout { track_id, timeout } => {
                TrackSinkError::ShutdownTimeout { track_id, timeout }
            }
            MediaError::Io { .. } | MediaError::RecordingFailed { .. } => {
                TrackSinkError::RecordingIo {
                    reason: err.to_string(),
                }
            }
            MediaError::InvalidConfiguration { message } => {
                TrackSinkError::InvalidConfiguration { reason: message }
            }
            MediaError::WorkerPanicked { .. } | MediaError::InvalidState { .. } => {
                TrackSinkError::Initialization {
                    reason: err.to_string(),
                }
            }
            MediaError::DeviceWrite { .. }
            | MediaError::InvalidFrameData { .. }
            | MediaError::DimensionMismatch { .. }
            | MediaError::SampleRateMismatch { .. }
            | MediaError::KindMismatch { .. }
            | MediaError::Render { .. } => TrackSinkError::FrameDelivery {
                reason: err.to_string(),
            },
        }
    }
}
