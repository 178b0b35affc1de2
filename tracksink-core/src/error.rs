//! Error types for tracksink

use std::time::Duration;
use thiserror::Error;

/// Main error type for track subscription and pipeline operations
#[derive(Error, Debug, Clone)]
pub enum TrackSinkError {
    /// The track is not known to the registry
    #[error("Track not found: {track_id}")]
    TrackNotFound {
        /// Track that was requested
        track_id: String,
    },

    /// The participant owning the track left before the operation completed
    #[error("Participant {participant_id} is gone (track {track_id})")]
    ParticipantGone {
        /// Owning participant
        participant_id: String,
        /// Track that was being operated on
        track_id: String,
    },

    /// The operation requires an active subscription
    #[error("Track {track_id} is not subscribed")]
    NotSubscribed {
        /// Track that was requested
        track_id: String,
    },

    /// Transport or negotiation failure while subscribing
    #[error("Subscription to {track_id} failed: {reason}")]
    SubscriptionFailed {
        /// Track that was requested
        track_id: String,
        /// Reason reported by the media client
        reason: String,
    },

    /// Audio output could not be opened at the required format
    #[error("Audio device unavailable: {reason}")]
    DeviceUnavailable {
        /// Reason for the failure
        reason: String,
    },

    /// Transient failure delivering a single frame
    #[error("Frame delivery error: {reason}")]
    FrameDelivery {
        /// Reason for the failure
        reason: String,
    },

    /// Recording file could not be opened or written
    #[error("Recording I/O error: {reason}")]
    RecordingIo {
        /// Reason for the failure
        reason: String,
    },

    /// A pipeline did not shut down within its join timeout
    #[error("Pipeline for {track_id} did not stop within {timeout:?}")]
    ShutdownTimeout {
        /// Track whose pipeline is stuck
        track_id: String,
        /// Join timeout that expired
        timeout: Duration,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration {
        /// Reason why the configuration is invalid
        reason: String,
    },

    /// Initialization error
    #[error("Initialization failed: {reason}")]
    Initialization {
        /// Reason for initialization failure
        reason: String,
    },

    /// The session has shut down and no longer accepts commands
    #[error("Session closed")]
    SessionClosed,
}

/// Result alias for tracksink operations
pub type TrackSinkResult<T> = Result<T, TrackSinkError>;

impl TrackSinkError {
    /// Classify the error for UI notifications
    pub fn kind(&self) -> ErrorKind {
        match self {
            TrackSinkError::TrackNotFound { .. } => ErrorKind::TrackNotFound,
            TrackSinkError::ParticipantGone { .. } => ErrorKind::ParticipantGone,
            TrackSinkError::NotSubscribed { .. } => ErrorKind::NotSubscribed,
            TrackSinkError::SubscriptionFailed { .. } => ErrorKind::SubscriptionFailed,
            TrackSinkError::DeviceUnavailable { .. } => ErrorKind::DeviceUnavailable,
            TrackSinkError::FrameDelivery { .. } => ErrorKind::FrameDelivery,
            TrackSinkError::RecordingIo { .. } => ErrorKind::RecordingIo,
            TrackSinkError::ShutdownTimeout { .. } => ErrorKind::ShutdownTimeout,
            TrackSinkError::InvalidConfiguration { .. }
            | TrackSinkError::Initialization { .. }
            | TrackSinkError::SessionClosed => ErrorKind::Session,
        }
    }

    /// Per-frame errors never terminate a pipeline
    pub fn is_transient(&self) -> bool {
        matches!(self, TrackSinkError::FrameDelivery { .. })
    }

    /// Shorthand for a transient frame error
    pub fn frame_delivery(reason: impl Into<String>) -> Self {
        TrackSinkError::FrameDelivery {
            reason: reason.into(),
        }
    }
}

/// Error classification carried in pipeline error notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// Unknown track
    TrackNotFound,
    /// Owning participant disconnected
    ParticipantGone,
    /// Track not subscribed
    NotSubscribed,
    /// Transport or negotiation failure
    SubscriptionFailed,
    /// Audio output could not be opened
    DeviceUnavailable,
    /// Transient per-frame failure
    FrameDelivery,
    /// Recording file failure
    RecordingIo,
    /// Pipeline shutdown exceeded its timeout
    ShutdownTimeout,
    /// Session-level failure (configuration, initialization, closed)
    Session,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::TrackNotFound => "track_not_found",
            ErrorKind::ParticipantGone => "participant_gone",
            ErrorKind::NotSubscribed => "not_subscribed",
            ErrorKind::SubscriptionFailed => "subscription_failed",
            ErrorKind::DeviceUnavailable => "device_unavailable",
            ErrorKind::FrameDelivery => "frame_delivery",
            ErrorKind::RecordingIo => "recording_io",
            ErrorKind::ShutdownTimeout => "shutdown_timeout",
            ErrorKind::Session => "session",
        };
        f.write_str(name)
    }
}

/// Errors reported by a media client when subscribing
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The owning participant left the room
    #[error("participant {participant_id} disconnected")]
    ParticipantGone {
        /// Participant that left
        participant_id: String,
    },

    /// The track is no longer published
    #[error("track is not published")]
    TrackNotFound,

    /// Transport or negotiation failure
    #[error("transport error: {0}")]
    Transport(String),
}

impl ClientError {
    /// Map a client failure for `track_id` onto the public taxonomy
    pub fn into_track_error(self, track_id: &str) -> TrackSinkError {
        match self {
            ClientError::ParticipantGone { participant_id } => TrackSinkError::ParticipantGone {
                participant_id,
                track_id: track_id.to_string(),
            },
            ClientError::TrackNotFound => TrackSinkError::TrackNotFound {
                track_id: track_id.to_string(),
            },
            ClientError::Transport(reason) => TrackSinkError::SubscriptionFailed {
                track_id: track_id.to_string(),
                reason,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let err = TrackSinkError::NotSubscribed {
            track_id: "T1".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::NotSubscribed);
        assert!(!err.is_transient());

        let err = TrackSinkError::frame_delivery("decoder hiccup");
        assert_eq!(err.kind(), ErrorKind::FrameDelivery);
        assert!(err.is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = TrackSinkError::ShutdownTimeout {
            track_id: "T1".to_string(),
            timeout: Duration::from_millis(500),
        };
        assert_eq!(err.to_string(), "Pipeline for T1 did not stop within 500ms");
        assert_eq!(ErrorKind::RecordingIo.to_string(), "recording_io");
    }

    #[test]
    fn test_client_error_mapping() {
        let err = ClientError::Transport("ice failed".to_string()).into_track_error("T9");
        match err {
            TrackSinkError::SubscriptionFailed { track_id, reason } => {
                assert_eq!(track_id, "T9");
                assert_eq!(reason, "ice failed");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = ClientError::ParticipantGone {
            participant_id: "bob".to_string(),
        }
        .into_track_error("T9");
        assert_eq!(err.kind(), ErrorKind::ParticipantGone);
    }
}
