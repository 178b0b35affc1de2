//! Track descriptors and per-track state

use serde::{Deserialize, Serialize};
use tracksink_core::TrackKind;

/// Subscription lifecycle of a remote track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubscriptionState {
    /// Not receiving frames
    Unsubscribed,
    /// Subscription requested from the media client
    Subscribing,
    /// Frames are flowing
    Subscribed,
    /// Pipelines and source are being torn down
    Unsubscribing,
}

/// Playback slot of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaybackState {
    /// Nothing playing
    Idle,
    /// Audio playing or video rendering
    Playing,
}

/// Recording slot of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordingState {
    /// Not recording
    Idle,
    /// Frames are being written to a file
    Recording,
}

impl std::fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SubscriptionState::Unsubscribed => "unsubscribed",
            SubscriptionState::Subscribing => "subscribing",
            SubscriptionState::Subscribed => "subscribed",
            SubscriptionState::Unsubscribing => "unsubscribing",
        };
        f.write_str(s)
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Idle => f.write_str("idle"),
            PlaybackState::Playing => f.write_str("playing"),
        }
    }
}

impl std::fmt::Display for RecordingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordingState::Idle => f.write_str("idle"),
            RecordingState::Recording => f.write_str("recording"),
        }
    }
}

/// Remote track as known to the session
///
/// Playing or recording implies subscribed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackDescriptor {
    /// Publication identity, unique in the registry
    pub track_id: String,
    /// Publishing participant
    pub participant_id: String,
    /// Audio or video
    pub kind: TrackKind,
    /// Subscription lifecycle
    pub subscription: SubscriptionState,
    /// Playback slot
    pub playback: PlaybackState,
    /// Recording slot
    pub recording: RecordingState,
}

impl TrackDescriptor {
    /// Newly published, unsubscribed track
    pub fn new(
        track_id: impl Into<String>,
        participant_id: impl Into<String>,
        kind: TrackKind,
    ) -> Self {
        Self {
            track_id: track_id.into(),
            participant_id: participant_id.into(),
            kind,
            subscription: SubscriptionState::Unsubscribed,
            playback: PlaybackState::Idle,
            recording: RecordingState::Idle,
        }
    }

    /// Whether frames are flowing
    pub fn is_subscribed(&self) -> bool {
        self.subscription == SubscriptionState::Subscribed
    }

    /// Whether a playback pipeline is active
    pub fn is_playing(&self) -> bool {
        self.playback == PlaybackState::Playing
    }

    /// Whether a recording pipeline is active
    pub fn is_recording(&self) -> bool {
        self.recording == RecordingState::Recording
    }

    /// Playing or recording only while subscribed
    pub fn is_consistent(&self) -> bool {
        self.is_subscribed() || (!self.is_playing() && !self.is_recording())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_track_is_idle() {
        let track = TrackDescriptor::new("T1", "alice", TrackKind::Audio);
        assert_eq!(track.subscription, SubscriptionState::Unsubscribed);
        assert!(!track.is_playing());
        assert!(!track.is_recording());
        assert!(track.is_consistent());
    }

    #[test]
    fn test_consistency_requires_subscription() {
        let mut track = TrackDescriptor::new("T1", "alice", TrackKind::Video);
        track.recording = RecordingState::Recording;
        assert!(!track.is_consistent());

        track.subscription = SubscriptionState::Subscribed;
        track.playback = PlaybackState::Playing;
        assert!(track.is_consistent());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SubscriptionState::Subscribing.to_string(), "subscribing");
        assert_eq!(PlaybackState::Playing.to_string(), "playing");
        assert_eq!(RecordingState::Idle.to_string(), "idle");
    }
}
