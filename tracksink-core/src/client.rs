//! Media client capability set and room events
//!
//! The media client owns signaling and transport. The rest of the system
//! only sees the calls below plus a typed stream of [`RoomEvent`]s.

use crate::error::ClientError;
use crate::frame::{AudioFormat, TrackKind};
use crate::source::FrameSource;
use async_trait::async_trait;

/// An active subscription handed out by the media client
pub struct Subscription {
    /// Decoded frames for the subscribed track
    pub source: Box<dyn FrameSource>,
    /// Audio format of the subscription, when the client knows it up front
    pub audio_format: Option<AudioFormat>,
}

impl Subscription {
    /// Wrap a frame source without format information
    pub fn new(source: Box<dyn FrameSource>) -> Self {
        Self {
            source,
            audio_format: None,
        }
    }

    /// Attach the audio format of the subscription
    pub fn with_audio_format(mut self, format: AudioFormat) -> Self {
        self.audio_format = Some(format);
        self
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("audio_format", &self.audio_format)
            .finish_non_exhaustive()
    }
}

/// Capabilities consumed from the external media client
#[async_trait]
pub trait MediaClient: Send + Sync {
    /// Subscribe to a remote track and open its frame source
    async fn subscribe(&self, track_id: &str) -> Result<Subscription, ClientError>;

    /// Release a remote subscription
    async fn unsubscribe(&self, track_id: &str);
}

/// Room events delivered by the media client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    /// A remote participant joined
    ParticipantConnected {
        /// Participant identity
        participant_id: String,
    },
    /// A remote participant left; all of its tracks are gone
    ParticipantDisconnected {
        /// Participant identity
        participant_id: String,
    },
    /// A remote participant published a track
    TrackPublished {
        /// Owning participant
        participant_id: String,
        /// Publication identity
        track_id: String,
        /// Track kind
        kind: TrackKind,
    },
    /// A remote participant unpublished a track
    TrackUnpublished {
        /// Owning participant
        participant_id: String,
        /// Publication identity
        track_id: String,
        /// Track kind
        kind: TrackKind,
    },
    /// The client confirmed a subscription
    TrackSubscribed {
        /// Owning participant
        participant_id: String,
        /// Publication identity
        track_id: String,
        /// Track kind
        kind: TrackKind,
    },
    /// The subscription ended on the client side
    TrackUnsubscribed {
        /// Owning participant
        participant_id: String,
        /// Publication identity
        track_id: String,
        /// Track kind
        kind: TrackKind,
    },
}

impl RoomEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            RoomEvent::ParticipantConnected { .. } => "participant_connected",
            RoomEvent::ParticipantDisconnected { .. } => "participant_disconnected",
            RoomEvent::TrackPublished { .. } => "track_published",
            RoomEvent::TrackUnpublished { .. } => "track_unpublished",
            RoomEvent::TrackSubscribed { .. } => "track_subscribed",
            RoomEvent::TrackUnsubscribed { .. } => "track_unsubscribed",
        }
    }

    /// Participant the event refers to
    pub fn participant_id(&self) -> &str {
        match self {
            RoomEvent::ParticipantConnected { participant_id }
            | RoomEvent::ParticipantDisconnected { participant_id }
            | RoomEvent::TrackPublished { participant_id, .. }
            | RoomEvent::TrackUnpublished { participant_id, .. }
            | RoomEvent::TrackSubscribed { participant_id, .. }
            | RoomEvent::TrackUnsubscribed { participant_id, .. } => participant_id,
        }
    }

    /// Track the event refers to, if any
    pub fn track_id(&self) -> Option<&str> {
        match self {
            RoomEvent::TrackPublished { track_id, .. }
            | RoomEvent::TrackUnpublished { track_id, .. }
            | RoomEvent::TrackSubscribed { track_id, .. }
            | RoomEvent::TrackUnsubscribed { track_id, .. } => Some(track_id),
            _ => None,
        }
    }
}
