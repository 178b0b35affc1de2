//! Event system for track and participant notifications

use crate::track::{PlaybackState, RecordingState, SubscriptionState, TrackDescriptor};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracksink_core::ErrorKind;

/// Notifications published to the UI layer
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A remote track was published
    TrackAdded {
        /// The new track
        track: TrackDescriptor,
    },
    /// A track was removed after its pipelines stopped
    TrackRemoved {
        /// Final state of the track
        track: TrackDescriptor,
    },
    /// Subscription, playback or recording state changed
    TrackStateChanged {
        /// Track ID
        track_id: String,
        /// Subscription state
        subscription: SubscriptionState,
        /// Playback state
        playback: PlaybackState,
        /// Recording state
        recording: RecordingState,
    },
    /// A pipeline or command failed
    PipelineError {
        /// Track the failure belongs to
        track_id: String,
        /// Error category
        kind: ErrorKind,
        /// Human readable message
        message: String,
    },
    /// A remote participant joined
    ParticipantConnected {
        /// Participant ID
        participant_id: String,
    },
    /// A remote participant left
    ParticipantDisconnected {
        /// Participant ID
        participant_id: String,
    },
    /// A recording was finalized
    RecordingSaved {
        /// Recorded track
        track_id: String,
        /// Recording file
        path: PathBuf,
        /// Frames persisted
        frames: u64,
    },
}

impl Event {
    /// Stable name of the event variant
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::TrackAdded { .. } => "track_added",
            Event::TrackRemoved { .. } => "track_removed",
            Event::TrackStateChanged { .. } => "track_state_changed",
            Event::PipelineError { .. } => "pipeline_error",
            Event::ParticipantConnected { .. } => "participant_connected",
            Event::ParticipantDisconnected { .. } => "participant_disconnected",
            Event::RecordingSaved { .. } => "recording_saved",
        }
    }

    /// Track the event refers to, if any
    pub fn track_id(&self) -> Option<&str> {
        match self {
            Event::TrackAdded { track } | Event::TrackRemoved { track } => Some(&track.track_id),
            Event::TrackStateChanged { track_id, .. }
            | Event::PipelineError { track_id, .. }
            | Event::RecordingSaved { track_id, .. } => Some(track_id),
            Event::ParticipantConnected { .. } | Event::ParticipantDisconnected { .. } => None,
        }
    }

    /// Participant join or leave
    pub fn is_participant_event(&self) -> bool {
        matches!(
            self,
            Event::ParticipantConnected { .. } | Event::ParticipantDisconnected { .. }
        )
    }

    /// Track lifecycle, state or recording notification
    pub fn is_track_event(&self) -> bool {
        matches!(
            self,
            Event::TrackAdded { .. }
                | Event::TrackRemoved { .. }
                | Event::TrackStateChanged { .. }
                | Event::RecordingSaved { .. }
        )
    }

    /// Pipeline or command failure
    pub fn is_error_event(&self) -> bool {
        matches!(self, Event::PipelineError { .. })
    }
}

/// Sender half used by the controller
pub type EventSender = mpsc::UnboundedSender<Event>;

/// Receiving end of the session's UI notifications
#[derive(Debug)]
pub struct EventStream {
    receiver: mpsc::UnboundedReceiver<Event>,
}

impl EventStream {
    /// Wrap a receiver
    pub fn new(receiver: mpsc::UnboundedReceiver<Event>) -> Self {
        Self { receiver }
    }

    /// Create a connected sender and stream
    pub fn channel() -> (EventSender, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self::new(rx))
    }

    /// Wait for the next event
    pub async fn next(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }

    /// Next event if one is queued
    pub fn try_next(&mut self) -> Result<Option<Event>, mpsc::error::TryRecvError> {
        match self.receiver.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => {
                Err(mpsc::error::TryRecvError::Disconnected)
            }
        }
    }

    /// Stop receiving; queued events can still be drained
    pub fn close(&mut self) {
        self.receiver.close();
    }

    /// Whether the controller side is gone
    pub fn is_closed(&self) -> bool {
        self.receiver.is_closed()
    }
}

/// Selects which session events a consumer sees
#[derive(Debug, Clone)]
pub struct EventFilter {
    /// Participant join and leave
    pub participants: bool,
    /// Track lifecycle and recording notifications
    pub tracks: bool,
    /// Pipeline errors
    pub errors: bool,
    /// Exact `event_type()` names; when set, the flags above are ignored
    pub event_types: Option<Vec<String>>,
}

impl EventFilter {
    /// Accept everything
    pub fn all() -> Self {
        Self {
            participants: true,
            tracks: true,
            errors: true,
            event_types: None,
        }
    }

    /// Participant events only
    pub fn participant_only() -> Self {
        Self {
            participants: true,
            tracks: false,
            errors: false,
            event_types: None,
        }
    }

    /// Track events only
    pub fn track_only() -> Self {
        Self {
            participants: false,
            tracks: true,
            errors: false,
            event_types: None,
        }
    }

    /// Pipeline errors only
    pub fn errors_only() -> Self {
        Self {
            participants: false,
            tracks: false,
            errors: true,
            event_types: None,
        }
    }

    /// Accept the named event types
    pub fn specific(event_types: Vec<String>) -> Self {
        Self {
            participants: false,
            tracks: false,
            errors: false,
            event_types: Some(event_types),
        }
    }

    /// Whether `event` passes
    pub fn should_include(&self, event: &Event) -> bool {
        if let Some(names) = &self.event_types {
            return names.iter().any(|name| name == event.event_type());
        }

        (self.participants && event.is_participant_event())
            || (self.tracks && event.is_track_event())
            || (self.errors && event.is_error_event())
    }
}

impl Default for EventFilter {
    fn default() -> Self {
        Self::all()
    }
}

/// Event stream that only yields events accepted by a filter
#[derive(Debug)]
pub struct FilteredEventStream {
    stream: EventStream,
    filter: EventFilter,
}

impl FilteredEventStream {
    /// Wrap `stream` with `filter`
    pub fn new(stream: EventStream, filter: EventFilter) -> Self {
        Self { stream, filter }
    }

    /// Next accepted event
    pub async fn next(&mut self) -> Option<Event> {
        while let Some(event) = self.stream.next().await {
            if self.filter.should_include(&event) {
                return Some(event);
            }
        }
        None
    }

    /// Next accepted event without waiting
    pub fn try_next(&mut self) -> Result<Option<Event>, mpsc::error::TryRecvError> {
        while let Some(event) = self.stream.try_next()? {
            if self.filter.should_include(&event) {
                return Ok(Some(event));
            }
        }
        Ok(None)
    }

    /// Filter in use
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracksink_core::TrackKind;

    fn track_added() -> Event {
        Event::TrackAdded {
            track: TrackDescriptor::new("T1", "alice", TrackKind::Audio),
        }
    }

    fn pipeline_error() -> Event {
        Event::PipelineError {
            track_id: "T1".to_string(),
            kind: ErrorKind::DeviceUnavailable,
            message: "no device".to_string(),
        }
    }

    #[test]
    fn test_event_types() {
        assert_eq!(track_added().event_type(), "track_added");
        assert_eq!(track_added().track_id(), Some("T1"));
        assert!(track_added().is_track_event());

        let joined = Event::ParticipantConnected {
            participant_id: "bob".to_string(),
        };
        assert!(joined.is_participant_event());
        assert_eq!(joined.track_id(), None);

        assert!(pipeline_error().is_error_event());
        assert!(!pipeline_error().is_track_event());
    }

    #[test]
    fn test_event_filter() {
        let joined = Event::ParticipantConnected {
            participant_id: "bob".to_string(),
        };

        let all = EventFilter::all();
        assert!(all.should_include(&track_added()));
        assert!(all.should_include(&joined));
        assert!(all.should_include(&pipeline_error()));

        let errors = EventFilter::errors_only();
        assert!(errors.should_include(&pipeline_error()));
        assert!(!errors.should_include(&track_added()));

        let specific = EventFilter::specific(vec!["participant_connected".to_string()]);
        assert!(specific.should_include(&joined));
        assert!(!specific.should_include(&track_added()));
    }

    #[tokio::test]
    async fn test_event_stream_basic() {
        let (tx, mut stream) = EventStream::channel();
        tx.send(track_added()).unwrap();

        let received = stream.next().await.unwrap();
        assert_eq!(received.event_type(), "track_added");
        assert!(stream.try_next().unwrap().is_none());

        drop(tx);
        assert!(stream.try_next().is_err());
    }

    #[tokio::test]
    async fn test_filtered_event_stream() {
        let (tx, stream) = EventStream::channel();
        let mut filtered = FilteredEventStream::new(stream, EventFilter::track_only());

        tx.send(Event::ParticipantConnected {
            participant_id: "bob".to_string(),
        })
        .unwrap();
        tx.send(track_added()).unwrap();

        let received = filtered.next().await.unwrap();
        assert_eq!(received.event_type(), "track_added");

        tx.send(pipeline_error()).unwrap();
        assert!(filtered.try_next().unwrap().is_none());
    }
}
