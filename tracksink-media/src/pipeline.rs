//! Pipeline identity and lifecycle reporting

use crate::error::MediaError;
use tokio::sync::mpsc;

/// Identifier of one pipeline instance, unique within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipelineId(pub u64);

impl std::fmt::Display for PipelineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pipeline-{}", self.0)
    }
}

/// What a pipeline does with its track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineRole {
    /// Audio playback to the output device
    AudioPlayback,
    /// Video frames to the display
    VideoRender,
    /// Frames to a recording file
    Recording,
}

impl PipelineRole {
    /// Whether this role occupies the track's playback slot
    pub fn is_playback(&self) -> bool {
        matches!(self, PipelineRole::AudioPlayback | PipelineRole::VideoRender)
    }
}

impl std::fmt::Display for PipelineRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineRole::AudioPlayback => write!(f, "audio playback"),
            PipelineRole::VideoRender => write!(f, "video render"),
            PipelineRole::Recording => write!(f, "recording"),
        }
    }
}

/// Why a pipeline ended on its own
#[derive(Debug)]
pub enum FinishReason {
    /// The frame source ended permanently
    SourceEnded,
    /// An unrecoverable error ended the pipeline
    Fatal(MediaError),
}

/// Notifications sent by pipelines that stop without being asked to
///
/// Explicitly stopped pipelines never report.
#[derive(Debug)]
pub enum PipelineEvent {
    /// The pipeline stopped on its own
    Finished {
        /// Pipeline instance
        id: PipelineId,
        /// Track it served
        track_id: String,
        /// Pipeline role
        role: PipelineRole,
        /// Why it stopped
        reason: FinishReason,
    },
}

/// Sender half used by pipelines
pub type PipelineEventSender = mpsc::UnboundedSender<PipelineEvent>;

/// Receiver half owned by the controller
pub type PipelineEventReceiver = mpsc::UnboundedReceiver<PipelineEvent>;

/// Create a pipeline event channel
pub fn pipeline_events() -> (PipelineEventSender, PipelineEventReceiver) {
    mpsc::unbounded_channel()
}

/// Context shared by every pipeline start call
#[derive(Debug, Clone)]
pub struct PipelineContext {
    /// Pipeline instance id
    pub id: PipelineId,
    /// Track served
    pub track_id: String,
    /// Where to report self-termination
    pub events: PipelineEventSender,
}

impl PipelineContext {
    /// Create a context
    pub fn new(id: PipelineId, track_id: impl Into<String>, events: PipelineEventSender) -> Self {
        Self {
            id,
            track_id: track_id.into(),
            events,
        }
    }

    pub(crate) fn report(&self, role: PipelineRole, reason: FinishReason) {
        let event = PipelineEvent::Finished {
            id: self.id,
            track_id: self.track_id.clone(),
            role,
            reason,
        };
        // The controller may already be gone during shutdown
        let _ = self.events.send(event);
    }
}
