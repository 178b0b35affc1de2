//! # TrackSink Media
//!
//! Downstream pipelines for subscribed tracks: audio playback on a dedicated
//! output thread, video rendering to a display callback, and recording to
//! WAV and AVI files. Each pipeline owns one track's frame source and reports
//! self-termination through a [`PipelineEvent`] channel.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod buffer;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod playback;
pub mod recording;
pub mod render;
pub mod video_render;

// Re-export main types
pub use buffer::{BufferStats, PlaybackBuffer, PopOutcome, PushOutcome};
pub use config::{PlaybackConfig, RecordingConfig, RenderConfig};
pub use error::{ErrorCategory, MediaError, MediaResult};
pub use pipeline::{
    pipeline_events, FinishReason, PipelineContext, PipelineEvent, PipelineEventReceiver,
    PipelineEventSender, PipelineId, PipelineRole,
};
pub use playback::{AudioPlaybackPipeline, PlaybackStats};
pub use recording::{
    AviRecordingSink, FileSinkFactory, RecordingPipeline, RecordingSink, RecordingSummary,
    SinkFactory, WavRecordingSink,
};
pub use render::{AudioBackend, AudioOutput, CpalAudioBackend};
pub use video_render::{
    convert_frame, CallbackRenderer, DisplayFormat, DisplayFrame, RenderStats, SoftwareRenderer,
    VideoRenderPipeline, VideoRenderStats, VideoRenderer,
};
