//! # tracksink - Remote track playback, rendering and recording
//!
//! tracksink sits between a real-time media client and the user interface.
//! It tracks which remote tracks exist, subscribes to them on request and
//! drives three kinds of pipelines over each subscription:
//!
//! - **Audio playback** to the system output device
//! - **Video rendering** to a display sink
//! - **Recording** to WAV (audio) or AVI (video) files
//!
//! Stopping a pipeline always waits for it to release its device or file,
//! and a removed track never leaves a pipeline running behind it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tracksink::{MediaClient, RoomEvent, TrackKind, TrackSink};
//! use tokio::sync::mpsc;
//!
//! # fn client() -> Arc<dyn MediaClient> { unimplemented!() }
//! # fn main() -> Result<(), tracksink::TrackSinkError> {
//! let tracksink = TrackSink::init()?;
//! let (room_tx, room_rx) = mpsc::unbounded_channel::<RoomEvent>();
//!
//! let (session, mut events, _task) =
//!     tracksink.spawn_session(tracksink.session(client(), room_rx).auto_subscribe(true))?;
//!
//! tracksink.block_on(async move {
//!     while let Some(event) = events.next().await {
//!         if let tracksink::Event::TrackStateChanged { track_id, .. } = event {
//!             let _ = session.play(&track_id, TrackKind::Audio).await;
//!         }
//!     }
//! });
//! # drop(room_tx);
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

// Re-export core types for easy access
pub use tracksink_core::{
    frame_channel, AudioFormat, AudioFrame, ChannelFrameSource, ClientError, ErrorKind,
    FrameItem, FrameSender, FrameSource, MediaClient, MediaFrame, RoomEvent, StreamFrameSource,
    Subscription, TrackKind, TrackSinkError, TrackSinkResult, VideoFrame,
};

pub use tracksink_media::{
    AudioBackend, AudioOutput, AviRecordingSink, CallbackRenderer, CpalAudioBackend,
    DisplayFormat, DisplayFrame, FileSinkFactory, MediaError, PlaybackConfig, PlaybackStats,
    RecordingConfig, RecordingSink, RecordingSummary, RenderConfig, RenderStats, SinkFactory,
    SoftwareRenderer, VideoRenderer, WavRecordingSink,
};

#[cfg(feature = "diagnostics")]
pub use tracksink_diagnostics::{DebugLogger, LoggingConfig};

// Public API modules
pub mod config;
pub mod controller;
pub mod event;
pub mod participant;
pub mod registry;
pub mod session;
pub mod track;

// Re-export main API types
pub use config::SessionConfig;
pub use controller::{ControllerInput, ControllerParts, SubscriptionController, TrackStats};
pub use event::{Event, EventFilter, EventStream, FilteredEventStream};
pub use participant::{Participants, RemoteParticipant};
pub use registry::{RegistryView, TrackRegistry};
pub use session::{RoomSession, SessionBuilder, SessionHandle};
pub use track::{PlaybackState, RecordingState, SubscriptionState, TrackDescriptor};

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Main entry point for tracksink
#[derive(Debug, Clone)]
pub struct TrackSink {
    inner: Arc<TrackSinkInner>,
}

#[derive(Debug)]
struct TrackSinkInner {
    runtime: tokio::runtime::Runtime,
    config: SessionConfig,
}

impl TrackSink {
    /// Initialize tracksink with default settings
    ///
    /// # Example
    /// ```rust,no_run
    /// use tracksink::TrackSink;
    ///
    /// let tracksink = TrackSink::init()?;
    /// # Ok::<(), tracksink::TrackSinkError>(())
    /// ```
    pub fn init() -> TrackSinkResult<Self> {
        Self::init_with(SessionConfig::default())
    }

    /// Initialize with a custom session configuration
    pub fn init_with(config: SessionConfig) -> TrackSinkResult<Self> {
        config.validate()?;

        let runtime =
            tokio::runtime::Runtime::new().map_err(|e| TrackSinkError::Initialization {
                reason: format!("Failed to create async runtime: {}", e),
            })?;

        Ok(Self {
            inner: Arc::new(TrackSinkInner { runtime, config }),
        })
    }

    /// Configuration sessions start from
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Session builder over a media client and its room events
    pub fn session(
        &self,
        client: Arc<dyn MediaClient>,
        room_events: mpsc::UnboundedReceiver<RoomEvent>,
    ) -> SessionBuilder {
        SessionBuilder::new(client, room_events).config(self.inner.config.clone())
    }

    /// Start a session on the tracksink runtime
    pub fn spawn_session(
        &self,
        builder: SessionBuilder,
    ) -> TrackSinkResult<(SessionHandle, EventStream, JoinHandle<()>)> {
        let _guard = self.inner.runtime.enter();
        builder.spawn()
    }

    /// Run a future to completion on the tracksink runtime
    pub fn block_on<F: std::future::Future>(&self, future: F) -> F::Output {
        self.inner.runtime.block_on(future)
    }
}
