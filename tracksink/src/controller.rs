//! Subscription controller
//!
//! The controller is the single writer of the [`TrackRegistry`]. It turns
//! commands and room events into registry transitions, starts and stops the
//! pipelines bound to each subscription, and publishes [`Event`]s.
//!
//! Every pipeline stop is cancel-then-join: a track is reported idle only
//! after its pipeline has released its device or file. Track removal runs
//! the same sequence before the registry entry is deleted.

use crate::config::SessionConfig;
use crate::event::{Event, EventSender};
use crate::participant::Participants;
use crate::registry::{RegistryView, TrackRegistry};
use crate::track::{PlaybackState, RecordingState, SubscriptionState, TrackDescriptor};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracksink_core::{
    AudioFormat, FrameFanout, MediaClient, RoomEvent, TrackKind, TrackSinkError, TrackSinkResult,
};
use tracksink_media::{
    pipeline_events, AudioBackend, AudioPlaybackPipeline, FinishReason, MediaError, MediaResult,
    PipelineContext, PipelineEvent, PipelineEventReceiver, PipelineEventSender, PipelineId,
    PipelineRole, PlaybackStats, RecordingPipeline, RecordingSummary, RenderStats, SinkFactory,
    VideoRenderPipeline, VideoRenderer,
};

/// Frames buffered per pipeline tap before the subscription pump waits
const TAP_CAPACITY: usize = 32;

/// How long a full tap may hold up the pump before it starts losing frames
const TAP_STALL_TIMEOUT: Duration = Duration::from_millis(100);

/// Input the controller reacts to besides commands
#[derive(Debug)]
pub enum ControllerInput {
    /// Event from the media client's room
    Room(RoomEvent),
    /// A pipeline stopped on its own
    Pipeline(PipelineEvent),
}

/// Live statistics of one subscribed track
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackStats {
    /// Audio playback statistics while playing audio
    pub playback: Option<PlaybackStats>,
    /// Render statistics while rendering video
    pub render: Option<RenderStats>,
    /// File being recorded
    pub recording_path: Option<PathBuf>,
    /// Pipelines attached to the subscription
    pub taps: usize,
    /// Frames a stalled pipeline missed
    pub dropped_frames: u64,
}

/// Playback slot: audio playback or video rendering
#[derive(Debug)]
enum PlaybackHandle {
    Audio(AudioPlaybackPipeline),
    Video(VideoRenderPipeline),
}

impl PlaybackHandle {
    fn id(&self) -> PipelineId {
        match self {
            PlaybackHandle::Audio(pipeline) => pipeline.id(),
            PlaybackHandle::Video(pipeline) => pipeline.id(),
        }
    }

    async fn stop(self) -> MediaResult<()> {
        match self {
            PlaybackHandle::Audio(pipeline) => pipeline.stop().await.map(|_| ()),
            PlaybackHandle::Video(pipeline) => pipeline.stop().await.map(|_| ()),
        }
    }
}

/// Resources bound to one subscription
#[derive(Debug)]
struct ActiveTrack {
    fanout: FrameFanout,
    audio_format: AudioFormat,
    playback: Option<PlaybackHandle>,
    recording: Option<RecordingPipeline>,
}

/// Collaborators the controller drives
pub struct ControllerParts {
    /// Media client providing subscriptions
    pub client: Arc<dyn MediaClient>,
    /// Room events from the media client
    pub room_events: mpsc::UnboundedReceiver<RoomEvent>,
    /// Audio output devices
    pub audio_backend: Arc<dyn AudioBackend>,
    /// Video display
    pub renderer: Arc<dyn VideoRenderer>,
    /// Recording file factory
    pub sinks: Arc<dyn SinkFactory>,
    /// Where UI events go
    pub events: EventSender,
}

/// Orchestrates subscriptions and the pipelines bound to them
pub struct SubscriptionController {
    client: Arc<dyn MediaClient>,
    audio_backend: Arc<dyn AudioBackend>,
    renderer: Arc<dyn VideoRenderer>,
    sinks: Arc<dyn SinkFactory>,
    config: SessionConfig,
    registry: TrackRegistry,
    participants: Participants,
    active: HashMap<String, ActiveTrack>,
    room_events: mpsc::UnboundedReceiver<RoomEvent>,
    room_closed: bool,
    pipeline_tx: PipelineEventSender,
    pipeline_rx: PipelineEventReceiver,
    events: EventSender,
    next_pipeline_id: u64,
    pending_subscriptions: VecDeque<String>,
}

impl std::fmt::Debug for SubscriptionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionController")
            .field("tracks", &self.registry.len())
            .field("participants", &self.participants.len())
            .field("active", &self.active.len())
            .field("room_closed", &self.room_closed)
            .finish_non_exhaustive()
    }
}

impl SubscriptionController {
    /// Create a controller
    pub fn new(parts: ControllerParts, config: SessionConfig) -> Self {
        let (pipeline_tx, pipeline_rx) = pipeline_events();
        Self {
            client: parts.client,
            audio_backend: parts.audio_backend,
            renderer: parts.renderer,
            sinks: parts.sinks,
            config,
            registry: TrackRegistry::new(),
            participants: Participants::new(),
            active: HashMap::new(),
            room_events: parts.room_events,
            room_closed: false,
            pipeline_tx,
            pipeline_rx,
            events: parts.events,
            next_pipeline_id: 1,
            pending_subscriptions: VecDeque::new(),
        }
    }

    /// Read-only view of the registry
    pub fn registry(&self) -> RegistryView {
        self.registry.view()
    }

    /// Connected remote participants
    pub fn participants(&self) -> &Participants {
        &self.participants
    }

    /// Session configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Wait for the next room or pipeline event
    ///
    /// Cancel-safe. Returns `None` only when no further input can arrive.
    pub async fn next_input(&mut self) -> Option<ControllerInput> {
        loop {
            tokio::select! {
                event = self.room_events.recv(), if !self.room_closed => match event {
                    Some(event) => return Some(ControllerInput::Room(event)),
                    None => {
                        debug!("Room event stream closed");
                        self.room_closed = true;
                    }
                },
                Some(event) = self.pipeline_rx.recv() => return Some(ControllerInput::Pipeline(event)),
                else => return None,
            }
        }
    }

    /// React to a room or pipeline event
    pub async fn handle_input(&mut self, input: ControllerInput) {
        match input {
            ControllerInput::Room(event) => self.handle_room_event(event).await,
            ControllerInput::Pipeline(event) => self.handle_pipeline_event(event).await,
        }
    }

    /// Subscribe to tracks queued by auto-subscribe
    pub async fn drain_pending(&mut self) {
        while let Some(track_id) = self.pending_subscriptions.pop_front() {
            if let Err(e) = self.subscribe(&track_id).await {
                warn!(track_id = %track_id, "Auto-subscribe failed: {}", e);
                self.report_error(&track_id, &e);
            }
        }
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Subscribe to a published track
    ///
    /// No-op if already subscribed. Room and pipeline events that arrive
    /// while the client is working are applied before this returns.
    pub async fn subscribe(&mut self, track_id: &str) -> TrackSinkResult<TrackDescriptor> {
        let track = self.lookup(track_id)?;
        match track.subscription {
            SubscriptionState::Subscribed | SubscriptionState::Subscribing => return Ok(track),
            SubscriptionState::Unsubscribed | SubscriptionState::Unsubscribing => {}
        }

        let participant_id = track.participant_id.clone();
        if !self.participants.contains(&participant_id) {
            return Err(TrackSinkError::ParticipantGone {
                participant_id,
                track_id: track_id.to_string(),
            });
        }

        self.set_state(track_id, |t| t.subscription = SubscriptionState::Subscribing);
        info!(track_id = %track_id, participant_id = %participant_id, "📥 Subscribing to {} track", track.kind);

        let client = self.client.clone();
        let request_id = track_id.to_string();
        let request = async move { client.subscribe(&request_id).await };
        tokio::pin!(request);

        let result = loop {
            tokio::select! {
                result = &mut request => break result,
                input = self.next_input() => match input {
                    Some(input) => self.handle_input(input).await,
                    None => break request.as_mut().await,
                },
            }
        };

        // The room may have moved on while the client was working
        let gone = !self.participants.contains(&participant_id);
        let current = self.registry.get(track_id);
        let failure = match (&result, gone, &current) {
            (_, true, _) => Some(TrackSinkError::ParticipantGone {
                participant_id: participant_id.clone(),
                track_id: track_id.to_string(),
            }),
            (_, false, None) => Some(TrackSinkError::TrackNotFound {
                track_id: track_id.to_string(),
            }),
            _ => None,
        };

        if let Some(err) = failure {
            if let Ok(mut subscription) = result {
                debug!(track_id = %track_id, "Discarding subscription for removed track");
                subscription.source.close().await;
                self.client.unsubscribe(track_id).await;
            }
            if current.is_some() {
                self.set_state(track_id, |t| t.subscription = SubscriptionState::Unsubscribed);
            }
            return Err(err);
        }

        let subscription = match result {
            Ok(subscription) => subscription,
            Err(e) => {
                let err = e.into_track_error(track_id);
                warn!(track_id = %track_id, "Subscription failed: {}", err);
                self.set_state(track_id, |t| t.subscription = SubscriptionState::Unsubscribed);
                return Err(err);
            }
        };

        let audio_format = subscription
            .audio_format
            .unwrap_or(self.config.playback.default_format);
        let fanout = FrameFanout::spawn(
            track_id,
            subscription.source,
            TAP_CAPACITY,
            TAP_STALL_TIMEOUT,
        );
        self.active.insert(
            track_id.to_string(),
            ActiveTrack {
                fanout,
                audio_format,
                playback: None,
                recording: None,
            },
        );

        info!(track_id = %track_id, "✅ Subscribed");
        let track = self.set_state(track_id, |t| t.subscription = SubscriptionState::Subscribed);
        self.lookup_or(track_id, track)
    }

    /// Unsubscribe, stopping every pipeline bound to the track
    ///
    /// Always succeeds for a known track. Pipelines that miss their join
    /// timeout are reported as `ShutdownTimeout` events.
    pub async fn unsubscribe(&mut self, track_id: &str) -> TrackSinkResult<TrackDescriptor> {
        let track = self.lookup(track_id)?;
        if track.subscription == SubscriptionState::Unsubscribed {
            return Ok(track);
        }

        // Pipelines go idle before the subscription starts closing
        self.stop_pipelines(track_id).await;
        self.set_state(track_id, |t| t.subscription = SubscriptionState::Unsubscribing);
        self.close_subscription(track_id, true).await;
        let track = self.set_state(track_id, |t| t.subscription = SubscriptionState::Unsubscribed);
        info!(track_id = %track_id, "📤 Unsubscribed");
        self.lookup_or(track_id, track)
    }

    /// Start audio playback or video rendering
    pub async fn play(
        &mut self,
        track_id: &str,
        kind: TrackKind,
    ) -> TrackSinkResult<TrackDescriptor> {
        let track = self.lookup(track_id)?;
        check_kind(&track, kind);
        if !track.is_subscribed() {
            return Err(TrackSinkError::NotSubscribed {
                track_id: track_id.to_string(),
            });
        }
        if track.is_playing() {
            return Ok(track);
        }

        let ctx = self.next_context(track_id);
        let Some(active) = self.active.get_mut(track_id) else {
            return Err(TrackSinkError::NotSubscribed {
                track_id: track_id.to_string(),
            });
        };

        let tap = active.fanout.open_tap();
        let handle = match track.kind {
            TrackKind::Audio => {
                let started = AudioPlaybackPipeline::start(
                    ctx,
                    tap,
                    active.audio_format,
                    self.audio_backend.clone(),
                    &self.config.playback,
                )
                .await;
                match started {
                    Ok(pipeline) => PlaybackHandle::Audio(pipeline),
                    Err(e) => {
                        let err = TrackSinkError::from(e);
                        error!(track_id = %track_id, "Failed to start playback: {}", err);
                        self.report_error(track_id, &err);
                        return Err(err);
                    }
                }
            }
            TrackKind::Video => PlaybackHandle::Video(VideoRenderPipeline::start(
                ctx,
                tap,
                self.renderer.clone(),
                &self.config.render,
            )),
        };
        active.playback = Some(handle);

        let track = self.set_state(track_id, |t| t.playback = PlaybackState::Playing);
        self.lookup_or(track_id, track)
    }

    /// Stop playback; returns after the pipeline has released its device
    pub async fn stop_play(
        &mut self,
        track_id: &str,
        kind: TrackKind,
    ) -> TrackSinkResult<TrackDescriptor> {
        let track = self.lookup(track_id)?;
        check_kind(&track, kind);

        let handle = self
            .active
            .get_mut(track_id)
            .and_then(|active| active.playback.take());
        let Some(handle) = handle else {
            return Ok(track);
        };

        let stopped = handle.stop().await;
        let track = self.set_state(track_id, |t| t.playback = PlaybackState::Idle);
        if let Err(e) = stopped {
            let err = TrackSinkError::from(e);
            error!(track_id = %track_id, "Playback did not stop cleanly: {}", err);
            self.report_error(track_id, &err);
            return Err(err);
        }
        self.lookup_or(track_id, track)
    }

    /// Start recording the track to a file
    pub async fn record(
        &mut self,
        track_id: &str,
        kind: TrackKind,
    ) -> TrackSinkResult<TrackDescriptor> {
        let track = self.lookup(track_id)?;
        check_kind(&track, kind);
        if !track.is_subscribed() {
            return Err(TrackSinkError::NotSubscribed {
                track_id: track_id.to_string(),
            });
        }
        if track.is_recording() {
            return Ok(track);
        }

        let audio_format = match self.active.get(track_id) {
            Some(active) => active.audio_format,
            None => {
                return Err(TrackSinkError::NotSubscribed {
                    track_id: track_id.to_string(),
                })
            }
        };

        let opened = match track.kind {
            TrackKind::Audio => self.sinks.open_audio(track_id, audio_format).await,
            TrackKind::Video => self.sinks.open_video(track_id).await,
        };
        let sink = match opened {
            Ok(sink) => sink,
            Err(e) => {
                let err = TrackSinkError::from(e);
                error!(track_id = %track_id, "Failed to open recording: {}", err);
                self.report_error(track_id, &err);
                return Err(err);
            }
        };

        let ctx = self.next_context(track_id);
        let Some(active) = self.active.get_mut(track_id) else {
            return Err(TrackSinkError::NotSubscribed {
                track_id: track_id.to_string(),
            });
        };
        let tap = active.fanout.open_tap();
        active.recording = Some(RecordingPipeline::start(
            ctx,
            track.kind,
            tap,
            sink,
            &self.config.recording,
        ));

        let track = self.set_state(track_id, |t| t.recording = RecordingState::Recording);
        self.lookup_or(track_id, track)
    }

    /// Stop recording; returns after the file has been finalized
    pub async fn stop_record(
        &mut self,
        track_id: &str,
        kind: TrackKind,
    ) -> TrackSinkResult<TrackDescriptor> {
        let track = self.lookup(track_id)?;
        check_kind(&track, kind);

        let recording = self
            .active
            .get_mut(track_id)
            .and_then(|active| active.recording.take());
        let Some(recording) = recording else {
            return Ok(track);
        };

        let finished = recording.stop().await;
        let track = self.set_state(track_id, |t| t.recording = RecordingState::Idle);
        self.report_recording(track_id, finished)?;
        self.lookup_or(track_id, track)
    }

    /// Live statistics for a subscribed track
    pub fn stats(&self, track_id: &str) -> Option<TrackStats> {
        let active = self.active.get(track_id)?;
        let mut stats = TrackStats {
            taps: active.fanout.tap_count(),
            dropped_frames: active.fanout.dropped_frames(),
            recording_path: active.recording.as_ref().map(|r| r.path().to_path_buf()),
            ..Default::default()
        };
        match &active.playback {
            Some(PlaybackHandle::Audio(pipeline)) => stats.playback = Some(pipeline.stats()),
            Some(PlaybackHandle::Video(pipeline)) => stats.render = Some(pipeline.stats()),
            None => {}
        }
        Some(stats)
    }

    /// Stop every pipeline and close every subscription
    pub async fn shutdown(&mut self) {
        self.pending_subscriptions.clear();
        let subscribed: Vec<String> = self.active.keys().cloned().collect();
        info!(subscriptions = subscribed.len(), "Shutting down subscriptions");
        for track_id in subscribed {
            if let Err(e) = self.unsubscribe(&track_id).await {
                warn!(track_id = %track_id, "Unsubscribe during shutdown failed: {}", e);
            }
        }
    }

    // ------------------------------------------------------------------
    // Room events
    // ------------------------------------------------------------------

    async fn handle_room_event(&mut self, event: RoomEvent) {
        debug!(event_type = event.event_type(), participant_id = %event.participant_id(), "📡 Room event");

        match event {
            RoomEvent::ParticipantConnected { participant_id } => {
                self.connect_participant(&participant_id);
            }
            RoomEvent::ParticipantDisconnected { participant_id } => {
                let owned: Vec<String> = self
                    .registry
                    .list()
                    .into_iter()
                    .filter(|t| t.participant_id == participant_id)
                    .map(|t| t.track_id)
                    .collect();
                for track_id in owned {
                    self.remove_track(&track_id).await;
                }
                if self.participants.disconnect(&participant_id).is_some() {
                    info!(participant_id = %participant_id, "👋 Participant disconnected");
                    self.emit(Event::ParticipantDisconnected { participant_id });
                }
            }
            RoomEvent::TrackPublished {
                participant_id,
                track_id,
                kind,
            } => {
                self.connect_participant(&participant_id);
                if let Some(existing) = self.registry.get(&track_id) {
                    if existing.participant_id != participant_id || existing.kind != kind {
                        warn!(track_id = %track_id, "Track republished with different owner or kind, ignoring");
                    }
                    return;
                }

                let track = TrackDescriptor::new(&track_id, &participant_id, kind);
                self.registry.upsert(track.clone());
                info!(track_id = %track_id, participant_id = %participant_id, "➕ {} track published", kind);
                self.emit(Event::TrackAdded { track });

                if self.config.auto_subscribe {
                    self.pending_subscriptions.push_back(track_id);
                }
            }
            RoomEvent::TrackUnpublished { track_id, .. } => {
                self.remove_track(&track_id).await;
            }
            RoomEvent::TrackSubscribed { track_id, .. } => {
                debug!(track_id = %track_id, "Subscription acknowledged by the room");
            }
            RoomEvent::TrackUnsubscribed { track_id, .. } => {
                let subscribed = self
                    .registry
                    .get(&track_id)
                    .is_some_and(|t| t.is_subscribed());
                if subscribed {
                    warn!(track_id = %track_id, "Subscription ended by the room");
                    self.stop_pipelines(&track_id).await;
                    self.set_state(&track_id, |t| {
                        t.subscription = SubscriptionState::Unsubscribing
                    });
                    self.close_subscription(&track_id, false).await;
                    self.set_state(&track_id, |t| {
                        t.subscription = SubscriptionState::Unsubscribed
                    });
                }
            }
        }
    }

    fn connect_participant(&mut self, participant_id: &str) {
        if self.participants.connect(participant_id) {
            info!(participant_id = %participant_id, "👤 Participant connected");
            self.emit(Event::ParticipantConnected {
                participant_id: participant_id.to_string(),
            });
        }
    }

    /// Cancel and join the track's pipelines, then drop it from the registry
    async fn remove_track(&mut self, track_id: &str) {
        self.pending_subscriptions.retain(|id| id != track_id);
        self.stop_pipelines(track_id).await;
        self.close_subscription(track_id, false).await;

        let Some(mut track) = self.registry.get(track_id) else {
            return;
        };
        self.registry.remove(track_id);
        track.subscription = SubscriptionState::Unsubscribed;
        track.playback = PlaybackState::Idle;
        track.recording = RecordingState::Idle;
        info!(track_id = %track_id, "➖ Track removed");
        self.emit(Event::TrackRemoved { track });
    }

    /// Cancel and join the track's pipelines, marking each slot idle once joined
    async fn stop_pipelines(&mut self, track_id: &str) {
        let Some(active) = self.active.get_mut(track_id) else {
            return;
        };
        let playback = active.playback.take();
        let recording = active.recording.take();

        if let Some(playback) = playback {
            let stopped = playback.stop().await;
            self.set_state(track_id, |t| t.playback = PlaybackState::Idle);
            if let Err(e) = stopped {
                let err = TrackSinkError::from(e);
                error!(track_id = %track_id, "Playback did not stop cleanly: {}", err);
                self.report_error(track_id, &err);
            }
        }
        if let Some(recording) = recording {
            let finished = recording.stop().await;
            self.set_state(track_id, |t| t.recording = RecordingState::Idle);
            // Already reported as an event
            let _ = self.report_recording(track_id, finished);
        }
    }

    /// Close the subscription's source; its pipelines must already be stopped
    async fn close_subscription(&mut self, track_id: &str, notify_client: bool) {
        let Some(active) = self.active.remove(track_id) else {
            return;
        };
        active.fanout.close().await;
        if notify_client {
            self.client.unsubscribe(track_id).await;
        }
    }

    // ------------------------------------------------------------------
    // Pipeline events
    // ------------------------------------------------------------------

    async fn handle_pipeline_event(&mut self, event: PipelineEvent) {
        let PipelineEvent::Finished {
            id,
            track_id,
            role,
            reason,
        } = event;

        let Some(active) = self.active.get_mut(&track_id) else {
            debug!(track_id = %track_id, %id, "Ignoring event from a released pipeline");
            return;
        };

        if role.is_playback() {
            let current = active.playback.as_ref().map(PlaybackHandle::id);
            if current != Some(id) {
                debug!(track_id = %track_id, %id, "Ignoring stale playback event");
                return;
            }
            let Some(handle) = active.playback.take() else {
                return;
            };

            let joined = handle.stop().await;
            self.set_state(&track_id, |t| t.playback = PlaybackState::Idle);
            self.report_finish(&track_id, role, reason);
            if let Err(e) = joined {
                self.report_error(&track_id, &TrackSinkError::from(e));
            }
        } else {
            let current = active.recording.as_ref().map(RecordingPipeline::id);
            if current != Some(id) {
                debug!(track_id = %track_id, %id, "Ignoring stale recording event");
                return;
            }
            let Some(recording) = active.recording.take() else {
                return;
            };

            let finished = recording.stop().await;
            self.set_state(&track_id, |t| t.recording = RecordingState::Idle);
            self.report_finish(&track_id, role, reason);
            let _ = self.report_recording(&track_id, finished);
        }
    }

    fn report_finish(&self, track_id: &str, role: PipelineRole, reason: FinishReason) {
        match reason {
            FinishReason::SourceEnded => {
                info!(track_id = %track_id, "⏹️ {} finished, source ended", role);
            }
            FinishReason::Fatal(e) => {
                error!(track_id = %track_id, "{} failed: {}", role, e);
                self.report_error(track_id, &TrackSinkError::from(e));
            }
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn lookup(&self, track_id: &str) -> TrackSinkResult<TrackDescriptor> {
        self.registry
            .get(track_id)
            .ok_or_else(|| TrackSinkError::TrackNotFound {
                track_id: track_id.to_string(),
            })
    }

    fn lookup_or(
        &self,
        track_id: &str,
        updated: Option<TrackDescriptor>,
    ) -> TrackSinkResult<TrackDescriptor> {
        match updated {
            Some(track) => Ok(track),
            None => self.lookup(track_id),
        }
    }

    /// Apply `change` to the track and publish the new state if it differs
    fn set_state(
        &self,
        track_id: &str,
        change: impl FnOnce(&mut TrackDescriptor),
    ) -> Option<TrackDescriptor> {
        let mut track = self.registry.get(track_id)?;
        change(&mut track);
        if self.registry.upsert(track.clone()) {
            debug!(
                track_id = %track_id,
                subscription = %track.subscription,
                playback = %track.playback,
                recording = %track.recording,
                "Track state changed"
            );
            self.emit(Event::TrackStateChanged {
                track_id: track_id.to_string(),
                subscription: track.subscription,
                playback: track.playback,
                recording: track.recording,
            });
        }
        Some(track)
    }

    fn next_context(&mut self, track_id: &str) -> PipelineContext {
        let id = PipelineId(self.next_pipeline_id);
        self.next_pipeline_id += 1;
        PipelineContext::new(id, track_id, self.pipeline_tx.clone())
    }

    fn report_recording(
        &self,
        track_id: &str,
        finished: Result<RecordingSummary, MediaError>,
    ) -> TrackSinkResult<()> {
        match finished {
            Ok(summary) => {
                info!(
                    track_id = %track_id,
                    path = %summary.path.display(),
                    frames = summary.frames_written,
                    "💾 Recording saved"
                );
                self.emit(Event::RecordingSaved {
                    track_id: track_id.to_string(),
                    path: summary.path,
                    frames: summary.frames_written,
                });
                Ok(())
            }
            Err(e) => {
                let err = TrackSinkError::from(e);
                error!(track_id = %track_id, "Recording did not finish cleanly: {}", err);
                self.report_error(track_id, &err);
                Err(err)
            }
        }
    }

    fn report_error(&self, track_id: &str, err: &TrackSinkError) {
        self.emit(Event::PipelineError {
            track_id: track_id.to_string(),
            kind: err.kind(),
            message: err.to_string(),
        });
    }

    fn emit(&self, event: Event) {
        // Nobody listening is fine
        let _ = self.events.send(event);
    }
}

fn check_kind(track: &TrackDescriptor, requested: TrackKind) {
    if track.kind != requested {
        warn!(
            track_id = %track.track_id,
            "Command for a {} track issued as {}, using {}",
            track.kind,
            requested,
            track.kind
        );
    }
}
