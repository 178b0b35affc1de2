//! Room session actor and its command handle
//!
//! A [`RoomSession`] owns the [`SubscriptionController`] and serializes
//! commands from any number of [`SessionHandle`] clones with room and
//! pipeline events. Readers never wait on the actor: they go through the
//! shared registry view.

use crate::config::SessionConfig;
use crate::controller::{ControllerParts, SubscriptionController, TrackStats};
use crate::event::EventStream;
use crate::registry::RegistryView;
use crate::track::TrackDescriptor;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use tracksink_core::{MediaClient, RoomEvent, TrackKind, TrackSinkError, TrackSinkResult};
use tracksink_media::{
    AudioBackend, CpalAudioBackend, FileSinkFactory, SinkFactory, SoftwareRenderer, VideoRenderer,
};

const COMMAND_QUEUE: usize = 64;

type Reply<T> = oneshot::Sender<TrackSinkResult<T>>;

enum Command {
    Subscribe {
        track_id: String,
        reply: Reply<TrackDescriptor>,
    },
    Unsubscribe {
        track_id: String,
        reply: Reply<TrackDescriptor>,
    },
    Play {
        track_id: String,
        kind: TrackKind,
        reply: Reply<TrackDescriptor>,
    },
    StopPlay {
        track_id: String,
        kind: TrackKind,
        reply: Reply<TrackDescriptor>,
    },
    Record {
        track_id: String,
        kind: TrackKind,
        reply: Reply<TrackDescriptor>,
    },
    StopRecord {
        track_id: String,
        kind: TrackKind,
        reply: Reply<TrackDescriptor>,
    },
    Stats {
        track_id: String,
        reply: oneshot::Sender<Option<TrackStats>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Subscribe { .. } => "subscribe",
            Command::Unsubscribe { .. } => "unsubscribe",
            Command::Play { .. } => "play",
            Command::StopPlay { .. } => "stop_play",
            Command::Record { .. } => "record",
            Command::StopRecord { .. } => "stop_record",
            Command::Stats { .. } => "stats",
            Command::Shutdown { .. } => "shutdown",
        }
    }
}

/// Cloneable handle for issuing commands to a running session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    registry: RegistryView,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl SessionHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> Command,
    ) -> TrackSinkResult<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| TrackSinkError::SessionClosed)?;
        response.await.map_err(|_| TrackSinkError::SessionClosed)?
    }

    /// Subscribe to a published track
    pub async fn subscribe(&self, track_id: &str) -> TrackSinkResult<TrackDescriptor> {
        let track_id = track_id.to_string();
        self.request(|reply| Command::Subscribe { track_id, reply })
            .await
    }

    /// Unsubscribe; playback and recording stop first
    pub async fn unsubscribe(&self, track_id: &str) -> TrackSinkResult<TrackDescriptor> {
        let track_id = track_id.to_string();
        self.request(|reply| Command::Unsubscribe { track_id, reply })
            .await
    }

    /// Start audio playback or video rendering
    pub async fn play(&self, track_id: &str, kind: TrackKind) -> TrackSinkResult<TrackDescriptor> {
        let track_id = track_id.to_string();
        self.request(|reply| Command::Play {
            track_id,
            kind,
            reply,
        })
        .await
    }

    /// Stop playback
    pub async fn stop_play(
        &self,
        track_id: &str,
        kind: TrackKind,
    ) -> TrackSinkResult<TrackDescriptor> {
        let track_id = track_id.to_string();
        self.request(|reply| Command::StopPlay {
            track_id,
            kind,
            reply,
        })
        .await
    }

    /// Start recording
    pub async fn record(
        &self,
        track_id: &str,
        kind: TrackKind,
    ) -> TrackSinkResult<TrackDescriptor> {
        let track_id = track_id.to_string();
        self.request(|reply| Command::Record {
            track_id,
            kind,
            reply,
        })
        .await
    }

    /// Stop recording; the file is finalized when this returns
    pub async fn stop_record(
        &self,
        track_id: &str,
        kind: TrackKind,
    ) -> TrackSinkResult<TrackDescriptor> {
        let track_id = track_id.to_string();
        self.request(|reply| Command::StopRecord {
            track_id,
            kind,
            reply,
        })
        .await
    }

    /// Live statistics for a subscribed track
    pub async fn stats(&self, track_id: &str) -> TrackSinkResult<Option<TrackStats>> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Stats {
                track_id: track_id.to_string(),
                reply,
            })
            .await
            .map_err(|_| TrackSinkError::SessionClosed)?;
        response.await.map_err(|_| TrackSinkError::SessionClosed)
    }

    /// Stop every pipeline, close every subscription and end the session
    pub async fn shutdown(&self) -> TrackSinkResult<()> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Shutdown { reply })
            .await
            .map_err(|_| TrackSinkError::SessionClosed)?;
        response.await.map_err(|_| TrackSinkError::SessionClosed)
    }

    /// Snapshot of every known track
    pub fn tracks(&self) -> Vec<TrackDescriptor> {
        self.registry.list()
    }

    /// Current descriptor of one track
    pub fn track(&self, track_id: &str) -> Option<TrackDescriptor> {
        self.registry.get(track_id)
    }

    /// Shared read-only registry
    pub fn registry(&self) -> &RegistryView {
        &self.registry
    }

    /// Whether the session has stopped accepting commands
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

/// Session actor driving one room's subscriptions
#[derive(Debug)]
pub struct RoomSession {
    controller: SubscriptionController,
    commands: mpsc::Receiver<Command>,
}

impl RoomSession {
    /// Process commands and events until shutdown
    ///
    /// Shutdown happens on an explicit command or when every handle is
    /// dropped. Room events keep being processed after the media client
    /// closes its event stream.
    pub async fn run(mut self) {
        info!("🚀 Room session started");

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown { reply }) => {
                        self.controller.shutdown().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.dispatch(command).await,
                    None => {
                        debug!("All session handles dropped");
                        self.controller.shutdown().await;
                        break;
                    }
                },
                Some(input) = self.controller.next_input() => {
                    self.controller.handle_input(input).await;
                }
            }
            self.controller.drain_pending().await;
        }

        self.commands.close();
        info!("Room session stopped");
    }

    async fn dispatch(&mut self, command: Command) {
        debug!(command = command.name(), "Session command");
        let controller = &mut self.controller;

        match command {
            Command::Subscribe { track_id, reply } => {
                let _ = reply.send(controller.subscribe(&track_id).await);
            }
            Command::Unsubscribe { track_id, reply } => {
                let _ = reply.send(controller.unsubscribe(&track_id).await);
            }
            Command::Play {
                track_id,
                kind,
                reply,
            } => {
                let _ = reply.send(controller.play(&track_id, kind).await);
            }
            Command::StopPlay {
                track_id,
                kind,
                reply,
            } => {
                let _ = reply.send(controller.stop_play(&track_id, kind).await);
            }
            Command::Record {
                track_id,
                kind,
                reply,
            } => {
                let _ = reply.send(controller.record(&track_id, kind).await);
            }
            Command::StopRecord {
                track_id,
                kind,
                reply,
            } => {
                let _ = reply.send(controller.stop_record(&track_id, kind).await);
            }
            Command::Stats { track_id, reply } => {
                let _ = reply.send(controller.stats(&track_id));
            }
            Command::Shutdown { reply } => {
                controller.shutdown().await;
                let _ = reply.send(());
            }
        }
    }
}

/// Builder wiring a media client to a [`RoomSession`]
pub struct SessionBuilder {
    client: Arc<dyn MediaClient>,
    room_events: mpsc::UnboundedReceiver<RoomEvent>,
    config: SessionConfig,
    audio_backend: Option<Arc<dyn AudioBackend>>,
    renderer: Option<Arc<dyn VideoRenderer>>,
    sinks: Option<Arc<dyn SinkFactory>>,
}

impl std::fmt::Debug for SessionBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SessionBuilder {
    /// Start building a session over `client` and its room events
    pub fn new(
        client: Arc<dyn MediaClient>,
        room_events: mpsc::UnboundedReceiver<RoomEvent>,
    ) -> Self {
        Self {
            client,
            room_events,
            config: SessionConfig::default(),
            audio_backend: None,
            renderer: None,
            sinks: None,
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Subscribe to tracks as soon as they are published
    pub fn auto_subscribe(mut self, enabled: bool) -> Self {
        self.config.auto_subscribe = enabled;
        self
    }

    /// Audio output backend (default: system output via cpal)
    pub fn audio_backend(mut self, backend: Arc<dyn AudioBackend>) -> Self {
        self.audio_backend = Some(backend);
        self
    }

    /// Video renderer (default: in-memory software renderer)
    pub fn renderer(mut self, renderer: Arc<dyn VideoRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Recording file factory (default: WAV and AVI files under the configured directories)
    pub fn sink_factory(mut self, sinks: Arc<dyn SinkFactory>) -> Self {
        self.sinks = Some(sinks);
        self
    }

    /// Assemble the session without starting it
    pub fn build(self) -> TrackSinkResult<(RoomSession, SessionHandle, EventStream)> {
        self.config.validate()?;

        let audio_backend = self
            .audio_backend
            .unwrap_or_else(|| Arc::new(CpalAudioBackend::from_config(&self.config.playback)));
        let renderer = self
            .renderer
            .unwrap_or_else(|| Arc::new(SoftwareRenderer::new(self.config.render.display_format)));
        let sinks = self
            .sinks
            .unwrap_or_else(|| Arc::new(FileSinkFactory::new(self.config.recording.clone())));

        let (event_tx, events) = EventStream::channel();
        let controller = SubscriptionController::new(
            ControllerParts {
                client: self.client,
                room_events: self.room_events,
                audio_backend,
                renderer,
                sinks,
                events: event_tx,
            },
            self.config,
        );

        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE);
        let handle = SessionHandle {
            commands: command_tx,
            registry: controller.registry(),
        };
        let session = RoomSession {
            controller,
            commands: command_rx,
        };

        Ok((session, handle, events))
    }

    /// Build and run the session on the current tokio runtime
    pub fn spawn(self) -> TrackSinkResult<(SessionHandle, EventStream, JoinHandle<()>)> {
        let (session, handle, events) = self.build()?;
        let task = tokio::spawn(session.run());
        Ok((handle, events, task))
    }
}
