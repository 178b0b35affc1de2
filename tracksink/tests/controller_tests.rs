//! Integration tests for the subscription controller
//!
//! The controller is driven directly: room events go through its event
//! channel and are applied with `settle`, commands are awaited in place.
//! A scripted media client hands out channel-backed frame sources.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracksink::*;
use tracksink_media::MediaResult;

// ============================================================================
// MOCK MEDIA CLIENT
// ============================================================================

#[derive(Default)]
struct MockClient {
    senders: Mutex<HashMap<String, FrameSender>>,
    subscribe_calls: AtomicUsize,
    unsubscribed: Mutex<Vec<String>>,
    delay: Duration,
    failure: Option<ClientError>,
}

impl MockClient {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    fn failing(failure: ClientError) -> Self {
        Self {
            failure: Some(failure),
            ..Default::default()
        }
    }

    fn sender(&self, track_id: &str) -> FrameSender {
        self.senders
            .lock()
            .get(track_id)
            .cloned()
            .expect("track was never subscribed")
    }

    /// End the remote source as if the publisher stopped sending
    fn end_source(&self, track_id: &str) {
        self.senders.lock().remove(track_id);
    }

    fn unsubscribed(&self) -> Vec<String> {
        self.unsubscribed.lock().clone()
    }
}

#[async_trait]
impl MediaClient for MockClient {
    async fn subscribe(&self, track_id: &str) -> Result<Subscription, ClientError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }

        let (sender, source) = frame_channel(64);
        self.senders.lock().insert(track_id.to_string(), sender);
        Ok(Subscription::new(Box::new(source)).with_audio_format(AudioFormat::new(16_000, 1)))
    }

    async fn unsubscribe(&self, track_id: &str) {
        self.senders.lock().remove(track_id);
        self.unsubscribed.lock().push(track_id.to_string());
    }
}

// ============================================================================
// MOCK AUDIO DEVICE
// ============================================================================

#[derive(Debug, Default)]
struct DeviceLog {
    samples_written: AtomicUsize,
    opened: AtomicUsize,
    open: AtomicBool,
    writes_after_close: AtomicUsize,
}

struct MockBackend {
    log: Arc<DeviceLog>,
}

impl AudioBackend for MockBackend {
    fn open(&self, _format: AudioFormat) -> MediaResult<Box<dyn AudioOutput>> {
        self.log.opened.fetch_add(1, Ordering::SeqCst);
        self.log.open.store(true, Ordering::SeqCst);
        Ok(Box::new(MockOutput {
            log: self.log.clone(),
        }))
    }
}

struct MockOutput {
    log: Arc<DeviceLog>,
}

impl AudioOutput for MockOutput {
    fn write(&mut self, samples: &[i16]) -> MediaResult<()> {
        if !self.log.open.load(Ordering::SeqCst) {
            self.log.writes_after_close.fetch_add(1, Ordering::SeqCst);
        }
        self.log
            .samples_written
            .fetch_add(samples.len(), Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(2));
        Ok(())
    }
}

impl Drop for MockOutput {
    fn drop(&mut self) {
        self.log.open.store(false, Ordering::SeqCst);
    }
}

// ============================================================================
// MOCK RECORDING SINK
// ============================================================================

/// Disk whose writes never complete
struct HangingDisk;

struct HangingSink {
    path: std::path::PathBuf,
}

#[async_trait]
impl RecordingSink for HangingSink {
    fn path(&self) -> &Path {
        &self.path
    }

    async fn write_frame(&mut self, _frame: &MediaFrame) -> MediaResult<()> {
        std::future::pending().await
    }

    async fn finalize(self: Box<Self>) -> MediaResult<RecordingSummary> {
        Ok(RecordingSummary {
            path: self.path,
            frames_written: 0,
            samples_written: 0,
            frames_failed: 0,
        })
    }
}

#[async_trait]
impl SinkFactory for HangingDisk {
    async fn open_audio(
        &self,
        track_id: &str,
        _format: AudioFormat,
    ) -> MediaResult<Box<dyn RecordingSink>> {
        Ok(Box::new(HangingSink {
            path: format!("/hung/{}.wav", track_id).into(),
        }))
    }

    async fn open_video(&self, track_id: &str) -> MediaResult<Box<dyn RecordingSink>> {
        Ok(Box::new(HangingSink {
            path: format!("/hung/{}.avi", track_id).into(),
        }))
    }
}

// ============================================================================
// HARNESS
// ============================================================================

struct Harness {
    controller: SubscriptionController,
    room: mpsc::UnboundedSender<RoomEvent>,
    events: EventStream,
    client: Arc<MockClient>,
    device: Arc<DeviceLog>,
    renderer: Arc<SoftwareRenderer>,
    dir: tempfile::TempDir,
}

fn harness(client: MockClient, auto_subscribe: bool) -> Harness {
    harness_with_sinks(client, auto_subscribe, None)
}

fn harness_with_sinks(
    client: MockClient,
    auto_subscribe: bool,
    sinks: Option<Arc<dyn SinkFactory>>,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut config = SessionConfig {
        auto_subscribe,
        ..Default::default()
    };
    config.render.yield_interval_ms = 0;
    config.recording.audio_dir = dir.path().join("audio");
    config.recording.video_dir = dir.path().join("video");

    let client = Arc::new(client);
    let device = Arc::new(DeviceLog::default());
    let renderer = Arc::new(SoftwareRenderer::new(config.render.display_format));
    let (room, room_events) = mpsc::unbounded_channel();
    let (event_tx, events) = EventStream::channel();
    let sinks = sinks.unwrap_or_else(|| Arc::new(FileSinkFactory::new(config.recording.clone())));

    let controller = SubscriptionController::new(
        ControllerParts {
            client: client.clone(),
            room_events,
            audio_backend: Arc::new(MockBackend {
                log: device.clone(),
            }),
            renderer: renderer.clone(),
            sinks,
            events: event_tx,
        },
        config,
    );

    Harness {
        controller,
        room,
        events,
        client,
        device,
        renderer,
        dir,
    }
}

impl Harness {
    /// Apply every queued room and pipeline event
    async fn settle(&mut self) {
        while let Ok(Some(input)) =
            tokio::time::timeout(Duration::from_millis(50), self.controller.next_input()).await
        {
            self.controller.handle_input(input).await;
        }
        self.controller.drain_pending().await;
    }

    /// Settle until `check` holds for the registry, or give up after 5s
    async fn settle_until(&mut self, check: impl Fn(&RegistryView) -> bool) -> bool {
        let view = self.controller.registry();
        for _ in 0..100 {
            self.settle().await;
            if check(&view) {
                return true;
            }
        }
        false
    }

    fn publish(&self, participant_id: &str, track_id: &str, kind: TrackKind) {
        self.room
            .send(RoomEvent::TrackPublished {
                participant_id: participant_id.to_string(),
                track_id: track_id.to_string(),
                kind,
            })
            .unwrap();
    }

    fn unpublish(&self, participant_id: &str, track_id: &str, kind: TrackKind) {
        self.room
            .send(RoomEvent::TrackUnpublished {
                participant_id: participant_id.to_string(),
                track_id: track_id.to_string(),
                kind,
            })
            .unwrap();
    }

    fn take_events(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(Some(event)) = self.events.try_next() {
            events.push(event);
        }
        events
    }

    fn track(&self, track_id: &str) -> Option<TrackDescriptor> {
        self.controller.registry().get(track_id)
    }

    fn assert_consistent(&self) {
        for track in self.controller.registry().list() {
            assert!(track.is_consistent(), "inconsistent track {:?}", track);
        }
    }
}

/// Every published state must keep pipelines inside a subscription
fn assert_states_consistent(events: &[Event]) {
    for event in events {
        match event {
            Event::TrackStateChanged {
                subscription,
                playback,
                recording,
                ..
            } => {
                let busy = *playback == PlaybackState::Playing
                    || *recording == RecordingState::Recording;
                assert!(
                    !busy || *subscription == SubscriptionState::Subscribed,
                    "pipeline active outside a subscription: {:?}",
                    event
                );
            }
            Event::TrackRemoved { track } => {
                assert!(track.is_consistent(), "inconsistent removal {:?}", track)
            }
            _ => {}
        }
    }
}

fn audio_frame(value: i16) -> AudioFrame {
    AudioFrame::new(vec![value; 320], AudioFormat::new(16_000, 1), value as u64 * 20_000).unwrap()
}

fn video_frame(ts: u64) -> VideoFrame {
    VideoFrame::new(2, 2, vec![ts as u8; 12], ts)
}

fn files_in(dir: &Path) -> Vec<std::path::PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}

// ============================================================================
// SUBSCRIPTION LIFECYCLE
// ============================================================================

#[tokio::test]
async fn test_published_track_is_registered_unsubscribed() {
    let mut h = harness(MockClient::default(), false);
    h.publish("alice", "T1", TrackKind::Audio);
    h.settle().await;

    let track = h.track("T1").unwrap();
    assert_eq!(track.participant_id, "alice");
    assert_eq!(track.subscription, SubscriptionState::Unsubscribed);
    assert!(h.controller.participants().contains("alice"));

    let events = h.take_events();
    let types: Vec<_> = events.iter().map(Event::event_type).collect();
    assert_eq!(types, vec!["participant_connected", "track_added"]);
    assert_eq!(h.client.subscribe_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_subscribe_and_unsubscribe_are_idempotent() {
    let mut h = harness(MockClient::default(), false);
    h.publish("alice", "T1", TrackKind::Audio);
    h.settle().await;

    let track = h.controller.subscribe("T1").await.unwrap();
    assert_eq!(track.subscription, SubscriptionState::Subscribed);
    let again = h.controller.subscribe("T1").await.unwrap();
    assert_eq!(again, track);
    assert_eq!(h.client.subscribe_calls.load(Ordering::SeqCst), 1);

    h.controller.play("T1", TrackKind::Audio).await.unwrap();
    h.controller.play("T1", TrackKind::Audio).await.unwrap();
    assert_eq!(h.device.opened.load(Ordering::SeqCst), 1);

    h.controller.stop_play("T1", TrackKind::Audio).await.unwrap();
    let idle = h.controller.stop_play("T1", TrackKind::Audio).await.unwrap();
    assert_eq!(idle.playback, PlaybackState::Idle);
    assert!(!h.device.open.load(Ordering::SeqCst));

    h.controller.unsubscribe("T1").await.unwrap();
    let track = h.controller.unsubscribe("T1").await.unwrap();
    assert_eq!(track.subscription, SubscriptionState::Unsubscribed);
    assert_eq!(h.client.unsubscribed(), vec!["T1".to_string()]);
    h.assert_consistent();
}

#[tokio::test]
async fn test_commands_reject_unknown_and_unsubscribed_tracks() {
    let mut h = harness(MockClient::default(), false);

    let err = h.controller.play("missing", TrackKind::Audio).await.unwrap_err();
    assert!(matches!(err, TrackSinkError::TrackNotFound { .. }));
    let err = h.controller.subscribe("missing").await.unwrap_err();
    assert!(matches!(err, TrackSinkError::TrackNotFound { .. }));

    h.publish("alice", "T1", TrackKind::Video);
    h.settle().await;

    let err = h.controller.play("T1", TrackKind::Video).await.unwrap_err();
    assert!(matches!(err, TrackSinkError::NotSubscribed { .. }));
    let err = h.controller.record("T1", TrackKind::Video).await.unwrap_err();
    assert!(matches!(err, TrackSinkError::NotSubscribed { .. }));

    // Stopping something that never started is fine
    let track = h.controller.stop_record("T1", TrackKind::Video).await.unwrap();
    assert_eq!(track.recording, RecordingState::Idle);

    let track = h.track("T1").unwrap();
    assert_eq!(track.playback, PlaybackState::Idle);
    assert_eq!(track.recording, RecordingState::Idle);
    assert!(h.controller.stats("T1").is_none());
}

#[tokio::test]
async fn test_client_failure_reverts_to_unsubscribed() {
    let mut h = harness(MockClient::failing(ClientError::Transport("refused".into())), false);
    h.publish("alice", "T1", TrackKind::Audio);
    h.settle().await;
    h.take_events();

    let err = h.controller.subscribe("T1").await.unwrap_err();
    assert!(matches!(err, TrackSinkError::SubscriptionFailed { .. }));
    assert_eq!(err.kind(), ErrorKind::SubscriptionFailed);
    assert_eq!(
        h.track("T1").unwrap().subscription,
        SubscriptionState::Unsubscribed
    );

    let states: Vec<_> = h
        .take_events()
        .into_iter()
        .filter_map(|e| match e {
            Event::TrackStateChanged { subscription, .. } => Some(subscription),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        vec![SubscriptionState::Subscribing, SubscriptionState::Unsubscribed]
    );
}

#[tokio::test]
async fn test_participant_leaving_during_subscribe() {
    let mut h = harness(MockClient::with_delay(Duration::from_millis(200)), false);
    h.publish("bob", "T1", TrackKind::Audio);
    h.settle().await;

    // Queued now, applied while the client is still subscribing
    h.room
        .send(RoomEvent::ParticipantDisconnected {
            participant_id: "bob".to_string(),
        })
        .unwrap();

    let err = h.controller.subscribe("T1").await.unwrap_err();
    assert!(matches!(err, TrackSinkError::ParticipantGone { .. }));
    assert_eq!(err.kind(), ErrorKind::ParticipantGone);

    assert!(h.track("T1").is_none());
    assert!(h.controller.stats("T1").is_none());
    assert!(!h.controller.participants().contains("bob"));
    // The late subscription was handed back
    assert_eq!(h.client.unsubscribed(), vec!["T1".to_string()]);

    let types: Vec<_> = h.take_events().iter().map(Event::event_type).collect();
    assert!(types.contains(&"track_removed"));
    assert_eq!(types.last(), Some(&"participant_disconnected"));
}

#[tokio::test]
async fn test_auto_subscribe_on_publish() {
    let mut h = harness(MockClient::default(), true);
    h.publish("alice", "A1", TrackKind::Audio);
    h.publish("alice", "V1", TrackKind::Video);
    h.settle().await;

    for id in ["A1", "V1"] {
        let track = h.track(id).unwrap();
        assert_eq!(track.subscription, SubscriptionState::Subscribed);
        assert_eq!(track.playback, PlaybackState::Idle);
    }
    assert_eq!(h.client.subscribe_calls.load(Ordering::SeqCst), 2);
}

// ============================================================================
// PIPELINES
// ============================================================================

#[tokio::test]
async fn test_unpublish_while_playing_and_recording() {
    let mut h = harness(MockClient::default(), false);
    h.publish("alice", "T1", TrackKind::Audio);
    h.settle().await;

    h.controller.subscribe("T1").await.unwrap();
    h.controller.play("T1", TrackKind::Audio).await.unwrap();
    let track = h.controller.record("T1", TrackKind::Audio).await.unwrap();
    assert!(track.is_playing() && track.is_recording());
    h.assert_consistent();

    let stats = h.controller.stats("T1").unwrap();
    assert_eq!(stats.taps, 2);
    let recording_path = stats.recording_path.clone().unwrap();
    assert!(recording_path.starts_with(h.dir.path().join("audio")));

    let sender = h.client.sender("T1");
    for value in 1..=5 {
        sender.send(audio_frame(value)).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(h.device.samples_written.load(Ordering::SeqCst) > 0);
    h.take_events();

    h.unpublish("alice", "T1", TrackKind::Audio);
    h.settle().await;

    assert!(h.track("T1").is_none());
    assert!(!h.device.open.load(Ordering::SeqCst));
    assert_eq!(h.device.writes_after_close.load(Ordering::SeqCst), 0);
    assert!(sender.is_closed());
    // The room already dropped the publication
    assert!(h.client.unsubscribed().is_empty());

    let events = h.take_events();
    let saved = events
        .iter()
        .position(|e| matches!(e, Event::RecordingSaved { .. }))
        .expect("recording saved");
    let removed = events
        .iter()
        .position(|e| matches!(e, Event::TrackRemoved { .. }))
        .expect("track removed");
    assert!(saved < removed);
    match &events[saved] {
        Event::RecordingSaved { path, frames, .. } => {
            assert_eq!(path, &recording_path);
            assert_eq!(*frames, 5);
        }
        other => panic!("unexpected event {:?}", other),
    }
    match &events[removed] {
        Event::TrackRemoved { track } => {
            assert_eq!(track.subscription, SubscriptionState::Unsubscribed);
            assert!(!track.is_playing() && !track.is_recording());
        }
        other => panic!("unexpected event {:?}", other),
    }

    let reader = hound::WavReader::open(&recording_path).unwrap();
    assert_eq!(reader.spec().sample_rate, 16_000);
    assert_eq!(reader.duration(), 5 * 320);
}

#[tokio::test]
async fn test_hung_recording_does_not_stall_playback() {
    let mut h = harness_with_sinks(MockClient::default(), false, Some(Arc::new(HangingDisk)));
    h.publish("alice", "T1", TrackKind::Audio);
    h.settle().await;

    h.controller.subscribe("T1").await.unwrap();
    h.controller.play("T1", TrackKind::Audio).await.unwrap();
    h.controller.record("T1", TrackKind::Audio).await.unwrap();

    let sender = h.client.sender("T1");
    for value in 1..=100 {
        tokio::time::timeout(Duration::from_secs(2), sender.send(audio_frame(value)))
            .await
            .expect("subscription stopped accepting frames")
            .unwrap();
    }

    // Far past what the recording tap could buffer
    let device = h.device.clone();
    let played = tokio::time::timeout(Duration::from_secs(5), async move {
        while device.samples_written.load(Ordering::SeqCst) < 80 * 320 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(
        played.is_ok(),
        "playback stalled after {} samples",
        h.device.samples_written.load(Ordering::SeqCst)
    );

    let stats = h.controller.stats("T1").unwrap();
    assert!(stats.dropped_frames > 0);
    let track = h.track("T1").unwrap();
    assert!(track.is_playing() && track.is_recording());
}

#[tokio::test]
async fn test_unsubscribe_stops_video_pipelines_first() {
    let mut h = harness(MockClient::default(), false);
    h.publish("carol", "V1", TrackKind::Video);
    h.settle().await;

    h.controller.subscribe("V1").await.unwrap();
    h.controller.play("V1", TrackKind::Video).await.unwrap();
    h.controller.record("V1", TrackKind::Video).await.unwrap();

    let sender = h.client.sender("V1");
    sender.send(video_frame(1)).await.unwrap();
    sender.send(video_frame(2)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let stats = h.controller.stats("V1").unwrap();
    assert_eq!(stats.render.unwrap().frames_rendered, 2);
    assert!(h.renderer.latest_frame("V1").is_some());

    let track = h.controller.unsubscribe("V1").await.unwrap();
    assert_eq!(track.subscription, SubscriptionState::Unsubscribed);
    assert_eq!(track.playback, PlaybackState::Idle);
    assert_eq!(track.recording, RecordingState::Idle);
    assert!(h.renderer.latest_frame("V1").is_none());
    assert_eq!(h.client.unsubscribed(), vec!["V1".to_string()]);

    let saved: Vec<_> = h
        .take_events()
        .into_iter()
        .filter_map(|e| match e {
            Event::RecordingSaved { path, frames, .. } => Some((path, frames)),
            _ => None,
        })
        .collect();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].1, 2);
    assert_eq!(files_in(&h.dir.path().join("video")), vec![saved[0].0.clone()]);
}

#[tokio::test]
async fn test_source_end_returns_pipelines_to_idle() {
    let mut h = harness(MockClient::default(), false);
    h.publish("alice", "T1", TrackKind::Audio);
    h.settle().await;

    h.controller.subscribe("T1").await.unwrap();
    h.controller.play("T1", TrackKind::Audio).await.unwrap();
    h.controller.record("T1", TrackKind::Audio).await.unwrap();

    let sender = h.client.sender("T1");
    sender.send(audio_frame(1)).await.unwrap();
    drop(sender);
    h.client.end_source("T1");

    let idle = h
        .settle_until(|view| {
            view.get("T1")
                .is_some_and(|t| !t.is_playing() && !t.is_recording())
        })
        .await;
    assert!(idle, "pipelines did not finish");

    let track = h.track("T1").unwrap();
    assert_eq!(track.subscription, SubscriptionState::Subscribed);
    assert!(!h.device.open.load(Ordering::SeqCst));

    let events = h.take_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::RecordingSaved { frames: 1, .. })));
    assert!(!events.iter().any(Event::is_error_event));
}

#[tokio::test]
async fn test_command_kind_follows_registered_track() {
    let mut h = harness(MockClient::default(), false);
    h.publish("alice", "V1", TrackKind::Video);
    h.settle().await;
    h.controller.subscribe("V1").await.unwrap();

    let track = h.controller.play("V1", TrackKind::Audio).await.unwrap();
    assert!(track.is_playing());
    assert_eq!(h.device.opened.load(Ordering::SeqCst), 0);
    assert!(h.controller.stats("V1").unwrap().render.is_some());
}

#[tokio::test]
async fn test_published_states_never_leave_pipelines_unsubscribed() {
    let mut h = harness(MockClient::default(), false);
    h.publish("alice", "T1", TrackKind::Audio);
    h.settle().await;

    // Local unsubscribe
    h.controller.subscribe("T1").await.unwrap();
    h.controller.play("T1", TrackKind::Audio).await.unwrap();
    h.controller.record("T1", TrackKind::Audio).await.unwrap();
    h.take_events();
    h.controller.unsubscribe("T1").await.unwrap();

    let local = h.take_events();
    assert_states_consistent(&local);
    let closing: Vec<_> = local
        .iter()
        .filter_map(|e| match e {
            Event::TrackStateChanged {
                subscription,
                playback,
                recording,
                ..
            } => Some((*subscription, *playback, *recording)),
            _ => None,
        })
        .collect();
    assert_eq!(
        closing,
        vec![
            (
                SubscriptionState::Subscribed,
                PlaybackState::Idle,
                RecordingState::Recording
            ),
            (
                SubscriptionState::Subscribed,
                PlaybackState::Idle,
                RecordingState::Idle
            ),
            (
                SubscriptionState::Unsubscribing,
                PlaybackState::Idle,
                RecordingState::Idle
            ),
            (
                SubscriptionState::Unsubscribed,
                PlaybackState::Idle,
                RecordingState::Idle
            ),
        ]
    );

    // Subscription ended by the room
    h.controller.subscribe("T1").await.unwrap();
    h.controller.play("T1", TrackKind::Audio).await.unwrap();
    h.controller.record("T1", TrackKind::Audio).await.unwrap();
    h.room
        .send(RoomEvent::TrackUnsubscribed {
            participant_id: "alice".to_string(),
            track_id: "T1".to_string(),
            kind: TrackKind::Audio,
        })
        .unwrap();
    h.settle().await;
    assert_eq!(
        h.track("T1").unwrap().subscription,
        SubscriptionState::Unsubscribed
    );

    // Publication withdrawn
    h.controller.subscribe("T1").await.unwrap();
    h.controller.play("T1", TrackKind::Audio).await.unwrap();
    h.controller.record("T1", TrackKind::Audio).await.unwrap();
    h.unpublish("alice", "T1", TrackKind::Audio);
    h.settle().await;
    assert!(h.track("T1").is_none());

    let events = h.take_events();
    assert_states_consistent(&events);
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::TrackRemoved { .. })));
    h.assert_consistent();
}

// ============================================================================
// ROOM EVENTS
// ============================================================================

#[tokio::test]
async fn test_disconnect_removes_every_track_of_participant() {
    let mut h = harness(MockClient::default(), false);
    h.publish("alice", "A1", TrackKind::Audio);
    h.publish("alice", "V1", TrackKind::Video);
    h.publish("bob", "B1", TrackKind::Audio);
    h.settle().await;

    for id in ["A1", "V1"] {
        h.controller.subscribe(id).await.unwrap();
    }
    h.controller.play("A1", TrackKind::Audio).await.unwrap();
    h.controller.play("V1", TrackKind::Video).await.unwrap();
    h.take_events();

    h.room
        .send(RoomEvent::ParticipantDisconnected {
            participant_id: "alice".to_string(),
        })
        .unwrap();
    h.settle().await;

    let remaining: Vec<_> = h
        .controller
        .registry()
        .list()
        .into_iter()
        .map(|t| t.track_id)
        .collect();
    assert_eq!(remaining, vec!["B1".to_string()]);
    assert!(!h.device.open.load(Ordering::SeqCst));
    assert!(h.controller.stats("A1").is_none());

    let types: Vec<_> = h.take_events().iter().map(Event::event_type).collect();
    assert_eq!(types.iter().filter(|t| **t == "track_removed").count(), 2);
    assert_eq!(types.last(), Some(&"participant_disconnected"));
}

#[tokio::test]
async fn test_room_ending_subscription_keeps_track() {
    let mut h = harness(MockClient::default(), false);
    h.publish("alice", "T1", TrackKind::Audio);
    h.settle().await;
    h.controller.subscribe("T1").await.unwrap();
    h.controller.play("T1", TrackKind::Audio).await.unwrap();

    h.room
        .send(RoomEvent::TrackUnsubscribed {
            participant_id: "alice".to_string(),
            track_id: "T1".to_string(),
            kind: TrackKind::Audio,
        })
        .unwrap();
    h.settle().await;

    let track = h.track("T1").unwrap();
    assert_eq!(track.subscription, SubscriptionState::Unsubscribed);
    assert_eq!(track.playback, PlaybackState::Idle);
    assert!(!h.device.open.load(Ordering::SeqCst));

    // Can subscribe again afterwards
    h.controller.subscribe("T1").await.unwrap();
    assert_eq!(h.client.subscribe_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_shutdown_closes_every_subscription() {
    let mut h = harness(MockClient::default(), false);
    h.publish("alice", "A1", TrackKind::Audio);
    h.publish("bob", "B1", TrackKind::Audio);
    h.settle().await;
    for id in ["A1", "B1"] {
        h.controller.subscribe(id).await.unwrap();
    }
    h.controller.record("B1", TrackKind::Audio).await.unwrap();

    h.controller.shutdown().await;

    for track in h.controller.registry().list() {
        assert_eq!(track.subscription, SubscriptionState::Unsubscribed);
        assert!(!track.is_recording());
    }
    let mut unsubscribed = h.client.unsubscribed();
    unsubscribed.sort();
    assert_eq!(unsubscribed, vec!["A1".to_string(), "B1".to_string()]);
    assert_eq!(files_in(&h.dir.path().join("audio")).len(), 1);
}
