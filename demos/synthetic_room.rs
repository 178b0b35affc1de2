//! Synthetic room demo for tracksink
//!
//! A fake media client publishes one audio and one video track and feeds
//! them with generated frames. The demo subscribes, plays, records for a
//! couple of seconds and then unpublishes the tracks while everything is
//! still running.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracksink::{
    frame_channel, AudioFormat, AudioFrame, ClientError, DebugLogger, Event, FrameSender,
    LoggingConfig, MediaClient, RoomEvent, SessionConfig, Subscription, TrackKind, TrackSink,
    VideoFrame,
};

const WIDTH: u32 = 64;
const HEIGHT: u32 = 48;

/// Media client generating a 440Hz tone and a moving gradient
#[derive(Default)]
struct SyntheticClient {
    generators: Mutex<HashMap<String, tokio::task::JoinHandle<()>>>,
}

#[async_trait]
impl MediaClient for SyntheticClient {
    async fn subscribe(&self, track_id: &str) -> Result<Subscription, ClientError> {
        let (sender, source) = frame_channel(32);
        let format = AudioFormat::mono_48k();

        let generator = if track_id.starts_with("audio") {
            tokio::spawn(generate_tone(sender, format))
        } else {
            tokio::spawn(generate_gradient(sender))
        };
        self.generators.lock().insert(track_id.to_string(), generator);

        Ok(Subscription::new(Box::new(source)).with_audio_format(format))
    }

    async fn unsubscribe(&self, track_id: &str) {
        if let Some(generator) = self.generators.lock().remove(track_id) {
            generator.abort();
        }
    }
}

async fn generate_tone(sender: FrameSender, format: AudioFormat) {
    let per_frame = format.samples_per_channel(Duration::from_millis(20)) as usize;
    let mut ticker = tokio::time::interval(Duration::from_millis(20));
    let mut phase = 0f32;
    let step = 2.0 * std::f32::consts::PI * 440.0 / format.sample_rate as f32;

    for seq in 0u64.. {
        ticker.tick().await;
        let samples: Vec<i16> = (0..per_frame)
            .map(|_| {
                phase = (phase + step) % (2.0 * std::f32::consts::PI);
                (phase.sin() * 8_000.0) as i16
            })
            .collect();
        let Ok(frame) = AudioFrame::new(samples, format, seq * 20_000) else {
            return;
        };
        if sender.send(frame).await.is_err() {
            return;
        }
    }
}

async fn generate_gradient(sender: FrameSender) {
    let mut ticker = tokio::time::interval(Duration::from_millis(33));

    for seq in 0u64.. {
        ticker.tick().await;
        let mut data = Vec::with_capacity((WIDTH * HEIGHT * 3) as usize);
        for y in 0..HEIGHT {
            for x in 0..WIDTH {
                data.push(((x + seq as u32) % 256) as u8);
                data.push(((y * 4) % 256) as u8);
                data.push((seq % 256) as u8);
            }
        }
        if sender
            .send(VideoFrame::new(WIDTH, HEIGHT, data, seq * 33_000))
            .await
            .is_err()
        {
            return;
        }
    }
}

fn main() -> anyhow::Result<()> {
    DebugLogger::new(LoggingConfig::console_only()).init()?;

    println!("🚀 Starting synthetic room");
    let tracksink = TrackSink::init_with(SessionConfig {
        auto_subscribe: true,
        ..Default::default()
    })?;

    let (room, room_events) = mpsc::unbounded_channel();
    let client = Arc::new(SyntheticClient::default());
    let (session, mut events, task) =
        tracksink.spawn_session(tracksink.session(client, room_events))?;

    tracksink.block_on(async move {
        for (track_id, kind) in [("audio-1", TrackKind::Audio), ("video-1", TrackKind::Video)] {
            room.send(RoomEvent::TrackPublished {
                participant_id: "synthetic".to_string(),
                track_id: track_id.to_string(),
                kind,
            })?;
        }

        // Start pipelines once auto-subscribe completes
        let mut subscribed = 0;
        while subscribed < 2 {
            let Some(event) = events.next().await else {
                anyhow::bail!("session ended early");
            };
            if let Event::TrackStateChanged {
                track_id,
                subscription: tracksink::SubscriptionState::Subscribed,
                ..
            } = event
            {
                subscribed += 1;
                let Some(track) = session.track(&track_id) else {
                    continue;
                };
                if let Err(e) = session.play(&track_id, track.kind).await {
                    println!("⚠️ Could not play {}: {}", track_id, e);
                }
                session.record(&track_id, track.kind).await?;
                println!("▶️ {} is playing and recording", track_id);
            }
        }

        tokio::time::sleep(Duration::from_secs(2)).await;
        for track in session.tracks() {
            if let Some(stats) = session.stats(&track.track_id).await? {
                println!("📊 {}: {:?}", track.track_id, stats);
            }
        }

        println!("⏹️ Unpublishing tracks while pipelines run");
        for track in session.tracks() {
            room.send(RoomEvent::TrackUnpublished {
                participant_id: track.participant_id.clone(),
                track_id: track.track_id.clone(),
                kind: track.kind,
            })?;
        }

        let mut removed = 0;
        while removed < 2 {
            match tokio::time::timeout(Duration::from_secs(5), events.next()).await {
                Ok(Some(Event::RecordingSaved { path, frames, .. })) => {
                    println!("💾 Saved {} frames to {}", frames, path.display());
                }
                Ok(Some(Event::TrackRemoved { track })) => {
                    println!("➖ {} removed", track.track_id);
                    removed += 1;
                }
                Ok(Some(_)) => {}
                Ok(None) | Err(_) => break,
            }
        }

        session.shutdown().await?;
        task.await?;
        Ok::<(), anyhow::Error>(())
    })?;

    println!("✅ Done");
    Ok(())
}
