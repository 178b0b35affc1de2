//! Audio playback pipeline
//!
//! Two execution domains cooperate per track:
//!
//! - a tokio task awaits frames from the [`FrameSource`] and pushes them into
//!   a bounded [`PlaybackBuffer`], dropping a frame when the buffer stays full
//!   past the push timeout;
//! - a dedicated OS thread opens the output device, drains the buffer with a
//!   bounded blocking wait and performs every device write.
//!
//! Stopping cancels the task, clears the active flag, closes the buffer and
//! joins the thread within the join timeout. The device is dropped on the
//! thread before it signals completion, so no write can follow a stop.

use crate::buffer::{PlaybackBuffer, PopOutcome, PushOutcome};
use crate::config::PlaybackConfig;
use crate::error::{MediaError, MediaResult};
use crate::pipeline::{FinishReason, PipelineContext, PipelineId, PipelineRole};
use crate::render::AudioBackend;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use tracksink_core::{AudioFormat, AudioFrame, FrameSource, MediaFrame};

/// Playback statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackStats {
    /// Audio frames received from the source
    pub frames_received: u64,
    /// Frames written to the device
    pub frames_written: u64,
    /// Frames dropped because the buffer stayed full
    pub frames_dropped: u64,
    /// Frames skipped because of source errors or a format change
    pub delivery_errors: u64,
    /// Failed device writes
    pub device_errors: u64,
    /// Largest observed buffer length
    pub high_water_mark: usize,
}

#[derive(Debug, Default)]
struct PlaybackCounters {
    frames_received: AtomicU64,
    frames_written: AtomicU64,
    delivery_errors: AtomicU64,
    device_errors: AtomicU64,
}

/// Low-latency playback of one audio track
#[derive(Debug)]
pub struct AudioPlaybackPipeline {
    ctx: PipelineContext,
    format: AudioFormat,
    cancel: CancellationToken,
    active: Arc<AtomicBool>,
    buffer: Arc<PlaybackBuffer<AudioFrame>>,
    counters: Arc<PlaybackCounters>,
    delivery: Option<JoinHandle<()>>,
    thread: Option<std::thread::JoinHandle<()>>,
    done: Option<oneshot::Receiver<()>>,
    join_timeout: Duration,
}

impl AudioPlaybackPipeline {
    /// Open the output device and start playing `source`
    ///
    /// Returns once the device is open. Fails with a device error if the
    /// output cannot be opened at `format` within the device-open timeout.
    pub async fn start<S>(
        ctx: PipelineContext,
        source: S,
        format: AudioFormat,
        backend: Arc<dyn AudioBackend>,
        config: &PlaybackConfig,
    ) -> MediaResult<Self>
    where
        S: FrameSource + 'static,
    {
        let buffer = Arc::new(PlaybackBuffer::new(config.buffer_capacity));
        let active = Arc::new(AtomicBool::new(true));
        let counters = Arc::new(PlaybackCounters::default());
        let (ready_tx, ready_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();

        let worker = PlaybackWorker {
            ctx: ctx.clone(),
            format,
            backend,
            buffer: buffer.clone(),
            active: active.clone(),
            counters: counters.clone(),
            poll_timeout: config.poll_timeout(),
        };

        let thread = std::thread::Builder::new()
            .name(format!("playback-{}", ctx.track_id))
            .spawn(move || worker.run(ready_tx, done_tx))
            .map_err(|e| MediaError::DeviceOpenFailed {
                reason: format!("Failed to spawn playback thread: {}", e),
            })?;

        let open_timeout = config.device_open_timeout();
        match tokio::time::timeout(open_timeout, ready_rx).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => {
                // The worker exits right after reporting the failure
                if let Err(join) =
                    join_worker(&ctx.track_id, thread, done_rx, config.join_timeout()).await
                {
                    warn!(track_id = %ctx.track_id, "Playback thread did not exit cleanly after failed open: {}", join);
                }
                return Err(e);
            }
            Ok(Err(_)) => {
                if let Err(join) =
                    join_worker(&ctx.track_id, thread, done_rx, config.join_timeout()).await
                {
                    warn!(track_id = %ctx.track_id, "Playback thread did not exit cleanly: {}", join);
                }
                return Err(MediaError::DeviceOpenFailed {
                    reason: "playback thread exited before opening the device".to_string(),
                });
            }
            Err(_) => {
                active.store(false, Ordering::Release);
                buffer.close();
                warn!(
                    track_id = %ctx.track_id,
                    "Audio device did not open within {:?}, detaching playback thread",
                    open_timeout
                );
                return Err(MediaError::DeviceOpenTimeout {
                    timeout: open_timeout,
                });
            }
        }

        let cancel = CancellationToken::new();
        let delivery = tokio::spawn(deliver_frames(
            ctx.clone(),
            source,
            format,
            buffer.clone(),
            counters.clone(),
            cancel.clone(),
            config.push_timeout(),
        ));

        info!(
            track_id = %ctx.track_id,
            id = %ctx.id,
            sample_rate = format.sample_rate,
            channels = format.channels,
            "▶️ Audio playback started"
        );

        Ok(Self {
            ctx,
            format,
            cancel,
            active,
            buffer,
            counters,
            delivery: Some(delivery),
            thread: Some(thread),
            done: Some(done_rx),
            join_timeout: config.join_timeout(),
        })
    }

    /// Pipeline instance id
    pub fn id(&self) -> PipelineId {
        self.ctx.id
    }

    /// Track being played
    pub fn track_id(&self) -> &str {
        &self.ctx.track_id
    }

    /// Device format
    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Whether the playback thread is still running
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Current statistics
    pub fn stats(&self) -> PlaybackStats {
        let buffer = self.buffer.stats();
        PlaybackStats {
            frames_received: self.counters.frames_received.load(Ordering::Relaxed),
            frames_written: self.counters.frames_written.load(Ordering::Relaxed),
            frames_dropped: buffer.dropped,
            delivery_errors: self.counters.delivery_errors.load(Ordering::Relaxed),
            device_errors: self.counters.device_errors.load(Ordering::Relaxed),
            high_water_mark: buffer.high_water_mark,
        }
    }

    /// Stop playback and join the playback thread
    ///
    /// On return the device has been released, unless the join timed out,
    /// in which case the thread is detached and `JoinTimeout` is returned.
    pub async fn stop(mut self) -> MediaResult<PlaybackStats> {
        self.cancel.cancel();
        self.active.store(false, Ordering::Release);
        self.buffer.close();

        if let Some(delivery) = self.delivery.take() {
            match tokio::time::timeout(self.join_timeout, delivery).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(track_id = %self.ctx.track_id, "Frame delivery task failed: {}", e),
                Err(_) => warn!(track_id = %self.ctx.track_id, "Frame delivery task did not stop in time"),
            }
        }

        let joined = match (self.thread.take(), self.done.take()) {
            (Some(thread), Some(done)) => {
                join_worker(&self.ctx.track_id, thread, done, self.join_timeout).await
            }
            _ => Ok(()),
        };

        let stats = self.stats();
        info!(
            track_id = %self.ctx.track_id,
            id = %self.ctx.id,
            written = stats.frames_written,
            dropped = stats.frames_dropped,
            "⏹️ Audio playback stopped"
        );
        joined.map(|()| stats)
    }
}

impl Drop for AudioPlaybackPipeline {
    fn drop(&mut self) {
        // Unjoined pipelines wind down on their own
        self.cancel.cancel();
        self.active.store(false, Ordering::Release);
        self.buffer.close();
    }
}

async fn join_worker(
    track_id: &str,
    thread: std::thread::JoinHandle<()>,
    done: oneshot::Receiver<()>,
    timeout: Duration,
) -> MediaResult<()> {
    match tokio::time::timeout(timeout, done).await {
        Ok(_) => {
            // Completion is signalled as the thread's last action, so this
            // join returns immediately
            thread.join().map_err(|_| MediaError::WorkerPanicked {
                track_id: track_id.to_string(),
            })
        }
        Err(_) => {
            warn!(
                track_id = %track_id,
                "Playback thread did not stop within {:?}, detaching", timeout
            );
            Err(MediaError::JoinTimeout {
                track_id: track_id.to_string(),
                timeout,
            })
        }
    }
}

async fn deliver_frames<S>(
    ctx: PipelineContext,
    mut source: S,
    format: AudioFormat,
    buffer: Arc<PlaybackBuffer<AudioFrame>>,
    counters: Arc<PlaybackCounters>,
    cancel: CancellationToken,
    push_timeout: Duration,
) where
    S: FrameSource,
{
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            item = source.next_frame() => Some(item),
        };
        let Some(item) = next else {
            break;
        };

        match item {
            None => {
                debug!(track_id = %ctx.track_id, "Audio source ended");
                // The playback thread drains what is left, then reports
                buffer.close();
                break;
            }
            Some(Err(e)) => {
                counters.delivery_errors.fetch_add(1, Ordering::Relaxed);
                warn!(track_id = %ctx.track_id, "Skipping audio frame: {}", e);
            }
            Some(Ok(MediaFrame::Audio(frame))) => {
                counters.frames_received.fetch_add(1, Ordering::Relaxed);
                if frame.format() != format {
                    counters.delivery_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        track_id = %ctx.track_id,
                        "Skipping audio frame at {}Hz/{}ch, playback opened at {}Hz/{}ch",
                        frame.sample_rate(),
                        frame.channels(),
                        format.sample_rate,
                        format.channels
                    );
                    continue;
                }
                match buffer.push(frame, push_timeout).await {
                    PushOutcome::Queued => {}
                    PushOutcome::Dropped => {
                        debug!(track_id = %ctx.track_id, "Playback buffer full, frame dropped")
                    }
                    PushOutcome::Closed => break,
                }
            }
            Some(Ok(MediaFrame::Video(_))) => {
                counters.delivery_errors.fetch_add(1, Ordering::Relaxed);
                warn!(track_id = %ctx.track_id, "Ignoring video frame on audio track");
            }
        }
    }

    source.close().await;
}

/// State moved onto the playback thread
struct PlaybackWorker {
    ctx: PipelineContext,
    format: AudioFormat,
    backend: Arc<dyn AudioBackend>,
    buffer: Arc<PlaybackBuffer<AudioFrame>>,
    active: Arc<AtomicBool>,
    counters: Arc<PlaybackCounters>,
    poll_timeout: Duration,
}

impl PlaybackWorker {
    fn run(self, ready: oneshot::Sender<MediaResult<()>>, done: oneshot::Sender<()>) {
        let mut output = match self.backend.open(self.format) {
            Ok(output) => {
                let _ = ready.send(Ok(()));
                output
            }
            Err(e) => {
                warn!(track_id = %self.ctx.track_id, "Failed to open audio output: {}", e);
                let _ = ready.send(Err(e));
                let _ = done.send(());
                return;
            }
        };

        let mut source_ended = false;
        while self.active.load(Ordering::Acquire) {
            match self.buffer.pop_timeout(self.poll_timeout) {
                PopOutcome::Item(frame) => {
                    if !self.active.load(Ordering::Acquire) {
                        break;
                    }
                    match output.write(frame.samples()) {
                        Ok(()) => {
                            self.counters.frames_written.fetch_add(1, Ordering::Relaxed);
                            trace!(track_id = %self.ctx.track_id, ts = frame.timestamp_us, "Frame written");
                        }
                        Err(e) => {
                            self.counters.device_errors.fetch_add(1, Ordering::Relaxed);
                            warn!(track_id = %self.ctx.track_id, "Audio device write failed: {}", e);
                        }
                    }
                }
                PopOutcome::Timeout => continue,
                PopOutcome::Closed => {
                    source_ended = true;
                    break;
                }
            }
        }

        drop(output);

        if source_ended && self.active.load(Ordering::Acquire) {
            self.ctx
                .report(PipelineRole::AudioPlayback, FinishReason::SourceEnded);
        }
        let _ = done.send(());
    }
}
