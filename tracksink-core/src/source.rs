//! Frame sources and subscription fan-out
//!
//! A [`FrameSource`] is the asynchronous, finite-until-cancelled sequence of
//! frames for one subscribed track. The media client hands out exactly one
//! source per subscription; [`FrameFanout`] pumps it into any number of
//! [`ChannelFrameSource`] taps so that playback and recording can consume the
//! same track concurrently.

use crate::error::TrackSinkError;
use crate::frame::MediaFrame;
use async_trait::async_trait;
use futures::future::join_all;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// One item yielded by a frame source
pub type FrameItem = Result<MediaFrame, TrackSinkError>;

/// Asynchronous sequence of decoded frames for a subscribed track
///
/// `next_frame` must be cancel-safe: pipelines race it against their
/// cancellation signal and drop the pending future on stop.
#[async_trait]
pub trait FrameSource: Send {
    /// Await the next frame
    ///
    /// `None` means the source ended permanently. `Some(Err(_))` is a
    /// transient per-frame failure; the consumer moves on to the next frame.
    async fn next_frame(&mut self) -> Option<FrameItem>;

    /// Release the underlying transport resources
    async fn close(&mut self) {}
}

#[async_trait]
impl FrameSource for Box<dyn FrameSource> {
    async fn next_frame(&mut self) -> Option<FrameItem> {
        (**self).next_frame().await
    }

    async fn close(&mut self) {
        (**self).close().await
    }
}

/// Create a bounded frame channel
///
/// The sender side is what producers (tests, demos, client adapters) feed.
pub fn frame_channel(capacity: usize) -> (FrameSender, ChannelFrameSource) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (FrameSender { tx }, ChannelFrameSource { rx })
}

/// Producer half of [`frame_channel`]
#[derive(Debug, Clone)]
pub struct FrameSender {
    tx: mpsc::Sender<FrameItem>,
}

impl FrameSender {
    /// Deliver a frame, waiting for channel capacity
    pub async fn send(&self, frame: impl Into<MediaFrame>) -> Result<(), TrackSinkError> {
        self.send_item(Ok(frame.into())).await
    }

    /// Deliver a transient per-frame error
    pub async fn send_error(&self, reason: impl Into<String>) -> Result<(), TrackSinkError> {
        self.send_item(Err(TrackSinkError::frame_delivery(reason)))
            .await
    }

    /// Deliver a raw item
    pub async fn send_item(&self, item: FrameItem) -> Result<(), TrackSinkError> {
        self.tx
            .send(item)
            .await
            .map_err(|_| TrackSinkError::frame_delivery("frame consumer closed"))
    }

    /// Whether the consumer side has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer end of a [`FrameFanout`]
pub type FrameTap = ChannelFrameSource;

/// Frame source backed by a bounded channel
#[derive(Debug)]
pub struct ChannelFrameSource {
    rx: mpsc::Receiver<FrameItem>,
}

#[async_trait]
impl FrameSource for ChannelFrameSource {
    async fn next_frame(&mut self) -> Option<FrameItem> {
        self.rx.recv().await
    }

    async fn close(&mut self) {
        self.rx.close();
    }
}

/// Adapter turning any frame stream into a [`FrameSource`]
#[derive(Debug)]
pub struct StreamFrameSource<S> {
    stream: S,
}

impl<S> StreamFrameSource<S>
where
    S: Stream<Item = FrameItem> + Send + Unpin,
{
    /// Wrap a stream
    pub fn new(stream: S) -> Self {
        Self { stream }
    }
}

#[async_trait]
impl<S> FrameSource for StreamFrameSource<S>
where
    S: Stream<Item = FrameItem> + Send + Unpin,
{
    async fn next_frame(&mut self) -> Option<FrameItem> {
        self.stream.next().await
    }
}

/// Default time the pump waits on a full tap before marking it stalled
pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_millis(100);

/// Pump-side state of one consumer
#[derive(Debug)]
struct Tap {
    sender: mpsc::Sender<FrameItem>,
    /// Set after a send timed out; the tap then only gets frames it has room for
    stalled: bool,
}

#[derive(Debug, Default)]
struct TapSet {
    taps: Vec<Tap>,
    dropped: u64,
}

/// `None` once the source has ended; late taps then end immediately
type SharedTaps = Arc<Mutex<Option<TapSet>>>;

/// Distributes one subscription's frames to every open tap, in arrival order
///
/// Each tap is a bounded channel. The pump offers a frame to all healthy
/// taps at once and waits at most the stall timeout for them to take it. A
/// tap that misses the deadline is marked stalled: it loses that frame and
/// is only offered later frames while it has free capacity, so one stuck
/// consumer never holds back the others. Dropped frames are counted. Taps
/// whose consumer went away are pruned.
#[derive(Debug)]
pub struct FrameFanout {
    track_id: String,
    taps: SharedTaps,
    tap_capacity: usize,
    cancel: CancellationToken,
    pump: Option<JoinHandle<()>>,
}

impl FrameFanout {
    /// Start pumping `source`
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<S>(
        track_id: impl Into<String>,
        source: S,
        tap_capacity: usize,
        stall_timeout: Duration,
    ) -> Self
    where
        S: FrameSource + 'static,
    {
        let track_id = track_id.into();
        let taps = Arc::new(Mutex::new(Some(TapSet::default())));
        let cancel = CancellationToken::new();

        let pump = tokio::spawn(Self::pump(
            track_id.clone(),
            source,
            taps.clone(),
            stall_timeout,
            cancel.clone(),
        ));

        Self {
            track_id,
            taps,
            tap_capacity: tap_capacity.max(1),
            cancel,
            pump: Some(pump),
        }
    }

    /// Track this fan-out serves
    pub fn track_id(&self) -> &str {
        &self.track_id
    }

    /// Open a new consumer of the subscription
    ///
    /// Frames that arrived before the tap was opened are not replayed.
    pub fn open_tap(&self) -> FrameTap {
        let (tx, rx) = mpsc::channel(self.tap_capacity);
        let mut taps = self.taps.lock();
        match taps.as_mut() {
            Some(set) => set.taps.push(Tap {
                sender: tx,
                stalled: false,
            }),
            None => debug!(track_id = %self.track_id, "source already ended, tap closed"),
        }
        ChannelFrameSource { rx }
    }

    /// Number of taps currently attached
    pub fn tap_count(&self) -> usize {
        self.taps.lock().as_ref().map_or(0, |set| set.taps.len())
    }

    /// Frames dropped for stalled taps so far
    pub fn dropped_frames(&self) -> u64 {
        self.taps.lock().as_ref().map_or(0, |set| set.dropped)
    }

    /// Whether the underlying source has ended
    pub fn is_ended(&self) -> bool {
        self.taps.lock().is_none()
    }

    /// Stop pumping, close the source and wait for the pump to exit
    pub async fn close(mut self) {
        self.cancel.cancel();
        if let Some(pump) = self.pump.take() {
            if let Err(e) = pump.await {
                debug!(track_id = %self.track_id, "frame pump ended abnormally: {}", e);
            }
        }
    }

    async fn pump<S>(
        track_id: String,
        mut source: S,
        taps: SharedTaps,
        stall_timeout: Duration,
        cancel: CancellationToken,
    ) where
        S: FrameSource,
    {
        let mut delivered = 0u64;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                item = source.next_frame() => Some(item),
            };

            let Some(next) = next else {
                break;
            };
            let Some(item) = next else {
                debug!(track_id = %track_id, delivered, "frame source ended");
                break;
            };

            // Stalled taps take the frame only if they have room right now
            let mut waiting = Vec::new();
            let mut closed = Vec::new();
            let mut dropped = 0u64;
            {
                let mut guard = taps.lock();
                let Some(set) = guard.as_mut() else {
                    break;
                };
                for tap in set.taps.iter_mut() {
                    if !tap.stalled {
                        waiting.push(tap.sender.clone());
                        continue;
                    }
                    match tap.sender.try_send(item.clone()) {
                        Ok(()) => {
                            debug!(track_id = %track_id, "stalled tap caught up");
                            tap.stalled = false;
                        }
                        Err(mpsc::error::TrySendError::Full(_)) => dropped += 1,
                        Err(mpsc::error::TrySendError::Closed(_)) => {
                            closed.push(tap.sender.clone())
                        }
                    }
                }
            }

            let sends = waiting.iter().map(|sender| {
                let item = item.clone();
                async move { tokio::time::timeout(stall_timeout, sender.send(item)).await }
            });
            let results = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                results = join_all(sends) => Some(results),
            };
            let Some(results) = results else {
                break;
            };

            let mut stalled = Vec::new();
            for (sender, result) in waiting.into_iter().zip(results) {
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(_)) => closed.push(sender),
                    Err(_) => {
                        warn!(track_id = %track_id, ?stall_timeout, "tap stalled, dropping its frames until it drains");
                        dropped += 1;
                        stalled.push(sender);
                    }
                }
            }

            if let Some(set) = taps.lock().as_mut() {
                set.dropped += dropped;
                for tap in set.taps.iter_mut() {
                    if stalled.iter().any(|s| s.same_channel(&tap.sender)) {
                        tap.stalled = true;
                    }
                }
                if !closed.is_empty() {
                    trace!(track_id = %track_id, count = closed.len(), "pruning closed taps");
                    set.taps
                        .retain(|tap| !closed.iter().any(|c| c.same_channel(&tap.sender)));
                }
            }
            delivered += 1;
        }

        // Dropping the senders ends every tap
        taps.lock().take();
        source.close().await;
        debug!(track_id = %track_id, delivered, "frame pump stopped");
    }
}

impl Drop for FrameFanout {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{AudioFormat, AudioFrame};

    fn audio(seq: u64) -> AudioFrame {
        AudioFrame::new(vec![seq as i16; 4], AudioFormat::mono_48k(), seq).unwrap()
    }

    #[tokio::test]
    async fn test_channel_source_yields_in_order() {
        let (tx, mut source) = frame_channel(4);
        tx.send(audio(1)).await.unwrap();
        tx.send_error("glitch").await.unwrap();
        tx.send(audio(2)).await.unwrap();
        drop(tx);

        assert_eq!(source.next_frame().await.unwrap().unwrap().timestamp_us(), 1);
        assert!(source.next_frame().await.unwrap().is_err());
        assert_eq!(source.next_frame().await.unwrap().unwrap().timestamp_us(), 2);
        assert!(source.next_frame().await.is_none());
    }

    #[tokio::test]
    async fn test_stream_source_adapter() {
        let items = vec![Ok(MediaFrame::from(audio(7)))];
        let mut source = StreamFrameSource::new(futures::stream::iter(items));
        assert_eq!(source.next_frame().await.unwrap().unwrap().timestamp_us(), 7);
        assert!(source.next_frame().await.is_none());
    }

    #[tokio::test]
    async fn test_fanout_delivers_to_every_tap() {
        let (tx, source) = frame_channel(8);
        let fanout = FrameFanout::spawn("T1", source, 8, DEFAULT_STALL_TIMEOUT);
        let mut first = fanout.open_tap();
        let mut second = fanout.open_tap();
        assert_eq!(fanout.tap_count(), 2);

        for seq in 0..3 {
            tx.send(audio(seq)).await.unwrap();
        }
        drop(tx);

        for tap in [&mut first, &mut second] {
            for seq in 0..3 {
                let frame = tap.next_frame().await.unwrap().unwrap();
                assert_eq!(frame.timestamp_us(), seq);
            }
            assert!(tap.next_frame().await.is_none());
        }
        assert!(fanout.is_ended());
    }

    #[tokio::test]
    async fn test_fanout_prunes_dropped_taps() {
        let (tx, source) = frame_channel(8);
        let fanout = FrameFanout::spawn("T1", source, 1, DEFAULT_STALL_TIMEOUT);
        let dropped = fanout.open_tap();
        let mut kept = fanout.open_tap();
        drop(dropped);

        tx.send(audio(1)).await.unwrap();
        let frame = kept.next_frame().await.unwrap().unwrap();
        assert_eq!(frame.timestamp_us(), 1);

        tokio::time::timeout(Duration::from_secs(1), async {
            while fanout.tap_count() != 1 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_stalled_tap_does_not_hold_back_others() {
        let (tx, source) = frame_channel(4);
        let fanout = FrameFanout::spawn("T1", source, 2, Duration::from_millis(50));
        let stuck = fanout.open_tap();
        let mut live = fanout.open_tap();

        let producer = tokio::spawn(async move {
            for seq in 0..20 {
                tx.send(audio(seq)).await.unwrap();
            }
        });

        for seq in 0..20 {
            let frame = tokio::time::timeout(Duration::from_secs(2), live.next_frame())
                .await
                .expect("live tap starved")
                .unwrap()
                .unwrap();
            assert_eq!(frame.timestamp_us(), seq);
        }
        producer.await.unwrap();

        // The stuck tap kept its first two frames and missed the rest
        tokio::time::timeout(Duration::from_secs(1), async {
            while fanout.dropped_frames() < 18 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(fanout.dropped_frames(), 18);
        assert_eq!(fanout.tap_count(), 2);
        drop(stuck);
    }

    #[tokio::test]
    async fn test_fanout_close_ends_taps() {
        let (tx, source) = frame_channel(8);
        let fanout = FrameFanout::spawn("T1", source, 4, DEFAULT_STALL_TIMEOUT);
        let mut tap = fanout.open_tap();

        fanout.close().await;
        assert!(tap.next_frame().await.is_none());
        assert!(tx.send(audio(1)).await.is_err());
    }
}
