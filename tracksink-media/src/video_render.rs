//! Video render pipeline and display seam
//!
//! Each RGB24 frame is validated, converted to the renderer's pixel layout
//! and handed to a [`VideoRenderer`]. The pipeline keeps no frame queue: a
//! slow renderer throttles consumption, which in turn paces the source. After
//! every frame the loop yields briefly so the host stays responsive.

use crate::config::RenderConfig;
use crate::error::{MediaError, MediaResult};
use crate::pipeline::{FinishReason, PipelineContext, PipelineId, PipelineRole};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use tracksink_core::{FrameSource, MediaFrame, TrackKind, VideoFrame};

/// Pixel layouts a display can ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisplayFormat {
    /// Packed RGB, 3 bytes per pixel
    Rgb24,
    /// Packed BGR, 3 bytes per pixel
    Bgr24,
    /// Packed RGBA with opaque alpha, 4 bytes per pixel
    Rgba32,
}

impl DisplayFormat {
    /// Bytes per pixel
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            DisplayFormat::Rgb24 | DisplayFormat::Bgr24 => 3,
            DisplayFormat::Rgba32 => 4,
        }
    }
}

/// Frame converted to a display layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayFrame {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel layout of `data`
    pub format: DisplayFormat,
    /// Packed pixels, top row first
    pub data: Vec<u8>,
    /// Capture timestamp in microseconds
    pub timestamp_us: u64,
}

/// Convert an RGB24 frame to `format`
pub fn convert_frame(frame: &VideoFrame, format: DisplayFormat) -> MediaResult<DisplayFrame> {
    if frame.data.len() != frame.expected_len() || frame.width == 0 || frame.height == 0 {
        return Err(MediaError::InvalidFrameData {
            expected: frame.expected_len(),
            actual: frame.data.len(),
        });
    }

    let pixels = frame.data.chunks_exact(VideoFrame::BYTES_PER_PIXEL);
    let data = match format {
        DisplayFormat::Rgb24 => frame.data.to_vec(),
        DisplayFormat::Bgr24 => pixels.flat_map(|p| [p[2], p[1], p[0]]).collect(),
        DisplayFormat::Rgba32 => pixels.flat_map(|p| [p[0], p[1], p[2], u8::MAX]).collect(),
    };

    Ok(DisplayFrame {
        width: frame.width,
        height: frame.height,
        format,
        data,
        timestamp_us: frame.timestamp_us,
    })
}

/// Display seam receiving converted frames
pub trait VideoRenderer: Send + Sync {
    /// Pixel layout this renderer expects
    fn display_format(&self) -> DisplayFormat;

    /// Show a frame for `track_id`
    fn render_frame(&self, track_id: &str, frame: &DisplayFrame) -> MediaResult<()>;

    /// Clear whatever is shown for `track_id`
    fn clear(&self, track_id: &str);
}

/// Video renderer statistics
#[derive(Debug, Default, Clone)]
pub struct VideoRenderStats {
    /// Total frames rendered
    pub frames_rendered: u64,
    /// Frames skipped (invalid, out of order, or rejected by the display)
    pub frames_skipped: u64,
    /// Last frame time
    pub last_frame_time: Option<Instant>,
}

/// Software renderer keeping the latest frame per track in memory
#[derive(Debug)]
pub struct SoftwareRenderer {
    format: DisplayFormat,
    frames: RwLock<HashMap<String, DisplayFrame>>,
    stats: RwLock<VideoRenderStats>,
}

impl SoftwareRenderer {
    /// Create a renderer for `format`
    pub fn new(format: DisplayFormat) -> Self {
        Self {
            format,
            frames: RwLock::new(HashMap::new()),
            stats: RwLock::new(VideoRenderStats::default()),
        }
    }

    /// Latest frame shown for `track_id`
    pub fn latest_frame(&self, track_id: &str) -> Option<DisplayFrame> {
        self.frames.read().get(track_id).cloned()
    }

    /// Rendering statistics
    pub fn stats(&self) -> VideoRenderStats {
        self.stats.read().clone()
    }
}

impl Default for SoftwareRenderer {
    fn default() -> Self {
        Self::new(DisplayFormat::Bgr24)
    }
}

impl VideoRenderer for SoftwareRenderer {
    fn display_format(&self) -> DisplayFormat {
        self.format
    }

    fn render_frame(&self, track_id: &str, frame: &DisplayFrame) -> MediaResult<()> {
        if frame.format != self.format {
            self.stats.write().frames_skipped += 1;
            return Err(MediaError::Render {
                message: format!("expected {:?}, got {:?}", self.format, frame.format),
            });
        }

        debug!(
            "Software rendering frame: {}x{} ({} bytes)",
            frame.width,
            frame.height,
            frame.data.len()
        );

        self.frames.write().insert(track_id.to_string(), frame.clone());
        let mut stats = self.stats.write();
        stats.frames_rendered += 1;
        stats.last_frame_time = Some(Instant::now());
        Ok(())
    }

    fn clear(&self, track_id: &str) {
        self.frames.write().remove(track_id);
    }
}

/// Renderer forwarding frames to a display callback
pub struct CallbackRenderer<F> {
    format: DisplayFormat,
    callback: F,
}

impl<F> CallbackRenderer<F>
where
    F: Fn(&str, Option<&DisplayFrame>) + Send + Sync,
{
    /// Wrap `callback`; `None` means the track's display was cleared
    pub fn new(format: DisplayFormat, callback: F) -> Self {
        Self { format, callback }
    }
}

impl<F> std::fmt::Debug for CallbackRenderer<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRenderer")
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

impl<F> VideoRenderer for CallbackRenderer<F>
where
    F: Fn(&str, Option<&DisplayFrame>) + Send + Sync,
{
    fn display_format(&self) -> DisplayFormat {
        self.format
    }

    fn render_frame(&self, track_id: &str, frame: &DisplayFrame) -> MediaResult<()> {
        (self.callback)(track_id, Some(frame));
        Ok(())
    }

    fn clear(&self, track_id: &str) {
        (self.callback)(track_id, None);
    }
}

#[derive(Debug, Default)]
struct RenderCounters {
    frames_rendered: AtomicU64,
    frames_skipped: AtomicU64,
}

/// Per-pipeline render statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Frames handed to the renderer
    pub frames_rendered: u64,
    /// Frames skipped
    pub frames_skipped: u64,
}

/// Surfaces one video track on a [`VideoRenderer`]
pub struct VideoRenderPipeline {
    ctx: PipelineContext,
    cancel: CancellationToken,
    counters: Arc<RenderCounters>,
    task: Option<JoinHandle<()>>,
    renderer: Arc<dyn VideoRenderer>,
    join_timeout: Duration,
}

impl std::fmt::Debug for VideoRenderPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoRenderPipeline")
            .field("ctx", &self.ctx)
            .field("display_format", &self.renderer.display_format())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl VideoRenderPipeline {
    /// Start rendering `source`
    pub fn start<S>(
        ctx: PipelineContext,
        source: S,
        renderer: Arc<dyn VideoRenderer>,
        config: &RenderConfig,
    ) -> Self
    where
        S: FrameSource + 'static,
    {
        let cancel = CancellationToken::new();
        let counters = Arc::new(RenderCounters::default());

        let task = tokio::spawn(render_loop(
            ctx.clone(),
            source,
            renderer.clone(),
            counters.clone(),
            cancel.clone(),
            config.yield_interval(),
        ));

        info!(
            track_id = %ctx.track_id,
            id = %ctx.id,
            format = ?renderer.display_format(),
            "📺 Video rendering started"
        );

        Self {
            ctx,
            cancel,
            counters,
            task: Some(task),
            renderer,
            join_timeout: config.join_timeout(),
        }
    }

    /// Pipeline instance id
    pub fn id(&self) -> PipelineId {
        self.ctx.id
    }

    /// Track being rendered
    pub fn track_id(&self) -> &str {
        &self.ctx.track_id
    }

    /// Current statistics
    pub fn stats(&self) -> RenderStats {
        RenderStats {
            frames_rendered: self.counters.frames_rendered.load(Ordering::Relaxed),
            frames_skipped: self.counters.frames_skipped.load(Ordering::Relaxed),
        }
    }

    /// Stop rendering; no callback is issued after this returns `Ok`
    pub async fn stop(mut self) -> MediaResult<RenderStats> {
        self.cancel.cancel();
        let result = match self.task.take() {
            Some(task) => match tokio::time::timeout(self.join_timeout, task).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(_)) => Err(MediaError::WorkerPanicked {
                    track_id: self.ctx.track_id.clone(),
                }),
                Err(_) => Err(MediaError::JoinTimeout {
                    track_id: self.ctx.track_id.clone(),
                    timeout: self.join_timeout,
                }),
            },
            None => Ok(()),
        };
        self.renderer.clear(&self.ctx.track_id);

        let stats = self.stats();
        info!(
            track_id = %self.ctx.track_id,
            rendered = stats.frames_rendered,
            skipped = stats.frames_skipped,
            "⏹️ Video rendering stopped"
        );
        result.map(|()| stats)
    }
}

impl Drop for VideoRenderPipeline {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn render_loop<S>(
    ctx: PipelineContext,
    mut source: S,
    renderer: Arc<dyn VideoRenderer>,
    counters: Arc<RenderCounters>,
    cancel: CancellationToken,
    yield_interval: Duration,
) where
    S: FrameSource,
{
    let format = renderer.display_format();
    let mut last_timestamp: Option<u64> = None;
    let mut ended = false;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            item = source.next_frame() => Some(item),
        };
        let Some(item) = next else {
            break;
        };

        let frame = match item {
            None => {
                ended = true;
                break;
            }
            Some(Ok(MediaFrame::Video(frame))) => frame,
            Some(Ok(other)) => {
                counters.frames_skipped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    track_id = %ctx.track_id,
                    "{}",
                    MediaError::KindMismatch {
                        expected: TrackKind::Video,
                        actual: other.kind(),
                    }
                );
                continue;
            }
            Some(Err(e)) => {
                counters.frames_skipped.fetch_add(1, Ordering::Relaxed);
                warn!(track_id = %ctx.track_id, "Skipping video frame: {}", e);
                continue;
            }
        };

        if last_timestamp.is_some_and(|last| frame.timestamp_us < last) {
            counters.frames_skipped.fetch_add(1, Ordering::Relaxed);
            debug!(
                track_id = %ctx.track_id,
                ts = frame.timestamp_us,
                "Skipping out-of-order video frame"
            );
            continue;
        }

        let rendered = convert_frame(&frame, format)
            .and_then(|display| renderer.render_frame(&ctx.track_id, &display));
        match rendered {
            Ok(()) => {
                last_timestamp = Some(frame.timestamp_us);
                counters.frames_rendered.fetch_add(1, Ordering::Relaxed);
                trace!(track_id = %ctx.track_id, ts = frame.timestamp_us, "Frame rendered");
            }
            Err(e) => {
                counters.frames_skipped.fetch_add(1, Ordering::Relaxed);
                warn!(track_id = %ctx.track_id, "Failed to render video frame: {}", e);
            }
        }

        // Give the host a chance to run between frames
        if yield_interval.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(yield_interval) => {}
            }
        }
    }

    source.close().await;
    if ended {
        debug!(track_id = %ctx.track_id, "Video source ended");
        ctx.report(PipelineRole::VideoRender, FinishReason::SourceEnded);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bgr_conversion_swaps_channels() {
        let frame = VideoFrame::new(2, 1, vec![1u8, 2, 3, 4, 5, 6], 0);
        let display = convert_frame(&frame, DisplayFormat::Bgr24).unwrap();
        assert_eq!(display.data, vec![3, 2, 1, 6, 5, 4]);
        assert_eq!(display.format.bytes_per_pixel(), 3);
    }

    #[test]
    fn test_rgba_conversion_adds_opaque_alpha() {
        let frame = VideoFrame::new(1, 1, vec![10u8, 20, 30], 7);
        let display = convert_frame(&frame, DisplayFormat::Rgba32).unwrap();
        assert_eq!(display.data, vec![10, 20, 30, 255]);
        assert_eq!(display.timestamp_us, 7);
    }

    #[test]
    fn test_conversion_rejects_short_buffer() {
        let frame = VideoFrame::new(2, 2, vec![0u8; 5], 0);
        assert!(matches!(
            convert_frame(&frame, DisplayFormat::Rgb24),
            Err(MediaError::InvalidFrameData { expected: 12, actual: 5 })
        ));
    }

    #[test]
    fn test_software_renderer_keeps_latest_frame() {
        let renderer = SoftwareRenderer::new(DisplayFormat::Rgb24);
        let frame = convert_frame(&VideoFrame::new(1, 1, vec![1u8, 2, 3], 1), DisplayFormat::Rgb24)
            .unwrap();
        renderer.render_frame("T1", &frame).unwrap();
        assert_eq!(renderer.latest_frame("T1"), Some(frame));
        assert_eq!(renderer.stats().frames_rendered, 1);

        renderer.clear("T1");
        assert!(renderer.latest_frame("T1").is_none());
    }
}
