//! AVI video recording
//!
//! Uncompressed 24-bit DIB frames in a RIFF AVI container. The first frame
//! fixes the dimensions. Each frame becomes one `00db` chunk inside the
//! `movi` list; finalization appends the `idx1` index and rewrites the
//! header with the frame count.
//!
//! File layout:
//!
//! ```text
//! RIFF 'AVI '
//!   LIST 'hdrl'
//!     avih
//!     LIST 'strl'
//!       strh
//!       strf (BITMAPINFOHEADER)
//!   LIST 'movi'
//!     00db ...
//!   idx1
//! ```

use super::{open_failed, rollback, RecordingSink, RecordingSummary};
use crate::error::{MediaError, MediaResult};
use async_trait::async_trait;
use bytes::BufMut;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info};
use tracksink_core::{MediaFrame, TrackKind, VideoFrame};

/// Bytes from the start of the file through the `movi` fourcc
pub const AVI_HEADER_LEN: u64 = 224;

/// Offset of the `movi` fourcc; index offsets are relative to it
const MOVI_FOURCC_OFFSET: u64 = 220;

const AVIF_HASINDEX: u32 = 0x10;
const AVIIF_KEYFRAME: u32 = 0x10;
const FRAME_CHUNK_ID: &[u8; 4] = b"00db";

#[derive(Debug, Clone, Copy)]
struct IndexEntry {
    offset: u32,
    size: u32,
}

/// Records video frames into an AVI file
#[derive(Debug)]
pub struct AviRecordingSink {
    path: PathBuf,
    file: File,
    fps: u32,
    dimensions: Option<(u32, u32)>,
    index: Vec<IndexEntry>,
    movi_len: u64,
    frames_failed: u64,
}

impl AviRecordingSink {
    /// Create (or truncate) `path` and write a placeholder header
    pub async fn create(path: impl Into<PathBuf>, fps: u32) -> MediaResult<Self> {
        let path = path.into();
        let file = File::create(&path)
            .await
            .map_err(|e| open_failed(&path, e))?;
        Self::from_file(path, file, fps).await
    }

    pub(crate) async fn from_file(path: PathBuf, file: File, fps: u32) -> MediaResult<Self> {
        if fps == 0 {
            return Err(MediaError::InvalidConfiguration {
                message: "video_fps must be greater than zero".to_string(),
            });
        }

        let mut sink = Self {
            path,
            file,
            fps,
            dimensions: None,
            index: Vec::new(),
            movi_len: 0,
            frames_failed: 0,
        };
        let header = sink.header(0);
        let written = async {
            sink.file.write_all(&header).await?;
            sink.file.flush().await
        }
        .await;
        written.map_err(|e| open_failed(&sink.path, e))?;

        info!(path = %sink.path.display(), fps, "🎥 Started video recording");
        Ok(sink)
    }

    /// Frames persisted so far
    pub fn frames_written(&self) -> u64 {
        self.index.len() as u64
    }

    /// Dimensions fixed by the first frame
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.dimensions
    }

    fn frame_size(&self) -> u32 {
        let (width, height) = self.dimensions.unwrap_or((0, 0));
        dib_stride(width) * height
    }

    /// Header region with sizes describing the current contents
    ///
    /// `index_len` is the size of the trailing `idx1` chunk, zero while the
    /// recording is still open.
    fn header(&self, index_len: u64) -> Vec<u8> {
        let (width, height) = self.dimensions.unwrap_or((0, 0));
        let frame_size = self.frame_size();
        let total_frames = self.index.len() as u32;
        let riff_len = (AVI_HEADER_LEN - 8 + self.movi_len + index_len) as u32;

        let mut buf = Vec::with_capacity(AVI_HEADER_LEN as usize);
        buf.put_slice(b"RIFF");
        buf.put_u32_le(riff_len);
        buf.put_slice(b"AVI ");

        buf.put_slice(b"LIST");
        buf.put_u32_le(192);
        buf.put_slice(b"hdrl");

        // Main header
        buf.put_slice(b"avih");
        buf.put_u32_le(56);
        buf.put_u32_le(1_000_000 / self.fps);
        buf.put_u32_le(frame_size.saturating_mul(self.fps));
        buf.put_u32_le(0);
        buf.put_u32_le(AVIF_HASINDEX);
        buf.put_u32_le(total_frames);
        buf.put_u32_le(0);
        buf.put_u32_le(1);
        buf.put_u32_le(frame_size + 8);
        buf.put_u32_le(width);
        buf.put_u32_le(height);
        buf.put_bytes(0, 16);

        buf.put_slice(b"LIST");
        buf.put_u32_le(116);
        buf.put_slice(b"strl");

        // Stream header
        buf.put_slice(b"strh");
        buf.put_u32_le(56);
        buf.put_slice(b"vids");
        buf.put_slice(b"DIB ");
        buf.put_u32_le(0);
        buf.put_u16_le(0);
        buf.put_u16_le(0);
        buf.put_u32_le(0);
        buf.put_u32_le(1);
        buf.put_u32_le(self.fps);
        buf.put_u32_le(0);
        buf.put_u32_le(total_frames);
        buf.put_u32_le(frame_size + 8);
        buf.put_u32_le(u32::MAX);
        buf.put_u32_le(frame_size);
        buf.put_i16_le(0);
        buf.put_i16_le(0);
        buf.put_i16_le(width.min(i16::MAX as u32) as i16);
        buf.put_i16_le(height.min(i16::MAX as u32) as i16);

        // BITMAPINFOHEADER, positive height means bottom-up rows
        buf.put_slice(b"strf");
        buf.put_u32_le(40);
        buf.put_u32_le(40);
        buf.put_i32_le(width as i32);
        buf.put_i32_le(height as i32);
        buf.put_u16_le(1);
        buf.put_u16_le(24);
        buf.put_u32_le(0);
        buf.put_u32_le(frame_size);
        buf.put_bytes(0, 16);

        buf.put_slice(b"LIST");
        buf.put_u32_le((4 + self.movi_len) as u32);
        buf.put_slice(b"movi");

        debug_assert_eq!(buf.len() as u64, AVI_HEADER_LEN);
        buf
    }

    fn index_chunk(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + 16 * self.index.len());
        buf.put_slice(b"idx1");
        buf.put_u32_le(16 * self.index.len() as u32);
        for entry in &self.index {
            buf.put_slice(FRAME_CHUNK_ID);
            buf.put_u32_le(AVIIF_KEYFRAME);
            buf.put_u32_le(entry.offset);
            buf.put_u32_le(entry.size);
        }
        buf
    }

    fn check_frame<'a>(&mut self, frame: &'a MediaFrame) -> MediaResult<&'a VideoFrame> {
        let video = match frame {
            MediaFrame::Video(video) => video,
            other => {
                return Err(MediaError::KindMismatch {
                    expected: TrackKind::Video,
                    actual: other.kind(),
                })
            }
        };

        let expected = video.expected_len();
        if expected == 0 || video.data.len() != expected {
            return Err(MediaError::InvalidFrameData {
                expected,
                actual: video.data.len(),
            });
        }

        match self.dimensions {
            None => self.dimensions = Some((video.width, video.height)),
            Some((width, height)) if (width, height) != (video.width, video.height) => {
                return Err(MediaError::DimensionMismatch {
                    expected_width: width,
                    expected_height: height,
                    width: video.width,
                    height: video.height,
                });
            }
            Some(_) => {}
        }
        Ok(video)
    }
}

#[async_trait]
impl RecordingSink for AviRecordingSink {
    fn path(&self) -> &Path {
        &self.path
    }

    async fn write_frame(&mut self, frame: &MediaFrame) -> MediaResult<()> {
        let had_dimensions = self.dimensions.is_some();
        let video = match self.check_frame(frame) {
            Ok(video) => video,
            Err(e) => {
                self.frames_failed += 1;
                return Err(e);
            }
        };

        let chunk = frame_chunk(video);
        let size = (chunk.len() - 8) as u32;
        let offset = AVI_HEADER_LEN + self.movi_len;

        // The finished file must still fit a 32-bit RIFF size with its index
        let index_len = 8 + 16 * (self.index.len() as u64 + 1);
        if offset + chunk.len() as u64 + index_len > u32::MAX as u64 {
            return Err(MediaError::RecordingFailed {
                path: self.path.display().to_string(),
                reason: "AVI size limit reached".to_string(),
            });
        }

        let written = async {
            self.file.write_all(&chunk).await?;
            self.file.flush().await
        }
        .await;

        if let Err(source) = written {
            self.frames_failed += 1;
            if !had_dimensions {
                self.dimensions = None;
            }
            rollback(&mut self.file, offset, &self.path).await?;
            return Err(MediaError::Io { source });
        }

        self.index.push(IndexEntry {
            offset: (offset - MOVI_FOURCC_OFFSET) as u32,
            size,
        });
        self.movi_len += chunk.len() as u64;
        Ok(())
    }

    async fn finalize(mut self: Box<Self>) -> MediaResult<RecordingSummary> {
        let index = self.index_chunk();
        let header = self.header(index.len() as u64);
        let index_offset = AVI_HEADER_LEN + self.movi_len;
        let path = self.path.clone();

        let finished = async {
            self.file.seek(SeekFrom::Start(index_offset)).await?;
            self.file.write_all(&index).await?;
            self.file.seek(SeekFrom::Start(0)).await?;
            self.file.write_all(&header).await?;
            self.file.seek(SeekFrom::End(0)).await?;
            self.file.flush().await?;
            self.file.sync_all().await
        }
        .await;
        finished.map_err(|e| MediaError::RecordingFailed {
            path: path.display().to_string(),
            reason: format!("failed to finalize AVI index: {}", e),
        })?;

        debug!(
            path = %path.display(),
            frames = self.index.len(),
            "AVI index finalized"
        );

        Ok(RecordingSummary {
            path,
            frames_written: self.index.len() as u64,
            samples_written: 0,
            frames_failed: self.frames_failed,
        })
    }
}

/// Row stride of a 24-bit DIB, padded to four bytes
pub fn dib_stride(width: u32) -> u32 {
    (width * 3 + 3) & !3
}

/// Encode one RGB24 frame as a `00db` chunk of bottom-up BGR rows
fn frame_chunk(frame: &VideoFrame) -> Vec<u8> {
    let width = frame.width as usize;
    let height = frame.height as usize;
    let row_len = width * VideoFrame::BYTES_PER_PIXEL;
    let stride = dib_stride(frame.width) as usize;

    let mut chunk = Vec::with_capacity(8 + stride * height);
    chunk.put_slice(FRAME_CHUNK_ID);
    chunk.put_u32_le((stride * height) as u32);

    for row in frame.data.chunks_exact(row_len).rev() {
        for pixel in row.chunks_exact(3) {
            chunk.put_slice(&[pixel[2], pixel[1], pixel[0]]);
        }
        chunk.put_bytes(0, stride - row_len);
    }
    chunk
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stride_padding() {
        assert_eq!(dib_stride(1), 4);
        assert_eq!(dib_stride(4), 12);
        assert_eq!(dib_stride(5), 16);
    }

    #[test]
    fn test_frame_chunk_is_bottom_up_bgr() {
        // 1x2: top pixel red, bottom pixel blue
        let frame = VideoFrame::new(1, 2, vec![255u8, 0, 0, 0, 0, 255], 0);
        let chunk = frame_chunk(&frame);
        assert_eq!(&chunk[0..4], b"00db");
        assert_eq!(u32::from_le_bytes(chunk[4..8].try_into().unwrap()), 8);
        // bottom row first, BGR order, padded to 4 bytes
        assert_eq!(&chunk[8..12], &[255, 0, 0, 0]);
        assert_eq!(&chunk[12..16], &[0, 0, 255, 0]);
    }

    #[tokio::test]
    async fn test_dimension_change_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = Box::new(
            AviRecordingSink::create(dir.path().join("dims.avi"), 30)
                .await
                .unwrap(),
        );

        sink.write_frame(&VideoFrame::new(2, 2, vec![1u8; 12], 0).into())
            .await
            .unwrap();
        let err = sink
            .write_frame(&VideoFrame::new(4, 2, vec![1u8; 24], 1).into())
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::DimensionMismatch { .. }));
        assert!(err.is_recoverable());

        let summary = sink.finalize().await.unwrap();
        assert_eq!(summary.frames_written, 1);
        assert_eq!(summary.frames_failed, 1);
    }

    #[tokio::test]
    async fn test_empty_recording_is_still_a_valid_container() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.avi");
        let sink = Box::new(AviRecordingSink::create(&path, 30).await.unwrap());
        sink.finalize().await.unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len() as u64, AVI_HEADER_LEN + 8);
        assert_eq!(
            u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize,
            bytes.len() - 8
        );
        assert_eq!(&bytes[224..228], b"idx1");
    }
}
