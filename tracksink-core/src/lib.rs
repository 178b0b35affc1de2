//! # tracksink core
//!
//! Frame and track types, the media client capability set, frame sources
//! with subscription fan-out, and the error taxonomy shared by every
//! tracksink crate.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod error;
pub mod frame;
pub mod source;

// Re-export main types
pub use client::{MediaClient, RoomEvent, Subscription};
pub use error::{ClientError, ErrorKind, TrackSinkError, TrackSinkResult};
pub use frame::{AudioFormat, AudioFrame, MediaFrame, TrackKind, VideoFrame};
pub use source::{
    frame_channel, ChannelFrameSource, FrameFanout, FrameItem, FrameSender, FrameSource,
    FrameTap, StreamFrameSource,
};
