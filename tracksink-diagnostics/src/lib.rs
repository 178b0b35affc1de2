//! # TrackSink Diagnostics
//!
//! Logging bootstrap for tracksink hosts: console output plus an optional
//! log file, filtered by level with a `RUST_LOG` override.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod debug_logger;

// Re-export main types
pub use debug_logger::{DebugLogger, LoggingConfig};
