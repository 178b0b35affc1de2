//! Audio output devices
//!
//! [`AudioBackend`] opens an [`AudioOutput`] at a subscription's format. The
//! playback thread opens the output, performs every blocking write and drops
//! it, so outputs need not be `Send`.

use crate::config::PlaybackConfig;
use crate::error::{MediaError, MediaResult};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};
use tracksink_core::AudioFormat;

// Real audio rendering dependencies
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

/// Opens audio outputs
pub trait AudioBackend: Send + Sync {
    /// Open an output at `format`
    ///
    /// Called on the playback thread.
    fn open(&self, format: AudioFormat) -> MediaResult<Box<dyn AudioOutput>>;
}

/// An open audio output
pub trait AudioOutput {
    /// Write interleaved samples, blocking until the device accepts them
    fn write(&mut self, samples: &[i16]) -> MediaResult<()>;
}

/// Audio backend using the system output device through cpal
#[derive(Debug, Clone)]
pub struct CpalAudioBackend {
    device_name: Option<String>,
    latency: Duration,
}

impl CpalAudioBackend {
    /// Backend for the default output device
    pub fn new() -> Self {
        Self {
            device_name: None,
            latency: Duration::from_millis(60),
        }
    }

    /// Backend configured from the playback settings
    pub fn from_config(config: &PlaybackConfig) -> Self {
        Self {
            device_name: config.device_name.clone(),
            latency: config.output_latency(),
        }
    }

    /// Use a named output device instead of the default one
    pub fn with_device(mut self, name: impl Into<String>) -> Self {
        self.device_name = Some(name.into());
        self
    }

    /// Amount of audio queued in the device before writes block
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn find_device(&self, host: &cpal::Host) -> MediaResult<cpal::Device> {
        if let Some(device_name) = &self.device_name {
            host.output_devices()
                .map_err(|e| MediaError::DeviceOpenFailed {
                    reason: format!("Failed to enumerate devices: {}", e),
                })?
                .find(|d| d.name().map(|n| n == *device_name).unwrap_or(false))
                .ok_or_else(|| MediaError::DeviceNotFound {
                    device: device_name.clone(),
                })
        } else {
            host.default_output_device()
                .ok_or_else(|| MediaError::DeviceNotFound {
                    device: "default output device".to_string(),
                })
        }
    }
}

impl Default for CpalAudioBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Samples waiting for the device callback
#[derive(Debug, Default)]
struct SharedQueue {
    samples: Mutex<QueueState>,
    drained: Condvar,
}

#[derive(Debug, Default)]
struct QueueState {
    samples: VecDeque<i16>,
    stream_error: Option<String>,
}

impl AudioBackend for CpalAudioBackend {
    fn open(&self, format: AudioFormat) -> MediaResult<Box<dyn AudioOutput>> {
        let host = cpal::default_host();
        let device = self.find_device(&host)?;

        // The device's preferred sample type decides the stream flavour
        let supported_config =
            device
                .default_output_config()
                .map_err(|e| MediaError::DeviceOpenFailed {
                    reason: format!("Failed to get default output config: {}", e),
                })?;

        let stream_config = cpal::StreamConfig {
            channels: format.channels as cpal::ChannelCount,
            sample_rate: cpal::SampleRate(format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let shared = Arc::new(SharedQueue::default());

        let stream = match supported_config.sample_format() {
            cpal::SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, shared.clone()),
            cpal::SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, shared.clone()),
            cpal::SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, shared.clone()),
            sample_format => {
                return Err(MediaError::UnsupportedFormat {
                    format: format!("Unsupported sample format: {:?}", sample_format),
                });
            }
        }
        .map_err(|e| MediaError::DeviceOpenFailed {
            reason: format!(
                "Failed to build output stream at {}Hz/{}ch: {}",
                format.sample_rate, format.channels, e
            ),
        })?;

        stream.play().map_err(|e| MediaError::DeviceOpenFailed {
            reason: format!("Failed to start stream: {}", e),
        })?;

        info!(
            sample_rate = format.sample_rate,
            channels = format.channels,
            "🔊 Opened audio output"
        );

        let max_queued =
            format.samples_per_channel(self.latency) as usize * format.channels as usize;

        Ok(Box::new(CpalAudioOutput {
            _stream: stream,
            shared,
            max_queued: max_queued.max(1),
        }))
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    shared: Arc<SharedQueue>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample + cpal::FromSample<i16>,
{
    let error_queue = shared.clone();
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let mut state = shared.samples.lock();
            for out in data.iter_mut() {
                // Underruns play silence
                let sample = state.samples.pop_front().unwrap_or(0);
                *out = <T as cpal::Sample>::from_sample(sample);
            }
            drop(state);
            shared.drained.notify_all();
        },
        move |err| {
            warn!("Audio render stream error: {}", err);
            error_queue.samples.lock().stream_error = Some(err.to_string());
            error_queue.drained.notify_all();
        },
        None,
    )
}

/// Blocking writer in front of a running cpal stream
struct CpalAudioOutput {
    // Dropping the stream closes the device
    _stream: cpal::Stream,
    shared: Arc<SharedQueue>,
    max_queued: usize,
}

impl CpalAudioOutput {
    /// A device that stops consuming for this long is considered stalled
    const STALL_TIMEOUT: Duration = Duration::from_secs(1);
}

impl AudioOutput for CpalAudioOutput {
    fn write(&mut self, samples: &[i16]) -> MediaResult<()> {
        let mut state = self.shared.samples.lock();
        let mut last_progress = Instant::now();
        let mut last_len = state.samples.len();

        while state.samples.len() > self.max_queued {
            if let Some(reason) = state.stream_error.take() {
                return Err(MediaError::DeviceWrite { reason });
            }
            self.shared
                .drained
                .wait_for(&mut state, Duration::from_millis(20));
            if state.samples.len() < last_len {
                last_len = state.samples.len();
                last_progress = Instant::now();
            } else if last_progress.elapsed() > Self::STALL_TIMEOUT {
                return Err(MediaError::DeviceWrite {
                    reason: "output device stopped consuming samples".to_string(),
                });
            }
        }

        state.samples.extend(samples.iter().copied());
        trace!(queued = state.samples.len(), "Audio samples queued");
        Ok(())
    }
}

impl Drop for CpalAudioOutput {
    fn drop(&mut self) {
        debug!("Closing audio output");
    }
}
