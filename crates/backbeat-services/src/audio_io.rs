//! Realtime audio output and the stream-driven audio clock

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use backbeat_core::AudioClock;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum AudioOutputError {
    #[error("No audio output devices found")]
    NoDevices,
    #[error("Failed to get default output config: {0}")]
    ConfigError(String),
    #[error("Failed to build output stream: {0}")]
    StreamError(String),
}

/// Audio time derived from frames the output stream has consumed.
///
/// Only the stream callback advances it, so it runs exactly at the device
/// rate and never drifts against what is heard.
#[derive(Debug)]
pub struct StreamClock {
    frames: AtomicU64,
    sample_rate: AtomicU32,
}

impl StreamClock {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            frames: AtomicU64::new(0),
            sample_rate: AtomicU32::new(sample_rate.max(1)),
        }
    }

    pub fn advance(&self, frames: u64) {
        self.frames.fetch_add(frames, Ordering::SeqCst);
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::SeqCst)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::SeqCst)
    }
}

impl AudioClock for StreamClock {
    fn now(&self) -> f64 {
        self.frames() as f64 / self.sample_rate() as f64
    }
}

/// Name, sample rate, and channel count of the default output device
pub fn default_device_info() -> Result<(String, u32, u16), AudioOutputError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(AudioOutputError::NoDevices)?;

    let config = device
        .default_output_config()
        .map_err(|e| AudioOutputError::ConfigError(e.to_string()))?;

    let name = device.name().unwrap_or_default();
    Ok((name, config.sample_rate().0, config.channels()))
}

/// Real-time audio output stream pulling interleaved f32 frames from a callback
pub struct RealtimeOutputStream {
    stop_flag: Arc<AtomicBool>,
    clock: Arc<StreamClock>,
    sample_rate: u32,
    _stream: cpal::Stream,
}

impl RealtimeOutputStream {
    /// Open the default device and start pulling from `sample_callback`.
    ///
    /// The callback receives the interleaved buffer, the device sample rate,
    /// and the channel count. The stream clock advances after every buffer.
    pub fn start<F>(sample_callback: F) -> Result<Self, AudioOutputError>
    where
        F: FnMut(&mut [f32], u32, u16) + Send + 'static,
    {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(AudioOutputError::NoDevices)?;

        let supported_config = device
            .default_output_config()
            .map_err(|e| AudioOutputError::ConfigError(e.to_string()))?;

        let sample_rate = supported_config.sample_rate().0;
        let channels = supported_config.channels();

        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop_clone = stop_flag.clone();
        let clock = Arc::new(StreamClock::new(sample_rate));
        let clock_clone = clock.clone();

        let config: StreamConfig = supported_config.into();
        let callback = Arc::new(Mutex::new(sample_callback));

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let frames = data.len() as u64 / channels.max(1) as u64;
                    if stop_clone.load(Ordering::SeqCst) {
                        data.fill(0.0);
                    } else if let Ok(mut cb) = callback.lock() {
                        cb(data, sample_rate, channels);
                    } else {
                        data.fill(0.0);
                    }
                    clock_clone.advance(frames);
                },
                move |err| error!("Output stream error: {}", err),
                None,
            )
            .map_err(|e| AudioOutputError::StreamError(e.to_string()))?;

        stream.play().map_err(|e| AudioOutputError::StreamError(e.to_string()))?;

        info!(
            device = %device.name().unwrap_or_default(),
            sample_rate,
            channels,
            "Started realtime output stream"
        );

        Ok(Self { stop_flag, clock, sample_rate, _stream: stream })
    }

    /// Clock driven by this stream's consumed frames
    pub fn clock(&self) -> Arc<StreamClock> {
        self.clock.clone()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }
}

impl Drop for RealtimeOutputStream {
    fn drop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_clock_counts_frames() {
        let clock = StreamClock::new(48_000);
        assert_eq!(clock.now(), 0.0);
        clock.advance(512);
        clock.advance(24_000 - 512);
        assert_eq!(clock.frames(), 24_000);
        assert!((clock.now() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_stream_clock_rejects_zero_rate() {
        let clock = StreamClock::new(0);
        clock.advance(10);
        assert_eq!(clock.sample_rate(), 1);
        assert_eq!(clock.now(), 10.0);
    }
}
