//! Sample-accurate mixer for scheduled drum hits

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use backbeat_core::{Instrument, TriggerSink};
use tracing::{trace, warn};

use crate::kit::{Sound, Voice};

/// Hard cap on simultaneously sounding voices; the oldest is dropped first
pub const MAX_VOICES: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq)]
struct QueuedHit {
    frame: u64,
    sound: Sound,
}

/// Turns timestamped triggers into audio.
///
/// Hits are converted from audio-clock seconds to absolute frame numbers and
/// started on exactly that frame, regardless of which buffer they land in.
#[derive(Debug)]
pub struct Renderer {
    sample_rate: u32,
    gain: f32,
    frame: u64,
    queue: VecDeque<QueuedHit>,
    voices: Vec<Voice>,
    rng: fastrand::Rng,
    late_hits: u64,
}

impl Renderer {
    pub fn new(sample_rate: u32, gain: f32) -> Self {
        Self::with_rng(sample_rate, gain, fastrand::Rng::new())
    }

    /// Renderer with deterministic noise
    pub fn with_rng(sample_rate: u32, gain: f32, rng: fastrand::Rng) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            gain,
            frame: 0,
            queue: VecDeque::new(),
            voices: Vec::with_capacity(MAX_VOICES),
            rng,
            late_hits: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Adopt the device rate. Only meaningful before anything is queued.
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        if sample_rate != self.sample_rate && sample_rate > 0 {
            self.sample_rate = sample_rate;
        }
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
    }

    /// Frames rendered so far
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    /// Hits that arrived after their frame had already been rendered
    pub fn late_hits(&self) -> u64 {
        self.late_hits
    }

    /// Queue `sound` to start at audio time `time`
    pub fn schedule(&mut self, sound: Sound, time: f64) {
        let target = (time.max(0.0) * self.sample_rate as f64).round() as u64;
        let frame = if target < self.frame {
            self.late_hits += 1;
            warn!(?sound, late_frames = self.frame - target, "Hit arrived late, starting now");
            self.frame
        } else {
            target
        };
        let at = self.queue.partition_point(|hit| hit.frame <= frame);
        self.queue.insert(at, QueuedHit { frame, sound });
    }

    /// Drop queued hits that have not started yet; sounding voices ring out
    pub fn cancel_pending(&mut self) {
        if !self.queue.is_empty() {
            trace!(dropped = self.queue.len(), "Cancelled queued hits");
        }
        self.queue.clear();
    }

    /// Fill an interleaved buffer. Every channel gets the same mono mix.
    pub fn render(&mut self, buffer: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        for frame in buffer.chunks_mut(channels) {
            let sample = self.next_sample();
            frame.fill(sample);
        }
    }

    /// Render `frames` mono samples
    pub fn render_mono(&mut self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames];
        self.render(&mut out, 1);
        out
    }

    fn next_sample(&mut self) -> f32 {
        while self.queue.front().is_some_and(|hit| hit.frame <= self.frame) {
            if let Some(hit) = self.queue.pop_front() {
                self.start_voice(hit.sound);
            }
        }

        let sr = self.sample_rate;
        let mut mix = 0.0;
        for voice in &mut self.voices {
            mix += voice.tick(sr);
        }
        self.voices.retain(Voice::is_active);
        self.frame += 1;
        (mix * self.gain).tanh()
    }

    fn start_voice(&mut self, sound: Sound) {
        if self.voices.len() >= MAX_VOICES {
            self.voices.remove(0);
        }
        let rng = self.rng.fork();
        self.voices.push(Voice::new(sound, self.sample_rate, rng));
    }
}

impl TriggerSink for Renderer {
    fn on_trigger(&mut self, instrument: Instrument, time: f64) {
        self.schedule(Sound::Drum(instrument), time);
    }

    fn on_metronome_tick(&mut self, accent: bool, time: f64) {
        self.schedule(Sound::Click { accent }, time);
    }
}

/// A renderer shared between the scheduling thread and the audio callback
#[derive(Debug, Clone)]
pub struct SharedRenderer(Arc<Mutex<Renderer>>);

impl SharedRenderer {
    pub fn new(renderer: Renderer) -> Self {
        Self(Arc::new(Mutex::new(renderer)))
    }

    /// Audio-callback entry point. Outputs silence if the lock is poisoned.
    pub fn render(&self, buffer: &mut [f32], sample_rate: u32, channels: u16) {
        let Ok(mut renderer) = self.0.lock() else {
            buffer.fill(0.0);
            return;
        };
        renderer.set_sample_rate(sample_rate);
        renderer.render(buffer, channels as usize);
    }

    pub fn with<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&mut Renderer) -> R,
    {
        self.0.lock().ok().map(|mut r| f(&mut r))
    }

    pub fn cancel_pending(&self) {
        self.with(Renderer::cancel_pending);
    }
}

impl TriggerSink for SharedRenderer {
    fn on_trigger(&mut self, instrument: Instrument, time: f64) {
        self.with(|r| r.on_trigger(instrument, time));
    }

    fn on_metronome_tick(&mut self, accent: bool, time: f64) {
        self.with(|r| r.on_metronome_tick(accent, time));
    }
}
