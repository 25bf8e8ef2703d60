//! Synthesized drum kit: per-instrument tone/noise layers and the voices that play them

use std::f64::consts::TAU;

use backbeat_core::Instrument;

/// Envelope floor reached at the end of each layer's decay (-60 dB)
const ENV_FLOOR: f64 = 0.001;
const TONE_ATTACK_SECS: f64 = 0.005;

/// Anything the renderer can strike
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sound {
    Drum(Instrument),
    Click { accent: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Triangle,
    Square,
}

impl Waveform {
    fn sample(&self, phase: f64) -> f64 {
        let p = phase.fract();
        match self {
            Self::Sine => (p * TAU).sin(),
            Self::Triangle => 1.0 - 4.0 * (p - 0.5).abs(),
            Self::Square => {
                if p < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
        }
    }
}

/// One synthesis component of a sound
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Layer {
    /// Pitched oscillator with a short linear attack and exponential decay
    Tone {
        freq: f64,
        decay: f64,
        wave: Waveform,
        level: f64,
    },
    /// Band-passed white noise with exponential decay. `width` is the band's
    /// ratio above and below `center`.
    Noise {
        center: f64,
        width: f64,
        decay: f64,
        level: f64,
    },
    /// Oscillator at full level from the first sample, for the click
    Blip { freq: f64, decay: f64, level: f64 },
}

impl Layer {
    fn decay(&self) -> f64 {
        match self {
            Self::Tone { decay, .. } | Self::Noise { decay, .. } | Self::Blip { decay, .. } => *decay,
        }
    }
}

use Layer::*;
use Waveform::*;

const KICK: &[Layer] = &[
    Tone { freq: 130.0, decay: 0.3, wave: Sine, level: 1.2 },
    Noise { center: 2000.0, width: 2.0, decay: 0.05, level: 0.5 },
];
const SNARE: &[Layer] = &[
    Noise { center: 2000.0, width: 3.0, decay: 0.25, level: 1.0 },
    Tone { freq: 180.0, decay: 0.1, wave: Triangle, level: 0.6 },
];
const GHOST: &[Layer] = &[Noise { center: 2000.0, width: 3.0, decay: 0.1, level: 0.3 }];
const RIM: &[Layer] = &[Tone { freq: 600.0, decay: 0.05, wave: Square, level: 0.8 }];
const CLOSED_HAT: &[Layer] = &[Noise { center: 5000.0, width: 4.0, decay: 0.05, level: 0.7 }];
const OPEN_HAT: &[Layer] = &[Noise { center: 5000.0, width: 4.0, decay: 0.4, level: 0.7 }];
const RIDE: &[Layer] = &[
    Noise { center: 4000.0, width: 2.0, decay: 0.6, level: 0.5 },
    Tone { freq: 500.0, decay: 0.6, wave: Sine, level: 0.2 },
];
const CRASH: &[Layer] = &[Noise { center: 3500.0, width: 3.0, decay: 1.5, level: 0.8 }];
const SPLASH: &[Layer] = &[Noise { center: 6000.0, width: 3.0, decay: 0.5, level: 0.6 }];
const HIGH_TOM: &[Layer] = &[Tone { freq: 200.0, decay: 0.35, wave: Sine, level: 0.9 }];
const LOW_TOM: &[Layer] = &[Tone { freq: 150.0, decay: 0.45, wave: Sine, level: 0.9 }];
const FLOOR_TOM: &[Layer] = &[Tone { freq: 100.0, decay: 0.55, wave: Sine, level: 1.0 }];
const CLICK: &[Layer] = &[Blip { freq: 800.0, decay: 0.1, level: 0.3 }];
const CLICK_ACCENT: &[Layer] = &[Blip { freq: 1200.0, decay: 0.1, level: 0.3 }];

impl Sound {
    /// Synthesis recipe; empty for the rest marker
    pub fn layers(&self) -> &'static [Layer] {
        match self {
            Self::Click { accent: true } => CLICK_ACCENT,
            Self::Click { accent: false } => CLICK,
            Self::Drum(inst) => match inst {
                Instrument::Kick | Instrument::KickSecondary => KICK,
                Instrument::Snare => SNARE,
                Instrument::SnareGhost => GHOST,
                Instrument::SnareRim => RIM,
                Instrument::ClosedHat => CLOSED_HAT,
                Instrument::OpenHat => OPEN_HAT,
                Instrument::Ride => RIDE,
                Instrument::Crash => CRASH,
                Instrument::Splash => SPLASH,
                Instrument::TomHigh => HIGH_TOM,
                Instrument::TomLow => LOW_TOM,
                Instrument::FloorTom => FLOOR_TOM,
                Instrument::Rest => &[],
            },
        }
    }
}

/// Per-layer oscillator and filter state
#[derive(Debug, Clone, Default)]
struct LayerState {
    phase: f64,
    low: f64,
    high: f64,
}

/// One sounding instance of a [`Sound`]
#[derive(Debug, Clone)]
pub struct Voice {
    layers: &'static [Layer],
    state: Vec<LayerState>,
    age: usize,
    length: usize,
    rng: fastrand::Rng,
}

impl Voice {
    pub fn new(sound: Sound, sample_rate: u32, rng: fastrand::Rng) -> Self {
        let layers = sound.layers();
        let longest = layers.iter().map(Layer::decay).fold(0.0, f64::max);
        Self {
            layers,
            state: vec![LayerState::default(); layers.len()],
            age: 0,
            length: (longest * sample_rate as f64).ceil() as usize,
            rng,
        }
    }

    pub fn is_active(&self) -> bool {
        self.age < self.length
    }

    /// Next output sample
    pub fn tick(&mut self, sample_rate: u32) -> f32 {
        if !self.is_active() {
            return 0.0;
        }
        let sr = sample_rate as f64;
        let dt = 1.0 / sr;
        let t = self.age as f64 * dt;
        self.age += 1;

        let mut out = 0.0;
        for (layer, state) in self.layers.iter().zip(self.state.iter_mut()) {
            if t >= layer.decay() {
                continue;
            }
            out += match *layer {
                Tone { freq, decay, wave, level } => {
                    state.phase += freq * dt;
                    let attack = (t / TONE_ATTACK_SECS).min(1.0);
                    wave.sample(state.phase) * level * attack * envelope(t, decay)
                }
                Blip { freq, decay, level } => {
                    state.phase += freq * dt;
                    Square.sample(state.phase) * level * envelope(t, decay)
                }
                Noise { center, width, decay, level } => {
                    let noise = self.rng.f64() * 2.0 - 1.0;
                    // band = lowpass(upper edge) - lowpass(lower edge)
                    state.high += one_pole(center * width, sr) * (noise - state.high);
                    state.low += one_pole(center / width, sr) * (noise - state.low);
                    (state.high - state.low) * level * envelope(t, decay)
                }
            };
        }
        out as f32
    }
}

/// Exponential fall from 1 to [`ENV_FLOOR`] over `decay` seconds
fn envelope(t: f64, decay: f64) -> f64 {
    ENV_FLOOR.powf(t / decay)
}

fn one_pole(cutoff: f64, sample_rate: f64) -> f64 {
    let nyquist = sample_rate * 0.49;
    1.0 - (-TAU * cutoff.min(nyquist) / sample_rate).exp()
}
