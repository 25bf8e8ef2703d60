//! Playback parameters exposed on the control surface

use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::instrument::MuteMask;

pub const MIN_TEMPO: f64 = 20.0;
pub const MAX_TEMPO: f64 = 300.0;

/// Practice speed multipliers, slowest first
pub const SPEED_RATES: [f64; 6] = [0.5, 0.75, 1.0, 1.25, 1.5, 2.0];

pub const PRE_ROLL_CHOICES: [u8; 3] = [0, 2, 4];

/// Multiplier applied on top of the tempo
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct SpeedRate(f64);

impl Default for SpeedRate {
    fn default() -> Self {
        Self(1.0)
    }
}

impl SpeedRate {
    pub fn value(&self) -> f64 {
        self.0
    }

    fn index(&self) -> usize {
        SPEED_RATES.iter().position(|r| *r == self.0).unwrap_or(2)
    }

    /// Next rate up, saturating at the fastest
    pub fn faster(self) -> Self {
        Self(SPEED_RATES[(self.index() + 1).min(SPEED_RATES.len() - 1)])
    }

    /// Next rate down, saturating at the slowest
    pub fn slower(self) -> Self {
        Self(SPEED_RATES[self.index().saturating_sub(1)])
    }
}

impl TryFrom<f64> for SpeedRate {
    type Error = SessionError;

    fn try_from(rate: f64) -> Result<Self, Self::Error> {
        if SPEED_RATES.contains(&rate) {
            Ok(Self(rate))
        } else {
            Err(SessionError::InvalidSpeedRate(rate))
        }
    }
}

impl From<SpeedRate> for f64 {
    fn from(rate: SpeedRate) -> Self {
        rate.0
    }
}

/// Shuffle amount in percent: 0-50, multiples of 5
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Swing(u8);

impl Swing {
    pub const MAX: u8 = 50;

    pub fn percent(&self) -> u8 {
        self.0
    }

    /// Fractional offset, e.g. 0.2 for 20%
    pub fn ratio(&self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl TryFrom<u8> for Swing {
    type Error = SessionError;

    fn try_from(percent: u8) -> Result<Self, Self::Error> {
        if percent <= Self::MAX && percent % 5 == 0 {
            Ok(Self(percent))
        } else {
            Err(SessionError::InvalidSwing(percent))
        }
    }
}

impl From<Swing> for u8 {
    fn from(swing: Swing) -> Self {
        swing.0
    }
}

pub fn validate_tempo(bpm: f64) -> Result<f64, SessionError> {
    if bpm.is_finite() && (MIN_TEMPO..=MAX_TEMPO).contains(&bpm) {
        Ok(bpm)
    } else {
        Err(SessionError::InvalidTempo(bpm))
    }
}

pub fn validate_pre_roll(beats: u8) -> Result<u8, SessionError> {
    if PRE_ROLL_CHOICES.contains(&beats) {
        Ok(beats)
    } else {
        Err(SessionError::InvalidPreRoll(beats))
    }
}

/// Everything the scheduler reads while playing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackSettings {
    pub tempo: f64,
    pub speed_rate: SpeedRate,
    pub swing: Swing,
    pub pre_roll_beats: u8,
    pub metronome: bool,
    pub mutes: MuteMask,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            tempo: 100.0,
            speed_rate: SpeedRate::default(),
            swing: Swing::default(),
            pre_roll_beats: 0,
            metronome: false,
            mutes: MuteMask::default(),
        }
    }
}

impl PlaybackSettings {
    /// Tempo after the speed multiplier
    pub fn effective_tempo(&self) -> f64 {
        self.tempo * self.speed_rate.value()
    }

    pub fn seconds_per_beat(&self) -> f64 {
        60.0 / self.effective_tempo()
    }
}

/// Timing constants of the lookahead loop
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How often the driver wakes up, in milliseconds
    pub tick_interval_ms: u64,
    /// How far past "now" each wake-up schedules, in seconds
    pub lookahead_secs: f64,
    /// Delay between start() and the first event, in seconds
    pub start_margin_secs: f64,
    /// Upper bound on steps emitted by one wake-up
    pub max_steps_per_tick: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 25,
            lookahead_secs: 0.1,
            start_margin_secs: 0.05,
            max_steps_per_tick: 100,
        }
    }
}

impl EngineConfig {
    /// Reject timings under which the scheduler could never emit a step
    pub fn validate(self) -> Result<Self, SessionError> {
        let invalid = |setting, value| Err(SessionError::InvalidEngineSetting { setting, value });
        if self.tick_interval_ms == 0 {
            return invalid("tick_interval_ms", 0.0);
        }
        if !(self.lookahead_secs.is_finite() && self.lookahead_secs > 0.0) {
            return invalid("lookahead_secs", self.lookahead_secs);
        }
        if !(self.start_margin_secs.is_finite() && self.start_margin_secs >= 0.0) {
            return invalid("start_margin_secs", self.start_margin_secs);
        }
        if self.max_steps_per_tick == 0 {
            return invalid("max_steps_per_tick", 0.0);
        }
        Ok(self)
    }
}
