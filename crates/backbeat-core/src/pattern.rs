//! Step-grid drum patterns

use serde::{Deserialize, Serialize};

use crate::error::PatternError;
use crate::instrument::Step;

/// Time signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meter {
    pub beats_per_bar: u8,
    pub beat_unit: u8,
}

impl Meter {
    pub const fn new(beats_per_bar: u8, beat_unit: u8) -> Self {
        Self { beats_per_bar, beat_unit }
    }

    /// Beat unit 8 is counted in triplets
    pub fn is_compound(&self) -> bool {
        self.beat_unit == 8
    }

    /// Grid steps per counted beat.
    ///
    /// Compound meters always count in threes, even when the grid leaves a
    /// shorter final beat (7/8 on 14 steps is four beats of three plus two).
    /// Anything else spreads the grid evenly over the bar's beats (4 for a
    /// 16th grid).
    pub fn steps_per_beat(&self, grid_size: usize) -> usize {
        if self.is_compound() {
            3
        } else {
            grid_size / self.beats_per_bar.max(1) as usize
        }
    }

    fn validate(&self, grid_size: usize) -> Result<usize, PatternError> {
        if self.beats_per_bar == 0 || !matches!(self.beat_unit, 2 | 4 | 8 | 16) {
            return Err(PatternError::InvalidMeter(self.beats_per_bar, self.beat_unit));
        }
        let spb = self.steps_per_beat(grid_size);
        // compound grids may end on a partial beat
        let even = self.is_compound() || grid_size % self.beats_per_bar as usize == 0;
        let fits = grid_size >= self.beats_per_bar as usize && spb > 0 && grid_size >= spb && even;
        if !fits {
            return Err(PatternError::GridMismatch {
                grid_size,
                beats: self.beats_per_bar,
                steps_per_beat: spb,
            });
        }
        Ok(spb)
    }
}

impl std::fmt::Display for Meter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.beats_per_bar, self.beat_unit)
    }
}

/// One bar of drum hits on a fixed grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPattern")]
pub struct Pattern {
    pub label: String,
    pub category: String,
    pub level: u8,
    /// Suggested tempo in BPM; playback tempo is a session setting
    pub tempo_hint: f64,
    meter: Meter,
    grid_size: usize,
    steps: Vec<Step>,
    is_derived: bool,
}

impl Pattern {
    pub fn new(
        label: impl Into<String>,
        meter: Meter,
        grid_size: usize,
        steps: Vec<Step>,
    ) -> Result<Self, PatternError> {
        meter.validate(grid_size)?;
        if steps.len() != grid_size {
            return Err(PatternError::StepCount {
                expected: grid_size,
                actual: steps.len(),
            });
        }
        Ok(Self {
            label: label.into(),
            category: String::new(),
            level: 0,
            tempo_hint: 100.0,
            meter,
            grid_size,
            steps,
            is_derived: false,
        })
    }

    pub fn with_category(mut self, category: impl Into<String>, level: u8) -> Self {
        self.category = category.into();
        self.level = level;
        self
    }

    pub fn with_tempo_hint(mut self, bpm: f64) -> Self {
        self.tempo_hint = bpm;
        self
    }

    /// Copy with new steps and label, flagged as derived. Shape is unchanged.
    pub(crate) fn derive(&self, label: String, steps: Vec<Step>) -> Self {
        debug_assert_eq!(steps.len(), self.grid_size);
        Self {
            label,
            steps,
            is_derived: true,
            ..self.clone()
        }
    }

    /// Copy with new steps, keeping label and derived flag
    pub(crate) fn overwrite(&self, steps: Vec<Step>) -> Self {
        debug_assert_eq!(steps.len(), self.grid_size);
        Self {
            steps,
            ..self.clone()
        }
    }

    pub fn meter(&self) -> Meter {
        self.meter
    }

    pub fn grid_size(&self) -> usize {
        self.grid_size
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn step(&self, index: usize) -> Option<Step> {
        self.steps.get(index).copied()
    }

    pub fn is_derived(&self) -> bool {
        self.is_derived
    }

    pub fn steps_per_beat(&self) -> usize {
        self.meter.steps_per_beat(self.grid_size)
    }

    /// Number of whole counted beats in the bar
    pub fn beats(&self) -> usize {
        self.grid_size / self.steps_per_beat()
    }

    /// Bar length in beats, counting a trailing partial beat fractionally
    pub fn bar_beats(&self) -> f64 {
        self.grid_size as f64 / self.steps_per_beat() as f64
    }

    /// First step of the bar's final beat
    pub fn last_beat_start(&self) -> usize {
        self.grid_size - self.steps_per_beat()
    }

    pub fn is_beat_start(&self, index: usize) -> bool {
        index % self.steps_per_beat() == 0
    }
}

#[derive(Deserialize)]
struct RawPattern {
    label: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    level: u8,
    #[serde(default = "default_tempo_hint")]
    tempo_hint: f64,
    meter: Meter,
    grid_size: usize,
    steps: Vec<Step>,
    #[serde(default)]
    is_derived: bool,
}

fn default_tempo_hint() -> f64 {
    100.0
}

impl TryFrom<RawPattern> for Pattern {
    type Error = PatternError;

    fn try_from(raw: RawPattern) -> Result<Self, Self::Error> {
        let mut pattern = Pattern::new(raw.label, raw.meter, raw.grid_size, raw.steps)?
            .with_category(raw.category, raw.level)
            .with_tempo_hint(raw.tempo_hint);
        pattern.is_derived = raw.is_derived;
        Ok(pattern)
    }
}
