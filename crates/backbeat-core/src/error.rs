//! Error types for backbeat

use thiserror::Error;

/// Pattern shape violations, caught at construction time
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("Invalid meter {0}/{1}")]
    InvalidMeter(u8, u8),
    #[error("Grid of {grid_size} steps does not fit {beats} beats of {steps_per_beat} steps")]
    GridMismatch {
        grid_size: usize,
        beats: u8,
        steps_per_beat: usize,
    },
    #[error("Expected {expected} steps, got {actual}")]
    StepCount { expected: usize, actual: usize },
    #[error("Step has no entries")]
    EmptyStep,
    #[error("Unknown instrument: {0}")]
    UnknownInstrument(String),
}

/// Rejected control-surface requests
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("Pattern not found: {0}")]
    PatternNotFound(String),
    #[error("Beat {beat} out of range (pattern has {beats} beats)")]
    BeatOutOfRange { beat: usize, beats: usize },
    #[error("Tempo out of range: {0}")]
    InvalidTempo(f64),
    #[error("Unsupported speed rate: {0}")]
    InvalidSpeedRate(f64),
    #[error("Swing must be 0-50 in steps of 5, got {0}")]
    InvalidSwing(u8),
    #[error("Pre-roll must be 0, 2 or 4 beats, got {0}")]
    InvalidPreRoll(u8),
    #[error("Library is empty")]
    EmptyLibrary,
    #[error("Engine setting {setting} out of range: {value}")]
    InvalidEngineSetting { setting: &'static str, value: f64 },
}

#[derive(Debug, Error)]
pub enum BackbeatError {
    #[error("Pattern error: {0}")]
    Pattern(#[from] PatternError),
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
    #[error("Pattern file error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BackbeatError>;
