//! Playback session: the control surface over scheduler, library, and mutator

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::SessionError;
use crate::instrument::InstrumentGroup;
use crate::library::PatternLibrary;
use crate::mutator;
use crate::pattern::Pattern;
use crate::scheduler::{Scheduler, TickReport, TriggerSink};
use crate::settings::{self, EngineConfig, PlaybackSettings, SpeedRate, Swing};
use crate::transition::{self, Transition};

/// Where the next pattern comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternRequest {
    /// A library pattern by key
    Select(String),
    /// Any non-derived library pattern
    Random,
    /// Randomized variation of the current pattern
    Variation,
    /// Loop one beat of the current pattern across the bar
    BeatRepeat(usize),
}

/// One user's playback session.
///
/// Owns the scheduler state outright; callers drive it with [`Session::tick`]
/// and change it only through the methods below.
pub struct Session {
    library: Arc<PatternLibrary>,
    scheduler: Scheduler,
    rng: fastrand::Rng,
}

impl Session {
    pub fn new(library: Arc<PatternLibrary>, config: EngineConfig, rng: fastrand::Rng) -> Self {
        let mut scheduler = Scheduler::new(config);
        if let Some(first) = library.first() {
            transition::request_change(&mut scheduler, first.pattern.clone());
        }
        Self { library, scheduler, rng }
    }

    /// Session over the built-in catalog with default timing
    pub fn with_builtin_library() -> Self {
        Self::new(PatternLibrary::builtin(), EngineConfig::default(), fastrand::Rng::new())
    }

    pub fn library(&self) -> &Arc<PatternLibrary> {
        &self.library
    }

    /// Start from the top of the active pattern at audio time `now`
    pub fn play(&mut self, now: f64) -> Result<(), SessionError> {
        let pattern = self.scheduler.active().ok_or(SessionError::EmptyLibrary)?;
        let settings = *self.scheduler.settings();
        self.scheduler.start(pattern, settings, now);
        Ok(())
    }

    pub fn stop(&mut self) {
        self.scheduler.stop();
    }

    pub fn tick(&mut self, now: f64, sink: &mut dyn TriggerSink) -> TickReport {
        self.scheduler.tick(now, sink)
    }

    /// Resolve a request into a pattern and hand it to the transition policy
    pub fn request_change(&mut self, request: PatternRequest) -> Result<Transition, SessionError> {
        let next = match request {
            PatternRequest::Select(key) => self
                .library
                .get(&key)
                .ok_or(SessionError::PatternNotFound(key))?,
            PatternRequest::Random => {
                let entry = self
                    .library
                    .random(&mut self.rng)
                    .ok_or(SessionError::EmptyLibrary)?;
                entry.pattern.clone()
            }
            PatternRequest::Variation => {
                let Some(base) = self.base_pattern() else {
                    debug!("Variation requested with no pattern loaded");
                    return Ok(Transition::Ignored);
                };
                Arc::new(mutator::variation(&base, &mut self.rng))
            }
            PatternRequest::BeatRepeat(beat) => {
                let Some(base) = self.base_pattern() else {
                    debug!("Beat repeat requested with no pattern loaded");
                    return Ok(Transition::Ignored);
                };
                Arc::new(mutator::beat_repeat(&base, beat)?)
            }
        };
        info!(pattern = %next.label, derived = next.is_derived(), "Pattern requested");
        Ok(transition::request_change(&mut self.scheduler, next))
    }

    pub fn select(&mut self, key: &str) -> Result<Transition, SessionError> {
        self.request_change(PatternRequest::Select(key.to_string()))
    }

    pub fn random(&mut self) -> Result<Transition, SessionError> {
        self.request_change(PatternRequest::Random)
    }

    pub fn variation(&mut self) -> Result<Transition, SessionError> {
        self.request_change(PatternRequest::Variation)
    }

    pub fn beat_repeat(&mut self, beat: usize) -> Result<Transition, SessionError> {
        self.request_change(PatternRequest::BeatRepeat(beat))
    }

    /// The pattern mutations derive from: whatever is queued, else what is
    /// playing. A bar carrying a fill always has a queued successor, so the
    /// fill never leaks into a derivation.
    fn base_pattern(&self) -> Option<Arc<Pattern>> {
        self.scheduler.pending().or_else(|| self.scheduler.active())
    }

    pub fn set_tempo(&mut self, bpm: f64) -> Result<(), SessionError> {
        let bpm = settings::validate_tempo(bpm)?;
        self.scheduler.set_tempo(bpm);
        Ok(())
    }

    pub fn set_speed_rate(&mut self, rate: f64) -> Result<(), SessionError> {
        self.scheduler.set_speed_rate(SpeedRate::try_from(rate)?);
        Ok(())
    }

    pub fn faster(&mut self) -> SpeedRate {
        let rate = self.scheduler.settings().speed_rate.faster();
        self.scheduler.set_speed_rate(rate);
        rate
    }

    pub fn slower(&mut self) -> SpeedRate {
        let rate = self.scheduler.settings().speed_rate.slower();
        self.scheduler.set_speed_rate(rate);
        rate
    }

    pub fn set_swing(&mut self, percent: u8) -> Result<(), SessionError> {
        self.scheduler.set_swing(Swing::try_from(percent)?);
        Ok(())
    }

    /// Count-in length for the next `play`
    pub fn set_pre_roll(&mut self, beats: u8) -> Result<(), SessionError> {
        self.scheduler.set_pre_roll(settings::validate_pre_roll(beats)?);
        Ok(())
    }

    pub fn set_metronome(&mut self, on: bool) {
        self.scheduler.set_metronome(on);
    }

    pub fn set_muted(&mut self, group: InstrumentGroup, muted: bool) {
        self.scheduler.set_muted(group, muted);
    }

    /// Apply a full settings block, validating each field
    pub fn apply_settings(&mut self, settings: &PlaybackSettings) -> Result<(), SessionError> {
        self.set_tempo(settings.tempo)?;
        self.set_pre_roll(settings.pre_roll_beats)?;
        self.scheduler.set_speed_rate(settings.speed_rate);
        self.scheduler.set_swing(settings.swing);
        self.set_metronome(settings.metronome);
        for group in InstrumentGroup::ALL {
            self.set_muted(group, settings.mutes.is_muted(group));
        }
        Ok(())
    }

    pub fn settings(&self) -> &PlaybackSettings {
        self.scheduler.settings()
    }

    pub fn engine_config(&self) -> &EngineConfig {
        self.scheduler.config()
    }

    pub fn is_playing(&self) -> bool {
        self.scheduler.is_playing()
    }

    pub fn current_step(&self) -> i32 {
        self.scheduler.cursor()
    }

    pub fn active_pattern(&self) -> Option<Arc<Pattern>> {
        self.scheduler.active()
    }

    pub fn pending_pattern(&self) -> Option<Arc<Pattern>> {
        self.scheduler.pending()
    }
}
