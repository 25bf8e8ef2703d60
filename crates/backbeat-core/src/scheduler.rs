//! Lookahead step scheduler
//!
//! A coarse periodic wake-up calls [`Scheduler::tick`] with the current audio
//! clock reading. Every step whose start time falls inside the lookahead
//! window is emitted to a [`TriggerSink`] stamped with its exact intended
//! audio time, so the consumer can render it sample-accurately even though
//! the callback itself fires early.

use std::sync::Arc;

use tracing::{debug, info};

use crate::instrument::{Instrument, InstrumentGroup};
use crate::pattern::Pattern;
use crate::settings::{EngineConfig, PlaybackSettings, SpeedRate, Swing};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransportState {
    Stopped,
    Playing,
}

/// Receiver of scheduled events. Times are audio-clock seconds.
pub trait TriggerSink {
    /// One call per struck, unmuted instrument of a step
    fn on_trigger(&mut self, instrument: Instrument, time: f64);

    /// Count-in clicks, and beat clicks while the metronome is on
    fn on_metronome_tick(&mut self, _accent: bool, _time: f64) {}

    /// Once per scheduled step; negative steps are count-in
    fn on_step(&mut self, _step: i32, _time: f64) {}
}

/// A scheduler callback captured as a value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScheduledEvent {
    Step { step: i32, time: f64 },
    Trigger { instrument: Instrument, time: f64 },
    Metronome { accent: bool, time: f64 },
}

impl ScheduledEvent {
    pub fn time(&self) -> f64 {
        match self {
            Self::Step { time, .. } | Self::Trigger { time, .. } | Self::Metronome { time, .. } => *time,
        }
    }
}

impl TriggerSink for Vec<ScheduledEvent> {
    fn on_trigger(&mut self, instrument: Instrument, time: f64) {
        self.push(ScheduledEvent::Trigger { instrument, time });
    }

    fn on_metronome_tick(&mut self, accent: bool, time: f64) {
        self.push(ScheduledEvent::Metronome { accent, time });
    }

    fn on_step(&mut self, step: i32, time: f64) {
        self.push(ScheduledEvent::Step { step, time });
    }
}

/// Outcome of one wake-up
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub scheduled: usize,
    /// The per-tick step cap was reached; the rest is picked up next tick
    pub capped: bool,
}

/// Duration of the step at `cursor`.
///
/// Swing only applies to 16-step grids and never to count-in steps. An
/// even/odd pair always sums to two straight steps.
pub fn step_duration(pattern: &Pattern, settings: &PlaybackSettings, cursor: i32) -> f64 {
    let base = settings.seconds_per_beat() / pattern.steps_per_beat() as f64;
    let swing = settings.swing.ratio();
    if cursor < 0 || pattern.grid_size() != 16 || swing == 0.0 {
        return base;
    }
    if cursor % 2 == 0 {
        base * (1.0 + swing)
    } else {
        base * (1.0 - swing)
    }
}

/// Playback state for one session: active/pending patterns, step cursor, and
/// the audio time of the next event
#[derive(Debug)]
pub struct Scheduler {
    config: EngineConfig,
    settings: PlaybackSettings,
    state: TransportState,
    active: Option<Arc<Pattern>>,
    pending: Option<Arc<Pattern>>,
    /// Active pattern as it was before a fill overwrote its last beat
    prefill: Option<Arc<Pattern>>,
    cursor: i32,
    pre_roll_start: i32,
    next_event_time: f64,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Scheduler {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            settings: PlaybackSettings::default(),
            state: TransportState::Stopped,
            active: None,
            pending: None,
            prefill: None,
            cursor: 0,
            pre_roll_start: 0,
            next_event_time: 0.0,
        }
    }

    /// Begin playback of `pattern` at `now` (audio clock).
    ///
    /// With a count-in the cursor starts at `-(pre_roll_beats * steps_per_beat)`.
    pub fn start(&mut self, pattern: Arc<Pattern>, settings: PlaybackSettings, now: f64) {
        let spb = pattern.steps_per_beat() as i32;
        self.settings = settings;
        self.pre_roll_start = -(settings.pre_roll_beats as i32 * spb);
        self.cursor = self.pre_roll_start;
        self.next_event_time = now + self.config.start_margin_secs;
        self.pending = None;
        self.prefill = None;
        info!(
            pattern = %pattern.label,
            tempo = settings.tempo,
            speed = settings.speed_rate.value(),
            swing = settings.swing.percent(),
            pre_roll = settings.pre_roll_beats,
            "Playback started"
        );
        self.active = Some(pattern);
        self.state = TransportState::Playing;
    }

    /// Halt playback. Nothing is emitted until the next `start`.
    pub fn stop(&mut self) {
        if self.state == TransportState::Stopped {
            return;
        }
        self.state = TransportState::Stopped;
        self.cursor = 0;
        self.pending = None;
        if let Some(origin) = self.prefill.take() {
            self.active = Some(origin);
        }
        info!("Playback stopped");
    }

    /// Emit every step that starts before `now + lookahead`
    pub fn tick(&mut self, now: f64, sink: &mut dyn TriggerSink) -> TickReport {
        let mut report = TickReport::default();
        if self.state != TransportState::Playing {
            return report;
        }
        let horizon = now + self.config.lookahead_secs;
        while self.next_event_time < horizon {
            if report.scheduled >= self.config.max_steps_per_tick {
                report.capped = true;
                debug!(
                    behind = horizon - self.next_event_time,
                    "Step cap reached, deferring catch-up to next tick"
                );
                break;
            }
            let Some(pattern) = self.active.clone() else {
                break;
            };
            self.emit(&pattern, sink);
            self.advance(&pattern);
            report.scheduled += 1;
        }
        report
    }

    fn emit(&self, pattern: &Pattern, sink: &mut dyn TriggerSink) {
        let time = self.next_event_time;
        let spb = pattern.steps_per_beat() as i32;
        sink.on_step(self.cursor, time);

        if self.cursor < 0 {
            if self.cursor % spb == 0 {
                sink.on_metronome_tick(self.cursor == self.pre_roll_start, time);
            }
            return;
        }

        let index = self.cursor as usize;
        if self.settings.metronome && pattern.is_beat_start(index) {
            sink.on_metronome_tick(index == 0, time);
        }
        let Some(step) = pattern.step(index) else {
            return;
        };
        for inst in step.hits() {
            if !self.settings.mutes.silences(inst) {
                sink.on_trigger(inst, time);
            }
        }
    }

    fn advance(&mut self, pattern: &Pattern) {
        self.next_event_time += step_duration(pattern, &self.settings, self.cursor);
        self.cursor += 1;
        if self.cursor >= pattern.grid_size() as i32 {
            self.cursor = 0;
            self.prefill = None;
            if let Some(next) = self.pending.take() {
                debug!(from = %pattern.label, to = %next.label, "Bar wrap hand-off");
                self.active = Some(next);
            }
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Playing
    }

    /// Step that will be emitted next; negative during count-in
    pub fn cursor(&self) -> i32 {
        self.cursor
    }

    pub fn next_event_time(&self) -> f64 {
        self.next_event_time
    }

    pub fn active(&self) -> Option<Arc<Pattern>> {
        self.active.clone()
    }

    pub fn pending(&self) -> Option<Arc<Pattern>> {
        self.pending.clone()
    }

    /// Whether the active bar carries an injected fill
    pub fn has_fill(&self) -> bool {
        self.prefill.is_some()
    }

    pub fn settings(&self) -> &PlaybackSettings {
        &self.settings
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn set_tempo(&mut self, bpm: f64) {
        self.settings.tempo = bpm;
    }

    pub(crate) fn set_speed_rate(&mut self, rate: SpeedRate) {
        self.settings.speed_rate = rate;
    }

    pub(crate) fn set_swing(&mut self, swing: Swing) {
        self.settings.swing = swing;
    }

    /// Applies to the next `start`
    pub(crate) fn set_pre_roll(&mut self, beats: u8) {
        self.settings.pre_roll_beats = beats;
    }

    pub(crate) fn set_metronome(&mut self, on: bool) {
        self.settings.metronome = on;
    }

    pub(crate) fn set_muted(&mut self, group: InstrumentGroup, muted: bool) {
        self.settings.mutes.set(group, muted);
    }

    /// Replace the active pattern outright, dropping any queued or fill state
    pub(crate) fn install_now(&mut self, pattern: Arc<Pattern>) {
        self.active = Some(pattern);
        self.pending = None;
        self.prefill = None;
    }

    /// Swap in a fill-overwritten copy of the active bar
    pub(crate) fn install_fill(&mut self, filled: Arc<Pattern>) {
        if let Some(origin) = self.active.replace(filled) {
            self.prefill.get_or_insert(origin);
        }
    }

    pub(crate) fn set_pending(&mut self, pattern: Arc<Pattern>) {
        self.pending = Some(pattern);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::Step;
    use crate::library::PatternLibrary;
    use crate::pattern::Meter;

    const EPS: f64 = 1e-9;

    fn settings(tempo: f64, swing: u8) -> PlaybackSettings {
        PlaybackSettings {
            tempo,
            swing: Swing::try_from(swing).unwrap(),
            ..Default::default()
        }
    }

    fn money_beat() -> Arc<Pattern> {
        PatternLibrary::builtin().get("p_1").unwrap()
    }

    fn step_times(events: &[ScheduledEvent]) -> Vec<(i32, f64)> {
        events
            .iter()
            .filter_map(|e| match e {
                ScheduledEvent::Step { step, time } => Some((*step, *time)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_straight_step_duration() {
        let p = money_beat();
        let s = settings(100.0, 0);
        for cursor in 0..16 {
            assert!((step_duration(&p, &s, cursor) - 0.15).abs() < EPS);
        }
    }

    #[test]
    fn test_swung_step_duration() {
        let p = money_beat();
        let s = settings(100.0, 20);
        let even = step_duration(&p, &s, 0);
        let odd = step_duration(&p, &s, 1);
        assert!((even - 0.18).abs() < EPS);
        assert!((odd - 0.12).abs() < EPS);
        assert!((even + odd - 0.30).abs() < EPS);
        // count-in is never swung
        assert!((step_duration(&p, &s, -2) - 0.15).abs() < EPS);
    }

    #[test]
    fn test_bar_length_ignores_swing() {
        for entry in PatternLibrary::builtin().entries() {
            let p = &entry.pattern;
            for swing in (0..=50).step_by(5) {
                let s = PlaybackSettings {
                    tempo: 93.0,
                    speed_rate: SpeedRate::try_from(1.25).unwrap(),
                    swing: Swing::try_from(swing).unwrap(),
                    ..Default::default()
                };
                let total: f64 = (0..p.grid_size() as i32).map(|c| step_duration(p, &s, c)).sum();
                let expected = s.seconds_per_beat() * p.bar_beats();
                assert!((total - expected).abs() < 1e-9, "{} swing {}", p.label, swing);
            }
        }
    }

    #[test]
    fn test_swing_only_on_sixteen_step_grids() {
        let shuffle = PatternLibrary::builtin()
            .entries()
            .iter()
            .find(|e| e.pattern.grid_size() == 12)
            .unwrap()
            .pattern
            .clone();
        let s = settings(120.0, 30);
        assert_eq!(step_duration(&shuffle, &s, 0), step_duration(&shuffle, &s, 1));
    }

    #[test]
    fn test_seven_eight_counts_in_threes() {
        let metropolis = PatternLibrary::builtin()
            .entries()
            .iter()
            .find(|e| e.pattern.meter() == Meter::new(7, 8))
            .unwrap()
            .pattern
            .clone();
        assert_eq!(metropolis.grid_size(), 14);
        let s = settings(130.0, 0);
        let step = 60.0 / 130.0 / 3.0;
        assert!((step_duration(&metropolis, &s, 0) - step).abs() < EPS);

        let mut sched = Scheduler::default();
        sched.start(
            metropolis.clone(),
            PlaybackSettings { metronome: true, ..s },
            0.0,
        );
        let mut events = Vec::new();
        sched.tick(14.0 * step, &mut events);
        let steps = step_times(&events);
        assert!((steps[13].1 - (0.05 + 13.0 * step)).abs() < 1e-9);
        assert_eq!(steps[14].0, 0);
        assert!((steps[14].1 - (0.05 + 14.0 * step)).abs() < 1e-9);
        let clicks = events
            .iter()
            .filter(|e| matches!(e, ScheduledEvent::Metronome { .. }) && e.time() < 0.05 + 14.0 * step - EPS)
            .count();
        assert_eq!(clicks, 5);
    }

    #[test]
    fn test_tick_schedules_within_lookahead() {
        let mut sched = Scheduler::default();
        sched.start(money_beat(), settings(100.0, 0), 0.0);
        let mut events = Vec::new();
        let report = sched.tick(0.0, &mut events);
        // first event at 0.05, window ends at 0.1: one step
        assert_eq!(report.scheduled, 1);
        assert!(!report.capped);
        assert_eq!(step_times(&events), vec![(0, 0.05)]);
        assert!(events.contains(&ScheduledEvent::Trigger { instrument: Instrument::Kick, time: 0.05 }));
        assert!(events.contains(&ScheduledEvent::Trigger { instrument: Instrument::ClosedHat, time: 0.05 }));
        assert_eq!(sched.cursor(), 1);
    }

    #[test]
    fn test_events_carry_exact_times_regardless_of_tick_jitter() {
        let mut sched = Scheduler::default();
        sched.start(money_beat(), settings(100.0, 0), 0.0);
        let mut events = Vec::new();
        let mut now = 0.0;
        for jitter in [0.021, 0.034, 0.025, 0.047, 0.003].iter().cycle().take(200) {
            sched.tick(now, &mut events);
            now += jitter;
        }
        let steps = step_times(&events);
        assert!(steps.len() > 32);
        for (n, (step, time)) in steps.iter().enumerate() {
            assert_eq!(*step, (n % 16) as i32);
            assert!((time - (0.05 + n as f64 * 0.15)).abs() < 1e-9);
        }
    }

    #[test]
    fn test_rests_emit_step_but_no_trigger() {
        let mut sched = Scheduler::default();
        sched.start(money_beat(), settings(100.0, 0), 0.0);
        let mut events = Vec::new();
        sched.tick(0.2, &mut events);
        // steps 0 and 1 at 0.05 and 0.20; step 1 is a rest
        assert_eq!(step_times(&events).len(), 2);
        let at_step_one = events
            .iter()
            .filter(|e| matches!(e, ScheduledEvent::Trigger { .. }) && (e.time() - 0.20).abs() < EPS)
            .count();
        assert_eq!(at_step_one, 0);
    }

    #[test]
    fn test_pre_roll_count_in() {
        let mut sched = Scheduler::default();
        let s = PlaybackSettings {
            pre_roll_beats: 2,
            ..settings(100.0, 20)
        };
        sched.start(money_beat(), s, 0.0);
        assert_eq!(sched.cursor(), -8);
        let mut events = Vec::new();
        sched.tick(8.0 * 0.15, &mut events);

        let clicks: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                ScheduledEvent::Metronome { accent, time } => Some((*accent, *time)),
                _ => None,
            })
            .collect();
        assert_eq!(clicks.len(), 2);
        assert!(clicks[0].0);
        assert!(!clicks[1].0);
        assert!((clicks[1].1 - clicks[0].1 - 0.6).abs() < EPS);

        let first_trigger = events
            .iter()
            .find(|e| matches!(e, ScheduledEvent::Trigger { .. }))
            .unwrap();
        // count-in is eight straight steps
        assert!((first_trigger.time() - (0.05 + 8.0 * 0.15)).abs() < EPS);
        let steps = step_times(&events);
        assert_eq!(steps.first().unwrap().0, -8);
        assert!(steps.iter().any(|(s, _)| *s == 0));
    }

    #[test]
    fn test_metronome_clicks_on_beats() {
        let mut sched = Scheduler::default();
        let s = PlaybackSettings {
            metronome: true,
            ..settings(100.0, 0)
        };
        sched.start(money_beat(), s, 0.0);
        let mut events = Vec::new();
        sched.tick(2.4, &mut events);
        let clicks: Vec<bool> = events
            .iter()
            .filter_map(|e| match e {
                ScheduledEvent::Metronome { accent, .. } => Some(*accent),
                _ => None,
            })
            .collect();
        assert_eq!(&clicks[..5], &[true, false, false, false, true]);
    }

    #[test]
    fn test_muted_group_is_silent() {
        let mut sched = Scheduler::default();
        sched.start(money_beat(), settings(100.0, 0), 0.0);
        sched.set_muted(InstrumentGroup::HiHats, true);
        let mut events = Vec::new();
        sched.tick(2.4, &mut events);
        assert!(!events.iter().any(|e| matches!(
            e,
            ScheduledEvent::Trigger { instrument: Instrument::ClosedHat, .. }
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            ScheduledEvent::Trigger { instrument: Instrument::Kick, .. }
        )));
    }

    #[test]
    fn test_step_cap_bounds_catch_up() {
        let mut sched = Scheduler::new(EngineConfig {
            max_steps_per_tick: 10,
            ..Default::default()
        });
        sched.start(money_beat(), settings(100.0, 0), 0.0);
        let mut events = Vec::new();
        // a stalled clock jumps 30 seconds
        let report = sched.tick(30.0, &mut events);
        assert_eq!(report, TickReport { scheduled: 10, capped: true });
        let report = sched.tick(30.0, &mut events);
        assert_eq!(report.scheduled, 10);
        // nothing skipped: steps are contiguous with exact times
        let steps = step_times(&events);
        assert_eq!(steps.len(), 20);
        for (n, (_, time)) in steps.iter().enumerate() {
            assert!((time - (0.05 + n as f64 * 0.15)).abs() < 1e-9);
        }
    }

    #[test]
    fn test_tempo_change_applies_to_next_step() {
        let mut sched = Scheduler::default();
        sched.start(money_beat(), settings(100.0, 0), 0.0);
        let mut events = Vec::new();
        sched.tick(0.0, &mut events);
        sched.set_tempo(150.0);
        sched.tick(0.25, &mut events);
        let steps = step_times(&events);
        // step 0 already advanced at 100 BPM, step 1 at 150 BPM
        assert!((steps[1].1 - 0.20).abs() < EPS);
        assert!((steps[2].1 - 0.30).abs() < EPS);
    }

    #[test]
    fn test_stop_halts_and_resets() {
        let mut sched = Scheduler::default();
        sched.start(money_beat(), settings(100.0, 0), 0.0);
        let mut events = Vec::new();
        sched.tick(1.0, &mut events);
        sched.set_pending(money_beat());
        sched.stop();
        assert_eq!(sched.cursor(), 0);
        assert!(sched.pending().is_none());
        assert!(!sched.is_playing());
        events.clear();
        assert_eq!(sched.tick(5.0, &mut events), TickReport::default());
        assert!(events.is_empty());
    }

    #[test]
    fn test_triplet_grid_timing() {
        let p = Arc::new(
            Pattern::new("12/8", Meter::new(12, 8), 12, vec![Step::of(&[Instrument::Ride]); 12]).unwrap(),
        );
        let s = settings(120.0, 0);
        assert!((step_duration(&p, &s, 0) - 0.5 / 3.0).abs() < EPS);
    }
}
