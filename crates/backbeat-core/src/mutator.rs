//! Pattern derivations: random variation, beat repeat, and fill injection
//!
//! Every function returns a new pattern. The source is never modified, and
//! the shape (meter, grid size) of the result always matches the source.

use crate::error::SessionError;
use crate::instrument::{Instrument, InstrumentGroup, Step};
use crate::pattern::Pattern;

use Instrument::*;

const GHOST_IN_GAP: f64 = 0.30;
const GHOST_UNDER_HAT: f64 = 0.20;
const KICK_SHIFT: f64 = 0.20;
const KICK_ADD: f64 = 0.10;
const HAT_OPEN: f64 = 0.05;
const SPLASH: f64 = 0.03;

const VARIATION_SUFFIX: &str = " (Var)";

fn chance(rng: &mut fastrand::Rng, p: f64) -> bool {
    rng.f64() < p
}

/// Randomized variation of a groove.
///
/// Each rule rolls independently per step. Downbeats keep their hats closed
/// and never receive ghost notes; the first step's kick never moves.
pub fn variation(pattern: &Pattern, rng: &mut fastrand::Rng) -> Pattern {
    let mut steps = pattern.steps().to_vec();
    let grid = steps.len();
    let spb = pattern.steps_per_beat();
    let sixteenth_grid = grid == 16;

    for i in 0..grid {
        let downbeat = i % spb == 0;
        let backbeat = sixteenth_grid && (i == 4 || i == 12);

        if !downbeat && steps[i].is_rest() {
            if chance(rng, GHOST_IN_GAP) {
                steps[i].insert(SnareGhost);
            }
        } else if !downbeat
            && steps[i].contains(ClosedHat)
            && !steps[i].contains(Snare)
            && !steps[i].contains(Kick)
            && chance(rng, GHOST_UNDER_HAT)
        {
            steps[i].insert(SnareGhost);
        }

        if i != 0 && steps[i].contains(Kick) {
            // The kick leaves its step either way; it only lands on a free
            // next step. A pushed kick rolls again on the step it lands on.
            if chance(rng, KICK_SHIFT) {
                steps[i].remove(Kick);
                if i + 1 < grid && !steps[i + 1].contains(Kick) {
                    steps[i + 1].insert(Kick);
                }
            }
        } else if i != 0 && !backbeat && steps[i].is_rest() && chance(rng, KICK_ADD) {
            steps[i].insert(Kick);
        }

        if !downbeat && steps[i].contains(ClosedHat) && chance(rng, HAT_OPEN) {
            steps[i].remove(ClosedHat);
            steps[i].insert(OpenHat);
        }

        let accentable = downbeat || steps[i].contains_group(InstrumentGroup::Cymbals);
        if accentable && chance(rng, SPLASH) {
            steps[i].insert(Splash);
        }
    }

    let label = if pattern.label.ends_with(VARIATION_SUFFIX) {
        pattern.label.clone()
    } else {
        format!("{}{}", pattern.label, VARIATION_SUFFIX)
    };
    pattern.derive(label, steps)
}

/// Tile one beat across the whole bar
pub fn beat_repeat(pattern: &Pattern, beat: usize) -> Result<Pattern, SessionError> {
    let beats = pattern.beats();
    if beat >= beats {
        return Err(SessionError::BeatOutOfRange { beat, beats });
    }
    let spb = pattern.steps_per_beat();
    let start = beat * spb;
    let slice = &pattern.steps()[start..start + spb];
    let steps = (0..pattern.grid_size()).map(|i| slice[i % spb]).collect();
    Ok(pattern.derive(format!("{} (Loop {})", pattern.label, beat + 1), steps))
}

/// Fixed fill run for one beat of `steps_per_beat` steps
pub fn fill_shape(steps_per_beat: usize) -> Vec<Step> {
    match steps_per_beat {
        4 => vec![
            Step::of(&[Snare, Crash]),
            Step::of(&[Snare]),
            Step::of(&[TomHigh]),
            Step::of(&[FloorTom]),
        ],
        3 => vec![Step::of(&[Snare]), Step::of(&[TomHigh]), Step::of(&[FloorTom])],
        6 => vec![
            Step::of(&[Snare]),
            Step::of(&[Snare]),
            Step::of(&[TomHigh]),
            Step::of(&[TomHigh]),
            Step::of(&[FloorTom]),
            Step::of(&[FloorTom]),
        ],
        n => (0..n)
            .map(|i| {
                let voice = if i * 3 < n {
                    Snare
                } else if i * 3 < 2 * n {
                    TomHigh
                } else {
                    FloorTom
                };
                let mut step = Step::of(&[voice]);
                if i == 0 {
                    step.insert(Crash);
                }
                step
            })
            .collect(),
    }
}

/// Overwrite the bar's final beat with the fill run. Label and derived flag are kept.
pub fn inject_fill(pattern: &Pattern) -> Pattern {
    let start = pattern.last_beat_start();
    let mut steps = pattern.steps().to_vec();
    steps.truncate(start);
    steps.extend(fill_shape(pattern.steps_per_beat()));
    pattern.overwrite(steps)
}
