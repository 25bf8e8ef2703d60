//! Plain-text drum tab for `backbeat show`

use std::fmt::Write;

use backbeat_core::{Instrument, Pattern};

/// One row per instrument used, top to bottom as on a kit chart
const ROW_ORDER: [Instrument; 13] = [
    Instrument::Crash,
    Instrument::Splash,
    Instrument::Ride,
    Instrument::OpenHat,
    Instrument::ClosedHat,
    Instrument::TomHigh,
    Instrument::TomLow,
    Instrument::Snare,
    Instrument::SnareRim,
    Instrument::SnareGhost,
    Instrument::FloorTom,
    Instrument::Kick,
    Instrument::KickSecondary,
];

pub fn render(pattern: &Pattern) -> String {
    let spb = pattern.steps_per_beat();
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}  [{} | {} steps | ~{} BPM]",
        pattern.label,
        pattern.meter(),
        pattern.grid_size(),
        pattern.tempo_hint
    );
    for inst in ROW_ORDER {
        if !pattern.steps().iter().any(|s| s.contains(inst)) {
            continue;
        }
        let _ = write!(out, "{:>3} |", inst.code());
        for (i, step) in pattern.steps().iter().enumerate() {
            out.push(if step.contains(inst) { 'x' } else { '-' });
            if (i + 1) % spb == 0 {
                out.push('|');
            }
        }
        // close a trailing partial beat
        if pattern.grid_size() % spb != 0 {
            out.push('|');
        }
        out.push('\n');
    }
    out
}
