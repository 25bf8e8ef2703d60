//! Drum kit instruments, their groups, and the per-step instrument set

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PatternError;

/// Every sound a pattern step can reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Instrument {
    #[serde(rename = "K")]
    Kick,
    #[serde(rename = "K2")]
    KickSecondary,
    #[serde(rename = "S")]
    Snare,
    #[serde(rename = "S_G")]
    SnareGhost,
    #[serde(rename = "S_R")]
    SnareRim,
    #[serde(rename = "H")]
    ClosedHat,
    #[serde(rename = "O")]
    OpenHat,
    #[serde(rename = "R")]
    Ride,
    #[serde(rename = "C")]
    Crash,
    #[serde(rename = "SP")]
    Splash,
    #[serde(rename = "T1")]
    TomHigh,
    #[serde(rename = "T2")]
    TomLow,
    #[serde(rename = "F")]
    FloorTom,
    #[serde(rename = ".")]
    Rest,
}

impl Instrument {
    pub const ALL: [Instrument; 14] = [
        Self::Kick,
        Self::KickSecondary,
        Self::Snare,
        Self::SnareGhost,
        Self::SnareRim,
        Self::ClosedHat,
        Self::OpenHat,
        Self::Ride,
        Self::Crash,
        Self::Splash,
        Self::TomHigh,
        Self::TomLow,
        Self::FloorTom,
        Self::Rest,
    ];

    /// Short notation code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Kick => "K",
            Self::KickSecondary => "K2",
            Self::Snare => "S",
            Self::SnareGhost => "S_G",
            Self::SnareRim => "S_R",
            Self::ClosedHat => "H",
            Self::OpenHat => "O",
            Self::Ride => "R",
            Self::Crash => "C",
            Self::Splash => "SP",
            Self::TomHigh => "T1",
            Self::TomLow => "T2",
            Self::FloorTom => "F",
            Self::Rest => ".",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Kick => "Kick",
            Self::KickSecondary => "Kick (left foot)",
            Self::Snare => "Snare",
            Self::SnareGhost => "Ghost Snare",
            Self::SnareRim => "Rim Shot",
            Self::ClosedHat => "Closed Hi-Hat",
            Self::OpenHat => "Open Hi-Hat",
            Self::Ride => "Ride",
            Self::Crash => "Crash",
            Self::Splash => "Splash",
            Self::TomHigh => "High Tom",
            Self::TomLow => "Low Tom",
            Self::FloorTom => "Floor Tom",
            Self::Rest => "Rest",
        }
    }

    /// Group this instrument belongs to. Rest has none.
    pub fn group(&self) -> Option<InstrumentGroup> {
        InstrumentGroup::ALL
            .into_iter()
            .find(|g| g.members().contains(self))
    }

    pub fn is_rest(&self) -> bool {
        *self == Self::Rest
    }

    fn bit(&self) -> u16 {
        1 << (*self as u16)
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Instrument {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|i| i.code() == s)
            .ok_or_else(|| PatternError::UnknownInstrument(s.to_string()))
    }
}

/// Mixer groups used for muting and limb classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentGroup {
    Kicks,
    Snares,
    HiHats,
    Cymbals,
    Toms,
}

impl InstrumentGroup {
    pub const ALL: [InstrumentGroup; 5] = [
        Self::Kicks,
        Self::Snares,
        Self::HiHats,
        Self::Cymbals,
        Self::Toms,
    ];

    pub fn members(&self) -> &'static [Instrument] {
        match self {
            Self::Kicks => &[Instrument::Kick, Instrument::KickSecondary],
            Self::Snares => &[Instrument::Snare, Instrument::SnareGhost, Instrument::SnareRim],
            Self::HiHats => &[Instrument::ClosedHat, Instrument::OpenHat],
            Self::Cymbals => &[Instrument::Ride, Instrument::Crash, Instrument::Splash],
            Self::Toms => &[Instrument::TomHigh, Instrument::TomLow, Instrument::FloorTom],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Kicks => "kicks",
            Self::Snares => "snares",
            Self::HiHats => "hihats",
            Self::Cymbals => "cymbals",
            Self::Toms => "toms",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

impl FromStr for InstrumentGroup {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|g| g.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| PatternError::UnknownInstrument(s.to_string()))
    }
}

/// Mute flag per instrument group
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MuteMask([bool; 5]);

impl MuteMask {
    pub fn set(&mut self, group: InstrumentGroup, muted: bool) {
        self.0[group.index()] = muted;
    }

    pub fn is_muted(&self, group: InstrumentGroup) -> bool {
        self.0[group.index()]
    }

    /// Whether a trigger for this instrument should be suppressed
    pub fn silences(&self, instrument: Instrument) -> bool {
        instrument.group().is_some_and(|g| self.is_muted(g))
    }
}

/// The instruments struck on one step. Never empty: a silent step holds the rest marker.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "Vec<Instrument>", try_from = "Vec<Instrument>")]
pub struct Step(u16);

impl Default for Step {
    fn default() -> Self {
        Self::rest()
    }
}

impl Step {
    pub fn rest() -> Self {
        Self(Instrument::Rest.bit())
    }

    pub fn of(instruments: &[Instrument]) -> Self {
        let mut step = Self::rest();
        for &inst in instruments {
            step.insert(inst);
        }
        step
    }

    /// Adds an instrument, dropping the rest marker
    pub fn insert(&mut self, instrument: Instrument) {
        if instrument.is_rest() {
            return;
        }
        self.0 &= !Instrument::Rest.bit();
        self.0 |= instrument.bit();
    }

    /// Removes an instrument; the rest marker comes back if nothing is left
    pub fn remove(&mut self, instrument: Instrument) {
        if instrument.is_rest() {
            return;
        }
        self.0 &= !instrument.bit();
        if self.0 == 0 {
            self.0 = Instrument::Rest.bit();
        }
    }

    pub fn contains(&self, instrument: Instrument) -> bool {
        self.0 & instrument.bit() != 0
    }

    pub fn contains_group(&self, group: InstrumentGroup) -> bool {
        group.members().iter().any(|&i| self.contains(i))
    }

    pub fn is_rest(&self) -> bool {
        self.contains(Instrument::Rest)
    }

    /// Struck instruments, rest marker excluded
    pub fn hits(&self) -> impl Iterator<Item = Instrument> + '_ {
        Instrument::ALL
            .into_iter()
            .filter(move |i| !i.is_rest() && self.contains(*i))
    }

    /// All entries, including the rest marker on silent steps
    pub fn entries(&self) -> impl Iterator<Item = Instrument> + '_ {
        Instrument::ALL.into_iter().filter(move |i| self.contains(*i))
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries()).finish()
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let codes: Vec<&str> = self.entries().map(|i| i.code()).collect();
        f.write_str(&codes.join("+"))
    }
}

impl From<Step> for Vec<Instrument> {
    fn from(step: Step) -> Self {
        step.entries().collect()
    }
}

impl TryFrom<Vec<Instrument>> for Step {
    type Error = PatternError;

    fn try_from(instruments: Vec<Instrument>) -> Result<Self, Self::Error> {
        if instruments.is_empty() {
            return Err(PatternError::EmptyStep);
        }
        Ok(Self::of(&instruments))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_rest_marker() {
        let mut step = Step::rest();
        assert!(step.is_rest());
        assert_eq!(step.hits().count(), 0);

        step.insert(Instrument::Kick);
        assert!(!step.is_rest());
        assert_eq!(step.hits().collect::<Vec<_>>(), vec![Instrument::Kick]);

        step.remove(Instrument::Kick);
        assert!(step.is_rest());
        assert_eq!(step.entries().collect::<Vec<_>>(), vec![Instrument::Rest]);
    }

    #[test]
    fn test_group_table_covers_every_sound() {
        for inst in Instrument::ALL {
            if inst.is_rest() {
                assert_eq!(inst.group(), None);
            } else {
                let group = inst.group().expect("every sound has a group");
                assert!(group.members().contains(&inst));
            }
        }
        assert_eq!(Instrument::Splash.group(), Some(InstrumentGroup::Cymbals));
        assert_eq!(Instrument::FloorTom.group(), Some(InstrumentGroup::Toms));
    }

    #[test]
    fn test_mute_mask() {
        let mut mutes = MuteMask::default();
        mutes.set(InstrumentGroup::HiHats, true);
        assert!(mutes.silences(Instrument::OpenHat));
        assert!(!mutes.silences(Instrument::Kick));
        assert!(!mutes.silences(Instrument::Rest));
    }

    #[test]
    fn test_codes_parse() {
        for inst in Instrument::ALL {
            assert_eq!(inst.code().parse::<Instrument>().unwrap(), inst);
        }
        assert!("X".parse::<Instrument>().is_err());
        assert_eq!("HiHats".parse::<InstrumentGroup>().unwrap(), InstrumentGroup::HiHats);
    }

    #[test]
    fn test_step_json() {
        let step = Step::of(&[Instrument::ClosedHat, Instrument::Snare]);
        let json = serde_json::to_string(&step).unwrap();
        assert_eq!(json, r#"["S","H"]"#);
        let back: Step = serde_json::from_str(&json).unwrap();
        assert_eq!(back, step);
        assert!(serde_json::from_str::<Step>("[]").is_err());
    }
}
