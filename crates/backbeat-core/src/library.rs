//! Built-in groove catalog, organized by difficulty level

use std::sync::{Arc, LazyLock};

use tracing::error;

use crate::error::PatternError;
use crate::instrument::{Instrument, Step};
use crate::pattern::{Meter, Pattern};

use Instrument::*;

/// A difficulty category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub key: &'static str,
    pub label: &'static str,
    pub level: u8,
}

pub const CATEGORIES: &[Category] = &[
    Category { key: "Lv1", label: "8 Beat Basic", level: 1 },
    Category { key: "Lv2", label: "8 Beat Variations", level: 2 },
    Category { key: "Lv3", label: "16 Beat Basic", level: 3 },
    Category { key: "Lv4", label: "16 Beat Variations", level: 4 },
    Category { key: "Lv5", label: "Funk Basic", level: 5 },
    Category { key: "Lv6", label: "Funk Advanced", level: 6 },
    Category { key: "Lv7", label: "Linear Groove", level: 7 },
    Category { key: "Lv8", label: "Shuffle & Blues", level: 8 },
    Category { key: "Lv9", label: "Jazz & Odd Time", level: 9 },
    Category { key: "Lv10", label: "J-POP & Fast Rock", level: 10 },
    Category { key: "Lv11", label: "Double Pedal", level: 11 },
    Category { key: "Lv12", label: "Master Class", level: 12 },
    Category { key: "Lv13", label: "Progressive Metal Challenge", level: 13 },
];

/// A library pattern and its lookup key
#[derive(Debug, Clone)]
pub struct LibraryEntry {
    pub key: String,
    pub pattern: Arc<Pattern>,
}

/// Immutable, ordered pattern catalog
#[derive(Debug, Default)]
pub struct PatternLibrary {
    entries: Vec<LibraryEntry>,
}

static BUILTIN: LazyLock<Arc<PatternLibrary>> = LazyLock::new(|| Arc::new(PatternLibrary::build_builtin()));

impl PatternLibrary {
    /// The shared built-in catalog
    pub fn builtin() -> Arc<PatternLibrary> {
        BUILTIN.clone()
    }

    /// Keys are assigned in order as `p_1`, `p_2`, ...
    pub fn from_patterns(patterns: impl IntoIterator<Item = Pattern>) -> Self {
        let entries = patterns
            .into_iter()
            .enumerate()
            .map(|(i, pattern)| LibraryEntry {
                key: format!("p_{}", i + 1),
                pattern: Arc::new(pattern),
            })
            .collect();
        Self { entries }
    }

    /// Built-in catalog followed by patterns from a JSON array. The extra
    /// patterns continue the `p_N` numbering.
    pub fn builtin_with_json(json: &str) -> crate::Result<Self> {
        let extra: Vec<Pattern> = serde_json::from_str(json)?;
        let builtin = Self::builtin();
        let patterns = builtin
            .entries
            .iter()
            .map(|e| (*e.pattern).clone())
            .chain(extra);
        Ok(Self::from_patterns(patterns))
    }

    pub fn get(&self, key: &str) -> Option<Arc<Pattern>> {
        self.entries
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.pattern.clone())
    }

    pub fn entries(&self) -> &[LibraryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn first(&self) -> Option<&LibraryEntry> {
        self.entries.first()
    }

    /// Entries of one category, in catalog order
    pub fn in_category<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a LibraryEntry> + 'a {
        self.entries.iter().filter(move |e| e.pattern.category == category)
    }

    /// Uniform pick among non-derived patterns
    pub fn random(&self, rng: &mut fastrand::Rng) -> Option<&LibraryEntry> {
        let candidates: Vec<&LibraryEntry> = self
            .entries
            .iter()
            .filter(|e| !e.pattern.is_derived())
            .collect();
        if candidates.is_empty() {
            return None;
        }
        Some(candidates[rng.usize(..candidates.len())])
    }

    fn build_builtin() -> Self {
        let patterns = grooves().into_iter().filter_map(|built| match built {
            Ok(p) => Some(p),
            Err(e) => {
                error!("Rejected built-in pattern: {}", e);
                None
            }
        });
        Self::from_patterns(patterns)
    }
}

/// Mutable grid used while writing a groove
struct Grid(Vec<Step>);

impl Grid {
    fn at(&mut self, i: usize, inst: Instrument) -> &mut Self {
        self.0[i].insert(inst);
        self
    }

    fn each(&mut self, indices: &[usize], inst: Instrument) -> &mut Self {
        for &i in indices {
            self.0[i].insert(inst);
        }
        self
    }

    /// Every `stride` steps starting at 0
    fn every(&mut self, stride: usize, inst: Instrument) -> &mut Self {
        for i in (0..self.0.len()).step_by(stride) {
            self.0[i].insert(inst);
        }
        self
    }

    /// Alternate feet: kick on even steps, left-foot kick on odd
    fn double_kick(&mut self) -> &mut Self {
        for i in 0..self.0.len() {
            self.0[i].insert(if i % 2 == 0 { Kick } else { KickSecondary });
        }
        self
    }

    fn backbeat(&mut self) -> &mut Self {
        self.each(&[4, 12], Snare)
    }
}

fn groove(
    category: &str,
    name: &str,
    bpm: u16,
    grid_size: usize,
    meter: (u8, u8),
    build: impl FnOnce(&mut Grid),
) -> Result<Pattern, PatternError> {
    let mut grid = Grid(vec![Step::rest(); grid_size]);
    build(&mut grid);
    let level = category.trim_start_matches("Lv").parse().unwrap_or(0);
    Ok(Pattern::new(name, Meter::new(meter.0, meter.1), grid_size, grid.0)?
        .with_category(category, level)
        .with_tempo_hint(bpm as f64))
}

fn grooves() -> Vec<Result<Pattern, PatternError>> {
    vec![
        // Lv1
        groove("Lv1", "Money Beat (Michael Jackson - Billie Jean)", 117, 16, (4, 4), |s| {
            s.every(2, ClosedHat).backbeat().each(&[0, 8], Kick);
        }),
        groove("Lv1", "We Will Rock You (Queen)", 82, 16, (4, 4), |s| {
            s.each(&[0, 2, 8, 10], Kick).each(&[4, 12], Snare);
        }),
        groove("Lv1", "Slow Rock Ballad (Coldplay - Yellow)", 87, 16, (4, 4), |s| {
            s.every(2, OpenHat).backbeat().each(&[0, 8, 10], Kick);
        }),
        // Lv2
        groove("Lv2", "Smells Like Teen Spirit (Nirvana)", 110, 16, (4, 4), |s| {
            s.each(&[0, 2, 6, 7, 8, 14], Kick)
                .each(&[0, 8], Crash)
                .each(&[4, 12], Snare)
                .each(&[4, 12], ClosedHat);
        }),
        groove("Lv2", "Offbeat Kick (Disco Feel)", 120, 16, (4, 4), |s| {
            s.every(2, ClosedHat).backbeat().each(&[0, 6, 10], Kick);
        }),
        groove("Lv2", "Anticipation (Red Hot Chili Peppers)", 100, 16, (4, 4), |s| {
            s.every(2, ClosedHat).backbeat().each(&[0, 8, 14], Kick);
        }),
        // Lv3
        groove("Lv3", "16 Beat Ballad (One Handed)", 75, 16, (4, 4), |s| {
            s.every(1, ClosedHat).backbeat().each(&[0, 3, 8], Kick);
        }),
        groove("Lv3", "Tom Sawyer (Rush) - Main Groove", 88, 16, (4, 4), |s| {
            s.every(1, ClosedHat)
                .backbeat()
                .each(&[0, 2, 6, 11], Kick)
                .at(15, OpenHat);
        }),
        groove("Lv3", "Two-Handed 16th (RLRL)", 95, 16, (4, 4), |s| {
            s.every(1, ClosedHat).backbeat().each(&[0, 8], Kick);
        }),
        // Lv4
        groove("Lv4", "Funk Rock (Chad Smith Style)", 105, 16, (4, 4), |s| {
            s.every(1, ClosedHat).backbeat().each(&[0, 8, 11, 14], Kick);
        }),
        groove("Lv4", "Rosanna (Toto) - The Ghost Notes", 86, 16, (4, 4), |s| {
            s.every(1, ClosedHat)
                .backbeat()
                .each(&[0, 10], Kick)
                .each(&[1, 3, 5, 9, 13], SnareGhost);
        }),
        groove("Lv4", "Jungle/DnB Basic", 170, 16, (4, 4), |s| {
            s.at(0, Crash)
                .each(&[0, 10], Kick)
                .each(&[4, 12], Snare)
                .each(&[7, 9], SnareGhost)
                .every(2, Ride);
        }),
        // Lv5
        groove("Lv5", "Funky Drummer (James Brown)", 98, 16, (4, 4), |s| {
            s.every(1, ClosedHat)
                .each(&[0, 2, 10], Kick)
                .backbeat()
                .each(&[1, 5, 6, 9, 13, 15], SnareGhost);
        }),
        groove("Lv5", "Chameleon (Herbie Hancock)", 95, 16, (4, 4), |s| {
            s.every(1, ClosedHat)
                .each(&[0, 11], Kick)
                .backbeat()
                .each(&[1, 15], SnareGhost);
        }),
        groove("Lv5", "Superstition (Stevie Wonder)", 100, 16, (4, 4), |s| {
            s.every(1, ClosedHat).backbeat().each(&[0, 2, 8, 14], Kick);
        }),
        // Lv6
        groove("Lv6", "Linear Funk (Tower of Power)", 106, 16, (4, 4), |s| {
            s.each(&[0, 4, 6, 10, 12], Kick)
                .each(&[1, 3, 7, 9, 13, 15], Snare);
        }),
        groove("Lv6", "50 Ways to Leave Your Lover (Steve Gadd)", 90, 16, (4, 4), |s| {
            s.each(&[0, 6, 8, 14], Kick)
                .each(&[0, 2, 8, 10], ClosedHat)
                .each(&[3, 11], OpenHat)
                .each(&[4, 12], Snare)
                .each(&[1, 7, 9, 15], SnareGhost);
        }),
        // Lv7
        groove("Lv7", "Gospel Chops Basic (R L K)", 110, 12, (12, 8), |s| {
            s.each(&[0, 3, 6, 9], Ride)
                .each(&[1, 4, 7, 10], Snare)
                .each(&[2, 5, 8, 11], Kick);
        }),
        groove("Lv7", "Linear Fill Application (R K L K)", 120, 16, (4, 4), |s| {
            s.each(&[0, 4], Ride)
                .each(&[1, 3, 5, 7], Kick)
                .each(&[2, 6, 12], Snare)
                .at(8, Crash);
        }),
        // Lv8
        groove("Lv8", "Rosanna Shuffle (Toto) - Half Time", 130, 12, (12, 8), |s| {
            s.every(1, ClosedHat)
                .at(6, Snare)
                .each(&[0, 8], Kick)
                .each(&[0, 2, 3, 5, 8, 9, 11], SnareGhost);
        }),
        groove("Lv8", "La Grange (ZZ Top)", 160, 12, (12, 8), |s| {
            s.each(&[0, 2, 3, 5, 6, 8, 9, 11], Ride)
                .each(&[3, 9], Snare)
                .each(&[0, 6], Kick);
        }),
        // Lv9
        groove("Lv9", "Take Five (Dave Brubeck) - 5/4 Swing", 160, 20, (5, 4), |s| {
            s.each(&[0, 3, 4, 6, 9, 12, 15, 16, 18], Ride)
                .each(&[6, 18], Snare)
                .each(&[0, 12], Kick)
                .each(&[3, 9, 15], ClosedHat);
        }),
        groove("Lv9", "Jazz Swing (Standard)", 140, 12, (12, 8), |s| {
            s.each(&[0, 3, 4, 6, 9, 10], Ride).each(&[3, 9], ClosedHat);
        }),
        // Lv10
        groove("Lv10", "IDOL (YOASOBI) - Dance Beat", 166, 16, (4, 4), |s| {
            s.each(&[0, 4, 8, 12], Kick)
                .backbeat()
                .every(2, ClosedHat)
                .each(&[2, 10], OpenHat)
                .each(&[7, 15], SnareGhost);
        }),
        groove("Lv10", "Yoru ni Kakeru (YOASOBI)", 130, 16, (4, 4), |s| {
            s.every(2, ClosedHat)
                .backbeat()
                .each(&[0, 3, 6, 10, 11], Kick)
                .at(15, OpenHat);
        }),
        groove("Lv10", "Pretender (Official HIGE DANdism)", 92, 16, (4, 4), |s| {
            s.every(1, ClosedHat)
                .backbeat()
                .each(&[0, 8, 11, 14], Kick)
                .each(&[2, 6], SnareGhost);
        }),
        // Lv11
        groove("Lv11", "Painkiller (Judas Priest) - Intro", 100, 16, (4, 4), |s| {
            s.each(&[0, 8], Crash).backbeat().double_kick();
        }),
        groove("Lv11", "Bleed (Meshuggah) - Herta Pattern", 115, 16, (4, 4), |s| {
            s.each(&[0, 2, 6, 8], Kick)
                .each(&[1, 7], KickSecondary)
                .each(&[4, 12], Snare)
                .each(&[4, 12], Crash)
                .every(2, ClosedHat);
        }),
        // Lv12
        groove("Lv12", "Seven Days (Sting) - 5/4 Groove", 100, 20, (5, 4), |s| {
            s.each(&[0, 4, 8, 12, 16], ClosedHat)
                .each(&[0, 8, 10], Kick)
                .each(&[4, 14], Snare);
        }),
        groove("Lv12", "Schism (Tool) - 12/8 Variation", 105, 12, (12, 8), |s| {
            s.each(&[0, 2, 5, 7, 10], Kick)
                .each(&[4, 9], Snare)
                .every(1, ClosedHat);
        }),
        // Lv13
        groove("Lv13", "6:00 (Intro) - The Bell Groove", 100, 16, (4, 4), |s| {
            s.every(2, Ride)
                .backbeat()
                .each(&[0, 3, 10], Kick)
                .each(&[7, 9, 15], SnareGhost);
        }),
        groove("Lv13", "Metropolis Pt. 1 (7/8 Main Riff)", 130, 14, (7, 8), |s| {
            s.at(0, Crash)
                .each(&[0, 4, 6, 10], Kick)
                .each(&[2, 8], Snare)
                .at(12, SnareGhost)
                .every(2, ClosedHat);
        }),
        groove("Lv13", "Under a Glass Moon (Funky Metal)", 106, 16, (4, 4), |s| {
            s.each(&[0, 3, 8, 11], Kick)
                .backbeat()
                .every(2, Ride)
                .each(&[1, 5, 9, 13], SnareGhost);
        }),
        groove("Lv13", "Pull Me Under (Main Groove)", 102, 16, (4, 4), |s| {
            s.each(&[0, 3, 8, 10], Kick)
                .backbeat()
                .every(2, ClosedHat)
                .at(15, OpenHat);
        }),
        groove("Lv13", "The Dance of Eternity (7/8 Chaos)", 140, 14, (7, 8), |s| {
            s.each(&[0, 4, 6], Kick)
                .at(0, Crash)
                .each(&[2, 8], Snare)
                .at(10, TomHigh)
                .at(12, TomLow);
        }),
        groove("Lv13", "Panic Attack (5/4 Double Bass)", 140, 20, (5, 4), |s| {
            s.double_kick().each(&[4, 12], Snare).each(&[0, 16], Crash);
        }),
        groove("Lv13", "Constant Motion (Shuffle Metal)", 150, 16, (4, 4), |s| {
            s.each(&[0, 2, 6, 8, 10], Kick)
                .backbeat()
                .each(&[0, 8], Crash);
        }),
        groove("Lv13", "The Glass Prison (Stamina Test)", 145, 16, (4, 4), |s| {
            s.double_kick()
                .backbeat()
                .each(&[0, 2, 4, 6, 10, 12, 14], Ride)
                .at(8, Crash);
        }),
        groove("Lv13", "Erotomania (5/4 Groove)", 140, 20, (5, 4), |s| {
            s.each(&[0, 8, 10, 16], Kick)
                .each(&[4, 12], Snare)
                .at(18, SnareGhost)
                .every(2, ClosedHat)
                .at(19, OpenHat);
        }),
        groove("Lv13", "Finally Free (The Outro Fill)", 100, 16, (4, 4), |s| {
            s.each(&[0, 4, 8], Snare)
                .at(1, TomHigh)
                .at(5, TomLow)
                .at(9, FloorTom)
                .each(&[2, 3, 6, 7, 10, 11, 12], Kick)
                .at(12, Crash);
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_is_complete() {
        let lib = PatternLibrary::builtin();
        assert_eq!(lib.len(), 40);
        for entry in lib.entries() {
            let p = &entry.pattern;
            assert_eq!(p.steps().len(), p.grid_size());
            assert!(p.meter().is_compound() || p.grid_size() % p.steps_per_beat() == 0);
            assert!(!p.is_derived());
            assert!(CATEGORIES.iter().any(|c| c.key == p.category && c.level == p.level));
        }
    }

    #[test]
    fn test_lookup_by_key() {
        let lib = PatternLibrary::builtin();
        let money = lib.get("p_1").unwrap();
        assert!(money.label.starts_with("Money Beat"));
        assert_eq!(money.tempo_hint, 117.0);
        assert!(money.step(0).unwrap().contains(Kick));
        assert!(money.step(4).unwrap().contains(Snare));
        assert!(money.step(1).unwrap().is_rest());
        assert!(lib.get("p_999").is_none());
    }

    #[test]
    fn test_categories() {
        let lib = PatternLibrary::builtin();
        assert_eq!(lib.in_category("Lv1").count(), 3);
        assert_eq!(lib.in_category("Lv13").count(), 10);
        let total: usize = CATEGORIES.iter().map(|c| lib.in_category(c.key).count()).sum();
        assert_eq!(total, lib.len());
    }

    #[test]
    fn test_random_skips_derived() {
        let base = PatternLibrary::builtin().get("p_1").unwrap();
        let derived = base.derive("var".into(), base.steps().to_vec());
        let lib = PatternLibrary::from_patterns([(*base).clone(), derived]);
        let mut rng = fastrand::Rng::with_seed(7);
        for _ in 0..50 {
            let pick = lib.random(&mut rng).unwrap();
            assert_eq!(pick.key, "p_1");
        }
        assert!(PatternLibrary::default().random(&mut rng).is_none());
    }

    #[test]
    fn test_user_patterns_extend_catalog() {
        let json = r#"[{
            "label": "Four on the Floor",
            "category": "Lv1",
            "level": 1,
            "meter": { "beats_per_bar": 4, "beat_unit": 4 },
            "grid_size": 4,
            "steps": [["K", "H"], ["K", "H"], ["K", "H"], ["K", "H"]]
        }]"#;
        let lib = PatternLibrary::builtin_with_json(json).unwrap();
        assert_eq!(lib.len(), 41);
        let extra = lib.get("p_41").unwrap();
        assert_eq!(extra.label, "Four on the Floor");
        assert_eq!(extra.tempo_hint, 100.0);
        assert!(extra.step(3).unwrap().contains(Kick));

        let bad = json.replace("\"grid_size\": 4", "\"grid_size\": 5");
        assert!(matches!(
            PatternLibrary::builtin_with_json(&bad),
            Err(crate::BackbeatError::Json(_))
        ));
    }
}
