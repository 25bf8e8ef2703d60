//! Config file persistence

use std::path::{Path, PathBuf};

use backbeat_core::{
    settings, EngineConfig, InstrumentGroup, MuteMask, PlaybackSettings, SessionError, SpeedRate,
    Swing,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub render: RenderConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub pattern: String,
    pub tempo: f64,
    pub speed_rate: SpeedRate,
    pub swing: Swing,
    pub pre_roll_beats: u8,
    pub metronome: bool,
    pub muted: Vec<InstrumentGroup>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        let defaults = PlaybackSettings::default();
        Self {
            pattern: "p_1".into(),
            tempo: defaults.tempo,
            speed_rate: defaults.speed_rate,
            swing: defaults.swing,
            pre_roll_beats: defaults.pre_roll_beats,
            metronome: defaults.metronome,
            muted: Vec::new(),
        }
    }
}

impl PlaybackConfig {
    /// Validated session settings
    pub fn to_settings(&self) -> Result<PlaybackSettings, SessionError> {
        let mut mutes = MuteMask::default();
        for group in &self.muted {
            mutes.set(*group, true);
        }
        Ok(PlaybackSettings {
            tempo: settings::validate_tempo(self.tempo)?,
            speed_rate: self.speed_rate,
            swing: self.swing,
            pre_roll_beats: settings::validate_pre_roll(self.pre_roll_beats)?,
            metronome: self.metronome,
            mutes,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub sample_rate: u32,
    pub gain: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            gain: 0.8,
        }
    }
}

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("backbeat")
        .join("config.toml")
}

/// Read `path`, falling back to defaults when it is missing or malformed.
/// An out-of-range `[engine]` section is replaced by engine defaults.
pub fn load_config(path: &Path) -> AppConfig {
    let Ok(s) = std::fs::read_to_string(path) else {
        debug!(path = %path.display(), "No config file, using defaults");
        return AppConfig::default();
    };
    let mut config: AppConfig = match toml::from_str(&s) {
        Ok(config) => config,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring malformed config file");
            return AppConfig::default();
        }
    };
    if let Err(e) = config.engine.validate() {
        warn!(path = %path.display(), error = %e, "Ignoring [engine] section");
        config.engine = EngineConfig::default();
    }
    config
}

pub fn save_config(path: &Path, config: &AppConfig) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml::to_string_pretty(config)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [playback]
            tempo = 88.0
            swing = 25
            muted = ["hihats", "toms"]

            [engine]
            lookahead_secs = 0.2
            "#,
        )
        .unwrap();
        assert_eq!(config.playback.tempo, 88.0);
        assert_eq!(config.playback.pattern, "p_1");
        assert_eq!(config.engine.lookahead_secs, 0.2);
        assert_eq!(config.engine.tick_interval_ms, 25);
        assert_eq!(config.render, RenderConfig::default());

        let settings = config.playback.to_settings().unwrap();
        assert_eq!(settings.swing.percent(), 25);
        assert!(settings.mutes.is_muted(InstrumentGroup::HiHats));
        assert!(!settings.mutes.is_muted(InstrumentGroup::Kicks));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(toml::from_str::<AppConfig>("[playback]\nswing = 12\n").is_err());
        assert!(toml::from_str::<AppConfig>("[playback]\nspeed_rate = 3.0\n").is_err());
        let config: AppConfig = toml::from_str("[playback]\ntempo = 999.0\n").unwrap();
        assert_eq!(config.playback.to_settings(), Err(SessionError::InvalidTempo(999.0)));
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir()
            .join(format!("backbeat-config-{}", std::process::id()))
            .join("config.toml");
        let mut config = AppConfig::default();
        config.playback.pattern = "p_12".into();
        config.playback.metronome = true;
        config.render.sample_rate = 48_000;
        save_config(&path, &config).unwrap();
        assert_eq!(load_config(&path), config);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_missing_or_malformed_file_uses_defaults() {
        let dir = std::env::temp_dir().join(format!("backbeat-bad-{}", std::process::id()));
        assert_eq!(load_config(&dir.join("absent.toml")), AppConfig::default());
        std::fs::create_dir_all(&dir).unwrap();
        let bad = dir.join("config.toml");
        std::fs::write(&bad, "[playback\ntempo = ").unwrap();
        assert_eq!(load_config(&bad), AppConfig::default());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_stalling_engine_settings_are_rejected() {
        let dir = std::env::temp_dir().join(format!("backbeat-engine-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(
            &path,
            "[playback]\ntempo = 90.0\n\n[engine]\nmax_steps_per_tick = 0\nlookahead_secs = 0.2\n",
        )
        .unwrap();
        let config = load_config(&path);
        assert_eq!(config.engine, EngineConfig::default());
        assert_eq!(config.playback.tempo, 90.0);

        std::fs::write(&path, "[engine]\nlookahead_secs = -1.0\n").unwrap();
        assert_eq!(load_config(&path).engine, EngineConfig::default());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
