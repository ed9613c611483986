//! Application configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DuetError, DuetResult};

/// Environment variable that points at an explicit config file.
pub const CONFIG_ENV_VAR: &str = "DUET_CONFIG";

/// Global application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Composition defaults.
    #[serde(default)]
    pub compose: ComposeSettings,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Parameters applied to every composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposeSettings {
    /// Output frame rate.
    pub fps: u32,

    /// Encoder quality preset.
    pub quality: QualityPreset,

    /// What the bottom region shows once a shorter bottom clip has ended.
    pub tail_fill: TailFill,

    /// ffmpeg executable (name on PATH or absolute path).
    pub ffmpeg_bin: String,

    /// ffprobe executable (name on PATH or absolute path).
    pub ffprobe_bin: String,

    /// Probe the rendered file and write a verification report next to it.
    pub verify_output: bool,
}

/// Encoder quality presets, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityPreset {
    #[default]
    Highest,
    Balanced,
    Fast,
}

impl QualityPreset {
    pub fn as_str(self) -> &'static str {
        match self {
            QualityPreset::Highest => "highest",
            QualityPreset::Balanced => "balanced",
            QualityPreset::Fast => "fast",
        }
    }
}

impl std::str::FromStr for QualityPreset {
    type Err = DuetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "highest" | "high" => Ok(QualityPreset::Highest),
            "balanced" | "medium" => Ok(QualityPreset::Balanced),
            "fast" | "low" => Ok(QualityPreset::Fast),
            other => Err(DuetError::config(format!(
                "Unknown quality preset: {other}. Use: highest, balanced, fast"
            ))),
        }
    }
}

/// Fill behavior for the bottom region after the bottom clip runs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TailFill {
    /// Show the black canvas.
    #[default]
    Blank,
    /// Repeat the last decoded bottom frame.
    Hold,
}

impl TailFill {
    pub fn as_str(self) -> &'static str {
        match self {
            TailFill::Blank => "blank",
            TailFill::Hold => "hold",
        }
    }
}

impl std::str::FromStr for TailFill {
    type Err = DuetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "blank" | "black" => Ok(TailFill::Blank),
            "hold" | "repeat" => Ok(TailFill::Hold),
            other => Err(DuetError::config(format!(
                "Unknown tail fill: {other}. Use: blank, hold"
            ))),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "duet=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,
}

impl Default for ComposeSettings {
    fn default() -> Self {
        Self {
            fps: 30,
            quality: QualityPreset::Highest,
            tail_fill: TailFill::Blank,
            ffmpeg_bin: "ffmpeg".to_string(),
            ffprobe_bin: "ffprobe".to_string(),
            verify_output: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match Self::load_from(&config_path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to load config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Load config from an explicit path.
    pub fn load_from(path: &Path) -> DuetResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the render pipeline cannot honor.
    pub fn validate(&self) -> DuetResult<()> {
        self.compose.validate()
    }
}

impl ComposeSettings {
    /// Output frame rates accepted by the renderer.
    pub const FPS_RANGE: std::ops::RangeInclusive<u32> = 1..=240;

    /// Reject values the render pipeline cannot honor.
    pub fn validate(&self) -> DuetResult<()> {
        if !Self::FPS_RANGE.contains(&self.fps) {
            return Err(DuetError::config(format!(
                "fps must be within {}..={}, got {}",
                Self::FPS_RANGE.start(),
                Self::FPS_RANGE.end(),
                self.fps
            )));
        }
        if self.ffmpeg_bin.trim().is_empty() || self.ffprobe_bin.trim().is_empty() {
            return Err(DuetError::config("ffmpeg/ffprobe executable must not be empty"));
        }
        Ok(())
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    if let Ok(explicit) = std::env::var(CONFIG_ENV_VAR) {
        if !explicit.trim().is_empty() {
            return PathBuf::from(explicit);
        }
    }

    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("duet").join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_composition_contract() {
        let config = AppConfig::default();
        assert_eq!(config.compose.fps, 30);
        assert_eq!(config.compose.quality, QualityPreset::Highest);
        assert_eq!(config.compose.tail_fill, TailFill::Blank);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"compose":{"tail_fill":"hold"}}"#).unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.compose.tail_fill, TailFill::Hold);
        assert_eq!(config.compose.fps, 30);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_zero_fps_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"compose":{"fps":0}}"#).unwrap();

        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, DuetError::Config { .. }));
    }

    #[test]
    fn test_written_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = AppConfig::default();
        config.compose.quality = QualityPreset::Fast;
        config.compose.verify_output = true;

        std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();
        assert_eq!(AppConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_legacy_logging_file_key_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"logging":{"level":"debug","json":true,"file":"/var/log/duet.log"}}"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
    }

    #[test]
    fn test_settings_fps_range() {
        let mut settings = ComposeSettings::default();
        settings.fps = 240;
        assert!(settings.validate().is_ok());
        settings.fps = 241;
        assert!(matches!(settings.validate(), Err(DuetError::Config { .. })));
        settings.fps = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_preset_and_tail_fill_parse() {
        assert_eq!("Balanced".parse::<QualityPreset>().unwrap(), QualityPreset::Balanced);
        assert_eq!("repeat".parse::<TailFill>().unwrap(), TailFill::Hold);
        assert!("ultra".parse::<QualityPreset>().is_err());
    }
}
