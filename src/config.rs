//! Configuration management for cucu-clock.
//!
//! Loads config from YAML files in standard locations; every section has
//! working defaults so the clock runs with no config file at all.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::engine::EngineConfig;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub max_concurrency: usize,
    pub misfire_threshold_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            misfire_threshold_secs: 60,
        }
    }
}

impl SchedulerConfig {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_concurrency: self.max_concurrency,
            misfire_threshold: Duration::from_secs(self.misfire_threshold_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    pub program: String,
    pub language: String,
    pub rate: u32,
    pub voices: Vec<String>,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            program: "espeak-ng".into(),
            language: "es".into(),
            rate: 150,
            voices: vec!["es".into(), "es-419".into(), "es-mx".into()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sounds_dir: PathBuf,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sounds_dir: "sounds".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AphorismConfig {
    pub enabled: bool,
    pub phrases_path: PathBuf,
}

impl Default for AphorismConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            phrases_path: "aphorisms.json".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scheduler: SchedulerConfig,
    pub tts: TtsConfig,
    pub audio: AudioConfig,
    pub aphorisms: AphorismConfig,
}

impl Config {
    /// Load configuration from YAML file.
    ///
    /// Searches standard locations if no path is provided:
    /// 1. ./config.yaml
    /// 2. ~/.config/cucu-clock/config.yaml
    /// 3. /etc/cucu-clock/config.yaml
    pub fn load(path: Option<&Path>) -> Self {
        let resolved = path.map(PathBuf::from).or_else(|| {
            let candidates = [
                std::env::current_dir().ok().map(|d| d.join("config.yaml")),
                dirs::home_dir().map(|h| h.join(".config/cucu-clock/config.yaml")),
                Some(PathBuf::from("/etc/cucu-clock/config.yaml")),
            ];
            candidates.into_iter().flatten().find(|p| p.exists())
        });

        let Some(config_path) = resolved else {
            info!("No config file found, using defaults");
            return Self::default();
        };

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match serde_yml::from_str(&contents) {
                Ok(config) => {
                    info!("Loaded config from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse {}: {e}, using defaults",
                        config_path.display()
                    );
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!(
                    "Failed to read {}: {e}, using defaults",
                    config_path.display()
                );
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_section() {
        let config = Config::default();
        assert_eq!(config.scheduler.max_concurrency, 5);
        assert_eq!(config.scheduler.misfire_threshold_secs, 60);
        assert_eq!(config.tts.program, "espeak-ng");
        assert!(config.aphorisms.enabled);
    }

    #[test]
    fn partial_yaml_falls_back_per_section() {
        let config: Config = serde_yml::from_str("tts:\n  rate: 120\n").unwrap();
        assert_eq!(config.tts.rate, 120);
        assert_eq!(config.tts.language, "es", "untouched fields keep defaults");
        assert_eq!(config.scheduler.max_concurrency, 5);
    }

    #[test]
    fn engine_config_translates_the_threshold() {
        let engine = SchedulerConfig::default().engine_config();
        assert_eq!(engine.misfire_threshold, Duration::from_secs(60));
    }
}
