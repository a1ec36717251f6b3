use std::{path::Path, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{speech::Language, Result};

/// Lower bound applied to the deal interval.
pub const MIN_INTERVAL: Duration = Duration::from_millis(100);

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub dealer: DealerConfig,
    pub audio: AudioConfig,
    pub display: DisplayConfig,
}

impl AppConfig {
    /// Reads a JSON configuration file. Missing fields keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Settings for the dealing sequencer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DealerConfig {
    pub interval_ms: u64,
    pub deck_count: usize,
    /// Reshuffle and keep dealing after a pass completes.
    pub repeat: bool,
    /// Shuffle once on construction.
    pub auto_shuffle: bool,
    pub language: Language,
}

impl DealerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms).max(MIN_INTERVAL)
    }
}

impl Default for DealerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1_000,
            deck_count: 1,
            repeat: false,
            auto_shuffle: true,
            language: Language::En,
        }
    }
}

/// Configuration specific to the announcement subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub enabled: bool,
    pub volume: f32,
    /// Directory for the persistent announcement store. `None` keeps
    /// everything in memory.
    pub cache_dir: Option<PathBuf>,
    pub generator: GeneratorConfig,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            volume: 1.0,
            cache_dir: None,
            generator: GeneratorConfig::default(),
        }
    }
}

/// Remote text-to-speech endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub endpoint: String,
    pub model: String,
    pub voice: String,
    /// Environment variable holding the bearer token.
    pub api_key_env: String,
    pub timeout_ms: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/audio/speech".to_string(),
            model: "tts-1".to_string(),
            voice: "nova".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
    pub asset_root: PathBuf,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            asset_root: PathBuf::from("assets"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_files_keep_defaults() {
        let config = AppConfig::from_json(
            r#"{ "dealer": { "interval_ms": 1500, "language": "es" }, "audio": { "volume": 0.5 } }"#,
        )
        .unwrap();

        assert_eq!(config.dealer.interval(), Duration::from_millis(1500));
        assert_eq!(config.dealer.language, Language::Es);
        assert_eq!(config.dealer.deck_count, 1);
        assert!(config.dealer.auto_shuffle);
        assert_eq!(config.audio.volume, 0.5);
        assert_eq!(config.audio.generator.model, "tts-1");
        assert_eq!(config.display.width, 800);
    }

    #[test]
    fn interval_is_clamped() {
        let config = DealerConfig {
            interval_ms: 5,
            ..Default::default()
        };
        assert_eq!(config.interval(), MIN_INTERVAL);
    }

    #[test]
    fn rejects_malformed_json() {
        let err = AppConfig::from_json("{ nope").unwrap_err();
        assert!(format!("{err}").starts_with("invalid configuration"));
    }
}
