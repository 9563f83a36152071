//! Configuration reading and data directory paths.

pub mod paths;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

pub use paths::{get_data_dir, get_store_dir};

/// Default byte cap for the file cache (50 MiB).
pub const DEFAULT_CACHE_LIMIT: u64 = 50 * 1024 * 1024;

/// lector_config.json shape (written by the host's settings panel).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreConfig {
    /// Phrase that wakes the command gate from dormant.
    #[serde(default = "default_wake_phrase")]
    pub wake_phrase: String,
    /// Language tag for the recognition session.
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub speech: SpeechSettings,
    #[serde(default)]
    pub summarizer: SummarizerConfig,
    /// Total byte cap for the bounded file cache.
    #[serde(default = "default_cache_limit")]
    pub cache_limit_bytes: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            wake_phrase: default_wake_phrase(),
            language: default_language(),
            speech: SpeechSettings::default(),
            summarizer: SummarizerConfig::default(),
            cache_limit_bytes: default_cache_limit(),
        }
    }
}

/// Synthesis parameters applied to every utterance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechSettings {
    #[serde(default = "default_rate")]
    pub rate: f64,
    #[serde(default = "default_pitch")]
    pub pitch: f64,
    #[serde(default = "default_volume")]
    pub volume: f64,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            rate: default_rate(),
            pitch: default_pitch(),
            volume: default_volume(),
        }
    }
}

/// Summarization provider endpoints and keys. A provider with no API key is
/// skipped in the chain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummarizerConfig {
    #[serde(default)]
    pub gemini_api_key: Option<String>,
    #[serde(default)]
    pub gemini_endpoint: Option<String>,
    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default)]
    pub openai_endpoint: Option<String>,
}

fn default_wake_phrase() -> String {
    "hey lector".to_string()
}

fn default_language() -> String {
    "en-US".to_string()
}

fn default_rate() -> f64 {
    1.0
}

fn default_pitch() -> f64 {
    1.0
}

fn default_volume() -> f64 {
    1.0
}

fn default_cache_limit() -> u64 {
    DEFAULT_CACHE_LIMIT
}

/// Read lector_config.json from the data directory.
pub fn read_config() -> CoreConfig {
    read_json_file(&get_config_path()).unwrap_or_default()
}

/// Path to lector_config.json.
pub fn get_config_path() -> PathBuf {
    get_data_dir().join("lector_config.json")
}

/// Generic helper: read a JSON file and deserialize it.
fn read_json_file<T: serde::de::DeserializeOwned>(path: &PathBuf) -> Option<T> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(val) => Some(val),
            Err(e) => {
                warn!("Failed to parse {}: {}", path.display(), e);
                None
            }
        },
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to read {}: {}", path.display(), e);
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_missing_fields() {
        let cfg: CoreConfig = serde_json::from_str(r#"{"wakePhrase": "hey reader"}"#).unwrap();
        assert_eq!(cfg.wake_phrase, "hey reader");
        assert_eq!(cfg.language, "en-US");
        assert_eq!(cfg.cache_limit_bytes, DEFAULT_CACHE_LIMIT);
        assert!((cfg.speech.rate - 1.0).abs() < f64::EPSILON);
    }
}
