//! TOML configuration file loading
//!
//! Supports `~/.config/sottovoce/config.toml` (or the path in
//! `SOTTOVOCE_CONFIG`) as a persistent config source. All fields are
//! optional; the file is a partial overlay on top of defaults and below
//! environment variables.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    /// Voice activity detection
    #[serde(default)]
    pub vad: VadFileConfig,

    /// Speech-to-text
    #[serde(default)]
    pub stt: SttFileConfig,

    /// Language model
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// Conversation memory
    #[serde(default)]
    pub memory: MemoryFileConfig,

    /// Text-to-speech
    #[serde(default)]
    pub tts: TtsFileConfig,

    /// Session log directory
    pub session_logs_dir: Option<String>,
}

/// Capture configuration
#[derive(Debug, Default, Deserialize)]
pub struct VadFileConfig {
    /// Classifier aggressiveness (0-3)
    pub aggressiveness: Option<u8>,

    /// Sample rate in Hz
    pub sample_rate: Option<u32>,

    /// Frame duration in ms
    pub frame_ms: Option<u32>,

    /// Trailing silence in ms
    pub max_silence_ms: Option<f64>,

    /// Give up listening after this many seconds
    pub listen_timeout_secs: Option<f64>,

    /// Input device name (substring match)
    pub input_device: Option<String>,

    /// Seconds to wait after the device was unavailable
    pub device_retry_secs: Option<f64>,
}

/// STT configuration
#[derive(Debug, Default, Deserialize)]
pub struct SttFileConfig {
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub language: Option<String>,
}

/// LLM configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: Option<f64>,
    pub system_prompt_path: Option<String>,
    pub conversational_prompt: Option<String>,
    pub summarise_prompt: Option<String>,
}

/// Memory configuration
#[derive(Debug, Default, Deserialize)]
pub struct MemoryFileConfig {
    pub db_path: Option<String>,
    pub window_messages: Option<usize>,
    pub window_tokens: Option<u32>,
}

/// TTS configuration
#[derive(Debug, Default, Deserialize)]
pub struct TtsFileConfig {
    pub enabled: Option<bool>,
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub speed: Option<f32>,
    pub volume: Option<f32>,
}

/// Load the TOML config file from `path`
///
/// Returns `ConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file(path: Option<&Path>) -> ConfigFile {
    let Some(path) = path.map(Path::to_path_buf).or_else(config_file_path) else {
        return ConfigFile::default();
    };

    if !path.exists() {
        return ConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                ConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            ConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/sottovoce/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("sottovoce").join("config.toml"))
}
