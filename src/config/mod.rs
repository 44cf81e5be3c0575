//! Configuration management for sottovoce
//!
//! Values are resolved env > toml > default. The environment is read
//! through a lookup function so callers (and tests) can supply their own.

pub mod file;

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::Result;
use crate::voice::VadConfig;
use file::ConfigFile;

/// Default system prompt appended to any prompt file
pub const DEFAULT_CONVERSATIONAL_PROMPT: &str = "You are a helpful voice assistant. \
Your replies are spoken aloud, so keep them short, conversational and free of markdown.";

/// Default instruction used when the conversation must be summarised
pub const DEFAULT_SUMMARISE_PROMPT: &str = "Summarise the conversation so far in a few \
sentences. Keep names, facts, decisions and open questions.";

/// Top-level configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Voice activity detection parameters
    pub vad: VadConfig,

    /// Optional bound on a single listening session
    pub listen_timeout: Option<Duration>,

    /// Input device name (substring match); default device when `None`
    pub input_device: Option<String>,

    /// Pause before listening again after the device was unavailable
    pub device_retry: Duration,

    /// Speech-to-text configuration
    pub stt: SttConfig,

    /// Language model configuration
    pub llm: LlmConfig,

    /// Conversation memory configuration
    pub memory: MemoryConfig,

    /// Text-to-speech configuration
    pub tts: TtsConfig,

    /// Directory for per-session transcripts
    pub session_logs_dir: PathBuf,
}

/// Speech-to-text configuration
#[derive(Debug, Clone)]
pub struct SttConfig {
    /// OpenAI-compatible transcription endpoint
    pub endpoint: String,

    /// Transcription model (e.g. "base.en", "whisper-1")
    pub model: String,

    /// Optional language hint
    pub language: Option<String>,

    /// Bearer token (from `STT_API_KEY`)
    pub api_key: Option<String>,
}

/// Language model configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// OpenAI-compatible chat completions endpoint
    pub endpoint: String,

    /// Model identifier
    pub model: String,

    /// Request timeout
    pub timeout: Duration,

    /// Bearer token (from `LLM_API_KEY`)
    pub api_key: Option<String>,

    /// Optional system prompt file
    pub system_prompt_path: PathBuf,

    /// Prompt appended after the prompt file
    pub conversational_prompt: String,

    /// Instruction used to summarise history near the context limit
    pub summarise_prompt: String,
}

/// Conversation memory configuration
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// `SQLite` database path
    pub db_path: PathBuf,

    /// Number of recent messages included in each prompt
    pub window_messages: usize,

    /// Token budget of the model context
    pub window_tokens: u32,
}

/// Text-to-speech configuration
#[derive(Debug, Clone)]
pub struct TtsConfig {
    /// Speak replies aloud
    pub enabled: bool,

    /// OpenAI-compatible speech endpoint
    pub endpoint: String,

    /// TTS model
    pub model: String,

    /// Voice identifier
    pub voice: String,

    /// Speed multiplier
    pub speed: f32,

    /// Playback gain
    pub volume: f32,

    /// Bearer token (from `TTS_API_KEY`)
    pub api_key: Option<String>,
}

impl Config {
    /// Load configuration from the process environment and config file
    ///
    /// # Errors
    ///
    /// Returns error if the resulting VAD configuration is invalid
    pub fn load() -> Result<Self> {
        let path = std::env::var_os("SOTTOVOCE_CONFIG").map(PathBuf::from);
        let fc = file::load_config_file(path.as_deref());
        Self::from_sources(|key| std::env::var(key).ok(), fc)
    }

    /// Load configuration from a lookup function only (no config file)
    ///
    /// # Errors
    ///
    /// Returns error if the resulting VAD configuration is invalid
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::from_sources(lookup, ConfigFile::default())
    }

    /// Resolve configuration from a lookup function layered over a file
    ///
    /// # Errors
    ///
    /// Returns error if the resulting VAD configuration is invalid
    pub fn from_sources<F>(lookup: F, fc: ConfigFile) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };
        let defaults = VadConfig::default();

        // Capture (env > toml > default)
        let max_silence_ms = env
            .parse::<f64>("MAX_SILENCE_MS")
            .or(fc.vad.max_silence_ms)
            .map_or(defaults.max_silence_ms, whole_millis);
        let vad = VadConfig {
            aggressiveness: env
                .parse("VAD_AGGRESSIVENESS")
                .or(fc.vad.aggressiveness)
                .unwrap_or(defaults.aggressiveness),
            sample_rate: env
                .parse("VAD_SAMPLE_RATE")
                .or(fc.vad.sample_rate)
                .unwrap_or(defaults.sample_rate),
            frame_duration_ms: env
                .parse("VAD_FRAME_MS")
                .or(fc.vad.frame_ms)
                .unwrap_or(defaults.frame_duration_ms),
            max_silence_ms,
        };
        vad.validate()?;

        let listen_timeout = env
            .parse::<f64>("LISTEN_TIMEOUT_SECS")
            .or(fc.vad.listen_timeout_secs)
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(Duration::from_secs_f64);
        let input_device = env.string("INPUT_DEVICE").or(fc.vad.input_device);
        let device_retry = env
            .parse::<f64>("DEVICE_RETRY_SECS")
            .or(fc.vad.device_retry_secs)
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map_or(Duration::from_secs(2), Duration::from_secs_f64);

        let stt = SttConfig {
            endpoint: env
                .string("STT_ENDPOINT")
                .or(fc.stt.endpoint)
                .unwrap_or_else(|| "http://localhost:8080/v1/audio/transcriptions".to_string()),
            model: env
                .string("STT_MODEL")
                .or(fc.stt.model)
                .unwrap_or_else(|| "base.en".to_string()),
            language: env.string("STT_LANGUAGE").or(fc.stt.language),
            api_key: env.string("STT_API_KEY"),
        };

        let llm_timeout = env
            .parse::<f64>("LLM_TIMEOUT")
            .or(fc.llm.timeout_secs)
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .unwrap_or(60.0);
        let llm = LlmConfig {
            endpoint: env
                .string("LLM_ENDPOINT")
                .or(fc.llm.endpoint)
                .unwrap_or_else(|| "http://localhost:1234/v1/chat/completions".to_string()),
            model: env
                .string("LLM_MODEL")
                .or(fc.llm.model)
                .unwrap_or_else(|| "local-model".to_string()),
            timeout: Duration::from_secs_f64(llm_timeout),
            api_key: env.string("LLM_API_KEY"),
            system_prompt_path: env
                .string("SYSTEM_PROMPT_PATH")
                .or(fc.llm.system_prompt_path)
                .map_or_else(|| PathBuf::from("PROMPT.md"), PathBuf::from),
            conversational_prompt: env
                .string("LLM_PROMPT_CONVERSATIONAL")
                .or(fc.llm.conversational_prompt)
                .unwrap_or_else(|| DEFAULT_CONVERSATIONAL_PROMPT.to_string()),
            summarise_prompt: env
                .string("SUMMARISE_PROMPT")
                .or(fc.llm.summarise_prompt)
                .unwrap_or_else(|| DEFAULT_SUMMARISE_PROMPT.to_string()),
        };

        let memory = MemoryConfig {
            db_path: env
                .string("MEMORY_DB_PATH")
                .or(fc.memory.db_path)
                .map_or_else(|| Path::new("memory").join("memory.db"), PathBuf::from),
            window_messages: env
                .parse("CONTEXT_WINDOW_MESSAGES")
                .or(fc.memory.window_messages)
                .unwrap_or(12)
                .max(1),
            window_tokens: env
                .parse("CONTEXT_WINDOW_TOKENS")
                .or(fc.memory.window_tokens)
                .unwrap_or(4096),
        };

        let tts = TtsConfig {
            enabled: env.flag("TTS_ENABLED").or(fc.tts.enabled).unwrap_or(false),
            endpoint: env
                .string("TTS_ENDPOINT")
                .or(fc.tts.endpoint)
                .unwrap_or_else(|| "http://localhost:8880/v1/audio/speech".to_string()),
            model: env
                .string("TTS_MODEL")
                .or(fc.tts.model)
                .unwrap_or_else(|| "tts-1".to_string()),
            voice: env
                .string("TTS_VOICE")
                .or(fc.tts.voice)
                .unwrap_or_else(|| "alloy".to_string()),
            speed: env.parse("TTS_SPEED").or(fc.tts.speed).unwrap_or(1.0),
            volume: env.parse("TTS_VOLUME").or(fc.tts.volume).unwrap_or(1.0),
            api_key: env.string("TTS_API_KEY"),
        };

        let session_logs_dir = env
            .string("SESSION_LOGS_DIR")
            .or(fc.session_logs_dir)
            .map_or_else(|| PathBuf::from("session_logs"), PathBuf::from);

        Ok(Self {
            vad,
            listen_timeout,
            input_device,
            device_retry,
            stt,
            llm,
            memory,
            tts,
            session_logs_dir,
        })
    }
}

/// Typed access to a string lookup
struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Trimmed value; blank values count as unset
    fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// `1`, `true`, `yes` and `on` are true; anything else set is false
    fn flag(&self, key: &str) -> Option<bool> {
        self.string(key).map(|v| {
            matches!(
                v.to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
    }

    /// Parsed value; unparseable values are ignored with a warning
    fn parse<T: FromStr>(&self, key: &str) -> Option<T> {
        let raw = self.string(key)?;
        match raw.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(key, value = %raw, "ignoring unparseable setting");
                None
            }
        }
    }
}

/// Floor a millisecond value to a whole, non-negative count
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn whole_millis(ms: f64) -> u32 {
    if ms.is_finite() {
        ms.clamp(0.0, f64::from(u32::MAX)).floor() as u32
    } else {
        0
    }
}
