//! Error types for sottovoce

use thiserror::Error;

/// Result type alias for sottovoce operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice loop
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio error (encoding, decoding, playback)
    #[error("audio error: {0}")]
    Audio(String),

    /// Input device could not be opened or failed mid-stream
    #[error("could not access audio device: {0}")]
    DeviceAccess(String),

    /// A frame reached the classifier with the wrong size
    #[error("invalid frame: expected {expected} bytes, got {actual}")]
    InvalidFrame {
        /// Configured frame size in bytes
        expected: usize,
        /// Size of the rejected frame in bytes
        actual: usize,
    },

    /// A frame was classified at a rate other than the one configured
    #[error("sample rate mismatch: classifier runs at {expected} Hz, got {actual} Hz")]
    SampleRateMismatch {
        /// Rate the classifier was built for
        expected: u32,
        /// Rate passed with the frame
        actual: u32,
    },

    /// Voice activity detector error
    #[error("vad error: {0}")]
    Vad(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Language model error
    #[error("LLM error: {0}")]
    Llm(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}
