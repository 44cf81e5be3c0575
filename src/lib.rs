//! Sottovoce - a local voice loop for chat models
//!
//! This library provides:
//! - Voice-activity-gated microphone capture (one utterance per session)
//! - Transcription and speech synthesis over OpenAI-compatible endpoints
//! - A chat client with rolling, `SQLite`-backed conversation memory
//! - Per-session transcripts
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   Conversation (app)                 │
//! └──────┬──────────────┬──────────────┬────────────────┘
//!        │              │              │
//! ┌──────▼──────┐ ┌─────▼─────┐ ┌──────▼──────────────┐
//! │    voice    │ │    llm    │ │  db  │  session_log  │
//! │ VAD capture │ │ chat API  │ │ memory │ transcript  │
//! │  STT / TTS  │ └───────────┘ └─────────────────────┘
//! └─────────────┘
//! ```

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod session_log;
pub mod voice;

pub use app::{Conversation, TurnOutcome};
pub use config::Config;
pub use db::{DbConn, DbPool, MemoryManager};
pub use error::{Error, Result};
pub use llm::{ChatModel, Completion, LlmClient, Usage};
pub use session_log::SessionLogger;
pub use voice::{CaptureOutcome, Recorder, Utterance, VadConfig};
