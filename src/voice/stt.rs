//! Speech-to-text (STT) processing

use async_trait::async_trait;

use super::utterance::Utterance;
use crate::config::SttConfig;
use crate::{Error, Result};

/// Turns a captured utterance into text
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe an utterance
    ///
    /// # Errors
    ///
    /// Returns error if transcription fails
    async fn transcribe(&self, utterance: &Utterance) -> Result<String>;
}

/// Response from an OpenAI-compatible transcription API
#[derive(serde::Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Transcribes speech through an OpenAI-compatible `audio/transcriptions`
/// endpoint (OpenAI, faster-whisper-server, whisper.cpp server, ...)
pub struct SpeechToText {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    language: Option<String>,
    api_key: Option<String>,
}

impl SpeechToText {
    /// Create a new STT client
    ///
    /// # Errors
    ///
    /// Returns error if no endpoint is configured
    pub fn new(config: &SttConfig) -> Result<Self> {
        if config.endpoint.trim().is_empty() {
            return Err(Error::Config("STT endpoint required".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            language: config.language.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl Transcriber for SpeechToText {
    async fn transcribe(&self, utterance: &Utterance) -> Result<String> {
        let wav = utterance.to_wav()?;
        tracing::debug!(
            audio_bytes = wav.len(),
            duration = ?utterance.duration(),
            model = %self.model,
            "starting transcription"
        );

        let mut form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(wav)
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("model", self.model.clone())
            .text("response_format", "json");

        if let Some(language) = &self.language {
            form = form.text("language", language.clone());
        }

        let mut request = self.client.post(&self.endpoint).multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            tracing::error!(error = %e, "transcription request failed");
            e
        })?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "transcription API error");
            return Err(Error::Stt(format!("transcription API error {status}: {body}")));
        }

        let result: TranscriptionResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse response");
            e
        })?;

        let text = result.text.trim().to_string();
        tracing::info!(transcript = %text, "transcription complete");
        Ok(text)
    }
}
