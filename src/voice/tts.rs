//! Text-to-speech (TTS) processing

use async_trait::async_trait;

use super::playback::AudioPlayback;
use crate::config::TtsConfig;
use crate::{Error, Result};

/// Speaks assistant replies aloud
#[async_trait]
pub trait Speaker: Send + Sync {
    /// Synthesize and play `text`, returning once playback finished
    ///
    /// # Errors
    ///
    /// Returns error if synthesis or playback fails
    async fn speak(&self, text: &str) -> Result<()>;
}

/// Synthesizes speech through an OpenAI-compatible `audio/speech` endpoint
pub struct TextToSpeech {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    voice: String,
    speed: f32,
    model: String,
    playback: AudioPlayback,
}

impl TextToSpeech {
    /// Create a new TTS instance
    ///
    /// # Errors
    ///
    /// Returns error if no endpoint is configured
    pub fn new(config: &TtsConfig) -> Result<Self> {
        if config.endpoint.trim().is_empty() {
            return Err(Error::Config("TTS endpoint required".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            voice: config.voice.clone(),
            speed: config.speed,
            model: config.model.clone(),
            playback: AudioPlayback::new(config.volume),
        })
    }

    /// Synthesize text to speech
    ///
    /// # Returns
    ///
    /// Encoded audio bytes (WAV requested; MP3 servers are tolerated)
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
            response_format: &'a str,
        }

        let request = TtsRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            speed: self.speed,
            response_format: "wav",
        };

        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        tracing::debug!(bytes = audio.len(), "speech synthesized");
        Ok(audio.to_vec())
    }
}

#[async_trait]
impl Speaker for TextToSpeech {
    async fn speak(&self, text: &str) -> Result<()> {
        tracing::debug!(text, "speaking");
        let audio = self.synthesize(text).await?;
        self.playback.play_encoded(&audio).await
    }
}
