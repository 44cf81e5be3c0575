//! Chat completion client for OpenAI-compatible endpoints
//!
//! One request per turn, no streaming. Works with LM Studio, llama.cpp
//! server, Ollama's OpenAI shim and the hosted APIs.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::{Error, Result};

/// Token accounting reported by the server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: Option<u32>,
    #[serde(default)]
    pub completion_tokens: Option<u32>,
    #[serde(default)]
    pub total_tokens: Option<u32>,
}

/// A model reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Assistant text
    pub content: String,

    /// Usage, when the server reports it
    pub usage: Option<Usage>,
}

impl Completion {
    /// Total tokens consumed by the request, if known
    #[must_use]
    pub fn total_tokens(&self) -> Option<u32> {
        self.usage.and_then(|u| u.total_tokens)
    }
}

/// Produces a reply for a prompt
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Complete a single prompt
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the response is malformed
    async fn complete(&self, prompt: &str) -> Result<Completion>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Minimal OpenAI-compatible chat client
pub struct LlmClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    conversational_prompt: String,
    system_prompt: Option<String>,
}

impl LlmClient {
    /// Create a client; the system prompt starts as the conversational prompt
    ///
    /// # Errors
    ///
    /// Returns error if the endpoint is empty or the HTTP client can't be built
    pub fn new(config: &LlmConfig) -> Result<Self> {
        if config.endpoint.trim().is_empty() {
            return Err(Error::Config("LLM endpoint required".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            conversational_prompt: config.conversational_prompt.clone(),
            system_prompt: combine_prompts(None, &config.conversational_prompt),
        })
    }

    /// Prepend the contents of a prompt file to the system prompt
    ///
    /// A missing file leaves the conversational prompt on its own.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but can't be read
    pub fn load_system_prompt(&mut self, path: &Path) -> Result<()> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no system prompt file");
            self.system_prompt = combine_prompts(None, &self.conversational_prompt);
            return Ok(());
        }

        let contents = std::fs::read_to_string(path)?;
        tracing::info!(path = %path.display(), "loaded system prompt");
        self.system_prompt = combine_prompts(Some(&contents), &self.conversational_prompt);
        Ok(())
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn complete(&self, prompt: &str) -> Result<Completion> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system_prompt {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        let request = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
        };

        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        tracing::debug!(model = %self.model, prompt_len = prompt.len(), "sending chat request");
        let response = builder.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "chat API error");
            return Err(Error::Llm(format!("chat API error {status}: {body}")));
        }

        let data: serde_json::Value = response.json().await?;
        let completion = parse_completion(&data)?;

        tracing::debug!(
            total_tokens = ?completion.total_tokens(),
            reply_len = completion.content.len(),
            "chat response received"
        );

        Ok(completion)
    }
}

/// Join the prompt file and the conversational prompt, skipping blanks
fn combine_prompts(file: Option<&str>, conversational: &str) -> Option<String> {
    let parts: Vec<&str> = [file.unwrap_or_default(), conversational]
        .into_iter()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n\n"))
    }
}

/// Extract the first choice's content and the usage block
fn parse_completion(data: &serde_json::Value) -> Result<Completion> {
    let choice = data
        .get("choices")
        .and_then(serde_json::Value::as_array)
        .and_then(|choices| choices.first())
        .ok_or_else(|| Error::Llm("response missing choices".to_string()))?;

    let content = choice
        .get("message")
        .and_then(|message| message.get("content"))
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| Error::Llm("response content missing or invalid".to_string()))?;

    let usage = data
        .get("usage")
        .and_then(|usage| Usage::deserialize(usage).ok());

    Ok(Completion {
        content: content.to_string(),
        usage,
    })
}
