//! The conversation loop
//!
//! One turn: capture an utterance, transcribe it, ask the model with the
//! rolling context, log and remember the exchange, keep the context inside
//! the token budget, then optionally speak the reply.

use std::time::Duration;

use crate::config::Config;
use crate::db::{self, MemoryManager};
use crate::error::{Error, Result};
use crate::llm::{ChatModel, LlmClient};
use crate::session_log::SessionLogger;
use crate::voice::{
    AudioInput, CaptureOutcome, EarshotClassifier, FrameClassifier, Recorder, SpeechToText,
    Speaker, TextToSpeech, Transcriber, Utterance,
};

/// What happened during one turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The session ended without speech
    NoSpeech,
    /// The microphone could not be used
    DeviceUnavailable(String),
    /// Speech was captured but the turn did not produce a reply
    Skipped,
    /// The assistant answered
    Replied(String),
}

/// Collaborators and bookkeeping for a running conversation
pub struct Conversation {
    transcriber: Box<dyn Transcriber>,
    model: Box<dyn ChatModel>,
    speaker: Option<Box<dyn Speaker>>,
    memory: MemoryManager,
    log: SessionLogger,
    window_tokens: u32,
    summarise_prompt: String,
}

impl Conversation {
    /// Assemble a conversation from its parts; speech output is off
    #[must_use]
    pub fn new(
        transcriber: Box<dyn Transcriber>,
        model: Box<dyn ChatModel>,
        memory: MemoryManager,
        log: SessionLogger,
        window_tokens: u32,
        summarise_prompt: impl Into<String>,
    ) -> Self {
        Self {
            transcriber,
            model,
            speaker: None,
            memory,
            log,
            window_tokens,
            summarise_prompt: summarise_prompt.into(),
        }
    }

    /// Speak replies through `speaker`
    #[must_use]
    pub fn with_speaker(mut self, speaker: Box<dyn Speaker>) -> Self {
        self.speaker = Some(speaker);
        self
    }

    /// Wire the HTTP collaborators, memory database and session log
    ///
    /// # Errors
    ///
    /// Returns error if any collaborator can't be initialized
    pub fn from_config(config: &Config, speak: bool) -> Result<Self> {
        let transcriber = SpeechToText::new(&config.stt)?;

        let mut model = LlmClient::new(&config.llm)?;
        model.load_system_prompt(&config.llm.system_prompt_path)?;

        let log = SessionLogger::new(&config.session_logs_dir)?;
        let pool = db::init(&config.memory.db_path)?;
        let memory = MemoryManager::new(pool, log.session_id(), config.memory.window_messages);

        let conversation = Self::new(
            Box::new(transcriber),
            Box::new(model),
            memory,
            log,
            config.memory.window_tokens,
            config.llm.summarise_prompt.clone(),
        );

        if speak {
            Ok(conversation.with_speaker(Box::new(TextToSpeech::new(&config.tts)?)))
        } else {
            Ok(conversation)
        }
    }

    /// Conversation memory
    #[must_use]
    pub const fn memory(&self) -> &MemoryManager {
        &self.memory
    }

    /// Session transcript
    #[must_use]
    pub const fn log(&self) -> &SessionLogger {
        &self.log
    }

    /// Act on the result of one recording session
    pub async fn handle_capture(&mut self, outcome: CaptureOutcome) -> TurnOutcome {
        match outcome {
            CaptureOutcome::Utterance(utterance) => self.respond(&utterance).await,
            CaptureOutcome::NoSpeech => {
                println!("[SYSTEM] No speech detected. Please try again.");
                TurnOutcome::NoSpeech
            }
            CaptureOutcome::DeviceUnavailable(reason) => {
                eprintln!("[SYSTEM] Could not access audio device: {reason}");
                TurnOutcome::DeviceUnavailable(reason)
            }
        }
    }

    /// Transcribe an utterance and answer it
    ///
    /// Failures of the transcriber, model or speaker are reported and never
    /// end the conversation.
    pub async fn respond(&mut self, utterance: &Utterance) -> TurnOutcome {
        println!("[SYSTEM] Transcribing...");
        let user_text = match self.transcriber.transcribe(utterance).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                tracing::debug!("empty transcript, skipping turn");
                return TurnOutcome::Skipped;
            }
            Err(e) => {
                tracing::warn!(error = %e, "transcription failed");
                eprintln!("[SYSTEM] Transcription failed: {e}");
                return TurnOutcome::Skipped;
            }
        };

        let prompt = match self.memory.build_context_prompt(&user_text) {
            Ok(prompt) => prompt,
            Err(e) => {
                tracing::warn!(error = %e, "could not read history, continuing without it");
                format!("User: {user_text}")
            }
        };

        println!("[YOU] {user_text}");
        println!("[SYSTEM] Processing response...");

        let completion = match self.model.complete(&prompt).await {
            Ok(completion) => completion,
            Err(e) => {
                tracing::warn!(error = %e, "LLM call failed");
                eprintln!("[SYSTEM] LLM call failed: {e}");
                return TurnOutcome::Skipped;
            }
        };
        let reply = completion.content.trim().to_string();

        println!("[ASSISTANT] {reply}");
        if let Err(e) = self.log.append_turn(&user_text, &reply) {
            tracing::warn!(error = %e, path = %self.log.path().display(), "session log write failed");
        }
        if let Err(e) = self.memory.record_turn(&user_text, &reply) {
            tracing::warn!(error = %e, "could not record turn");
        }

        let total = completion.total_tokens();
        println!(
            "[SYSTEM] LLM usage: {} total tokens.",
            total.map_or_else(|| "unknown".to_string(), |t| t.to_string())
        );
        self.handle_limits(total).await;

        if let Some(speaker) = &self.speaker {
            println!("[SYSTEM] TTS speaking...");
            if let Err(e) = speaker.speak(&reply).await {
                tracing::warn!(error = %e, "speech output failed");
                eprintln!("[SYSTEM] TTS failed: {e}");
            }
        }

        TurnOutcome::Replied(reply)
    }

    /// Keep the next prompt inside the token budget
    async fn handle_limits(&mut self, total_tokens: Option<u32>) {
        let Some(total) = total_tokens else {
            return;
        };
        let limit = self.window_tokens;

        if u64::from(total) * 5 > u64::from(limit) * 4 {
            println!(
                "[SYSTEM] Approaching context limit ({total}/{limit}). \
                 Summarising to retain continuity..."
            );
            match self
                .memory
                .summarise_history(self.model.as_ref(), &self.summarise_prompt)
                .await
            {
                Ok(Some(summary)) => println!("[SYSTEM] Summary stored: {summary}"),
                Ok(None) => tracing::debug!("nothing to summarise"),
                Err(e) => {
                    tracing::warn!(error = %e, "summary failed");
                    eprintln!("[SYSTEM] Summary failed: {e}");
                }
            }
        }

        if total > limit {
            let window = self.memory.window();
            if window > 2 {
                let new_window = (window / 2).max(1);
                self.memory.shrink_window(new_window);
                println!(
                    "[SYSTEM] Context window exceeded ({total} > {limit}); \
                     reducing recent window to last {new_window} messages."
                );
            } else {
                if let Err(e) = self.memory.clear_history() {
                    tracing::warn!(error = %e, "could not clear history");
                }
                println!(
                    "[SYSTEM] Context window exceeded ({total} > {limit}); \
                     resetting conversation context."
                );
            }
        }
    }
}

/// Run turns with the default classifier until the future is dropped
///
/// # Errors
///
/// Returns error if the classifier can't be built for a session
#[allow(clippy::future_not_send)]
pub async fn run<I: AudioInput>(
    recorder: &Recorder<I>,
    conversation: &mut Conversation,
    retry_delay: Duration,
) -> Result<()> {
    run_with(recorder, conversation, retry_delay, || {
        EarshotClassifier::new(recorder.config())
    })
    .await
}

/// Run turns, building a fresh classifier for every session
///
/// A rejected frame is reported and the next session starts. After the
/// device was unavailable the loop waits `retry_delay` before listening
/// again. The caller cancels the loop (e.g. on Ctrl+C), which releases the
/// microphone.
///
/// # Errors
///
/// Returns the first capture error other than a rejected frame
#[allow(clippy::future_not_send)]
pub async fn run_with<I, C, F>(
    recorder: &Recorder<I>,
    conversation: &mut Conversation,
    retry_delay: Duration,
    mut make_classifier: F,
) -> Result<()>
where
    I: AudioInput,
    C: FrameClassifier + 'static,
    F: FnMut() -> Result<C>,
{
    println!("Initialising. Press Ctrl+C to quit.");
    println!("Session log: {}", conversation.log().path().display());

    loop {
        let classifier = make_classifier()?;

        println!("[SYSTEM] Listening for speech...");
        match recorder.record_with(classifier).await {
            Ok(outcome) => {
                let turn = conversation.handle_capture(outcome).await;
                if matches!(turn, TurnOutcome::DeviceUnavailable(_)) {
                    println!("[SYSTEM] Retrying in {:.1}s...", retry_delay.as_secs_f32());
                    tokio::time::sleep(retry_delay).await;
                }
            }
            Err(e @ Error::InvalidFrame { .. }) => {
                tracing::error!(error = %e, "recording session aborted");
                eprintln!("[SYSTEM] Recording failed: {e}");
            }
            Err(e) => return Err(e),
        }
    }
}
