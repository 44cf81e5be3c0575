//! Rolling conversation memory over the persistent history
//!
//! Every turn is stored, but only the last `window` messages (plus the
//! latest summary) are stitched into the prompt.

use super::DbPool;
use super::history::{HistoryRepo, Message, MessageRole};
use crate::Result;
use crate::llm::ChatModel;

/// Maintains the recent-context window for one session
pub struct MemoryManager {
    repo: HistoryRepo,
    session_id: String,
    window: usize,
}

impl MemoryManager {
    /// Create a manager for `session_id` with a window of at least one message
    #[must_use]
    pub fn new(pool: DbPool, session_id: impl Into<String>, window: usize) -> Self {
        Self {
            repo: HistoryRepo::new(pool),
            session_id: session_id.into(),
            window: window.max(1),
        }
    }

    /// Number of recent messages included in each prompt
    #[must_use]
    pub const fn window(&self) -> usize {
        self.window
    }

    /// Stitch the latest summary and recent messages ahead of `user_text`
    ///
    /// # Errors
    ///
    /// Returns error if the history can't be read
    pub fn build_context_prompt(&self, user_text: &str) -> Result<String> {
        let mut lines = self.transcript()?;
        lines.push(format!("{}: {user_text}", MessageRole::User.label()));
        Ok(lines.join("\n"))
    }

    /// Store a completed exchange
    ///
    /// # Errors
    ///
    /// Returns error if the history can't be written
    pub fn record_turn(&self, user_text: &str, assistant_text: &str) -> Result<()> {
        self.repo
            .add_turn(&self.session_id, user_text, assistant_text)?;
        tracing::debug!(session = %self.session_id, "turn recorded");
        Ok(())
    }

    /// Limit prompt assembly to fewer messages; stored history is untouched
    pub fn shrink_window(&mut self, new_window: usize) {
        self.window = new_window.max(1);
        tracing::info!(window = self.window, "context window reduced");
    }

    /// Delete this session's dialogue; the latest summary stays in the prompt
    ///
    /// # Errors
    ///
    /// Returns error if the history can't be cleared
    pub fn clear_history(&self) -> Result<()> {
        let removed = self.repo.clear_dialogue(&self.session_id)?;
        tracing::info!(session = %self.session_id, removed, "conversation history cleared");
        Ok(())
    }

    /// Ask `model` to condense the windowed transcript and store the result
    ///
    /// Returns `None` when there is nothing to summarise.
    ///
    /// # Errors
    ///
    /// Returns error if the model call or the history write fails
    pub async fn summarise_history(
        &self,
        model: &dyn ChatModel,
        instruction: &str,
    ) -> Result<Option<String>> {
        let transcript = self.transcript()?;
        if transcript.is_empty() {
            return Ok(None);
        }

        let prompt = format!("{instruction}\n\n{}", transcript.join("\n"));
        let completion = model.complete(&prompt).await?;
        let summary = completion.content.trim().to_string();
        if summary.is_empty() {
            return Ok(None);
        }

        self.repo
            .add_message(&self.session_id, MessageRole::System, &summary)?;
        tracing::info!(session = %self.session_id, len = summary.len(), "summary stored");

        Ok(Some(summary))
    }

    /// Summary line followed by the windowed dialogue, one line per message
    fn transcript(&self) -> Result<Vec<String>> {
        let summary = self.repo.latest_summary(&self.session_id)?;
        let recent = self.repo.recent_dialogue(&self.session_id, self.window)?;

        let mut lines = Vec::with_capacity(recent.len() + 2);
        if let Some(summary) = summary {
            lines.push(format!("{}: {summary}", MessageRole::System.label()));
        }
        lines.extend(recent.iter().map(render));
        Ok(lines)
    }
}

fn render(message: &Message) -> String {
    format!("{}: {}", message.role.label(), message.content)
}
