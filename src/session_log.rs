//! Plain-text transcript of a conversation session

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::Result;

/// Appends conversation turns to a per-session log file
#[derive(Debug, Clone)]
pub struct SessionLogger {
    path: PathBuf,
}

impl SessionLogger {
    /// Create a logger in `dir`, named after the current UTC time
    ///
    /// # Errors
    ///
    /// Returns error if the directory can't be created
    pub fn new(dir: &Path) -> Result<Self> {
        let filename = format!("session_{}.log", Utc::now().format("%Y%m%dT%H%M%SZ"));
        Self::with_filename(dir, &filename)
    }

    /// Create a logger writing to `dir/filename`
    ///
    /// # Errors
    ///
    /// Returns error if the directory can't be created
    pub fn with_filename(dir: &Path, filename: &str) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(filename);
        tracing::debug!(path = %path.display(), "session log ready");
        Ok(Self { path })
    }

    /// Path of the log file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File stem, used as the memory session id
    #[must_use]
    pub fn session_id(&self) -> String {
        self.path
            .file_stem()
            .map_or_else(String::new, |stem| stem.to_string_lossy().into_owned())
    }

    /// Append one exchange
    ///
    /// # Errors
    ///
    /// Returns error if the file can't be written
    pub fn append_turn(&self, user_text: &str, assistant_text: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        write!(file, "USER: {user_text}\nASSISTANT: {assistant_text}\n---\n")?;
        Ok(())
    }
}
