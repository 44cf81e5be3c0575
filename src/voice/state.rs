//! Capture state machine
//!
//! Advanced once per frame. Frames before speech onset are discarded, as is
//! the onset frame itself; everything after it is buffered until the
//! trailing silence run exceeds the configured threshold.

use super::frame::AudioFrame;
use super::utterance::Utterance;
use super::vad::{FrameClassifier, VadConfig};
use crate::Result;

/// Where a capture session currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePhase {
    /// Waiting for speech onset
    Idle,
    /// Speech started, buffering frames
    Listening,
    /// Trailing silence exceeded, no further frames are accepted
    Stopped,
}

/// Mutable state of one recording session
#[derive(Debug)]
pub struct CaptureState {
    started: bool,
    silence_count: usize,
    should_stop: bool,
    frames: Vec<AudioFrame>,
    silence_threshold: usize,
    sample_rate: u32,
}

impl CaptureState {
    /// Fresh state for a new session
    #[must_use]
    pub const fn new(config: &VadConfig) -> Self {
        Self {
            started: false,
            silence_count: 0,
            should_stop: false,
            frames: Vec::new(),
            silence_threshold: config.silence_threshold_frames(),
            sample_rate: config.sample_rate,
        }
    }

    /// Classify a frame and advance the state
    ///
    /// Frames arriving after the session stopped are ignored without being
    /// classified.
    ///
    /// # Errors
    ///
    /// Propagates classifier errors (e.g. `Error::InvalidFrame`)
    pub fn process<C>(&mut self, frame: AudioFrame, classifier: &mut C) -> Result<CapturePhase>
    where
        C: FrameClassifier + ?Sized,
    {
        if self.should_stop {
            return Ok(CapturePhase::Stopped);
        }

        let is_speech = classifier.classify(&frame, self.sample_rate)?;
        Ok(self.advance(frame, is_speech))
    }

    /// Advance the state with an already classified frame
    pub fn advance(&mut self, frame: AudioFrame, is_speech: bool) -> CapturePhase {
        if self.should_stop {
            return CapturePhase::Stopped;
        }

        if !self.started {
            if is_speech {
                self.started = true;
                tracing::debug!("speech onset, buffering");
            }
            return self.phase();
        }

        self.frames.push(frame);

        if is_speech {
            self.silence_count = 0;
        } else {
            self.silence_count += 1;
        }

        tracing::trace!(
            frames = self.frames.len(),
            silence = self.silence_count,
            is_speech,
            "listening"
        );

        if self.silence_count > self.silence_threshold {
            self.should_stop = true;
            tracing::debug!(
                silence = self.silence_count,
                threshold = self.silence_threshold,
                frames = self.frames.len(),
                "silence threshold reached"
            );
        }

        self.phase()
    }

    /// Current phase
    #[must_use]
    pub const fn phase(&self) -> CapturePhase {
        if self.should_stop {
            CapturePhase::Stopped
        } else if self.started {
            CapturePhase::Listening
        } else {
            CapturePhase::Idle
        }
    }

    /// Whether speech onset has been seen
    #[must_use]
    pub const fn started(&self) -> bool {
        self.started
    }

    /// Consecutive silent frames since the last speech frame
    #[must_use]
    pub const fn silence_count(&self) -> usize {
        self.silence_count
    }

    /// Whether the session has reached its stop condition
    #[must_use]
    pub const fn should_stop(&self) -> bool {
        self.should_stop
    }

    /// Buffered frames in arrival order
    #[must_use]
    pub fn frames(&self) -> &[AudioFrame] {
        &self.frames
    }

    /// Assemble the buffered frames
    #[must_use]
    pub fn into_utterance(self) -> Option<Utterance> {
        Utterance::assemble(self.frames, self.sample_rate)
    }

    /// Take the buffered frames as an utterance, leaving the buffer empty
    pub fn take_utterance(&mut self) -> Option<Utterance> {
        Utterance::assemble(std::mem::take(&mut self.frames), self.sample_rate)
    }
}
