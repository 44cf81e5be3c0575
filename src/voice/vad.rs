//! Per-frame voice activity classification
//!
//! The capture state machine only needs a speech/non-speech verdict per
//! frame. [`FrameClassifier`] is the seam; [`EarshotClassifier`] is the
//! default implementation backed by the `earshot` WebRTC VAD port.

use earshot::{VoiceActivityDetector, VoiceActivityProfile};

use super::frame::{AudioFrame, BYTES_PER_SAMPLE};
use crate::{Error, Result};

/// Sample rates the classifier accepts
pub const SUPPORTED_SAMPLE_RATES: [u32; 2] = [8000, 16000];

/// Frame durations the classifier accepts, in milliseconds
pub const SUPPORTED_FRAME_MS: [u32; 3] = [10, 20, 30];

/// Highest aggressiveness level
pub const MAX_AGGRESSIVENESS: u8 = 3;

/// Immutable per-session capture parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VadConfig {
    /// Classifier aggressiveness, 0 (permissive) to 3 (strict)
    pub aggressiveness: u8,

    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Frame duration in milliseconds
    pub frame_duration_ms: u32,

    /// Trailing silence tolerated before the utterance ends
    pub max_silence_ms: u32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            aggressiveness: 2,
            sample_rate: 16000,
            frame_duration_ms: 30,
            max_silence_ms: 1000,
        }
    }
}

impl VadConfig {
    /// Check the parameters against what the classifier supports
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` naming the first offending parameter
    pub fn validate(&self) -> Result<()> {
        if self.aggressiveness > MAX_AGGRESSIVENESS {
            return Err(Error::Config(format!(
                "VAD aggressiveness must be 0-{MAX_AGGRESSIVENESS}, got {}",
                self.aggressiveness
            )));
        }
        if !SUPPORTED_SAMPLE_RATES.contains(&self.sample_rate) {
            return Err(Error::Config(format!(
                "unsupported VAD sample rate {} (expected one of {SUPPORTED_SAMPLE_RATES:?})",
                self.sample_rate
            )));
        }
        if !SUPPORTED_FRAME_MS.contains(&self.frame_duration_ms) {
            return Err(Error::Config(format!(
                "unsupported VAD frame duration {}ms (expected one of {SUPPORTED_FRAME_MS:?})",
                self.frame_duration_ms
            )));
        }
        Ok(())
    }

    /// Samples per frame
    #[must_use]
    pub const fn frame_samples(&self) -> usize {
        (self.sample_rate as usize * self.frame_duration_ms as usize) / 1000
    }

    /// Bytes per frame (16-bit mono)
    #[must_use]
    pub const fn frame_bytes(&self) -> usize {
        self.frame_samples() * BYTES_PER_SAMPLE
    }

    /// Consecutive silent frames tolerated after speech
    ///
    /// Floor division: 1000ms of silence at 30ms frames tolerates 33 frames.
    #[must_use]
    pub const fn silence_threshold_frames(&self) -> usize {
        match self.max_silence_ms.checked_div(self.frame_duration_ms) {
            Some(frames) => frames as usize,
            None => 0,
        }
    }
}

/// Speech/non-speech decision for a single frame
pub trait FrameClassifier: Send {
    /// Classify one frame
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidFrame` when the frame size does not match the
    /// configured frame size
    fn classify(&mut self, frame: &AudioFrame, sample_rate: u32) -> Result<bool>;

    /// Name for logging
    fn name(&self) -> &'static str {
        "unknown_vad"
    }
}

/// Which `earshot` predictor a classifier runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Band {
    Narrow,
    Wide,
}

/// WebRTC-style VAD from the `earshot` crate
pub struct EarshotClassifier {
    detector: VoiceActivityDetector,
    band: Band,
    sample_rate: u32,
    frame_bytes: usize,
    scratch: Vec<i16>,
}

impl EarshotClassifier {
    /// Build a classifier for the given session parameters
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is not supported
    pub fn new(config: &VadConfig) -> Result<Self> {
        config.validate()?;

        let profile = match config.aggressiveness {
            0 => VoiceActivityProfile::QUALITY,
            1 => VoiceActivityProfile::LBR,
            2 => VoiceActivityProfile::AGGRESSIVE,
            _ => VoiceActivityProfile::VERY_AGGRESSIVE,
        };
        // validate() admits only the two rates earshot has predictors for
        let band = if config.sample_rate == 8000 {
            Band::Narrow
        } else {
            Band::Wide
        };

        tracing::debug!(
            aggressiveness = config.aggressiveness,
            sample_rate = config.sample_rate,
            frame_ms = config.frame_duration_ms,
            "earshot classifier initialized"
        );

        Ok(Self {
            detector: VoiceActivityDetector::new(profile),
            band,
            sample_rate: config.sample_rate,
            frame_bytes: config.frame_bytes(),
            scratch: Vec::with_capacity(config.frame_samples()),
        })
    }
}

impl FrameClassifier for EarshotClassifier {
    fn classify(&mut self, frame: &AudioFrame, sample_rate: u32) -> Result<bool> {
        if sample_rate != self.sample_rate {
            return Err(Error::SampleRateMismatch {
                expected: self.sample_rate,
                actual: sample_rate,
            });
        }
        check_frame_size(frame, self.frame_bytes)?;

        self.scratch.clear();
        self.scratch.extend(frame.samples());

        let verdict = match self.band {
            Band::Narrow => self.detector.predict_8khz(&self.scratch),
            Band::Wide => self.detector.predict_16khz(&self.scratch),
        };

        verdict.map_err(|_| Error::Vad("earshot rejected frame".to_string()))
    }

    fn name(&self) -> &'static str {
        "earshot_vad"
    }
}

/// Reject frames that do not match the configured size
///
/// # Errors
///
/// Returns `Error::InvalidFrame` on mismatch
pub fn check_frame_size(frame: &AudioFrame, expected: usize) -> Result<()> {
    let actual = frame.len();
    if actual == expected {
        Ok(())
    } else {
        Err(Error::InvalidFrame { expected, actual })
    }
}
