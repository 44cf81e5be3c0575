//! Shared test utilities
//!
//! A scripted audio input and a deterministic classifier so capture
//! sessions run without audio hardware.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use sottovoce::voice::{
    AudioFrame, AudioInput, ErrorCallback, FrameCallback, FrameClassifier, VadConfig,
    check_frame_size,
};
use sottovoce::{Error, Result};

/// 16 kHz, 30 ms frames, 90 ms trailing silence: threshold of 3 frames
#[must_use]
pub fn test_config() -> VadConfig {
    config_with_threshold(3)
}

/// Config whose silence threshold is exactly `frames`
#[must_use]
pub fn config_with_threshold(frames: u32) -> VadConfig {
    VadConfig {
        aggressiveness: 2,
        sample_rate: 16000,
        frame_duration_ms: 30,
        max_silence_ms: frames * 30,
    }
}

/// A frame the [`EnergyClassifier`] calls speech, filled with `level`
#[must_use]
pub fn speech_frame(config: &VadConfig, level: i16) -> AudioFrame {
    AudioFrame::from_samples(&vec![level; config.frame_samples()])
}

/// A frame of digital silence
#[must_use]
pub fn silence_frame(config: &VadConfig) -> AudioFrame {
    AudioFrame::from_samples(&vec![0; config.frame_samples()])
}

/// Speech whenever any sample is non-zero; rejects wrongly sized frames
#[derive(Clone)]
pub struct EnergyClassifier {
    frame_bytes: usize,
    calls: Arc<AtomicUsize>,
}

impl EnergyClassifier {
    #[must_use]
    pub fn new(config: &VadConfig) -> Self {
        Self {
            frame_bytes: config.frame_bytes(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of frames classified so far (shared across clones)
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FrameClassifier for EnergyClassifier {
    fn classify(&mut self, frame: &AudioFrame, _sample_rate: u32) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        check_frame_size(frame, self.frame_bytes)?;
        Ok(frame.samples().any(|s| s != 0))
    }

    fn name(&self) -> &'static str {
        "energy"
    }
}

/// What the scripted device does after delivering its frames
#[derive(Clone)]
pub enum Script {
    /// Deliver the frames, then stay open without sending anything else
    Frames(Vec<AudioFrame>),
    /// Deliver the frames, then report a stream error
    FramesThenFail(Vec<AudioFrame>, String),
    /// Refuse to open
    OpenFails(String),
}

/// Observations shared between a test and its scripted input
#[derive(Clone, Default)]
pub struct DeviceLog {
    opened: Arc<AtomicUsize>,
    released: Arc<AtomicBool>,
    delivered: Arc<AtomicUsize>,
}

impl DeviceLog {
    #[must_use]
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn delivered(&self) -> usize {
        self.delivered.load(Ordering::SeqCst)
    }
}

/// Audio input replaying a script synchronously on open
///
/// Each open consumes the next script; the last one repeats.
pub struct ScriptedInput {
    scripts: Mutex<VecDeque<Script>>,
    device: DeviceLog,
}

impl ScriptedInput {
    #[must_use]
    pub fn new(script: Script) -> Self {
        Self::sessions(vec![script])
    }

    /// One script per recording session
    #[must_use]
    pub fn sessions(scripts: Vec<Script>) -> Self {
        assert!(!scripts.is_empty(), "at least one script");
        Self {
            scripts: Mutex::new(scripts.into()),
            device: DeviceLog::default(),
        }
    }

    fn next_script(&self) -> Script {
        let mut scripts = self.scripts.lock().unwrap();
        if scripts.len() > 1 {
            scripts.pop_front().unwrap()
        } else {
            scripts[0].clone()
        }
    }

    #[must_use]
    pub fn device(&self) -> DeviceLog {
        self.device.clone()
    }
}

/// Keeps the session callbacks alive until dropped
pub struct ScriptedStream {
    _on_frame: FrameCallback,
    _on_error: ErrorCallback,
    released: Arc<AtomicBool>,
}

impl Drop for ScriptedStream {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

impl AudioInput for ScriptedInput {
    type Stream = ScriptedStream;

    fn open(
        &self,
        _config: &VadConfig,
        mut on_frame: FrameCallback,
        mut on_error: ErrorCallback,
    ) -> Result<ScriptedStream> {
        let (frames, failure) = match self.next_script() {
            Script::OpenFails(reason) => return Err(Error::DeviceAccess(reason)),
            Script::Frames(frames) => (frames, None),
            Script::FramesThenFail(frames, reason) => (frames, Some(reason)),
        };

        self.device.opened.fetch_add(1, Ordering::SeqCst);
        for frame in frames {
            self.device.delivered.fetch_add(1, Ordering::SeqCst);
            on_frame(frame);
        }
        if let Some(reason) = failure {
            on_error(reason);
        }

        Ok(ScriptedStream {
            _on_frame: on_frame,
            _on_error: on_error,
            released: Arc::clone(&self.device.released),
        })
    }
}
