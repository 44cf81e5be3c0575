//! Voice processing module
//!
//! Handles voice-activity-gated capture, transcription, speech synthesis
//! and playback.
//!
//! ```text
//! device ─▶ DeviceFramer ─▶ FrameClassifier ─▶ CaptureState ─▶ Utterance
//!       (capture, resample)     (vad)             (state)      (utterance)
//! ```

mod capture;
mod frame;
mod playback;
mod recorder;
mod resample;
mod state;
mod stt;
mod tts;
mod utterance;
mod vad;

pub use capture::{
    CpalInput, DeviceFramer, FrameChunker, InputStream, default_input_device, list_input_devices,
};
pub use frame::{AudioFrame, BYTES_PER_SAMPLE};
pub use playback::{AudioPlayback, decode_audio};
pub use recorder::{AudioInput, CaptureOutcome, ErrorCallback, FrameCallback, Recorder};
pub use resample::StreamResampler;
pub use state::{CapturePhase, CaptureState};
pub use stt::{SpeechToText, Transcriber};
pub use tts::{Speaker, TextToSpeech};
pub use utterance::Utterance;
pub use vad::{
    EarshotClassifier, FrameClassifier, MAX_AGGRESSIVENESS, SUPPORTED_FRAME_MS,
    SUPPORTED_SAMPLE_RATES, VadConfig, check_frame_size,
};
