//! Voice-activity-gated recording sessions
//!
//! A session opens the input device, runs the capture state machine inside
//! the device's frame callback and waits for the callback to report that the
//! utterance ended (or that something went wrong). The device guard is
//! dropped on every exit path, including cancellation of the session future.

use std::time::Duration;

use tokio::sync::mpsc;

use super::frame::AudioFrame;
use super::state::{CapturePhase, CaptureState};
use super::utterance::Utterance;
use super::vad::{EarshotClassifier, FrameClassifier, VadConfig};
use crate::{Error, Result};

/// Called on the device thread for every complete frame
pub type FrameCallback = Box<dyn FnMut(AudioFrame) + Send + 'static>;

/// Called on the device thread when the stream fails
pub type ErrorCallback = Box<dyn FnMut(String) + Send + 'static>;

/// A live audio source delivering fixed-size frames
pub trait AudioInput {
    /// Guard keeping the device open; dropping it releases the device
    type Stream;

    /// Open the device and start delivering frames of
    /// `config.frame_bytes()` bytes to `on_frame`
    ///
    /// # Errors
    ///
    /// Returns `Error::DeviceAccess` if the device cannot be opened
    fn open(
        &self,
        config: &VadConfig,
        on_frame: FrameCallback,
        on_error: ErrorCallback,
    ) -> Result<Self::Stream>;
}

/// Result of one recording session
#[derive(Debug)]
pub enum CaptureOutcome {
    /// Speech was captured
    Utterance(Utterance),
    /// The session ended without any buffered speech
    NoSpeech,
    /// The input device could not be opened or failed mid-stream
    DeviceUnavailable(String),
}

impl CaptureOutcome {
    /// The captured utterance, if any
    #[must_use]
    pub fn into_utterance(self) -> Option<Utterance> {
        match self {
            Self::Utterance(utterance) => Some(utterance),
            Self::NoSpeech | Self::DeviceUnavailable(_) => None,
        }
    }
}

/// Signals sent from the frame callback to the waiting session
enum SessionEvent {
    Finished(Option<Utterance>),
    Failed(Error),
    DeviceFailed(String),
}

/// Records one utterance per call
pub struct Recorder<I> {
    input: I,
    config: VadConfig,
    listen_timeout: Option<Duration>,
}

impl<I: AudioInput> Recorder<I> {
    /// Create a recorder over an audio input
    ///
    /// # Errors
    ///
    /// Returns error if the VAD configuration is not supported
    pub fn new(input: I, config: VadConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            input,
            config,
            listen_timeout: None,
        })
    }

    /// Bound how long a session may run before giving up
    ///
    /// Sessions are unbounded by default. When the bound elapses the session
    /// ends as [`CaptureOutcome::NoSpeech`] and any partial speech is dropped.
    #[must_use]
    pub const fn with_listen_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.listen_timeout = timeout;
        self
    }

    /// Session parameters
    #[must_use]
    pub const fn config(&self) -> &VadConfig {
        &self.config
    }

    /// Record one utterance using the default classifier
    ///
    /// # Errors
    ///
    /// Returns error if the classifier cannot be built or rejects a frame.
    /// Device failures are reported as [`CaptureOutcome::DeviceUnavailable`].
    #[allow(clippy::future_not_send)]
    pub async fn record(&self) -> Result<CaptureOutcome> {
        let classifier = EarshotClassifier::new(&self.config)?;
        self.record_with(classifier).await
    }

    /// Record one utterance with a specific classifier
    ///
    /// # Errors
    ///
    /// Returns error if the classifier rejects a frame; no partial utterance
    /// is assembled in that case
    #[allow(clippy::future_not_send)]
    pub async fn record_with<C>(&self, classifier: C) -> Result<CaptureOutcome>
    where
        C: FrameClassifier + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let classifier_name = classifier.name();

        let on_frame = frame_handler(CaptureState::new(&self.config), classifier, tx.clone());
        let on_error: ErrorCallback = Box::new(move |reason| {
            let _ = tx.send(SessionEvent::DeviceFailed(reason));
        });

        let stream = match self.input.open(&self.config, on_frame, on_error) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(error = %e, "could not open audio input");
                return Ok(CaptureOutcome::DeviceUnavailable(e.to_string()));
            }
        };

        tracing::debug!(
            classifier = classifier_name,
            threshold = self.config.silence_threshold_frames(),
            "listening for speech"
        );

        let event = if let Some(limit) = self.listen_timeout {
            if let Ok(event) = tokio::time::timeout(limit, rx.recv()).await {
                event
            } else {
                drop(stream);
                tracing::info!(timeout = ?limit, "listen timeout, no utterance");
                return Ok(CaptureOutcome::NoSpeech);
            }
        } else {
            rx.recv().await
        };

        drop(stream);

        match event {
            Some(SessionEvent::Finished(Some(utterance))) => {
                tracing::debug!(
                    bytes = utterance.len(),
                    duration = ?utterance.duration(),
                    "utterance captured"
                );
                Ok(CaptureOutcome::Utterance(utterance))
            }
            Some(SessionEvent::Finished(None)) => {
                tracing::info!("no speech detected");
                Ok(CaptureOutcome::NoSpeech)
            }
            Some(SessionEvent::Failed(e)) => {
                tracing::error!(error = %e, "capture aborted");
                Err(e)
            }
            Some(SessionEvent::DeviceFailed(reason)) => {
                tracing::error!(reason = %reason, "audio device failed");
                Ok(CaptureOutcome::DeviceUnavailable(reason))
            }
            None => {
                tracing::error!("audio stream closed before the utterance ended");
                Ok(CaptureOutcome::DeviceUnavailable(
                    "audio stream closed".to_string(),
                ))
            }
        }
    }
}

/// Build the per-frame callback owning the session state and classifier
fn frame_handler<C>(
    mut state: CaptureState,
    mut classifier: C,
    events: mpsc::UnboundedSender<SessionEvent>,
) -> FrameCallback
where
    C: FrameClassifier + 'static,
{
    let mut done = false;
    Box::new(move |frame| {
        if done {
            return;
        }

        match state.process(frame, &mut classifier) {
            Ok(CapturePhase::Stopped) => {
                done = true;
                let _ = events.send(SessionEvent::Finished(state.take_utterance()));
            }
            Ok(CapturePhase::Idle | CapturePhase::Listening) => {}
            Err(e) => {
                done = true;
                let _ = events.send(SessionEvent::Failed(e));
            }
        }
    })
}
