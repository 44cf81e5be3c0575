//! Audio playback to speakers

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate};

use crate::{Error, Result};

/// Extra time allowed for the device to drain after the last sample
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Plays audio to the default output device
#[derive(Debug, Clone, Copy)]
pub struct AudioPlayback {
    volume: f32,
}

impl AudioPlayback {
    /// Create a playback handle with a gain applied to every sample
    #[must_use]
    pub const fn new(volume: f32) -> Self {
        Self { volume }
    }

    /// Play mono f32 samples, returning once playback finished
    ///
    /// # Errors
    ///
    /// Returns error if no output device accepts the sample rate
    pub async fn play(&self, samples: Vec<f32>, sample_rate: u32) -> Result<()> {
        let volume = self.volume;
        tokio::task::spawn_blocking(move || play_blocking(&samples, sample_rate, volume))
            .await
            .map_err(|e| Error::Audio(e.to_string()))?
    }

    /// Play encoded WAV or MP3 bytes
    ///
    /// # Errors
    ///
    /// Returns error if decoding or playback fails
    pub async fn play_encoded(&self, data: &[u8]) -> Result<()> {
        let (samples, sample_rate) = decode_audio(data)?;
        self.play(samples, sample_rate).await
    }
}

/// Play samples on the current thread, blocking until done
fn play_blocking(samples: &[f32], sample_rate: u32, volume: f32) -> Result<()> {
    if samples.is_empty() {
        return Ok(());
    }

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

    let rate = SampleRate(sample_rate);
    let supported = device
        .supported_output_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .filter(|c| {
            c.sample_format() == SampleFormat::F32
                && c.min_sample_rate() <= rate
                && c.max_sample_rate() >= rate
        })
        .min_by_key(cpal::SupportedStreamConfigRange::channels)
        .ok_or_else(|| Error::Audio(format!("no output config supports {sample_rate} Hz")))?;

    let config = supported.with_sample_rate(rate).config();
    let channels = usize::from(config.channels.max(1));

    let samples: Arc<Vec<f32>> = Arc::new(samples.iter().map(|s| s * volume).collect());
    let position = Arc::new(AtomicUsize::new(0));
    let (done_tx, done_rx) = std::sync::mpsc::sync_channel::<()>(1);

    let stream = {
        let samples = Arc::clone(&samples);
        let position = Arc::clone(&position);
        device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for frame in data.chunks_mut(channels) {
                        let pos = position.load(Ordering::Relaxed);
                        let sample = samples.get(pos).copied().unwrap_or(0.0);
                        frame.fill(sample);

                        if pos < samples.len() {
                            position.store(pos + 1, Ordering::Relaxed);
                        } else {
                            let _ = done_tx.try_send(());
                        }
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?
    };

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;

    let duration_ms = (samples.len() as u64 * 1000) / u64::from(sample_rate.max(1));
    let timeout = Duration::from_millis(duration_ms) + DRAIN_GRACE;
    if done_rx.recv_timeout(timeout).is_err() {
        tracing::warn!(?timeout, "playback did not finish in time");
    }

    drop(stream);
    tracing::debug!(samples = samples.len(), sample_rate, "playback complete");

    Ok(())
}

/// Decode WAV or MP3 bytes to mono f32 samples and their sample rate
///
/// # Errors
///
/// Returns error if the data is neither valid WAV nor MP3
pub fn decode_audio(data: &[u8]) -> Result<(Vec<f32>, u32)> {
    if data.starts_with(b"RIFF") {
        decode_wav(data)
    } else {
        decode_mp3(data)
    }
}

/// Decode WAV bytes, averaging channels
fn decode_wav(data: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut reader =
        hound::WavReader::new(Cursor::new(data)).map_err(|e| Error::Audio(e.to_string()))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Audio(e.to_string()))?,
        hound::SampleFormat::Int => {
            #[allow(clippy::cast_precision_loss)]
            let scale = (1_i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            #[allow(clippy::cast_precision_loss)]
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| Error::Audio(e.to_string()))?
        }
    };

    Ok((downmix(&interleaved, channels), spec.sample_rate))
}

/// Decode MP3 bytes, averaging channels
fn decode_mp3(data: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(data));
    let mut samples = Vec::new();
    let mut sample_rate = 0;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                sample_rate = u32::try_from(frame.sample_rate).unwrap_or(0);
                let pcm: Vec<f32> = frame.data.iter().map(|&s| f32::from(s) / 32768.0).collect();
                samples.extend(downmix(&pcm, frame.channels));
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    if sample_rate == 0 {
        return Err(Error::Audio("no audio frames decoded".to_string()));
    }

    Ok((samples, sample_rate))
}

/// Average interleaved channels into mono
#[allow(clippy::cast_precision_loss)]
fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|group| group.iter().sum::<f32>() / group.len() as f32)
        .collect()
}
