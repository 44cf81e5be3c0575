//! Assembled speech turns

use std::time::Duration;

use super::frame::{AudioFrame, BYTES_PER_SAMPLE};
use crate::{Error, Result};

/// One complete speech turn as contiguous 16-bit mono PCM
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pcm: Vec<u8>,
    sample_rate: u32,
}

impl Utterance {
    /// Concatenate frames in arrival order
    ///
    /// Returns `None` when there are no frames, which callers treat as
    /// "nothing to transcribe".
    #[must_use]
    pub fn assemble(frames: Vec<AudioFrame>, sample_rate: u32) -> Option<Self> {
        if frames.is_empty() {
            return None;
        }

        let total = frames.iter().map(AudioFrame::len).sum();
        let mut pcm = Vec::with_capacity(total);
        for frame in frames {
            pcm.extend_from_slice(frame.as_bytes());
        }

        Some(Self { pcm, sample_rate })
    }

    /// Raw PCM bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.pcm
    }

    /// Length in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.pcm.len()
    }

    /// Always false for an assembled utterance
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pcm.is_empty()
    }

    /// Sample rate of the PCM data
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Playback duration
    #[must_use]
    pub fn duration(&self) -> Duration {
        let samples = (self.pcm.len() / BYTES_PER_SAMPLE) as u64;
        Duration::from_millis(samples * 1000 / u64::from(self.sample_rate.max(1)))
    }

    /// Samples normalised to [-1.0, 1.0)
    #[must_use]
    pub fn samples_f32(&self) -> Vec<f32> {
        self.pcm
            .chunks_exact(BYTES_PER_SAMPLE)
            .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
            .collect()
    }

    /// Encode as a 16-bit mono WAV file for STT APIs
    ///
    /// # Errors
    ///
    /// Returns error if WAV encoding fails
    pub fn to_wav(&self) -> Result<Vec<u8>> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)
                .map_err(|e| Error::Audio(e.to_string()))?;

            for pair in self.pcm.chunks_exact(BYTES_PER_SAMPLE) {
                writer
                    .write_sample(i16::from_le_bytes([pair[0], pair[1]]))
                    .map_err(|e| Error::Audio(e.to_string()))?;
            }

            writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
        }

        Ok(cursor.into_inner())
    }
}
