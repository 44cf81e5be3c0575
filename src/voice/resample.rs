//! Sample-rate conversion for input devices that can't run at the VAD rate

use rubato::{FftFixedIn, Resampler};

use crate::{Error, Result};

const CHUNK_SIZE: usize = 1024;
const SUB_CHUNKS: usize = 2;

/// Streaming mono resampler
///
/// Device buffers rarely match the resampler's chunk size, so input is held
/// until a full chunk is available. Output is handed to the caller as soon as
/// each chunk is converted.
pub struct StreamResampler {
    resampler: FftFixedIn<f32>,
    pending: Vec<f32>,
}

impl StreamResampler {
    /// Create a resampler from `from_rate` to `to_rate` Hz
    ///
    /// # Errors
    ///
    /// Returns error if either rate is zero or the resampler can't be built
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(from_rate: u32, to_rate: u32) -> Result<Self> {
        if from_rate == 0 || to_rate == 0 {
            return Err(Error::Audio(format!(
                "cannot resample {from_rate} Hz to {to_rate} Hz"
            )));
        }

        let resampler = FftFixedIn::<f32>::new(
            from_rate as usize,
            to_rate as usize,
            CHUNK_SIZE,
            SUB_CHUNKS,
            1,
        )
        .map_err(|e| Error::Audio(format!("resampler init failed: {e}")))?;

        tracing::debug!(from_rate, to_rate, chunk = CHUNK_SIZE, "resampler ready");

        Ok(Self {
            resampler,
            pending: Vec::with_capacity(CHUNK_SIZE * 2),
        })
    }

    /// Feed mono samples, emitting each converted block
    ///
    /// # Errors
    ///
    /// Returns error if the resampler rejects a chunk
    pub fn push<F>(&mut self, samples: &[f32], mut emit: F) -> Result<()>
    where
        F: FnMut(&[f32]),
    {
        self.pending.extend_from_slice(samples);

        loop {
            let needed = self.resampler.input_frames_next();
            if self.pending.len() < needed {
                return Ok(());
            }

            let output = self
                .resampler
                .process(&[&self.pending[..needed]], None)
                .map_err(|e| Error::Audio(format!("resample failed: {e}")))?;
            self.pending.drain(..needed);

            if let Some(channel) = output.first() {
                emit(channel);
            }
        }
    }
}
