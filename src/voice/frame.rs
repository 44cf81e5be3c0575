//! Raw PCM frames as delivered to the voice activity detector

/// Bytes per 16-bit PCM sample
pub const BYTES_PER_SAMPLE: usize = 2;

/// A fixed-duration chunk of mono 16-bit little-endian PCM
///
/// Frames are immutable once captured. The classifier borrows them, the
/// capture state either drops them or takes ownership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    bytes: Vec<u8>,
}

impl AudioFrame {
    /// Wrap raw little-endian PCM bytes
    #[must_use]
    pub const fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Encode i16 samples as a frame
    #[must_use]
    pub fn from_samples(samples: &[i16]) -> Self {
        let bytes = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self { bytes }
    }

    /// Raw frame bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Length in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the frame holds no audio
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Decode the frame back into i16 samples
    ///
    /// A trailing odd byte is ignored.
    pub fn samples(&self) -> impl Iterator<Item = i16> + '_ {
        self.bytes
            .chunks_exact(BYTES_PER_SAMPLE)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
    }
}
