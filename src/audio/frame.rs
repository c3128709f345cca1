//! Fixed-size mono PCM frames
//!
//! A frame is the unit exchanged on the stream socket: `buffer_size`
//! little-endian IEEE-754 f32 samples with no delimiter.

use bytes::{BufMut, Bytes, BytesMut};
use std::sync::Arc;

use crate::constants::{BYTES_PER_SAMPLE, LEVEL_FLOOR_DB};
use crate::error::FrameError;

/// Immutable block of mono samples
///
/// Cloning is cheap; the sample storage is shared.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    samples: Arc<[f32]>,
}

impl Frame {
    pub fn new(samples: Vec<f32>) -> Self {
        Self {
            samples: samples.into(),
        }
    }

    /// Frame of `len` zero samples
    pub fn silence(len: usize) -> Self {
        Self::new(vec![0.0; len])
    }

    /// Frame with every sample set to `value`
    pub fn filled(len: usize, value: f32) -> Self {
        Self::new(vec![value; len])
    }

    /// Number of bytes a frame of `samples` samples occupies on the wire
    pub const fn wire_len(samples: usize) -> usize {
        samples * BYTES_PER_SAMPLE
    }

    /// Decode a wire payload that must hold exactly `samples` samples
    pub fn from_le_bytes(data: &[u8], samples: usize) -> Result<Self, FrameError> {
        if samples == 0 {
            return Err(FrameError::Empty);
        }

        let expected = Self::wire_len(samples);
        if data.len() != expected {
            return Err(FrameError::SizeMismatch {
                expected,
                actual: data.len(),
            });
        }

        let decoded = data
            .chunks_exact(BYTES_PER_SAMPLE)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect::<Vec<_>>();

        Ok(Self::new(decoded))
    }

    /// Encode to the wire representation
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::wire_len(self.samples.len()));
        for &sample in self.samples.iter() {
            buf.put_f32_le(sample);
        }
        buf.freeze()
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Root mean square of the samples
    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }

        let sum_squares: f64 = self
            .samples
            .iter()
            .map(|&s| (s as f64) * (s as f64))
            .sum();

        (sum_squares / self.samples.len() as f64).sqrt() as f32
    }

    /// RMS level in dB, clamped to [`LEVEL_FLOOR_DB`]
    ///
    /// Silence and non-finite input read as the floor.
    pub fn level_db(&self) -> f32 {
        let rms = self.rms();
        if !rms.is_finite() || rms <= 0.0 {
            return LEVEL_FLOOR_DB;
        }

        (20.0 * rms.log10()).max(LEVEL_FLOOR_DB)
    }
}
