//! Payload buffers handed to the transfer sessions.

pub mod idx;

use crate::error::{Error, Result};
use crate::protocol::frame::MAX_TOTAL;
use std::fmt;
use std::path::Path;

/// Bytes in one 28x28 digit image.
pub const IMAGE_SIZE: usize = 784;

/// Immutable payload of at most 65535 bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    bytes: Vec<u8>,
}

impl Payload {
    /// Wrap `bytes`, rejecting buffers the 16-bit offset cannot address.
    pub fn new(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() > MAX_TOTAL {
            return Err(Error::PayloadTooLarge {
                len: bytes.len(),
                max: MAX_TOTAL,
            });
        }
        Ok(Self { bytes })
    }

    /// Read a raw payload file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::new(bytes)
    }

    /// All-zero payload.
    pub fn zeros(len: usize) -> Result<Self> {
        Self::new(vec![0; len])
    }

    /// All-zero payload with a single byte set.
    pub fn single_pixel(len: usize, index: usize, value: u8) -> Result<Self> {
        if index >= len {
            return Err(Error::Config(format!(
                "pixel index {index} out of range (0..{len})"
            )));
        }
        let mut bytes = vec![0; len];
        bytes[index] = value;
        Self::new(bytes)
    }

    /// Copy with every byte replaced by `255 - b`.
    ///
    /// Turns a dark-on-light image into the light-on-dark polarity the
    /// network was trained on.
    #[must_use]
    pub fn inverted(&self) -> Self {
        Self {
            bytes: self
                .bytes
                .iter()
                .map(|b| 255 - b)
                .collect(),
        }
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Value statistics for logging.
    pub fn summary(&self) -> PayloadSummary {
        let nonzero = self
            .bytes
            .iter()
            .filter(|&&b| b != 0)
            .count();
        let sum: u64 = self
            .bytes
            .iter()
            .map(|&b| u64::from(b))
            .sum();
        #[allow(clippy::cast_precision_loss)]
        let mean = if self.bytes.is_empty() {
            0.0
        } else {
            sum as f64 / self.bytes.len() as f64
        };

        PayloadSummary {
            len: self.bytes.len(),
            min: self
                .bytes
                .iter()
                .copied()
                .min()
                .unwrap_or(0),
            max: self
                .bytes
                .iter()
                .copied()
                .max()
                .unwrap_or(0),
            mean,
            nonzero,
        }
    }
}

impl AsRef<[u8]> for Payload {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

/// Value statistics of a payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PayloadSummary {
    /// Length in bytes.
    pub len: usize,
    /// Smallest byte.
    pub min: u8,
    /// Largest byte.
    pub max: u8,
    /// Mean byte value.
    pub mean: f64,
    /// Bytes that are not zero.
    pub nonzero: usize,
}

impl fmt::Display for PayloadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "len {} min {} max {} avg {:.1} nonzero {}",
            self.len, self.min, self.max, self.mean, self.nonzero
        )
    }
}
