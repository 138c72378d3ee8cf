//! Protocol implementations.
//!
//! - [`frame`]: strict-mode frame codec
//! - [`strict`]: framed, acknowledged, retried chunk transfer
//! - [`handshake`]: readiness-token handshake with paced raw writes
//! - [`response`]: reply classification after a transfer
//! - [`command`]: single-byte menu commands understood by the firmware

pub mod command;
pub mod frame;
pub mod handshake;
pub mod lines;
pub mod response;
pub mod strict;

// Re-export common types
pub use command::DeviceCommand;
pub use frame::{Frame, checksum};
pub use handshake::{HandshakeTransfer, LooseConfig, READY_TOKEN};
pub use response::{PredictionResult, ReplyFormat, ResponseConfig, ResponseReceiver, classify_reply};
pub use strict::{Ack, ChunkState, ChunkedTransfer, StrictConfig, Transition};

/// Counters collected while a payload is sent.
///
/// `rejects` and `ack_timeouts` are both retried the same way; they are
/// counted apart so a noisy line can be told from a slow one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TransferStats {
    /// Frames (strict) accepted by the device.
    pub frames: usize,
    /// Write calls issued, including resends.
    pub writes: usize,
    /// Payload bytes written, including resends.
    pub bytes_sent: usize,
    /// Explicit `0xEE` rejections.
    pub rejects: usize,
    /// Attempts with no ack byte before the deadline.
    pub ack_timeouts: usize,
    /// Ack bytes that were neither accept nor reject.
    pub unexpected_acks: usize,
}

impl TransferStats {
    /// Attempts that had to be repeated.
    pub fn retries(&self) -> usize {
        self.rejects + self.ack_timeouts + self.unexpected_acks
    }
}
