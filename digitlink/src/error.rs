//! Error types for digitlink.

use std::fmt;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type for digitlink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Where in a session an error happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Writing a single-byte menu command.
    Command,
    /// Waiting for the readiness token (loose mode).
    Readiness,
    /// Sending or acknowledging the frame at `offset` (strict mode).
    Frame {
        /// Payload offset of the frame.
        offset: usize,
    },
    /// Writing the raw chunk at `offset` (loose mode).
    RawChunk {
        /// Payload offset of the chunk.
        offset: usize,
    },
    /// Reading the device reply.
    Response,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command => write!(f, "command"),
            Self::Readiness => write!(f, "readiness wait"),
            Self::Frame { offset } => write!(f, "frame at offset {offset}"),
            Self::RawChunk { offset } => write!(f, "raw chunk at offset {offset}"),
            Self::Response => write!(f, "response"),
        }
    }
}

/// Error type for digitlink operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (file operations, unscoped port access).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// The channel could not be opened.
    #[error("Cannot open channel {port}: {reason}")]
    ChannelOpen {
        /// Port name or path.
        port: String,
        /// Underlying failure.
        reason: String,
    },

    /// A chunk or the whole payload exceeds the protocol limits.
    #[error("Payload too large: {len} bytes (max {max})")]
    PayloadTooLarge {
        /// Offending length.
        len: usize,
        /// Allowed maximum.
        max: usize,
    },

    /// A frame was never accepted within the allowed attempts.
    #[error("Chunk at offset {offset} not accepted after {attempts} attempts")]
    RetryExhausted {
        /// Offset of the failed frame.
        offset: usize,
        /// Attempts made for that frame.
        attempts: u32,
    },

    /// The readiness token did not arrive in time.
    #[error("Device not ready after {}ms (received {} bytes)", waited.as_millis(), received.len())]
    DeviceNotReady {
        /// How long the session waited.
        waited: Duration,
        /// Text observed while waiting.
        received: String,
    },

    /// Transport failure tagged with the session phase.
    #[error("Transport error during {phase}: {source}")]
    Transport {
        /// Phase in which the failure happened.
        phase: Phase,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The embedding application requested cancellation.
    #[error("Interrupted during {phase}")]
    Interrupted {
        /// Phase that was aborted.
        phase: Phase,
    },

    /// Malformed dataset file.
    #[error("Invalid dataset: {0}")]
    InvalidDataset(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Tag an I/O error with the phase it happened in.
    pub fn transport(phase: Phase, source: io::Error) -> Self {
        Self::Transport { phase, source }
    }

    /// Returns `true` when the error came from a cancellation request.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted { .. })
    }
}
