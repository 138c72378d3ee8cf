//! Framed, acknowledged chunk transfer (strict mode).
//!
//! The payload is cut into frames of at most 240 bytes. Exactly one frame is
//! in flight: it is written, flushed, and answered by a single ack byte
//! before the next frame goes out.
//!
//! Per frame the session walks a small state machine:
//!
//! ```text
//!            write+flush             ack byte / timeout
//! Sending ---------------> AwaitAck -------------------+
//!    ^                                                 |
//!    |             Retry (attempt < max)               |
//!    +-------------------------------------------------+
//!                                                      |
//!           Advance (Ok)         Abort (attempt == max)|
//!        <---------------------------------------------+
//! ```
//!
//! A missing ack is handled exactly like an explicit reject. Both are counted
//! separately in [`TransferStats`].

use crate::error::{Error, Phase, Result};
use crate::is_interrupted_requested;
use crate::port::{Port, is_timeout};
use crate::protocol::TransferStats;
use crate::protocol::frame::{self, ACK_BAD, ACK_OK, Frame};
use log::{debug, info, trace, warn};
use std::time::Duration;

/// Strict-mode options.
#[derive(Debug, Clone)]
pub struct StrictConfig {
    /// Attempts per frame before the transfer is aborted.
    pub max_attempts: u32,
    /// How long to wait for the ack byte after each frame.
    pub ack_timeout: Duration,
}

impl Default for StrictConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            ack_timeout: Duration::from_secs(2),
        }
    }
}

impl StrictConfig {
    /// Set the attempts per frame.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the ack timeout.
    #[must_use]
    pub fn with_ack_timeout(mut self, ack_timeout: Duration) -> Self {
        self.ack_timeout = ack_timeout;
        self
    }
}

/// Reply observed after one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// `0x55`: frame accepted.
    Ok,
    /// `0xEE`, or any other unexpected byte: frame rejected.
    Bad,
    /// Nothing arrived before the deadline.
    Timeout,
}

impl Ack {
    /// Interpret the result of a one-byte read.
    pub fn from_reply(reply: Option<u8>) -> Self {
        match reply {
            Some(ACK_OK) => Self::Ok,
            Some(_) => Self::Bad,
            None => Self::Timeout,
        }
    }
}

/// Outcome of an ack for the frame in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Frame accepted; move to the next offset.
    Advance,
    /// Resend the same frame.
    Retry,
    /// Attempts exhausted; abort the whole transfer.
    Abort,
}

/// Per-frame state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    /// About to write the frame for the given attempt (1-based).
    Sending {
        /// Current attempt.
        attempt: u32,
    },
    /// Frame written, waiting for its ack.
    AwaitAck {
        /// Current attempt.
        attempt: u32,
    },
    /// Frame accepted.
    Accepted {
        /// Attempts used.
        attempts: u32,
    },
    /// Frame never accepted.
    Exhausted {
        /// Attempts used.
        attempts: u32,
    },
}

impl ChunkState {
    /// Initial state for a new frame.
    pub fn start() -> Self {
        Self::Sending { attempt: 1 }
    }

    /// The frame bytes have been written and flushed.
    #[must_use]
    pub fn written(self) -> Self {
        match self {
            Self::Sending { attempt } => Self::AwaitAck { attempt },
            other => other,
        }
    }

    /// Apply an ack; only meaningful in `AwaitAck`.
    pub fn on_ack(self, ack: Ack, max_attempts: u32) -> (Self, Option<Transition>) {
        let Self::AwaitAck { attempt } = self else {
            return (self, None);
        };

        let transition = match ack {
            Ack::Ok => Transition::Advance,
            Ack::Bad | Ack::Timeout if attempt < max_attempts => Transition::Retry,
            Ack::Bad | Ack::Timeout => Transition::Abort,
        };
        let next = match transition {
            Transition::Advance => Self::Accepted { attempts: attempt },
            Transition::Retry => Self::Sending {
                attempt: attempt + 1,
            },
            Transition::Abort => Self::Exhausted { attempts: attempt },
        };
        (next, Some(transition))
    }
}

/// Strict-mode sender.
pub struct ChunkedTransfer<'a, P: Port> {
    port: &'a mut P,
    config: StrictConfig,
    stats: TransferStats,
}

impl<'a, P: Port> ChunkedTransfer<'a, P> {
    /// Create a sender with default options.
    pub fn new(port: &'a mut P) -> Self {
        Self::with_config(port, StrictConfig::default())
    }

    /// Create a sender with custom options.
    pub fn with_config(port: &'a mut P, config: StrictConfig) -> Self {
        Self {
            port,
            config,
            stats: TransferStats::default(),
        }
    }

    /// Counters for the last transfer.
    pub fn stats(&self) -> &TransferStats {
        &self.stats
    }

    /// Send `payload` frame by frame.
    ///
    /// `progress` is called with `(acknowledged_bytes, total_bytes)` after
    /// every accepted frame.
    pub fn send<F>(&mut self, payload: &[u8], mut progress: F) -> Result<()>
    where
        F: FnMut(usize, usize),
    {
        if self.config.max_attempts == 0 {
            return Err(Error::Config("max attempts per chunk must be at least 1".into()));
        }

        let frames = frame::split(payload)?;
        let total = payload.len();
        self.stats = TransferStats::default();
        self.port.set_timeout(self.config.ack_timeout)?;

        debug!(
            "Strict transfer: {total} bytes in {} frames, {} attempts each",
            frames.len(),
            self.config.max_attempts
        );

        for frame in &frames {
            self.send_frame(frame)?;
            self.stats.frames += 1;
            progress(usize::from(frame.offset()) + frame.payload().len(), total);
        }

        info!(
            "Sent {total} bytes in {} frames ({} retries)",
            self.stats.frames,
            self.stats.retries()
        );
        Ok(())
    }

    /// Drive one frame through the state machine until it is accepted or
    /// its attempts run out.
    fn send_frame(&mut self, frame: &Frame) -> Result<()> {
        let offset = usize::from(frame.offset());
        let phase = Phase::Frame { offset };
        let mut state = ChunkState::start();

        loop {
            state = match state {
                ChunkState::Sending { attempt } => {
                    // Cancellation is only honoured between whole frames
                    if is_interrupted_requested() {
                        return Err(Error::Interrupted { phase });
                    }
                    trace!(
                        "Frame @{offset}: attempt {attempt}, {} bytes",
                        frame
                            .as_bytes()
                            .len()
                    );
                    self.stats.writes += 1;
                    match self.write_frame(frame) {
                        Ok(()) => {
                            self.stats.bytes_sent += frame.payload().len();
                            state.written()
                        },
                        // A write that times out is a dropped frame
                        Err(e) if is_timeout(&e) => {
                            warn!("Frame @{offset}: write timed out");
                            let (next, _) = state
                                .written()
                                .on_ack(Ack::Timeout, self.config.max_attempts);
                            self.stats.ack_timeouts += 1;
                            next
                        },
                        Err(e) => return Err(Error::transport(phase, e)),
                    }
                },
                ChunkState::AwaitAck { .. } => {
                    let reply = self
                        .port
                        .read_byte()
                        .map_err(|e| Error::transport(phase, e))?;
                    let ack = Ack::from_reply(reply);
                    self.record_ack(offset, reply);
                    let (next, _) = state.on_ack(ack, self.config.max_attempts);
                    next
                },
                ChunkState::Accepted { attempts } => {
                    debug!("Frame @{offset} accepted after {attempts} attempt(s)");
                    return Ok(());
                },
                ChunkState::Exhausted { attempts } => {
                    warn!("Frame @{offset} failed after {attempts} attempts, aborting");
                    return Err(Error::RetryExhausted { offset, attempts });
                },
            };
        }
    }

    fn write_frame(&mut self, frame: &Frame) -> std::io::Result<()> {
        self.port
            .write_all_flush(frame.as_bytes())
    }

    fn record_ack(&mut self, offset: usize, reply: Option<u8>) {
        match reply {
            Some(ACK_OK) => trace!("Frame @{offset}: ACK"),
            Some(ACK_BAD) => {
                self.stats.rejects += 1;
                warn!("Frame @{offset}: rejected by device, retrying");
            },
            Some(other) => {
                self.stats.unexpected_acks += 1;
                warn!("Frame @{offset}: unexpected reply 0x{other:02X}, retrying");
            },
            None => {
                self.stats.ack_timeouts += 1;
                warn!("Frame @{offset}: no ack before timeout, retrying");
            },
        }
    }
}
