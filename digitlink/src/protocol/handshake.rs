//! Readiness handshake with paced raw writes (loose mode).
//!
//! Kept for firmware that has no frame decoder. The device prints text and
//! eventually `READY`; the host then writes the payload in small slices with
//! a fixed delay after each one. There is no ack, no checksum and no retry,
//! so a dropped byte goes unnoticed.

use crate::error::{Error, Phase, Result};
use crate::is_interrupted_requested;
use crate::port::Port;
use crate::protocol::TransferStats;
use crate::protocol::frame::MAX_TOTAL;
use crate::protocol::lines::decode_lossy;
use log::{debug, info, trace};
use std::thread;
use std::time::{Duration, Instant};

/// Token the device prints when it can accept an image.
pub const READY_TOKEN: &str = "READY";

/// Default slice size for raw writes.
pub const DEFAULT_CHUNK_SIZE: usize = 32;

/// Loose-mode options.
#[derive(Debug, Clone)]
pub struct LooseConfig {
    /// How long to wait for [`READY_TOKEN`].
    pub ready_timeout: Duration,
    /// Bytes per raw write.
    pub chunk_size: usize,
    /// Delay after every raw write.
    pub inter_chunk_delay: Duration,
    /// Read timeout while polling for readiness.
    pub poll_interval: Duration,
    /// Send the receive-image menu command before waiting for readiness.
    pub send_receive_command: bool,
}

impl Default for LooseConfig {
    fn default() -> Self {
        Self {
            ready_timeout: Duration::from_secs(10),
            chunk_size: DEFAULT_CHUNK_SIZE,
            inter_chunk_delay: Duration::from_millis(50),
            poll_interval: Duration::from_millis(50),
            send_receive_command: true,
        }
    }
}

impl LooseConfig {
    /// Set the readiness timeout.
    #[must_use]
    pub fn with_ready_timeout(mut self, ready_timeout: Duration) -> Self {
        self.ready_timeout = ready_timeout;
        self
    }

    /// Set the pacing delay.
    #[must_use]
    pub fn with_inter_chunk_delay(mut self, delay: Duration) -> Self {
        self.inter_chunk_delay = delay;
        self
    }

    /// Expected time spent pacing `len` bytes.
    pub fn pacing_time(&self, len: usize) -> Duration {
        let slices = u32::try_from(len.div_ceil(self.chunk_size.max(1))).unwrap_or(u32::MAX);
        self.inter_chunk_delay * slices
    }
}

/// Loose-mode sender.
pub struct HandshakeTransfer<'a, P: Port> {
    port: &'a mut P,
    config: LooseConfig,
    stats: TransferStats,
    ready_seen: bool,
    transcript: String,
}

impl<'a, P: Port> HandshakeTransfer<'a, P> {
    /// Create a sender with default options.
    pub fn new(port: &'a mut P) -> Self {
        Self::with_config(port, LooseConfig::default())
    }

    /// Create a sender with custom options.
    pub fn with_config(port: &'a mut P, config: LooseConfig) -> Self {
        Self {
            port,
            config,
            stats: TransferStats::default(),
            ready_seen: false,
            transcript: String::new(),
        }
    }

    /// Counters for the last transfer.
    pub fn stats(&self) -> &TransferStats {
        &self.stats
    }

    /// Whether the readiness token has been observed.
    pub fn ready_seen(&self) -> bool {
        self.ready_seen
    }

    /// Text received while waiting for readiness.
    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    /// Block until [`READY_TOKEN`] appears anywhere in the received text.
    pub fn wait_ready(&mut self) -> Result<()> {
        debug!("Waiting for {READY_TOKEN} from device...");
        self.port
            .set_timeout(self.config.poll_interval)?;

        let start = Instant::now();
        let mut buf = [0u8; 256];

        while start.elapsed() < self.config.ready_timeout {
            if is_interrupted_requested() {
                return Err(Error::Interrupted {
                    phase: Phase::Readiness,
                });
            }

            let n = self
                .port
                .read_some(&mut buf)
                .map_err(|e| Error::transport(Phase::Readiness, e))?;
            if n == 0 {
                continue;
            }

            let text = decode_lossy(&buf[..n]);
            for line in text
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
            {
                debug!("Device: {line}");
            }
            self.transcript
                .push_str(&text);

            // Scan the whole transcript: the token may straddle two reads
            if self
                .transcript
                .contains(READY_TOKEN)
            {
                info!("Device ready after {}ms", start.elapsed().as_millis());
                self.ready_seen = true;
                return Ok(());
            }
        }

        Err(Error::DeviceNotReady {
            waited: start.elapsed(),
            received: self.transcript.clone(),
        })
    }

    /// Wait for readiness, then write `payload` in paced raw slices.
    ///
    /// `progress` is called with `(written_bytes, total_bytes)` after every
    /// slice.
    pub fn send<F>(&mut self, payload: &[u8], mut progress: F) -> Result<()>
    where
        F: FnMut(usize, usize),
    {
        if payload.len() > MAX_TOTAL {
            return Err(Error::PayloadTooLarge {
                len: payload.len(),
                max: MAX_TOTAL,
            });
        }
        if self.config.chunk_size == 0 {
            return Err(Error::Config("raw chunk size must be at least 1".into()));
        }

        self.stats = TransferStats::default();
        self.wait_ready()?;

        let total = payload.len();
        debug!(
            "Sending {total} raw bytes in {}-byte slices (~{}ms pacing)",
            self.config.chunk_size,
            self.config
                .pacing_time(total)
                .as_millis()
        );

        for (i, chunk) in payload
            .chunks(self.config.chunk_size)
            .enumerate()
        {
            let offset = i * self.config.chunk_size;
            let phase = Phase::RawChunk { offset };
            if is_interrupted_requested() {
                return Err(Error::Interrupted { phase });
            }

            self.port
                .write_all_flush(chunk)
                .map_err(|e| Error::transport(phase, e))?;
            self.stats.writes += 1;
            self.stats.bytes_sent += chunk.len();
            trace!("Raw slice @{offset}: {} bytes", chunk.len());
            progress(self.stats.bytes_sent, total);

            if !self
                .config
                .inter_chunk_delay
                .is_zero()
            {
                thread::sleep(self.config.inter_chunk_delay);
            }
        }

        info!("Sent {} raw bytes", self.stats.bytes_sent);
        Ok(())
    }
}
