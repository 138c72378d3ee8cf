//! End-to-end inference sessions.
//!
//! [`InferenceLink`] owns the channel for as long as it lives, runs the
//! transfer protocol chosen by [`TransferMode`], then reads the reply.
//!
//! ## Example
//!
//! ```rust,no_run
//! use digitlink::{InferenceLink, LinkConfig, Payload, SerialConfig, TransferMode};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let payload = Payload::from_file("img_28x28.bin")?;
//!
//!     #[cfg(feature = "native")]
//!     {
//!         let serial = SerialConfig::new("/dev/ttyUSB0", 9600);
//!         let config = LinkConfig::new(TransferMode::strict());
//!         let mut link = InferenceLink::open(&serial, config)?;
//!
//!         let inference = link.infer(&payload, |sent, total| {
//!             println!("{sent}/{total}");
//!         })?;
//!         println!("Prediction: {:?}", inference.prediction.digit());
//!     }
//!
//!     Ok(())
//! }
//! ```

use crate::error::{Error, Phase, Result};
use crate::is_interrupted_requested;
use crate::payload::Payload;
use crate::port::Port;
use crate::protocol::lines::LineBuffer;
use crate::protocol::{
    ChunkedTransfer, DeviceCommand, HandshakeTransfer, LooseConfig, PredictionResult, ReplyFormat,
    ResponseConfig, ResponseReceiver, StrictConfig, TransferStats,
};
use log::{debug, info, warn};
use std::thread;
use std::time::{Duration, Instant};

/// Transfer protocol, chosen once per link.
#[derive(Debug, Clone)]
pub enum TransferMode {
    /// Framed, checksummed, acknowledged, retried.
    Strict(StrictConfig),
    /// Readiness handshake, raw paced writes.
    Loose(LooseConfig),
}

impl TransferMode {
    /// Strict mode with default options.
    pub fn strict() -> Self {
        Self::Strict(StrictConfig::default())
    }

    /// Loose mode with default options.
    pub fn loose() -> Self {
        Self::Loose(LooseConfig::default())
    }

    /// Reply format the firmware uses in this mode.
    pub fn reply_format(&self) -> ReplyFormat {
        match self {
            Self::Strict(_) => ReplyFormat::Raw,
            Self::Loose(_) => ReplyFormat::Lines,
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Strict(_) => "strict",
            Self::Loose(_) => "loose",
        }
    }
}

/// Options for a link.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Transfer protocol.
    pub mode: TransferMode,
    /// Reply handling.
    pub response: ResponseConfig,
    /// Pause after opening the port, before the first byte is sent.
    pub settle_delay: Duration,
    /// Pause after a menu command.
    pub command_delay: Duration,
}

impl LinkConfig {
    /// Default options for `mode`.
    pub fn new(mode: TransferMode) -> Self {
        Self {
            mode,
            response: ResponseConfig::default(),
            settle_delay: Duration::from_millis(200),
            command_delay: Duration::from_millis(500),
        }
    }

    /// Set the reply options.
    #[must_use]
    pub fn with_response(mut self, response: ResponseConfig) -> Self {
        self.response = response;
        self
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self::new(TransferMode::strict())
    }
}

/// Outcome of one inference round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Inference {
    /// Classified reply.
    pub prediction: PredictionResult,
    /// Transfer counters.
    pub stats: TransferStats,
    /// Diagnostic lines printed by the device.
    pub diagnostics: Vec<String>,
}

/// A channel plus the protocol used on it.
///
/// The port is closed by [`InferenceLink::close`] or, failing that, when the
/// link is dropped.
pub struct InferenceLink<P: Port> {
    port: P,
    config: LinkConfig,
    closed: bool,
}

#[cfg(feature = "native")]
impl InferenceLink<crate::port::NativePort> {
    /// Open a serial port and wait for it to settle.
    pub fn open(serial: &crate::port::SerialConfig, config: LinkConfig) -> Result<Self> {
        let port = crate::port::NativePort::open(serial)?;
        info!(
            "Opened {} at {} baud ({} mode)",
            serial.port_name,
            serial.baud_rate,
            config
                .mode
                .name()
        );
        thread::sleep(config.settle_delay);
        Ok(Self::new(port, config))
    }
}

impl<P: Port> InferenceLink<P> {
    /// Wrap an already opened port.
    pub fn new(port: P, config: LinkConfig) -> Self {
        Self {
            port,
            config,
            closed: false,
        }
    }

    /// Get a reference to the underlying port.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Active options.
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "link closed",
            )));
        }
        Ok(())
    }

    /// Send `payload` and wait for the classification.
    ///
    /// `progress` receives `(sent_bytes, total_bytes)`.
    pub fn infer<F>(&mut self, payload: &Payload, progress: F) -> Result<Inference>
    where
        F: FnMut(usize, usize),
    {
        self.ensure_open()?;
        debug!(
            "Payload: {} ({} mode)",
            payload.summary(),
            self.config
                .mode
                .name()
        );

        // Drop stale output from an earlier run
        self.port
            .clear_buffers()?;

        let stats = match self
            .config
            .mode
            .clone()
        {
            TransferMode::Strict(strict) => {
                let mut transfer = ChunkedTransfer::with_config(&mut self.port, strict);
                transfer.send(payload.as_bytes(), progress)?;
                transfer
                    .stats()
                    .clone()
            },
            TransferMode::Loose(loose) => {
                if loose.send_receive_command {
                    self.send_command(DeviceCommand::ReceiveImage)?;
                }
                let mut transfer = HandshakeTransfer::with_config(&mut self.port, loose);
                transfer.send(payload.as_bytes(), progress)?;
                transfer
                    .stats()
                    .clone()
            },
        };

        let format = self
            .config
            .mode
            .reply_format();
        let timeout = self
            .config
            .response
            .timeout_for(format);
        let mut receiver =
            ResponseReceiver::with_config(&mut self.port, format, self.config.response.clone());
        let prediction = receiver.receive(timeout)?;
        let diagnostics = receiver.into_diagnostics();

        match prediction.digit() {
            Some(digit) => info!("Prediction: {digit}"),
            None => warn!("No prediction received"),
        }

        Ok(Inference {
            prediction,
            stats,
            diagnostics,
        })
    }

    /// Write a single-byte menu command and give the device time to react.
    pub fn send_command(&mut self, command: DeviceCommand) -> Result<()> {
        self.ensure_open()?;
        if is_interrupted_requested() {
            return Err(Error::Interrupted {
                phase: Phase::Command,
            });
        }

        debug!("Sending command {command:?}");
        self.port
            .write_all_flush(&[command.byte()])
            .map_err(|e| Error::transport(Phase::Command, e))?;
        if !self
            .config
            .command_delay
            .is_zero()
        {
            thread::sleep(self.config.command_delay);
        }
        Ok(())
    }

    /// Collect the text lines the device prints during `timeout`.
    pub fn read_lines(&mut self, timeout: Duration) -> Result<Vec<String>> {
        self.ensure_open()?;
        self.port
            .set_timeout(self.config.response.poll_interval)?;

        let start = Instant::now();
        let mut buf = [0u8; 256];
        let mut lines = LineBuffer::new();
        let mut out = Vec::new();

        while start.elapsed() < timeout {
            if is_interrupted_requested() {
                return Err(Error::Interrupted {
                    phase: Phase::Response,
                });
            }
            let n = self
                .port
                .read_some(&mut buf)
                .map_err(|e| Error::transport(Phase::Response, e))?;
            for line in lines.push(&buf[..n]) {
                debug!("Device: {line}");
                out.push(line);
            }
        }
        out.extend(lines.finish());
        Ok(out)
    }

    /// Send a command and collect what the device prints in reply.
    pub fn query(&mut self, command: DeviceCommand, timeout: Duration) -> Result<Vec<String>> {
        self.port
            .clear_buffers()?;
        self.send_command(command)?;
        self.read_lines(timeout)
    }

    /// Check that the device answers the menu command at all.
    pub fn ping(&mut self, timeout: Duration) -> Result<bool> {
        let lines = self.query(DeviceCommand::ShowMenu, timeout)?;
        if lines.is_empty() {
            warn!("No response from device on {}", self.port.name());
        }
        Ok(!lines.is_empty())
    }

    /// Close the port. Further operations fail.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        debug!("Closing {}", self.port.name());
        self.port
            .close()
    }
}

impl<P: Port> Drop for InferenceLink<P> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close port: {e}");
        }
    }
}
