//! Channel abstraction for the serial link to the inference device.
//!
//! Both transfer protocols talk to the device through the [`Port`] trait and
//! nothing else, so they can be driven by a real serial port or by a scripted
//! port in tests.
//!
//! ```text
//! +--------------------+   +---------------------+
//! |  ChunkedTransfer   |   |  HandshakeTransfer  |
//! |   (strict mode)    |   |    (loose mode)     |
//! +---------+----------+   +----------+----------+
//!           |                         |
//!           +-----------+-------------+
//!                       v
//!              +--------+--------+
//!              |   Port trait    |
//!              +--------+--------+
//!                       v
//!              +--------+--------+
//!              |   NativePort    |
//!              |  (serialport)   |
//!              +-----------------+
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use digitlink::port::Port;
//!
//! fn example<P: Port>(port: &mut P) -> std::io::Result<()> {
//!     port.write_all(b"4")?;
//!     port.flush()?;
//!
//!     let mut buf = [0u8; 32];
//!     let n = port.read_some(&mut buf)?;
//!     println!("Received: {:?}", &buf[..n]);
//!
//!     Ok(())
//! }
//! ```

#[cfg(feature = "native")]
pub mod native;
#[cfg(feature = "native")]
pub use native::NativePort;

#[cfg(test)]
pub(crate) mod mock;

use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use crate::error::Result;

/// Baud rate expected by the device firmware.
pub const DEFAULT_BAUD: u32 = 9600;

/// Serial port configuration.
///
/// Passed explicitly to channel construction; there is no process-wide port
/// state.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyUSB0", "COM3").
    pub port_name: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Read timeout applied when the port is opened.
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD,
            timeout: Duration::from_millis(500),
        }
    }
}

impl SerialConfig {
    /// Create a new configuration with port name and baud rate.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            ..Default::default()
        }
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Duplex byte channel with bounded-timeout reads.
///
/// A session owns its port exclusively for its whole lifetime.
pub trait Port: Read + Write + Send {
    /// Set the read timeout.
    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;

    /// Get the current timeout.
    fn timeout(&self) -> Duration;

    /// Discard pending input and output.
    fn clear_buffers(&mut self) -> Result<()>;

    /// Get the port name/path.
    fn name(&self) -> &str;

    /// Close the port and release resources.
    ///
    /// After calling this method, the port cannot be used for further I/O.
    fn close(&mut self) -> Result<()>;

    /// Read whatever arrives before the timeout; `Ok(0)` means nothing did.
    fn read_some(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if is_timeout(&e) => Ok(0),
            Err(e) => Err(e),
        }
    }

    /// Read exactly one byte, or `None` if the timeout elapsed first.
    fn read_byte(&mut self) -> std::io::Result<Option<u8>> {
        let mut buf = [0u8; 1];
        match self.read_some(&mut buf)? {
            0 => Ok(None),
            _ => Ok(Some(buf[0])),
        }
    }

    /// Write all bytes and flush before returning.
    fn write_all_flush(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.write_all(buf)?;
        self.flush()
    }
}

/// Whether an I/O error only means "no data before the deadline".
pub fn is_timeout(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
    )
}
