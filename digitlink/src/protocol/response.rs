//! Reply classification after a transfer.
//!
//! Strict-mode firmware answers with a single raw byte holding the digit,
//! though debug builds print text instead. Loose-mode firmware prints lines
//! and ends with `PRED:<digit>`.

use crate::error::{Error, Phase, Result};
use crate::is_interrupted_requested;
use crate::port::Port;
use crate::protocol::lines::LineBuffer;
use log::{debug, info, warn};
use std::thread;
use std::time::{Duration, Instant};

/// Prefix of the terminal prediction line.
pub const PRED_PREFIX: &str = "PRED:";

/// Prefixes of diagnostic lines that do not end the wait.
pub const DIAGNOSTIC_PREFIXES: [&str; 2] = ["HW:", "SW"];

/// Classification result handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum PredictionResult {
    /// Raw digit byte (0-9).
    RawByte {
        /// Predicted digit.
        digit: u8,
    },
    /// Textual reply, with the digit when one could be parsed.
    Text {
        /// Reply text.
        text: String,
        /// Parsed digit.
        digit: Option<u8>,
    },
    /// Nothing usable arrived before the timeout.
    None,
}

impl PredictionResult {
    /// The predicted digit, if any.
    pub fn digit(&self) -> Option<u8> {
        match self {
            Self::RawByte { digit } => Some(*digit),
            Self::Text { digit, .. } => *digit,
            Self::None => None,
        }
    }

    /// Whether the device replied at all.
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// How the device formats its reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyFormat {
    /// A small burst of bytes, usually a single raw digit (strict mode).
    Raw,
    /// Newline-delimited text ending in `PRED:` (loose mode).
    Lines,
}

/// One classified line of device output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyLine<'a> {
    /// `PRED:<digit>`.
    Prediction(u8),
    /// `PRED:` with an unusable value.
    Malformed(&'a str),
    /// `HW:` / `SW` debug output.
    Diagnostic(&'a str),
    /// Anything else.
    Other(&'a str),
}

/// Classify a single line of device output.
pub fn classify_line(line: &str) -> ReplyLine<'_> {
    if let Some(rest) = line.strip_prefix(PRED_PREFIX) {
        return match parse_digit(rest) {
            Some(digit) => ReplyLine::Prediction(digit),
            None => ReplyLine::Malformed(line),
        };
    }
    if DIAGNOSTIC_PREFIXES
        .iter()
        .any(|p| line.starts_with(p))
    {
        return ReplyLine::Diagnostic(line);
    }
    ReplyLine::Other(line)
}

/// Classify the burst read after a strict-mode transfer.
///
/// A first byte of `P`/`p` means the firmware printed text. Any other first
/// byte is taken as the raw digit and must be 0-9; bytes outside that range
/// are surfaced as text.
pub fn classify_reply(bytes: &[u8]) -> PredictionResult {
    let Some(&first) = bytes.first() else {
        return PredictionResult::None;
    };

    if !matches!(first, b'P' | b'p') && first <= 9 {
        return PredictionResult::RawByte { digit: first };
    }

    let text = String::from_utf8_lossy(bytes)
        .trim()
        .to_string();
    let digit = text
        .split_once(':')
        .filter(|(head, _)| head.eq_ignore_ascii_case("pred"))
        .and_then(|(_, value)| parse_digit(value));
    PredictionResult::Text { text, digit }
}

fn parse_digit(value: &str) -> Option<u8> {
    value
        .trim()
        .parse::<u8>()
        .ok()
        .filter(|d| *d <= 9)
}

/// Reply-reading options.
#[derive(Debug, Clone)]
pub struct ResponseConfig {
    /// Deadline for a raw reply.
    pub raw_timeout: Duration,
    /// Deadline for a `PRED:` line.
    pub lines_timeout: Duration,
    /// Pause before the first read, giving the device time to compute.
    pub reply_delay: Duration,
    /// Maximum bytes collected for a raw reply.
    pub raw_window: usize,
    /// Read timeout while polling.
    pub poll_interval: Duration,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            raw_timeout: Duration::from_secs(2),
            lines_timeout: Duration::from_secs(20),
            reply_delay: Duration::from_millis(50),
            raw_window: 64,
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl ResponseConfig {
    /// Deadline for the given format.
    pub fn timeout_for(&self, format: ReplyFormat) -> Duration {
        match format {
            ReplyFormat::Raw => self.raw_timeout,
            ReplyFormat::Lines => self.lines_timeout,
        }
    }
}

/// Reads and classifies the device reply.
pub struct ResponseReceiver<'a, P: Port> {
    port: &'a mut P,
    format: ReplyFormat,
    config: ResponseConfig,
    diagnostics: Vec<String>,
}

impl<'a, P: Port> ResponseReceiver<'a, P> {
    /// Create a receiver with default options.
    pub fn new(port: &'a mut P, format: ReplyFormat) -> Self {
        Self::with_config(port, format, ResponseConfig::default())
    }

    /// Create a receiver with custom options.
    pub fn with_config(port: &'a mut P, format: ReplyFormat, config: ResponseConfig) -> Self {
        Self {
            port,
            format,
            config,
            diagnostics: Vec::new(),
        }
    }

    /// Diagnostic lines seen while waiting.
    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    /// Consume the receiver, keeping the diagnostic lines.
    pub fn into_diagnostics(self) -> Vec<String> {
        self.diagnostics
    }

    /// Wait up to `timeout` for a reply.
    ///
    /// A timeout yields [`PredictionResult::None`]; only transport failures
    /// and cancellation are errors.
    pub fn receive(&mut self, timeout: Duration) -> Result<PredictionResult> {
        self.port
            .set_timeout(self.config.poll_interval)?;
        match self.format {
            ReplyFormat::Raw => self.receive_raw(timeout),
            ReplyFormat::Lines => self.receive_lines(timeout),
        }
    }

    fn receive_raw(&mut self, timeout: Duration) -> Result<PredictionResult> {
        if !self
            .config
            .reply_delay
            .is_zero()
        {
            thread::sleep(self.config.reply_delay);
        }

        let start = Instant::now();
        let mut buf = vec![0u8; self.config.raw_window.max(1)];
        let mut len = 0;

        while len < buf.len() && start.elapsed() < timeout {
            check_interrupt()?;
            let n = self
                .port
                .read_some(&mut buf[len..])
                .map_err(|e| Error::transport(Phase::Response, e))?;
            if n == 0 && len > 0 {
                // Reply burst is over
                break;
            }
            len += n;
        }

        let reply = &buf[..len];
        if reply.is_empty() {
            warn!("No reply within {}ms", timeout.as_millis());
        } else {
            debug!("Reply bytes: {reply:02X?}");
        }

        let result = classify_reply(reply);
        if let PredictionResult::Text { text, .. } = &result {
            info!("Device replied with text: {text:?}");
        }
        Ok(result)
    }

    fn receive_lines(&mut self, timeout: Duration) -> Result<PredictionResult> {
        let start = Instant::now();
        let mut buf = [0u8; 256];
        let mut lines = LineBuffer::new();

        while start.elapsed() < timeout {
            check_interrupt()?;
            let n = self
                .port
                .read_some(&mut buf)
                .map_err(|e| Error::transport(Phase::Response, e))?;

            for line in lines.push(&buf[..n]) {
                if let Some(result) = self.handle_line(line) {
                    return Ok(result);
                }
            }
        }

        // A final line without its newline still counts
        if let Some(result) = lines
            .finish()
            .and_then(|line| self.handle_line(line))
        {
            return Ok(result);
        }

        warn!("No prediction within {}s", timeout.as_secs_f32());
        Ok(PredictionResult::None)
    }

    /// Log or record one device line; a valid prediction ends the wait.
    fn handle_line(&mut self, line: String) -> Option<PredictionResult> {
        let digit = match classify_line(&line) {
            ReplyLine::Prediction(digit) => digit,
            ReplyLine::Malformed(raw) => {
                warn!("Unparseable prediction line: {raw:?}");
                return None;
            },
            ReplyLine::Diagnostic(raw) => {
                info!("Device: {raw}");
                self.diagnostics
                    .push(raw.to_string());
                return None;
            },
            ReplyLine::Other(raw) => {
                debug!("Device: {raw}");
                return None;
            },
        };
        info!("Device: {line}");
        Some(PredictionResult::Text {
            text: line,
            digit: Some(digit),
        })
    }
}

fn check_interrupt() -> Result<()> {
    if is_interrupted_requested() {
        Err(Error::Interrupted {
            phase: Phase::Response,
        })
    } else {
        Ok(())
    }
}
