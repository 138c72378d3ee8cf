//! Scripted port for protocol tests.
//!
//! Reads and writes are independent: reads replay a script of events, writes
//! are recorded one entry per successful `write` call.

use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use crate::error::Result;
use crate::port::Port;

enum Event {
    Bytes(Vec<u8>),
    Silence,
    Error(ErrorKind),
}

pub(crate) struct MockPort {
    script: VecDeque<Event>,
    writes: Vec<Vec<u8>>,
    write_errors: VecDeque<ErrorKind>,
    flushes: usize,
    clears: usize,
    closed: bool,
    timeout: Duration,
}

impl MockPort {
    pub(crate) fn new() -> Self {
        Self {
            script: VecDeque::new(),
            writes: Vec::new(),
            write_errors: VecDeque::new(),
            flushes: 0,
            clears: 0,
            closed: false,
            timeout: Duration::from_millis(10),
        }
    }

    /// One read returns these bytes (split across reads if the buffer is short).
    pub(crate) fn push_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.script.push_back(Event::Bytes(bytes.to_vec()));
        self
    }

    /// One read times out.
    pub(crate) fn push_silence(&mut self) -> &mut Self {
        self.script.push_back(Event::Silence);
        self
    }

    /// One read fails with `kind`.
    pub(crate) fn push_error(&mut self, kind: ErrorKind) -> &mut Self {
        self.script.push_back(Event::Error(kind));
        self
    }

    /// The next `write` fails with `kind` and records nothing.
    pub(crate) fn push_write_error(&mut self, kind: ErrorKind) -> &mut Self {
        self.write_errors.push_back(kind);
        self
    }

    /// Script a sequence of single-byte ack reads; `None` is a timeout.
    pub(crate) fn with_acks(acks: &[Option<u8>]) -> Self {
        let mut port = Self::new();
        for ack in acks {
            match ack {
                Some(b) => port.push_bytes(&[*b]),
                None => port.push_silence(),
            };
        }
        port
    }

    pub(crate) fn writes(&self) -> &[Vec<u8>] {
        &self.writes
    }

    pub(crate) fn written(&self) -> Vec<u8> {
        self.writes.concat()
    }

    pub(crate) fn flushes(&self) -> usize {
        self.flushes
    }

    pub(crate) fn clears(&self) -> usize {
        self.clears
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Read for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self.script.pop_front() {
            Some(Event::Bytes(mut bytes)) => {
                let n = buf.len().min(bytes.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    let rest = bytes.split_off(n);
                    self.script.push_front(Event::Bytes(rest));
                }
                Ok(n)
            },
            Some(Event::Error(kind)) => Err(std::io::Error::new(kind, "scripted error")),
            Some(Event::Silence) | None => {
                Err(std::io::Error::new(ErrorKind::TimedOut, "no data"))
            },
        }
    }
}

impl Write for MockPort {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.closed {
            return Err(std::io::Error::new(ErrorKind::NotConnected, "port closed"));
        }
        if let Some(kind) = self.write_errors.pop_front() {
            return Err(std::io::Error::new(kind, "scripted write error"));
        }
        self.writes.push(buf.to_vec());
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flushes += 1;
        Ok(())
    }
}

impl Port for MockPort {
    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.timeout = timeout;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn clear_buffers(&mut self) -> Result<()> {
        self.clears += 1;
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}
