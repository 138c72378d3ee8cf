//! Text helpers for the line-oriented device output.

/// Accumulates raw bytes and yields complete, trimmed lines.
///
/// Bytes after the last newline stay buffered until more data arrives, so a
/// line (or a UTF-8 sequence) split across reads is reassembled.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes and return every line completed by them.
    ///
    /// Blank lines are dropped; invalid UTF-8 is replaced.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending
            .extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self
            .pending
            .iter()
            .position(|&b| b == b'\n')
        {
            let raw: Vec<u8> = self
                .pending
                .drain(..=pos)
                .collect();
            let line = String::from_utf8_lossy(&raw)
                .trim()
                .to_string();
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }

    /// Take the unterminated remainder, if it holds any text.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        let line = String::from_utf8_lossy(&rest)
            .trim()
            .to_string();
        (!line.is_empty()).then_some(line)
    }
}

/// Decode bytes for a text scan, dropping anything that is not valid UTF-8.
pub fn decode_lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .chars()
        .filter(|&c| c != char::REPLACEMENT_CHARACTER)
        .collect()
}
