//! Reassembly of newline-delimited controller output

/// Accumulates inbound bytes and yields complete lines.
///
/// Only the unterminated tail is kept between calls, so the lines produced
/// do not depend on how the bytes were split across reads.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append freshly read bytes
    pub fn extend(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Take the next complete line, with `\n` and one trailing `\r` removed.
    ///
    /// Empty lines are returned as empty strings; callers decide whether to skip them.
    pub fn next_line(&mut self) -> Option<String> {
        let end = self.pending.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.pending.drain(..=end).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Bytes received after the last complete line
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
