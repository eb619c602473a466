//! Newline framing for device byte streams
//!
//! The glove speaks UTF-8 text, one message per `\n`-terminated line, with an
//! optional `\r` before the terminator. Reads from serial ports and radio
//! notifications arrive in arbitrary chunk sizes, so the framer keeps the
//! unterminated tail between reads.
//!
//! Bytes are buffered rather than characters: a multi-byte UTF-8 sequence
//! split across two reads is reassembled before decoding.
//!
//! There is no upper bound on the pending tail. A device that never sends a
//! terminator grows the buffer for as long as the link stays open; this is an
//! accepted risk of the line protocol.

/// Splits a byte stream into complete, trimmed, non-empty lines.
#[derive(Debug, Default)]
pub struct LineFramer {
    pending: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every line it completes, in arrival order.
    ///
    /// Lines that are empty after trimming are keep-alive noise and are not
    /// returned. Invalid UTF-8 is decoded lossily.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let Some(last_newline) = self.pending.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        // Everything up to and including the last terminator is complete;
        // the remainder becomes the new pending tail.
        let tail = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, tail);

        complete
            .split(|&b| b == b'\n')
            .filter_map(|segment| {
                let segment = segment.strip_suffix(b"\r").unwrap_or(segment);
                let text = String::from_utf8_lossy(segment);
                let trimmed = text.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            })
            .collect()
    }

    /// Number of buffered bytes still waiting for a terminator
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Discard the unterminated tail (end of stream or cancellation).
    ///
    /// Returns how many bytes were dropped. Partial lines are never emitted.
    pub fn discard(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }
}
