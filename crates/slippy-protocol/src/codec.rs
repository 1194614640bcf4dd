//! Newline-delimited codec for the client side of the router.
//!
//! TCP delivers a byte stream, not messages: one read may carry half an
//! envelope or several of them. The codec accumulates received bytes and hands
//! back complete lines, one envelope per line.

use bytes::BytesMut;

use crate::error::{ProtocolError, ProtocolResult};

/// Maximum length of a single buffered line.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// A codec for re-framing newline-delimited envelopes.
#[derive(Debug, Default)]
pub struct LineCodec {
    /// Buffer for accumulating incoming data.
    buffer: BytesMut,
}

impl LineCodec {
    /// Create a new line codec.
    pub fn new() -> Self {
        LineCodec {
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Add received data to the buffer.
    ///
    /// If the data leaves an unterminated line longer than [`MAX_LINE_LENGTH`],
    /// the pending partial line is dropped and an overflow error is returned.
    /// Complete lines already in the buffer are kept.
    pub fn push(&mut self, data: &[u8]) -> ProtocolResult<()> {
        self.buffer.extend_from_slice(data);

        let tail_start = self
            .buffer
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(0, |i| i + 1);
        let tail_len = self.buffer.len() - tail_start;

        if tail_len > MAX_LINE_LENGTH {
            self.buffer.truncate(tail_start);
            log::debug!("dropped {} byte partial line", tail_len);
            return Err(ProtocolError::BufferOverflow {
                max: MAX_LINE_LENGTH,
                actual: tail_len,
            });
        }

        Ok(())
    }

    /// Try to decode a complete line from the buffer.
    ///
    /// The trailing `\n` (and a `\r` before it) is stripped and blank lines
    /// are skipped. A line that is not valid UTF-8 is consumed and returned as
    /// a malformed request. Returns `None` if more data is needed.
    pub fn decode_line(&mut self) -> Option<ProtocolResult<String>> {
        loop {
            let end = self.buffer.iter().position(|&b| b == b'\n')?;
            let mut line = self.buffer.split_to(end + 1);
            line.truncate(end);
            if line.last() == Some(&b'\r') {
                line.truncate(end - 1);
            }

            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            return Some(
                String::from_utf8(line.to_vec())
                    .map_err(|e| ProtocolError::malformed(format!("request is not UTF-8: {}", e))),
            );
        }
    }

    /// Get the number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }
}
