//! Byte-chunk to line framing for streamed response bodies.

/// Incremental line splitter for a response body delivered in arbitrary chunks.
///
/// Bytes are buffered until a `\n` terminator arrives, and only complete lines
/// are decoded. Because `\n` never occurs inside a multi-byte UTF-8 sequence,
/// characters split across chunks are reassembled before decoding. A trailing
/// `\r` is stripped so CRLF bodies frame the same way as LF bodies.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    carry: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one body chunk and drain every line it completes.
    ///
    /// Only the newly appended bytes are scanned for a terminator, so a long
    /// line delivered in many small chunks costs time linear in its length.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let Some(newline_in_chunk) = chunk.iter().rposition(|byte| *byte == b'\n') else {
            self.carry.extend_from_slice(chunk);
            return Vec::new();
        };

        let last_newline = self.carry.len() + newline_in_chunk;
        self.carry.extend_from_slice(chunk);
        let remainder = self.carry.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.carry, remainder);

        complete[..complete.len() - 1]
            .split(|byte| *byte == b'\n')
            .map(|line| {
                let line = line.strip_suffix(b"\r").unwrap_or(line);
                String::from_utf8_lossy(line).into_owned()
            })
            .collect()
    }

    /// Number of buffered bytes not yet terminated by a newline.
    pub fn pending_len(&self) -> usize {
        self.carry.len()
    }

    /// Ends the body. An unterminated trailing segment is never emitted; the
    /// number of discarded bytes is returned for diagnostics.
    pub fn finish(&mut self) -> usize {
        let discarded = self.carry.len();
        self.carry.clear();
        discarded
    }

    /// Split a complete body in one shot.
    pub fn decode_all(input: &[u8]) -> Vec<String> {
        let mut decoder = Self::default();
        let lines = decoder.feed(input);
        decoder.finish();
        lines
    }
}
