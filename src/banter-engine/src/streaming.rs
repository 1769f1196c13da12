//! Stream framing.
//!
//! The service sends a reply as newline-delimited `data: ` records over
//! a chunked response body. The transport may cut the body anywhere,
//! including between the bytes of one multi-byte UTF-8 character, so
//! the framer accumulates raw bytes, decodes only complete characters,
//! and emits only newline-terminated records.

/// Prefix marking a line as an event record.
const RECORD_PREFIX: &str = "data: ";

/// Incremental framer that turns transport chunks into record payloads.
///
/// Holds two buffers: raw bytes whose tail may be an incomplete UTF-8
/// sequence, and decoded text whose tail may be an unterminated line.
/// A line without a trailing newline is never emitted; if the stream
/// closes first, that tail is discarded.
pub struct EventFramer {
    /// Accumulated bytes that may end mid-character.
    bytes: Vec<u8>,
    /// Decoded text not yet terminated by a newline.
    text: String,
}

impl EventFramer {
    /// Create an empty framer.
    pub fn new() -> Self {
        Self {
            bytes: Vec::new(),
            text: String::new(),
        }
    }

    /// Feed one transport chunk and collect the payloads of every
    /// record the chunk completed, in arrival order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.bytes.extend_from_slice(chunk);

        let boundary = self.utf8_boundary();
        if boundary == self.bytes.len() {
            let complete = std::mem::take(&mut self.bytes);
            self.text.push_str(&String::from_utf8_lossy(&complete));
        } else {
            let complete: Vec<u8> = self.bytes.drain(..boundary).collect();
            self.text.push_str(&String::from_utf8_lossy(&complete));

            if !is_incomplete_utf8_start(&self.bytes) {
                // The leftover is invalid rather than a split character.
                // Decode it lossily now so it cannot block later chunks.
                let rest = std::mem::take(&mut self.bytes);
                self.text.push_str(&String::from_utf8_lossy(&rest));
            }
        }

        self.drain_complete_lines()
    }

    /// Emit every newline-terminated line, keeping the unterminated tail.
    fn drain_complete_lines(&mut self) -> Vec<String> {
        let mut records = Vec::new();

        while let Some(pos) = self.text.find('\n') {
            let line: String = self.text.drain(..=pos).collect();
            let line = &line[..line.len() - 1];

            if let Some(payload) = line.strip_prefix(RECORD_PREFIX) {
                records.push(payload.to_string());
            }
        }

        records
    }

    /// Find the position up to which the byte buffer contains valid
    /// UTF-8. Returns the number of bytes that form complete characters.
    fn utf8_boundary(&self) -> usize {
        let len = self.bytes.len();

        // Try the full buffer first
        if std::str::from_utf8(&self.bytes).is_ok() {
            return len;
        }

        // Check trailing bytes that might be incomplete multi-byte sequences
        // UTF-8 encoding:
        // - 1 byte:  0xxxxxxx
        // - 2 bytes: 110xxxxx 10xxxxxx
        // - 3 bytes: 1110xxxx 10xxxxxx 10xxxxxx
        // - 4 bytes: 11110xxx 10xxxxxx 10xxxxxx 10xxxxxx
        for trailing in 1..=3.min(len) {
            let boundary = len - trailing;
            if std::str::from_utf8(&self.bytes[..boundary]).is_ok()
                && is_incomplete_utf8_start(&self.bytes[boundary..])
            {
                return boundary;
            }
        }

        // Fallback: return what parses
        for i in (0..len).rev() {
            if std::str::from_utf8(&self.bytes[..i]).is_ok() {
                return i;
            }
        }

        0
    }

    /// Check whether anything fed in has not yet been emitted.
    pub fn has_partial(&self) -> bool {
        !self.bytes.is_empty() || !self.text.is_empty()
    }

    /// Number of bytes still awaiting a character or line boundary.
    pub fn pending_bytes(&self) -> usize {
        self.bytes.len() + self.text.len()
    }
}

impl Default for EventFramer {
    fn default() -> Self {
        Self::new()
    }
}

/// Check if bytes look like the start of an incomplete UTF-8 sequence.
fn is_incomplete_utf8_start(bytes: &[u8]) -> bool {
    let Some(&first) = bytes.first() else {
        return false;
    };

    if first & 0b11100000 == 0b11000000 {
        // 2-byte sequence, need 2 bytes
        bytes.len() < 2
    } else if first & 0b11110000 == 0b11100000 {
        // 3-byte sequence, need 3 bytes
        bytes.len() < 3
    } else if first & 0b11111000 == 0b11110000 {
        // 4-byte sequence, need 4 bytes
        bytes.len() < 4
    } else {
        false
    }
}
