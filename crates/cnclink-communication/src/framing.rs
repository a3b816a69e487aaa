//! Line framing for incoming controller output
//!
//! Transports deliver arbitrary chunks; the controller speaks in lines. The
//! [`LineBuffer`] carries a partial line across chunks so a line split over
//! two reads is still seen once.

/// Longest partial line kept while waiting for a terminator
pub const MAX_PENDING_LINE: usize = 4096;

/// Accumulates chunks and yields complete, trimmed, non-empty lines
#[derive(Debug, Default, Clone)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return the lines it completed
    ///
    /// Lines end at `\n`; a trailing `\r` and surrounding whitespace are
    /// stripped and empty lines are dropped. Invalid UTF-8 is replaced rather
    /// than rejected. A partial line that grows past [`MAX_PENDING_LINE`] is
    /// emitted as-is.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            push_line(&mut lines, &raw);
        }

        if self.pending.len() > MAX_PENDING_LINE {
            tracing::warn!(
                "Flushing unterminated line after {} bytes",
                self.pending.len()
            );
            let raw = std::mem::take(&mut self.pending);
            push_line(&mut lines, &raw);
        }
        lines
    }

    /// Take whatever partial line remains
    pub fn flush(&mut self) -> Option<String> {
        let raw = std::mem::take(&mut self.pending);
        let mut lines = Vec::new();
        push_line(&mut lines, &raw);
        lines.pop()
    }

    /// Bytes waiting for a terminator
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Discard any partial line
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

fn push_line(lines: &mut Vec<String>, raw: &[u8]) {
    let text = String::from_utf8_lossy(raw);
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        lines.push(trimmed.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_splits_and_trims() {
        let mut buf = LineBuffer::new();
        let lines = buf.push(b"ok\r\n<Idle|MPos:0.000,0.000,0.000>\r\n\r\n");
        assert_eq!(lines, vec!["ok", "<Idle|MPos:0.000,0.000,0.000>"]);
        assert_eq!(buf.pending_len(), 0);
    }

    #[test]
    fn test_partial_line_carried_over() {
        let mut buf = LineBuffer::new();
        assert!(buf.push(b"<Idle|WPos:1.0").is_empty());
        assert_eq!(buf.push(b"00,2.000,-0.500>\n"), vec!["<Idle|WPos:1.000,2.000,-0.500>"]);
    }

    #[test]
    fn test_flush_returns_tail() {
        let mut buf = LineBuffer::new();
        buf.push(b"ok\nGrbl 1.1h");
        assert_eq!(buf.flush().as_deref(), Some("Grbl 1.1h"));
        assert_eq!(buf.flush(), None);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut buf = LineBuffer::new();
        let lines = buf.push(&[b'o', 0xff, b'k', b'\n']);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with('o'));
    }

    #[test]
    fn test_oversized_tail_is_emitted() {
        let mut buf = LineBuffer::new();
        let lines = buf.push(&vec![b'x'; MAX_PENDING_LINE + 1]);
        assert_eq!(lines.len(), 1);
        assert_eq!(buf.pending_len(), 0);
    }

    proptest! {
        #[test]
        fn chunking_does_not_change_lines(
            lines in prop::collection::vec("[a-zA-Z0-9<>|:.,$ -]{1,40}", 1..10),
            split in 0usize..400,
        ) {
            let stream: String = lines.iter().map(|l| format!("{l}\r\n")).collect();
            let bytes = stream.as_bytes();
            let split = split.min(bytes.len());

            let mut whole = LineBuffer::new();
            let expected = whole.push(bytes);

            let mut parts = LineBuffer::new();
            let mut got = parts.push(&bytes[..split]);
            got.extend(parts.push(&bytes[split..]));
            prop_assert_eq!(got, expected);
        }
    }
}
