//! SSE frame reassembly
//!
//! Transport reads do not align with semantic frames: a chunk boundary can
//! land mid-line, so complete lines must be reassembled from a persistent
//! carry-over buffer across reads. The parser splits on newline boundaries
//! and retains the last (possibly incomplete) line as the new carry-over.

/// Terminal payload signalling successful end of stream
pub const DONE_MARKER: &str = "[DONE]";

/// Reassembles complete lines from arbitrarily-split byte chunks
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
}

impl SseParser {
    /// Create an empty parser
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes and return the complete lines they unlocked
    ///
    /// The last line is only returned once its trailing newline arrives;
    /// until then it stays buffered.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));

        let Some(pos) = self.buffer.rfind('\n') else {
            return Vec::new();
        };

        let complete = self.buffer[..=pos].to_string();
        self.buffer = self.buffer[pos + 1..].to_string();

        complete
            .lines()
            .map(|line| line.trim_end_matches('\r').to_string())
            .collect()
    }

    /// Whatever is still buffered without a terminating newline
    pub fn remainder(&self) -> &str {
        &self.buffer
    }
}

/// Extract the payload of a `data:` line
///
/// Returns `None` for empty lines, comments, and other SSE fields.
pub fn data_payload(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("data:")?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}

/// Whether a `data:` payload is the terminal marker
pub fn is_done(payload: &str) -> bool {
    payload.trim() == DONE_MARKER
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_lines_pass_through() {
        let mut parser = SseParser::new();
        let lines = parser.push(b"data: one\ndata: two\n");
        assert_eq!(lines, vec!["data: one", "data: two"]);
        assert!(parser.remainder().is_empty());
    }

    #[test]
    fn test_incomplete_line_is_retained() {
        let mut parser = SseParser::new();
        let lines = parser.push(b"data: {\"partial\":");
        assert!(lines.is_empty());
        assert_eq!(parser.remainder(), "data: {\"partial\":");

        let lines = parser.push(b" 1}\n");
        assert_eq!(lines, vec!["data: {\"partial\": 1}"]);
        assert!(parser.remainder().is_empty());
    }

    #[test]
    fn test_split_across_three_reads() {
        let mut parser = SseParser::new();
        assert!(parser.push(b"da").is_empty());
        assert!(parser.push(b"ta: hel").is_empty());
        let lines = parser.push(b"lo\n\n");
        assert_eq!(lines, vec!["data: hello", ""]);
    }

    #[test]
    fn test_crlf_line_endings() {
        let mut parser = SseParser::new();
        let lines = parser.push(b"data: x\r\ndata: y\r\n");
        assert_eq!(lines, vec!["data: x", "data: y"]);
    }

    #[test]
    fn test_mixed_complete_and_partial() {
        let mut parser = SseParser::new();
        let lines = parser.push(b"data: a\ndata: b");
        assert_eq!(lines, vec!["data: a"]);
        assert_eq!(parser.remainder(), "data: b");
    }

    #[test]
    fn test_data_payload_extraction() {
        assert_eq!(data_payload("data: {\"x\":1}"), Some("{\"x\":1}"));
        assert_eq!(data_payload("data:{\"x\":1}"), Some("{\"x\":1}"));
        assert_eq!(data_payload("event: ping"), None);
        assert_eq!(data_payload(": keepalive comment"), None);
        assert_eq!(data_payload(""), None);
    }

    #[test]
    fn test_done_marker() {
        assert!(is_done("[DONE]"));
        assert!(is_done(" [DONE] "));
        assert!(!is_done("{\"done\": true}"));
    }
}
