//! Server-sent-event parsing.
//!
//! A stream is a sequence of messages separated by blank lines; each message
//! is a list of `field: value` lines. Recognized field names are `data`,
//! `event`, `id`, and `retry`; an empty field name is a comment. A
//! `data: [DONE]` sentinel closes the stream without producing content, and
//! an `event: error` message surfaces its comment as the error message.

use aiperf_common::{AIPerfError, AIPerfResult};

/// The sentinel data value that terminates a stream.
pub const SSE_DONE_SENTINEL: &str = "[DONE]";

/// Status code attached to explicit SSE error events.
const SSE_ERROR_CODE: u16 = 502;

/// One `name: value` line of an SSE message. An empty name is a comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SSEField {
    pub name: String,
    pub value: String,
}

impl SSEField {
    pub fn is_comment(&self) -> bool {
        self.name.is_empty()
    }

    pub fn is_data(&self) -> bool {
        self.name == "data"
    }
}

/// Parse one SSE message (the lines between blank-line separators).
///
/// Whitespace-only input yields no fields. An `event: error` message is
/// surfaced as a typed error carrying the comment text.
pub fn parse_sse_message(message: &str) -> AIPerfResult<Vec<SSEField>> {
    let mut fields = Vec::new();
    for line in message.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let field = match line.split_once(':') {
            Some((name, value)) => SSEField {
                name: name.trim().to_string(),
                value: value.strip_prefix(' ').unwrap_or(value).to_string(),
            },
            // A line without a colon is a field with an empty value.
            None => SSEField {
                name: line.trim().to_string(),
                value: String::new(),
            },
        };
        fields.push(field);
    }

    let is_error_event = fields
        .iter()
        .any(|f| f.name == "event" && f.value == "error");
    if is_error_event {
        let message = fields
            .iter()
            .find(|f| f.is_comment())
            .map(|f| f.value.clone())
            .unwrap_or_else(|| "unspecified SSE error event".to_string());
        return Err(AIPerfError::SSEResponse {
            message,
            code: SSE_ERROR_CODE,
        });
    }

    Ok(fields)
}

/// Incremental splitter feeding raw bytes and yielding complete messages.
#[derive(Default)]
pub struct SSEMessageSplitter {
    buffer: String,
}

impl SSEMessageSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes and return every message completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));
        // Normalize CRLF separators before splitting on blank lines.
        if self.buffer.contains('\r') {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }

        let mut messages = Vec::new();
        while let Some(split_at) = self.buffer.find("\n\n") {
            let message: String = self.buffer.drain(..split_at + 2).collect();
            let trimmed = message.trim_end_matches('\n');
            if !trimmed.trim().is_empty() {
                messages.push(trimmed.to_string());
            }
        }
        messages
    }

    /// Whatever is left once the stream ends, as a final message.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        let trimmed = rest.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_inputs_yield_zero_fields() {
        for input in ["", "\n", "   "] {
            let fields = parse_sse_message(input).expect("parse");
            assert!(fields.is_empty(), "input {input:?} produced {fields:?}");
        }
    }

    #[test]
    fn test_single_data_field() {
        let fields = parse_sse_message("data: X").expect("parse");
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].name, "data");
        assert_eq!(fields[0].value, "X");
        assert!(fields[0].is_data());
    }

    #[test]
    fn test_data_without_space_after_colon() {
        let fields = parse_sse_message("data:X").expect("parse");
        assert_eq!(fields[0].value, "X");
    }

    #[test]
    fn test_comment_field() {
        let fields = parse_sse_message(": keep-alive").expect("parse");
        assert_eq!(fields.len(), 1);
        assert!(fields[0].is_comment());
        assert_eq!(fields[0].value, "keep-alive");
    }

    #[test]
    fn test_error_event_surfaces_comment() {
        let result = parse_sse_message("event: error\n: RateLimit");
        match result {
            Err(AIPerfError::SSEResponse { message, code }) => {
                assert_eq!(code, 502);
                assert!(message.contains("RateLimit"));
            }
            other => panic!("expected SSE response error, got {other:?}"),
        }
    }

    #[test]
    fn test_multi_field_message() {
        let fields =
            parse_sse_message("event: message\nid: 7\ndata: {\"x\":1}").expect("parse");
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[2].value, "{\"x\":1}");
    }

    #[test]
    fn test_splitter_handles_partial_chunks() {
        let mut splitter = SSEMessageSplitter::new();
        assert!(splitter.feed(b"data: par").is_empty());
        let messages = splitter.feed(b"tial\n\ndata: second\n\n");
        assert_eq!(messages, vec!["data: partial", "data: second"]);
        assert!(splitter.finish().is_none());
    }

    #[test]
    fn test_splitter_crlf_normalization() {
        let mut splitter = SSEMessageSplitter::new();
        let messages = splitter.feed(b"data: one\r\n\r\ndata: two\r\n\r\n");
        assert_eq!(messages, vec!["data: one", "data: two"]);
    }

    #[test]
    fn test_splitter_finish_returns_trailing_message() {
        let mut splitter = SSEMessageSplitter::new();
        assert!(splitter.feed(b"data: tail").is_empty());
        assert_eq!(splitter.finish().expect("trailing"), "data: tail");
    }
}
