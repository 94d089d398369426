//! Line framing for streamed response bodies (SSE and NDJSON).
//!
//! Transport chunks are appended to a byte buffer and split on `\n`. A trailing partial
//! line stays buffered until the next chunk completes it, so a multi-byte UTF-8 sequence
//! split across chunks is only decoded once whole.

use bytes::Bytes;
use futures::{stream, StreamExt};

use crate::{BoxStream, Result};

/// Accumulates raw bytes and hands out complete lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and return every line it completed, without terminators.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(idx) = self.buf.iter().position(|b| *b == b'\n') {
            let rest = self.buf.split_off(idx + 1);
            let mut line = std::mem::replace(&mut self.buf, rest);
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Flush the unterminated remainder at end of input.
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buf);
        let text = String::from_utf8_lossy(&line);
        let text = text.trim_end_matches('\r');
        if text.trim().is_empty() {
            None
        } else {
            Some(text.to_string())
        }
    }

    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

/// Payload carried by one line, or `None` for framing noise.
///
/// `data:` prefixes are stripped; blank lines, `:` comments and `event:`/`id:`/`retry:`
/// fields are skipped. Anything else is returned trimmed, which covers NDJSON bodies.
pub fn line_payload(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with(':') {
        return None;
    }
    if let Some(rest) = trimmed.strip_prefix("data:") {
        let rest = rest.trim_start();
        return if rest.is_empty() { None } else { Some(rest) };
    }
    if ["event:", "id:", "retry:"].iter().any(|f| trimmed.starts_with(f)) {
        return None;
    }
    Some(trimmed)
}

/// Turn a byte stream into a stream of line payloads.
pub fn payload_stream(input: BoxStream<'static, Bytes>) -> BoxStream<'static, String> {
    let stream = stream::unfold(
        (input, LineBuffer::new(), std::collections::VecDeque::<String>::new(), false),
        |(mut input, mut buffer, mut ready, mut eof)| async move {
            loop {
                if let Some(payload) = ready.pop_front() {
                    return Some((Ok(payload), (input, buffer, ready, eof)));
                }
                if eof {
                    return None;
                }
                match input.next().await {
                    Some(Ok(bytes)) => {
                        let lines = buffer.push(&bytes);
                        ready.extend(lines.iter().filter_map(|l| line_payload(l)).map(String::from));
                    }
                    Some(Err(e)) => {
                        eof = true;
                        return Some((Err(e), (input, buffer, ready, eof)));
                    }
                    None => {
                        eof = true;
                        if let Some(line) = buffer.finish() {
                            ready.extend(line_payload(&line).map(String::from));
                        }
                    }
                }
            }
        },
    );
    Box::pin(stream)
}

/// Collect a finite byte stream into payloads. Used for bodies that arrived whole.
pub fn payloads_of(body: &[u8]) -> Vec<String> {
    let mut buffer = LineBuffer::new();
    let mut lines = buffer.push(body);
    lines.extend(buffer.finish());
    lines
        .iter()
        .filter_map(|l| line_payload(l))
        .map(String::from)
        .collect()
}

pub(crate) fn ok_chunks(chunks: Vec<Bytes>) -> BoxStream<'static, Bytes> {
    Box::pin(stream::iter(chunks.into_iter().map(Result::Ok)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_line_is_retained() {
        let mut buffer = LineBuffer::new();
        assert!(buffer.push(b"data: {\"a\":").is_empty());
        assert_eq!(buffer.pending(), 12);
        let lines = buffer.push(b"1}\n\ndata: [DONE]\n");
        assert_eq!(lines, vec!["data: {\"a\":1}", "", "data: [DONE]"]);
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn test_split_utf8_sequence_survives() {
        let text = "data: {\"t\":\"héllo\"}\n".as_bytes();
        let split = text.iter().position(|b| *b == 0xc3).unwrap() + 1;
        let mut buffer = LineBuffer::new();
        assert!(buffer.push(&text[..split]).is_empty());
        let lines = buffer.push(&text[split..]);
        assert_eq!(lines, vec!["data: {\"t\":\"héllo\"}"]);
    }

    #[test]
    fn test_crlf_and_framing_noise() {
        assert_eq!(line_payload("data: {}\r"), Some("{}"));
        assert_eq!(line_payload("data:{}"), Some("{}"));
        assert_eq!(line_payload(": keep-alive"), None);
        assert_eq!(line_payload("event: message_start"), None);
        assert_eq!(line_payload("   "), None);
        assert_eq!(line_payload("{\"ndjson\":true}"), Some("{\"ndjson\":true}"));
    }

    #[tokio::test]
    async fn test_payload_stream_flushes_unterminated_tail() {
        let chunks = vec![
            Bytes::from_static(b"data: one\n"),
            Bytes::from_static(b": ping\ndata: tw"),
            Bytes::from_static(b"o"),
        ];
        let payloads: Vec<String> = payload_stream(ok_chunks(chunks))
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(payloads, vec!["one", "two"]);
    }
}
