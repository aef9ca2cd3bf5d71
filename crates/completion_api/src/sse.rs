use crate::decoder::Utf8Decoder;

const DATA_PREFIX: &str = "data:";

/// Incremental line framer for event-stream bodies.
///
/// Every `\n` terminates a line, so producers that separate frames with one
/// newline and producers that use a blank line between frames yield the same
/// payload sequence. Only `data:` lines carry payloads; blank lines, `event:`
/// fields and `:` comments are dropped. An unterminated trailing line is kept
/// until a later chunk completes it.
#[derive(Debug, Default)]
pub struct SseStreamParser {
    decoder: Utf8Decoder,
    buffer: String,
    /// Prefix of `buffer` already known to hold no `\n`.
    scanned: usize,
}

impl SseStreamParser {
    /// Feed arbitrary bytes into the parser and drain complete `data:` payloads.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        let text = self.decoder.decode(bytes);
        self.buffer.push_str(&text);

        let mut payloads = Vec::new();
        let mut consumed = 0;
        let mut search_from = self.scanned;

        while let Some(offset) = self.buffer[search_from..].find('\n') {
            let end = search_from + offset;
            if let Some(payload) = extract_data_payload(&self.buffer[consumed..end]) {
                payloads.push(payload.to_owned());
            }
            consumed = end + 1;
            search_from = consumed;
        }

        self.buffer.drain(..consumed);
        self.scanned = self.buffer.len();
        payloads
    }

    /// Flush the decoder and treat any unterminated trailing text as a final line.
    pub fn finish(&mut self) -> Vec<String> {
        let tail = self.decoder.finish();
        self.buffer.push_str(&tail);

        self.feed(b"\n")
    }

    /// Parse a complete event-stream body in one shot.
    pub fn parse_payloads(input: &str) -> Vec<String> {
        let mut parser = Self::default();
        let mut payloads = parser.feed(input.as_bytes());
        payloads.extend(parser.finish());
        payloads
    }

    /// Drop buffered partial data without parsing it.
    pub fn discard(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
        self.decoder = Utf8Decoder::default();
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.trim().is_empty() && !self.decoder.has_pending()
    }
}

fn extract_data_payload(line: &str) -> Option<&str> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let value = line.strip_prefix(DATA_PREFIX)?;
    let value = value.strip_prefix(' ').unwrap_or(value).trim();

    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::SseStreamParser;

    #[test]
    fn parse_sse_lines_incrementally() {
        let mut parser = SseStreamParser::default();
        let mut payloads = Vec::new();

        payloads.extend(parser.feed(b"data: {\"content\":\"Hello\"}\n\n"));
        assert_eq!(payloads.len(), 1);

        payloads.extend(parser.feed(b"data: [DONE]\n"));
        assert_eq!(payloads, vec!["{\"content\":\"Hello\"}", "[DONE]"]);
        assert!(parser.is_empty_buffer());
    }

    #[test]
    fn crlf_and_non_data_lines_are_tolerated() {
        let payloads = SseStreamParser::parse_payloads(
            ": keep-alive\r\nevent: message\r\ndata:{\"content\":\"x\"}\r\n\r\n",
        );
        assert_eq!(payloads, vec!["{\"content\":\"x\"}"]);
    }

    #[test]
    fn unterminated_tail_is_held_until_finish() {
        let mut parser = SseStreamParser::default();
        assert!(parser.feed(b"data: {\"content\":\"tail\"}").is_empty());
        assert!(!parser.is_empty_buffer());
        assert_eq!(parser.finish(), vec!["{\"content\":\"tail\"}"]);
        assert!(parser.is_empty_buffer());
    }

    #[test]
    fn long_line_in_small_chunks_is_scanned_once() {
        let mut parser = SseStreamParser::default();
        let text = "x".repeat(4096);
        let line = format!("data: {{\"content\":\"{text}\"}}");

        for piece in line.as_bytes().chunks(7) {
            assert!(parser.feed(piece).is_empty());
            assert_eq!(parser.scanned, parser.buffer.len());
        }
        let payloads = parser.feed(b"\ndata: [DONE]\n");

        assert_eq!(payloads, vec![line["data: ".len()..].to_owned(), "[DONE]".to_owned()]);
        assert_eq!(parser.scanned, 0);
        assert!(parser.is_empty_buffer());
    }

    #[test]
    fn discard_drops_partial_line() {
        let mut parser = SseStreamParser::default();
        assert!(parser.feed(b"data: {\"content\":\"ha").is_empty());
        parser.discard();
        assert!(parser.is_empty_buffer());
        assert!(parser.finish().is_empty());
    }
}
