use super::logging::emit_frame_dropped;
use crate::types::StreamEvent;

const FRAME_SEPARATOR: &str = "\n\n";
const DATA_MARKER: &str = "data:";

/// Events decoded from the complete frames at the front of a text chunk.
#[derive(Debug, Default, PartialEq)]
pub struct DecodedFrames {
    pub events: Vec<StreamEvent>,
    /// Byte offset just past the last complete frame. Anything after it is a
    /// partial frame the caller has to carry into the next chunk.
    pub consumed: usize,
}

/// Decodes every blank-line terminated frame in `text`. Stateless: a trailing
/// frame without its separator is left undecoded and excluded from `consumed`.
pub fn decode_frames(text: &str) -> DecodedFrames {
    let mut decoded = DecodedFrames::default();

    while let Some(end) = text[decoded.consumed..].find(FRAME_SEPARATOR) {
        let frame = &text[decoded.consumed..decoded.consumed + end];
        decoded.consumed += end + FRAME_SEPARATOR.len();

        if let Some(event) = decode_frame(frame) {
            decoded.events.push(event);
        }
    }

    decoded
}

fn decode_frame(frame: &str) -> Option<StreamEvent> {
    let mut payload: Option<String> = None;
    for line in frame.lines() {
        let Some(rest) = line.trim_start().strip_prefix(DATA_MARKER) else {
            continue;
        };
        let rest = rest.trim();
        match payload.as_mut() {
            Some(existing) => {
                existing.push('\n');
                existing.push_str(rest);
            }
            None => payload = Some(rest.to_string()),
        }
    }

    let payload = payload?;
    if payload.trim().is_empty() {
        return None;
    }

    match serde_json::from_str::<serde_json::Value>(&payload) {
        Ok(value) => {
            let event = StreamEvent::from_payload(value);
            if event.is_none() {
                emit_frame_dropped(&payload, "payload is not a JSON object");
            }
            event
        }
        Err(error) => {
            emit_frame_dropped(&payload, &error.to_string());
            None
        }
    }
}

/// Carries undecoded bytes across transport chunks and feeds complete frames to
/// [`decode_frames`].
#[derive(Default)]
pub struct StreamParser {
    buffer: String,
    pending_bytes: Vec<u8>,
}

impl StreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.push_bytes(chunk);

        let decoded = decode_frames(&self.buffer);
        if decoded.consumed > 0 {
            self.buffer.drain(..decoded.consumed);
        }
        decoded.events
    }

    /// Decodes whatever is left once the transport is exhausted, treating it as
    /// one final frame.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if !self.pending_bytes.is_empty() {
            let tail = std::mem::take(&mut self.pending_bytes);
            self.buffer.push_str(&String::from_utf8_lossy(&tail));
        }
        let mut rest = std::mem::take(&mut self.buffer);
        if rest.trim().is_empty() {
            return Vec::new();
        }
        rest.push_str(FRAME_SEPARATOR);
        decode_frames(&rest).events
    }

    pub fn remainder(&self) -> &str {
        &self.buffer
    }

    fn push_bytes(&mut self, chunk: &[u8]) {
        self.pending_bytes.extend_from_slice(chunk);

        let mut text = String::new();
        let mut start = 0;
        while start < self.pending_bytes.len() {
            let rest = &self.pending_bytes[start..];
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    text.push_str(valid);
                    start = self.pending_bytes.len();
                }
                Err(error) => {
                    let valid_end = start + error.valid_up_to();
                    text.push_str(&String::from_utf8_lossy(&self.pending_bytes[start..valid_end]));
                    match error.error_len() {
                        // An incomplete multi-byte sequence at the end waits for the next chunk.
                        None => {
                            start = valid_end;
                            break;
                        }
                        Some(bad) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            start = valid_end + bad;
                        }
                    }
                }
            }
        }

        self.pending_bytes.drain(..start);
        self.push_text(&text);
    }

    fn push_text(&mut self, text: &str) {
        self.buffer.extend(text.chars().filter(|ch| *ch != '\r'));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_frames_stops_at_partial_frame() {
        let text = "data: {\"token\":\"a\"}\n\ndata: {\"tok";
        let decoded = decode_frames(text);
        assert_eq!(decoded.events.len(), 1);
        assert_eq!(&text[decoded.consumed..], "data: {\"tok");
    }

    #[test]
    fn test_decode_frames_ignores_frames_without_marker_or_payload() {
        let text = "event: ping\n\ndata:   \n\n: comment\n\ndata: {\"done\":true}\n\n";
        let decoded = decode_frames(text);
        assert_eq!(decoded.events.len(), 1);
        assert!(decoded.events[0].done);
        assert_eq!(decoded.consumed, text.len());
    }

    #[test]
    fn test_decode_frames_reads_data_line_after_other_fields() {
        let decoded = decode_frames("event: message\nid: 3\ndata: {\"token\":\"x\"}\n\n");
        assert_eq!(decoded.events[0].token_text(), Some("x"));
    }

    #[test]
    fn test_parser_handles_crlf_split_across_chunks() {
        let mut parser = StreamParser::new();
        assert!(parser.process(b"data: {\"token\":\"a\"}\r\n\r").is_empty());
        let events = parser.process(b"\n");
        assert_eq!(events.len(), 1);
        assert_eq!(parser.remainder(), "");
    }

    #[test]
    fn test_parser_keeps_multibyte_char_split_across_chunks() {
        let frame = "data: {\"token\":\"caf\u{e9}\"}\n\n".as_bytes();
        let split = frame
            .iter()
            .position(|byte| *byte == 0xC3)
            .expect("two-byte sequence")
            + 1;

        let mut parser = StreamParser::new();
        assert!(parser.process(&frame[..split]).is_empty());
        let events = parser.process(&frame[split..]);
        assert_eq!(events[0].token_text(), Some("caf\u{e9}"));
    }

    #[test]
    fn test_invalid_byte_does_not_swallow_split_char_behind_it() {
        let frame = b"data: {\"token\":\"\xFFcaf\xC3\xA9\"}\n\n";
        let split = frame.iter().position(|byte| *byte == 0xC3).expect("lead byte") + 1;

        let mut parser = StreamParser::new();
        assert!(parser.process(&frame[..split]).is_empty());
        let events = parser.process(&frame[split..]);
        assert_eq!(events[0].token_text(), Some("\u{FFFD}caf\u{e9}"));
    }

    #[test]
    fn test_finish_flushes_unterminated_final_frame() {
        let mut parser = StreamParser::new();
        assert!(parser.process(b"data: {\"done\":true}").is_empty());
        let events = parser.finish();
        assert_eq!(events.len(), 1);
        assert!(events[0].done);
        assert!(parser.finish().is_empty());
    }
}
