//! Incremental `text/event-stream` decoding.

use reqwest::header::{CONTENT_TYPE, HeaderMap};

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct SseEvent {
    /// Event name, `message` when the stream omits it.
    pub name: String,
    /// Data lines joined with `\n`.
    pub data: String,
}

/// Accumulates byte chunks and yields complete events.
///
/// Events end at a blank line. Lines may end in `\n` or `\r\n` and may be
/// split across chunks.
#[derive(Debug, Default)]
pub(super) struct SseParser {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    pub(super) fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns every event it completes.
    pub(super) fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(line) = self.next_line() {
            if let Some(event) = self.apply(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Flushes a trailing unterminated event at end of stream.
    pub(super) fn finish(&mut self) -> Option<SseEvent> {
        let rest = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&rest);
        let trailing = line.trim_end_matches(['\r', '\n']);
        if trailing.starts_with("data:") {
            self.data.push(field_value(trailing, "data:").to_owned());
        }
        self.dispatch()
    }

    fn next_line(&mut self) -> Option<String> {
        let newline = self.buffer.iter().position(|byte| *byte == b'\n')?;
        let raw: Vec<u8> = self.buffer.drain(..=newline).collect();
        let line = String::from_utf8_lossy(&raw);
        Some(line.trim_end_matches(['\r', '\n']).to_owned())
    }

    fn apply(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = line
            .split_once(':')
            .map_or((line, ""), |(field, rest)| (field, field_value(rest, "")));
        match field {
            "event" => self.event = Some(value.to_owned()),
            "data" => self.data.push(value.to_owned()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let name = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = self.data.join("\n");
        self.data.clear();
        Some(SseEvent {
            name: name.unwrap_or_else(|| String::from("message")),
            data,
        })
    }
}

fn field_value<'a>(line: &'a str, prefix: &str) -> &'a str {
    let rest = line.strip_prefix(prefix).unwrap_or(line);
    rest.strip_prefix(' ').unwrap_or(rest)
}

/// Returns whether a response carries an event stream.
pub(super) fn is_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("text/event-stream"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn events_split_across_chunks_are_reassembled() {
        let mut parser = SseParser::new();

        let first = parser.push(b"event: endpoint\r\nda");
        let second = parser.push(b"ta: /messages?session=1\r\n\r\n");

        assert!(first.is_empty());
        assert_eq!(
            second,
            vec![SseEvent {
                name: String::from("endpoint"),
                data: String::from("/messages?session=1"),
            }]
        );
    }

    #[rstest]
    fn unnamed_events_default_to_message_and_join_data_lines() {
        let mut parser = SseParser::new();

        let events = parser.push(b": keep-alive\n\ndata: {\"a\":\ndata: 1}\n\n");

        assert_eq!(events.len(), 1);
        let event = events.first().expect("one event");
        assert_eq!(event.name, "message");
        assert_eq!(event.data, "{\"a\":\n1}");
    }

    #[rstest]
    fn finish_flushes_an_unterminated_event() {
        let mut parser = SseParser::new();

        let pushed = parser.push(b"data: {\"id\":1}");
        let flushed = parser.finish();

        assert!(pushed.is_empty());
        assert_eq!(flushed.map(|event| event.data), Some(String::from("{\"id\":1}")));
    }

    #[rstest]
    #[case("text/event-stream", true)]
    #[case("text/event-stream; charset=utf-8", true)]
    #[case("application/json", false)]
    fn event_streams_are_detected_by_content_type(
        #[case] content_type: &str,
        #[case] expected: bool,
    ) {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, content_type.parse().expect("header value"));

        assert_eq!(is_event_stream(&headers), expected);
    }
}
