//! Client-side half of the protocol: a line-accumulating decoder robust to
//! chunk boundaries, plus a connect/idle watchdog, written directly from
//! the wire format this crate's writer emits.

use std::time::Duration;

/// One decoded `event`/`data`/`id`/`retry` block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SseClientEvent {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
    pub retry: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SseDecoded {
    Event(SseClientEvent),
    Comment(String),
}

/// Accumulates bytes across chunk boundaries and yields complete blocks as
/// they become available. Normalizes `\r\n` to `\n` and splits on blank
/// lines
#[derive(Default)]
pub struct SseDecoder {
    buffer: String,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk of bytes (assumed UTF-8; invalid sequences are
    /// replaced) and returns every complete block decoded so far. A
    /// trailing partial block, if any, stays buffered for the next call.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseDecoded> {
        let text = String::from_utf8_lossy(chunk);
        self.buffer.push_str(&text.replace("\r\n", "\n"));

        let mut decoded = Vec::new();
        while let Some(pos) = self.buffer.find("\n\n") {
            let block: String = self.buffer.drain(..pos + 2).collect();
            if let Some(item) = decode_block(block.trim_end_matches('\n')) {
                decoded.push(item);
            }
        }
        decoded
    }
}

fn decode_block(block: &str) -> Option<SseDecoded> {
    if block.is_empty() {
        return None;
    }

    let mut event: Option<String> = None;
    let mut data_lines: Vec<&str> = Vec::new();
    let mut id: Option<String> = None;
    let mut retry: Option<u64> = None;
    let mut comment_lines: Vec<&str> = Vec::new();
    let mut saw_field = false;

    for line in block.lines() {
        if let Some(rest) = line.strip_prefix(':') {
            comment_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => {
                event = Some(value.to_string());
                saw_field = true;
            }
            "data" => {
                data_lines.push(value);
                saw_field = true;
            }
            "id" => {
                id = Some(value.to_string());
                saw_field = true;
            }
            "retry" => {
                retry = value.parse().ok();
                saw_field = true;
            }
            // Unknown fields are ignored
            _ => {}
        }
    }

    if saw_field {
        Some(SseDecoded::Event(SseClientEvent {
            event,
            data: data_lines.join("\n"),
            id,
            retry,
        }))
    } else if !comment_lines.is_empty() {
        Some(SseDecoded::Comment(comment_lines.join("\n")))
    } else {
        None
    }
}

/// Client-side timeout policy distinguishing "no response headers yet"
/// from "connected, but nothing has arrived in a while".
#[derive(Clone, Copy, Debug)]
pub struct StreamWatchdog {
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for StreamWatchdog {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(45),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_single_complete_block() {
        let mut decoder = SseDecoder::new();
        let decoded = decoder.feed(b"event: progress\ndata: {\"stage\":\"plan\"}\n\n");
        assert_eq!(
            decoded,
            vec![SseDecoded::Event(SseClientEvent {
                event: Some("progress".to_string()),
                data: r#"{"stage":"plan"}"#.to_string(),
                id: None,
                retry: None,
            })]
        );
    }

    #[test]
    fn joins_multiline_data_with_newlines() {
        let mut decoder = SseDecoder::new();
        let decoded = decoder.feed(b"event: token\ndata: line one\ndata: line two\n\n");
        let SseDecoded::Event(event) = &decoded[0] else {
            panic!("expected an event");
        };
        assert_eq!(event.data, "line one\nline two");
    }

    #[test]
    fn survives_a_split_across_two_chunk_boundaries() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"event: done\ndata: {\"threadId").is_empty());
        let decoded = decoder.feed(b"\":\"t1\"}\n\n");
        let SseDecoded::Event(event) = &decoded[0] else {
            panic!("expected an event");
        };
        assert_eq!(event.event.as_deref(), Some("done"));
        assert_eq!(event.data, r#"{"threadId":"t1"}"#);
    }

    #[test]
    fn normalizes_crlf_line_endings() {
        let mut decoder = SseDecoder::new();
        let decoded = decoder.feed(b"event: ping\r\ndata: 1\r\n\r\n");
        assert_eq!(decoded.len(), 1);
    }

    #[test]
    fn surfaces_comments_separately_from_events() {
        let mut decoder = SseDecoder::new();
        let decoded = decoder.feed(b": keep-alive\n\n");
        assert_eq!(decoded, vec![SseDecoded::Comment("keep-alive".to_string())]);
    }

    #[test]
    fn ignores_unknown_fields() {
        let mut decoder = SseDecoder::new();
        let decoded = decoder.feed(b"event: done\ndata: {}\nfoo: bar\n\n");
        let SseDecoded::Event(event) = &decoded[0] else {
            panic!("expected an event");
        };
        assert_eq!(event.event.as_deref(), Some("done"));
    }

    #[test]
    fn parses_multiple_blocks_fed_in_one_chunk() {
        let mut decoder = SseDecoder::new();
        let decoded = decoder.feed(b"event: a\ndata: 1\n\nevent: b\ndata: 2\n\n");
        assert_eq!(decoded.len(), 2);
    }
}
