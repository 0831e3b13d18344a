//! Incremental `text/event-stream` decoding.

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseFrame {
    pub event: String,
    pub data: String,
}

/// Splits a byte stream into events. Chunks may end anywhere, including in
/// the middle of a UTF-8 sequence or a line.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if self.data.is_empty() && event.is_none() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_split_frames() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"event: put\ndata: {\"path\":").is_empty());
        let frames = decoder.feed(b"\"/\",\"data\":1}\n\n");
        assert_eq!(
            frames,
            vec![SseFrame {
                event: "put".to_string(),
                data: r#"{"path":"/","data":1}"#.to_string(),
            }]
        );
    }

    #[test]
    fn handles_crlf_comments_and_multiple_frames() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(
            b": hello\r\nevent: keep-alive\r\ndata: null\r\n\r\nevent: cancel\ndata: denied\n\n",
        );
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].event, "keep-alive");
        assert_eq!(frames[1].data, "denied");
    }

    #[test]
    fn joins_multiline_data() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b"data: a\ndata: b\n\n");
        assert_eq!(frames[0].event, "message");
        assert_eq!(frames[0].data, "a\nb");
    }
}
