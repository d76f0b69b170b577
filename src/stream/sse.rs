//! Incremental `text/event-stream` decoder

/// One dispatched server-sent event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Value of the `event:` field, if any
    pub event: Option<String>,
    /// Concatenated `data:` lines, joined with `\n`
    pub data: String,
    /// Value of the `id:` field, if any
    pub id: Option<String>,
}

/// A decoded frame: either a full event or a `:` comment line.
///
/// Comments are the usual keepalive mechanism; they count for connection
/// liveness but carry no payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    Event(SseEvent),
    Comment,
}

/// Streaming decoder for the event-stream wire format.
///
/// Feed it raw chunks in arrival order; it buffers partial lines across
/// chunk boundaries, tolerates CRLF line endings and a UTF-8 BOM on the
/// first line, and dispatches an event on every blank line that follows at
/// least one `data:` line.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
    first_line: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self {
            first_line: true,
            ..Self::default()
        }
    }

    /// Consume a chunk and return every frame completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop(); // trailing \n
            if line.last() == Some(&b'\r') {
                line.pop();
            }

            let mut text = String::from_utf8_lossy(&line).into_owned();
            if self.first_line {
                self.first_line = false;
                if let Some(stripped) = text.strip_prefix('\u{feff}') {
                    text = stripped.to_string();
                }
            }

            if let Some(frame) = self.handle_line(&text) {
                frames.push(frame);
            }
        }
        frames
    }

    fn handle_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }

        if line.starts_with(':') {
            return Some(SseFrame::Comment);
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => self.data.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            // "retry" and unknown fields are ignored
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        let id = self.id.take();
        let data = std::mem::take(&mut self.data);
        if data.is_empty() {
            // Blank line without data: nothing to dispatch
            return None;
        }

        Some(SseFrame::Event(SseEvent {
            event,
            data: data.join("\n"),
            id,
        }))
    }
}
