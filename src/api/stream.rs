use crate::types::StreamEvent;

const KNOWN_EVENTS: &[&str] = &[
    "message_start",
    "content_block_start",
    "content_block_delta",
    "content_block_stop",
    "message_delta",
    "message_stop",
    "ping",
    "error",
];

/// Incremental server-sent-events framer for the Messages stream.
#[derive(Default)]
pub struct StreamParser {
    buffer: String,
}

impl StreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a network chunk and returns every event completed by it.
    /// Unknown event names are skipped; malformed JSON is logged and skipped.
    pub fn process(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));
        if self.buffer.contains('\r') {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }
        let mut events = Vec::new();
        let mut start = 0;

        while let Some(end) = self.buffer[start..].find("\n\n") {
            let event_end = start + end + 2;
            let event_text = &self.buffer[start..event_end];

            let mut event_type = None;
            let mut data = None;

            for line in event_text.lines() {
                if let Some(rest) = line.strip_prefix("event:") {
                    event_type = Some(rest.trim().to_string());
                } else if let Some(rest) = line.strip_prefix("data:") {
                    data = Some(rest.trim().to_string());
                }
            }

            if let (Some(evt_type), Some(json_data)) = (event_type, data) {
                if json_data != "[DONE]" && KNOWN_EVENTS.contains(&evt_type.as_str()) {
                    match serde_json::from_str::<StreamEvent>(&json_data) {
                        Ok(evt) => events.push(evt),
                        Err(error) => {
                            tracing::warn!(
                                event_type = %evt_type,
                                data = %json_data,
                                %error,
                                "SSE parse error"
                            );
                        }
                    }
                }
            }

            start = event_end;
        }

        if start > 0 {
            self.buffer.drain(..start);
        }

        events
    }

    /// Returns whatever partial frame is still buffered.
    pub fn flush(&mut self) -> String {
        std::mem::take(&mut self.buffer)
    }
}
