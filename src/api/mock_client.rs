use super::client::lift_error_event;
use super::stream::StreamParser;
use super::{wire, BackendError, EventStream, ModelBackend, ModelRequest};
use futures::stream;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

type ScriptedResponse = Result<Vec<String>, BackendError>;

/// Replays scripted SSE responses, one per `open_stream` call, and records
/// every request body it was asked to send.
#[derive(Clone, Default)]
pub struct MockBackend {
    responses: Arc<Mutex<VecDeque<ScriptedResponse>>>,
    requests: Arc<Mutex<Vec<Value>>>,
}

impl MockBackend {
    pub fn new(responses: Vec<ScriptedResponse>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn streams(responses: Vec<Vec<String>>) -> Self {
        Self::new(responses.into_iter().map(Ok).collect())
    }

    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().unwrap().len()
    }
}

impl ModelBackend for MockBackend {
    async fn open_stream(&self, request: &ModelRequest<'_>) -> Result<EventStream, BackendError> {
        self.requests
            .lock()
            .unwrap()
            .push(wire::request_body(request));

        let next = self.responses.lock().unwrap().pop_front();
        let chunks = next.unwrap_or_else(|| {
            Err(BackendError::Transport(
                "MockBackend: no more responses configured".to_string(),
            ))
        })?;

        let mut parser = StreamParser::new();
        let events: Vec<_> = chunks
            .into_iter()
            .flat_map(|chunk| {
                let framed = if chunk.ends_with("\n\n") {
                    chunk
                } else {
                    format!("{chunk}\n\n")
                };
                parser.process(framed.as_bytes())
            })
            .map(lift_error_event)
            .collect();
        Ok(Box::pin(stream::iter(events)))
    }
}

fn frame(event: &str, data: Value) -> String {
    format!("event: {event}\ndata: {data}")
}

pub fn message_start() -> String {
    frame(
        "message_start",
        serde_json::json!({
            "type": "message_start",
            "message": {"id": "msg_mock", "type": "message", "role": "assistant", "model": "mock-model", "content": []}
        }),
    )
}

pub fn text_block(index: usize, text: &str) -> Vec<String> {
    vec![
        frame(
            "content_block_start",
            serde_json::json!({"type": "content_block_start", "index": index, "content_block": {"type": "text", "text": ""}}),
        ),
        frame(
            "content_block_delta",
            serde_json::json!({"type": "content_block_delta", "index": index, "delta": {"type": "text_delta", "text": text}}),
        ),
        block_stop(index),
    ]
}

pub fn thinking_block(index: usize, thinking: &str, signature: &str) -> Vec<String> {
    vec![
        frame(
            "content_block_start",
            serde_json::json!({"type": "content_block_start", "index": index, "content_block": {"type": "thinking", "thinking": ""}}),
        ),
        frame(
            "content_block_delta",
            serde_json::json!({"type": "content_block_delta", "index": index, "delta": {"type": "thinking_delta", "thinking": thinking}}),
        ),
        frame(
            "content_block_delta",
            serde_json::json!({"type": "content_block_delta", "index": index, "delta": {"type": "signature_delta", "signature": signature}}),
        ),
        block_stop(index),
    ]
}

/// A tool_use block whose input arrives split into two JSON fragments.
pub fn tool_use_block(index: usize, id: &str, name: &str, input: &Value) -> Vec<String> {
    let json = input.to_string();
    let split = json.len() / 2;
    let split = (0..=split)
        .rev()
        .find(|at| json.is_char_boundary(*at))
        .unwrap_or(0);
    let (head, tail) = json.split_at(split);
    vec![
        frame(
            "content_block_start",
            serde_json::json!({"type": "content_block_start", "index": index, "content_block": {"type": "tool_use", "id": id, "name": name, "input": {}}}),
        ),
        frame(
            "content_block_delta",
            serde_json::json!({"type": "content_block_delta", "index": index, "delta": {"type": "input_json_delta", "partial_json": head}}),
        ),
        frame(
            "content_block_delta",
            serde_json::json!({"type": "content_block_delta", "index": index, "delta": {"type": "input_json_delta", "partial_json": tail}}),
        ),
        block_stop(index),
    ]
}

pub fn block_stop(index: usize) -> String {
    frame(
        "content_block_stop",
        serde_json::json!({"type": "content_block_stop", "index": index}),
    )
}

pub fn message_end(stop_reason: &str) -> Vec<String> {
    vec![
        frame(
            "message_delta",
            serde_json::json!({"type": "message_delta", "delta": {"stop_reason": stop_reason, "stop_sequence": null}}),
        ),
        frame("message_stop", serde_json::json!({"type": "message_stop"})),
    ]
}

pub fn error_event(kind: &str, message: &str) -> String {
    frame(
        "error",
        serde_json::json!({"type": "error", "error": {"type": kind, "message": message}}),
    )
}

/// A complete response that answers with plain text.
pub fn text_response(text: &str) -> Vec<String> {
    let mut chunks = vec![message_start()];
    chunks.extend(text_block(0, text));
    chunks.extend(message_end("end_turn"));
    chunks
}

/// A complete response that requests the given tool calls.
pub fn tool_response(preamble: Option<&str>, calls: &[(&str, &str, Value)]) -> Vec<String> {
    let mut chunks = vec![message_start()];
    let mut index = 0;
    if let Some(text) = preamble {
        chunks.extend(text_block(index, text));
        index += 1;
    }
    for (id, name, input) in calls {
        chunks.extend(tool_use_block(index, id, name, input));
        index += 1;
    }
    chunks.extend(message_end("tool_use"));
    chunks
}
