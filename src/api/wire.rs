//! Messages-API request bodies.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{json, Map, Value};

use super::ModelRequest;
use crate::config::SamplingMode;
use crate::types::{Attachment, ContentBlock, ToolPart, ToolPayload, Turn};

const AUDIT_DATA_PREFIX_CHARS: usize = 40;
const AUDIT_DATA_SUFFIX: &str = "...[truncated]";
const EMPTY_TURN_TEXT: &str = "(no content)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryMode {
    Full,
    Elided,
}

/// The body sent to the backend.
pub fn request_body(request: &ModelRequest<'_>) -> Value {
    build_body(request, BinaryMode::Full)
}

/// Same shape as [`request_body`] with attachment data cut to a short prefix.
pub fn audit_body(request: &ModelRequest<'_>) -> Value {
    build_body(request, BinaryMode::Elided)
}

fn build_body(request: &ModelRequest<'_>, mode: BinaryMode) -> Value {
    let mut body = Map::new();
    body.insert("model".to_string(), json!(request.model));
    body.insert(
        "max_tokens".to_string(),
        json!(request.sampling.max_tokens()),
    );
    body.insert("stream".to_string(), json!(true));
    body.insert("system".to_string(), json!(request.system));
    body.insert(
        "messages".to_string(),
        Value::Array(
            request
                .turns
                .iter()
                .map(|turn| turn_to_wire(turn, mode))
                .collect(),
        ),
    );
    if !request.tools.is_empty() {
        let tools = request
            .tools
            .iter()
            .map(|tool| {
                json!({
                    "name": tool.name,
                    "description": tool.description,
                    "input_schema": tool.input_schema,
                })
            })
            .collect();
        body.insert("tools".to_string(), Value::Array(tools));
    }

    match request.sampling {
        SamplingMode::Temperature(temperature) => {
            // f32 -> f64 widening would otherwise send 0.30000001192092896.
            let temperature = (f64::from(temperature) * 1000.0).round() / 1000.0;
            body.insert("temperature".to_string(), json!(temperature));
        }
        SamplingMode::AdaptiveReasoning { effort } => {
            body.insert("thinking".to_string(), json!({ "type": "adaptive" }));
            body.insert(
                "output_config".to_string(),
                json!({ "effort": effort.as_str() }),
            );
        }
        SamplingMode::BudgetedReasoning { budget_tokens } => {
            body.insert(
                "thinking".to_string(),
                json!({ "type": "enabled", "budget_tokens": budget_tokens }),
            );
        }
    }

    Value::Object(body)
}

fn turn_to_wire(turn: &Turn, mode: BinaryMode) -> Value {
    let mut content: Vec<Value> = turn
        .content()
        .iter()
        .filter_map(|block| block_to_wire(block, mode))
        .collect();
    if content.is_empty() {
        content.push(json!({ "type": "text", "text": EMPTY_TURN_TEXT }));
    }
    json!({
        "role": turn.role().wire_name(),
        "content": content,
    })
}

fn block_to_wire(block: &ContentBlock, mode: BinaryMode) -> Option<Value> {
    match block {
        ContentBlock::Text { text } if text.is_empty() => None,
        ContentBlock::Text { text } => Some(json!({ "type": "text", "text": text })),
        // Unsigned reasoning cannot be replayed.
        ContentBlock::Reasoning { signature: None, .. } => None,
        ContentBlock::Reasoning {
            text,
            signature: Some(signature),
        } => Some(json!({
            "type": "thinking",
            "thinking": text,
            "signature": signature,
        })),
        ContentBlock::RedactedReasoning { data } => Some(json!({
            "type": "redacted_thinking",
            "data": data,
        })),
        ContentBlock::Attachment(attachment) => Some(image_to_wire(attachment, mode)),
        ContentBlock::ToolInvocation {
            id,
            name,
            arguments,
        } => Some(json!({
            "type": "tool_use",
            "id": id,
            "name": name,
            "input": arguments,
        })),
        ContentBlock::ToolOutcome {
            invocation_id,
            payload,
        } => Some(json!({
            "type": "tool_result",
            "tool_use_id": invocation_id,
            "content": payload_to_wire(payload, mode),
        })),
    }
}

fn payload_to_wire(payload: &ToolPayload, mode: BinaryMode) -> Value {
    match payload {
        ToolPayload::Text(text) => json!(text),
        ToolPayload::Parts(parts) => Value::Array(
            parts
                .iter()
                .map(|part| match part {
                    ToolPart::Text(text) => json!({ "type": "text", "text": text }),
                    ToolPart::Attachment(attachment) => image_to_wire(attachment, mode),
                })
                .collect(),
        ),
    }
}

fn image_to_wire(attachment: &Attachment, mode: BinaryMode) -> Value {
    let encoded = BASE64.encode(&attachment.data);
    let data = match mode {
        BinaryMode::Full => encoded,
        BinaryMode::Elided => {
            let prefix: String = encoded.chars().take(AUDIT_DATA_PREFIX_CHARS).collect();
            format!("{prefix}{AUDIT_DATA_SUFFIX}")
        }
    };
    json!({
        "type": "image",
        "source": {
            "type": "base64",
            "media_type": attachment.media_type,
            "data": data,
        }
    })
}
