//! Text-only conversation export.
//!
//! Exported turns keep the Messages-API shape but never carry binary data:
//! attachments and screenshots become short text markers, and reasoning is
//! dropped. Importing an export therefore resumes without resending images.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};

use crate::types::{ContentBlock, Conversation, Role, ToolPart, ToolPayload, Turn};

pub const IMAGE_MARKER: &str = "[Image was attached]";
pub const SCREENSHOT_MARKER: &str = "[Screenshot]";

pub fn export_conversation(conversation: &Conversation) -> Value {
    Value::Array(
        conversation
            .turns()
            .iter()
            .filter_map(export_turn)
            .collect(),
    )
}

fn export_turn(turn: &Turn) -> Option<Value> {
    let content: Vec<Value> = turn.content().iter().filter_map(export_block).collect();
    if content.is_empty() {
        return None;
    }
    Some(json!({
        "role": turn.role().wire_name(),
        "content": content,
    }))
}

fn export_block(block: &ContentBlock) -> Option<Value> {
    match block {
        ContentBlock::Text { text } if text.is_empty() => None,
        ContentBlock::Text { text } => Some(text_part(text)),
        ContentBlock::Reasoning { .. } | ContentBlock::RedactedReasoning { .. } => None,
        ContentBlock::Attachment(_) => Some(text_part(IMAGE_MARKER)),
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
        } => {
            let content = match payload {
                ToolPayload::Text(text) => json!(text),
                ToolPayload::Parts(parts) => Value::Array(
                    parts
                        .iter()
                        .map(|part| match part {
                            ToolPart::Text(text) => text_part(text),
                            ToolPart::Attachment(_) => text_part(SCREENSHOT_MARKER),
                        })
                        .collect(),
                ),
            };
            Some(json!({
                "type": "tool_result",
                "tool_use_id": invocation_id,
                "content": content,
            }))
        }
    }
}

fn text_part(text: &str) -> Value {
    json!({ "type": "text", "text": text })
}

/// Rebuilds a conversation from an export. Adjacent turns with the same role
/// are merged; the result must satisfy the usual turn invariants.
pub fn import_conversation(value: &Value) -> Result<Conversation> {
    let Some(items) = value.as_array() else {
        bail!("conversation export must be a JSON array of turns");
    };

    let mut grouped: Vec<(Role, Vec<ContentBlock>)> = Vec::new();
    for (position, item) in items.iter().enumerate() {
        let role = match item.get("role").and_then(Value::as_str) {
            Some("user") => Role::Requester,
            Some("assistant") => Role::Responder,
            other => bail!("turn {position}: unsupported role {other:?}"),
        };
        let blocks = import_content(item.get("content"))
            .with_context(|| format!("turn {position}: invalid content"))?;
        if blocks.is_empty() {
            continue;
        }
        match grouped.last_mut() {
            Some((last_role, last_blocks)) if *last_role == role => last_blocks.extend(blocks),
            _ => grouped.push((role, blocks)),
        }
    }

    let mut conversation = Conversation::new();
    for (role, blocks) in grouped {
        let turn = match role {
            Role::Requester => Turn::requester(blocks),
            Role::Responder => Turn::responder(blocks),
        };
        conversation.push(turn)?;
    }
    Ok(conversation)
}

fn import_content(content: Option<&Value>) -> Result<Vec<ContentBlock>> {
    match content {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(text)) if text.is_empty() => Ok(Vec::new()),
        Some(Value::String(text)) => Ok(vec![ContentBlock::text(text.clone())]),
        Some(Value::Array(parts)) => {
            let mut blocks = Vec::with_capacity(parts.len());
            for part in parts {
                if let Some(block) = import_block(part)? {
                    blocks.push(block);
                }
            }
            Ok(blocks)
        }
        Some(other) => bail!("expected a string or an array, got {other}"),
    }
}

fn import_block(part: &Value) -> Result<Option<ContentBlock>> {
    let block = match part.get("type").and_then(Value::as_str) {
        Some("text") => {
            let text = string_field(part, "text")?;
            (!text.is_empty()).then(|| ContentBlock::text(text))
        }
        Some("image") => Some(ContentBlock::text(IMAGE_MARKER)),
        Some("tool_use") => Some(ContentBlock::ToolInvocation {
            id: string_field(part, "id")?,
            name: string_field(part, "name")?,
            arguments: part.get("input").cloned().unwrap_or_else(|| json!({})),
        }),
        Some("tool_result") => Some(ContentBlock::ToolOutcome {
            invocation_id: string_field(part, "tool_use_id")?,
            payload: import_payload(part.get("content")),
        }),
        // Thinking blocks and anything unrecognized carry nothing to resume.
        _ => None,
    };
    Ok(block)
}

fn import_payload(content: Option<&Value>) -> ToolPayload {
    match content {
        Some(Value::String(text)) => ToolPayload::text(text.clone()),
        Some(Value::Array(parts)) => ToolPayload::Parts(
            parts
                .iter()
                .filter_map(|part| match part.get("type").and_then(Value::as_str) {
                    Some("text") => part
                        .get("text")
                        .and_then(Value::as_str)
                        .map(|text| ToolPart::Text(text.to_string())),
                    Some("image") => Some(ToolPart::Text(SCREENSHOT_MARKER.to_string())),
                    _ => None,
                })
                .collect(),
        ),
        _ => ToolPayload::text(String::new()),
    }
}

fn string_field(part: &Value, key: &str) -> Result<String> {
    part.get(key)
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
        .with_context(|| format!("missing string field '{key}'"))
}

pub fn save_export(conversation: &Conversation, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let rendered = serde_json::to_string_pretty(&export_conversation(conversation))
        .context("failed to serialize conversation")?;
    fs::write(path, rendered)
        .with_context(|| format!("failed to write conversation export to {}", path.display()))
}

pub fn load_export(path: impl AsRef<Path>) -> Result<Conversation> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read conversation export {}", path.display()))?;
    let value: Value = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    import_conversation(&value)
}
