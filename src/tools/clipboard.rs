use anyhow::{anyhow, Result};
use serde_json::Value;

use super::ToolHandler;
use crate::types::ToolPayload;

const PREVIEW_CHARS: usize = 100;

/// `clipboard_read`: the system clipboard's text.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClipboardReadTool;

impl ToolHandler for ClipboardReadTool {
    fn execute(&self, _arguments: &Value) -> Result<ToolPayload> {
        let mut clipboard = open_clipboard()?;
        let text = match clipboard.get_text() {
            Ok(text) => Some(text),
            Err(arboard::Error::ContentNotAvailable) => None,
            Err(error) => return Err(anyhow!("clipboard read failed: {error}")),
        };
        Ok(ToolPayload::Text(read_report(text)))
    }

    fn activity(&self, _arguments: &Value) -> Option<String> {
        Some("Reading clipboard...".to_string())
    }
}

/// `clipboard_write`: replaces the clipboard with the given text.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClipboardWriteTool;

impl ToolHandler for ClipboardWriteTool {
    fn execute(&self, arguments: &Value) -> Result<ToolPayload> {
        let text = clipboard_text(arguments)?;
        open_clipboard()?
            .set_text(text)
            .map_err(|error| anyhow!("clipboard write failed: {error}"))?;
        tracing::debug!(chars = text.chars().count(), "clipboard written");
        Ok(ToolPayload::Text(write_report(text)))
    }

    fn activity(&self, arguments: &Value) -> Option<String> {
        let text = arguments.get("text")?.as_str()?;
        Some(format!("Writing to clipboard: {}", preview(text)))
    }
}

fn open_clipboard() -> Result<arboard::Clipboard> {
    arboard::Clipboard::new().map_err(|error| anyhow!("system clipboard unavailable: {error}"))
}

/// Unlike most tools, blank text is a valid clipboard value.
fn clipboard_text(arguments: &Value) -> Result<&str> {
    arguments
        .get("text")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("clipboard_write requires a 'text' string argument"))
}

fn read_report(text: Option<String>) -> String {
    match text {
        Some(text) if !text.is_empty() => format!("Clipboard contents:\n{text}"),
        _ => "Clipboard is empty or contains non-text data.".to_string(),
    }
}

fn write_report(text: &str) -> String {
    format!(
        "Copied to clipboard ({} chars): {}",
        text.chars().count(),
        preview(text)
    )
}

fn preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_CHARS {
        let head: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}
