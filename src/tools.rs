mod catalog;
mod clipboard;
mod registry;
mod shell;
mod web;

pub use catalog::default_catalog;
pub use clipboard::{ClipboardReadTool, ClipboardWriteTool};
pub use registry::{ToolRegistry, MAX_TOOL_OUTPUT_CHARS, REJECTED_BY_USER, TRUNCATION_MARKER};
pub use shell::{ShellCommand, ShellTool, COMMAND_TIMEOUT};
pub use web::{FetchWebpageTool, WebSearchTool};

use anyhow::{bail, Result};
use serde_json::Value;

use crate::types::ToolPayload;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityGroup {
    /// Always enabled.
    Core,
    Desktop,
    Browser,
}

/// Which optional tool groups the user has switched on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub desktop: bool,
    pub browser: bool,
}

impl Capabilities {
    pub fn allows(&self, group: CapabilityGroup) -> bool {
        match group {
            CapabilityGroup::Core => true,
            CapabilityGroup::Desktop => self.desktop,
            CapabilityGroup::Browser => self.browser,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub group: CapabilityGroup,
    /// Runs through the safety gate before execution.
    pub gated: bool,
}

/// A synchronous tool executor. Runs on the blocking pool.
pub trait ToolHandler: Send + Sync {
    fn execute(&self, arguments: &Value) -> Result<ToolPayload>;

    /// Short human-readable description of what `execute` is about to do.
    fn activity(&self, _arguments: &Value) -> Option<String> {
        None
    }
}

pub fn required_tool_string<'a>(arguments: &'a Value, tool: &str, key: &str) -> Result<&'a str> {
    let value = arguments
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .unwrap_or("");
    if value.is_empty() {
        bail!("{tool} requires a non-empty '{key}' string argument");
    }
    Ok(value)
}
