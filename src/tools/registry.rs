use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::Value;

use super::clipboard::{ClipboardReadTool, ClipboardWriteTool};
use super::shell::{ShellCommand, ShellTool};
use super::web::{FetchWebpageTool, WebSearchTool};
use super::{default_catalog, Capabilities, CapabilityGroup, ToolDescriptor, ToolHandler};
use crate::safety::{Confirmer, SafetyError, SafetyGate, SafetyVerdict};
use crate::types::{ToolPart, ToolPayload};
use crate::util::truncate_chars;

pub const MAX_TOOL_OUTPUT_CHARS: usize = 20_000;
pub const TRUNCATION_MARKER: &str = "\n\n[Output truncated...]";
pub const REJECTED_BY_USER: &str = "Command was rejected by the user.";

/// Maps tool names to executors and applies gating around them.
///
/// `resolve` never fails: every outcome, including refusals and executor
/// errors, comes back as a payload the model can read.
pub struct ToolRegistry {
    catalog: Vec<ToolDescriptor>,
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
    gate: SafetyGate,
}

impl ToolRegistry {
    pub fn new(catalog: Vec<ToolDescriptor>, gate: SafetyGate) -> Self {
        Self {
            catalog,
            handlers: HashMap::new(),
            gate,
        }
    }

    /// Full catalog with the built-in web, shell and clipboard executors
    /// registered. Other desktop and browser tools are not offered until
    /// executors are registered for them.
    pub fn with_defaults(shell: ShellCommand) -> Result<Self, SafetyError> {
        let mut registry = Self::new(default_catalog(), SafetyGate::with_defaults()?);
        registry.register("web_search", Arc::new(WebSearchTool::default()));
        registry.register("fetch_webpage", Arc::new(FetchWebpageTool::default()));
        registry.register("run_command", Arc::new(ShellTool::new(shell)));
        registry.register("clipboard_read", Arc::new(ClipboardReadTool));
        registry.register("clipboard_write", Arc::new(ClipboardWriteTool));
        Ok(registry)
    }

    /// Installs the executor for a tool; replaces any previous one.
    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn ToolHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    /// Adds (or replaces) a catalog entry together with its executor.
    pub fn add_tool(&mut self, descriptor: ToolDescriptor, handler: Arc<dyn ToolHandler>) {
        let name = descriptor.name.clone();
        match self.catalog.iter_mut().find(|tool| tool.name == name) {
            Some(existing) => *existing = descriptor,
            None => self.catalog.push(descriptor),
        }
        self.register(name, handler);
    }

    pub fn descriptor(&self, name: &str) -> Option<&ToolDescriptor> {
        self.catalog.iter().find(|tool| tool.name == name)
    }

    /// Descriptors offered to the model under the given capabilities. Tools
    /// without an executor are never offered.
    pub fn enabled_tools(&self, capabilities: Capabilities) -> Vec<ToolDescriptor> {
        self.catalog
            .iter()
            .filter(|tool| capabilities.allows(tool.group))
            .filter(|tool| self.handlers.contains_key(&tool.name))
            .cloned()
            .collect()
    }

    pub fn activity(&self, name: &str, arguments: &Value) -> Option<String> {
        self.handlers
            .get(name)
            .and_then(|handler| handler.activity(arguments))
    }

    pub fn resolve(
        &self,
        name: &str,
        arguments: &Value,
        capabilities: Capabilities,
        confirmer: &dyn Confirmer,
    ) -> ToolPayload {
        let Some(descriptor) = self.descriptor(name) else {
            tracing::warn!(tool = name, "model requested an unknown tool");
            return ToolPayload::text(format!("Unknown tool: {name}"));
        };

        if !capabilities.allows(descriptor.group) {
            return ToolPayload::text(disabled_message(descriptor.group));
        }

        if descriptor.gated {
            if let Some(refusal) = self.check_gate(name, arguments, confirmer) {
                return ToolPayload::text(refusal);
            }
        }

        let Some(handler) = self.handlers.get(name) else {
            return ToolPayload::text(format!(
                "Error: {name} is not available: no executor is registered for it."
            ));
        };

        let outcome = catch_unwind(AssertUnwindSafe(|| handler.execute(arguments)));
        let payload = match outcome {
            Ok(Ok(payload)) => payload,
            Ok(Err(error)) => {
                tracing::debug!(tool = name, error = %format!("{error:#}"), "tool failed");
                ToolPayload::text(format!("Error: {name} failed: {error:#}"))
            }
            Err(panic) => {
                let cause = panic_message(panic.as_ref());
                tracing::error!(tool = name, cause = %cause, "tool executor panicked");
                ToolPayload::text(format!("Error: {name} failed: {cause}"))
            }
        };

        truncate_payload(payload)
    }

    /// Returns the refusal text when the command must not run.
    fn check_gate(&self, name: &str, arguments: &Value, confirmer: &dyn Confirmer) -> Option<String> {
        let command = match super::required_tool_string(arguments, name, "command") {
            Ok(command) => command,
            Err(error) => return Some(format!("Error: {name} failed: {error}")),
        };

        match self.gate.classify(command) {
            SafetyVerdict::Blocked(reason) => {
                tracing::warn!(command, %reason, "command blocked");
                Some(reason)
            }
            SafetyVerdict::NeedsConfirmation(rule) => {
                tracing::info!(command, rule = %rule, "command needs confirmation");
                if confirmer.confirm(command) {
                    None
                } else {
                    Some(REJECTED_BY_USER.to_string())
                }
            }
            SafetyVerdict::Safe => None,
        }
    }
}

fn disabled_message(group: CapabilityGroup) -> &'static str {
    match group {
        CapabilityGroup::Desktop => {
            "Desktop control is disabled. Enable desktop control to use this tool."
        }
        CapabilityGroup::Browser => {
            "Browser tools are disabled. Enable browser control to use this tool."
        }
        CapabilityGroup::Core => "This tool is disabled.",
    }
}

fn truncate_payload(payload: ToolPayload) -> ToolPayload {
    let cut = |text: String| truncate_chars(&text, MAX_TOOL_OUTPUT_CHARS, TRUNCATION_MARKER);
    match payload {
        ToolPayload::Text(text) => ToolPayload::Text(cut(text)),
        ToolPayload::Parts(parts) => ToolPayload::Parts(
            parts
                .into_iter()
                .map(|part| match part {
                    ToolPart::Text(text) => ToolPart::Text(cut(text)),
                    attachment => attachment,
                })
                .collect(),
        ),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "executor panicked".to_string()
    }
}
