use serde_json::Value;

use crate::safety::ConfirmationRequest;

/// Notifications a background run sends to the presentation layer, in order.
#[derive(Debug)]
pub enum RunEvent {
    /// A model request cycle began; numbered from 1 within the run.
    CallStarted(u32),
    /// Audit copy of the outgoing request body with binary data elided.
    Payload(String),
    ToolCallStarted {
        name: String,
        arguments: Value,
    },
    ToolInfo(String),
    ReasoningStarted,
    ReasoningDelta(String),
    ReasoningEnded,
    /// Fires once per run, right before the answer text begins.
    AnswerLabel,
    AnswerDelta(String),
    ConfirmationRequest(ConfirmationRequest),
    RunComplete,
    RunCancelled,
    RunError(String),
}

impl RunEvent {
    /// True for the last event a run emits.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::RunComplete | Self::RunCancelled | Self::RunError(_)
        )
    }
}
