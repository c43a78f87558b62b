use serde_json::Value;
use thiserror::Error;

use crate::runtime::RunEvent;
use crate::types::{ContentBlock, Delta, StreamBlockKind, StreamEvent};

const TOOL_USE_STOP_REASON: &str = "tool_use";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("{delta} delta for block {index} does not match the open {open} block")]
    MismatchedDelta {
        index: usize,
        open: &'static str,
        delta: &'static str,
    },
    #[error("delta for block {index} arrived while no block was open")]
    NoOpenBlock { index: usize },
    #[error("delta for block {index} arrived while block {open_index} was open")]
    WrongIndex { index: usize, open_index: usize },
    #[error("tool '{name}' sent input that is not valid JSON: {message}")]
    InvalidToolInput { name: String, message: String },
    #[error("stream ended without a stop reason")]
    MissingStopReason,
}

#[derive(Debug)]
enum OpenBlock {
    Text {
        index: usize,
        text: String,
    },
    Reasoning {
        index: usize,
        text: String,
        signature: Option<String>,
    },
    Redacted {
        index: usize,
        data: String,
    },
    ToolUse {
        index: usize,
        id: String,
        name: String,
        initial_input: Value,
        partial_json: String,
    },
    Ignored {
        index: usize,
    },
}

impl OpenBlock {
    fn index(&self) -> usize {
        match self {
            Self::Text { index, .. }
            | Self::Reasoning { index, .. }
            | Self::Redacted { index, .. }
            | Self::ToolUse { index, .. }
            | Self::Ignored { index } => *index,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Reasoning { .. } => "thinking",
            Self::Redacted { .. } => "redacted_thinking",
            Self::ToolUse { .. } => "tool_use",
            Self::Ignored { .. } => "unrecognized",
        }
    }
}

fn delta_kind(delta: &Delta) -> &'static str {
    match delta {
        Delta::TextDelta { .. } => "text",
        Delta::ThinkingDelta { .. } => "thinking",
        Delta::InputJsonDelta { .. } => "input_json",
        Delta::SignatureDelta { .. } => "signature",
        Delta::Other => "unrecognized",
    }
}

/// One fully decoded model response.
#[derive(Debug)]
pub struct DecodedResponse {
    pub blocks: Vec<ContentBlock>,
    pub stop_reason: String,
    /// Close notifications for a block the stream never stopped.
    pub trailing: Vec<RunEvent>,
}

impl DecodedResponse {
    /// The model stopped to have tools run and declared at least one call.
    pub fn needs_tools(&self) -> bool {
        self.stop_reason == TOOL_USE_STOP_REASON
            && self
                .blocks
                .iter()
                .any(|block| matches!(block, ContentBlock::ToolInvocation { .. }))
    }

    /// Concatenated answer text.
    pub fn text(&self) -> String {
        self.blocks
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Turns stream events into content blocks and live notifications.
///
/// One decoder lives for a whole run: the answer label latch spans every
/// response of the run, everything else resets with [`begin_response`].
///
/// [`begin_response`]: StreamDecoder::begin_response
#[derive(Debug, Default)]
pub struct StreamDecoder {
    label_shown: bool,
    blocks: Vec<ContentBlock>,
    open: Option<OpenBlock>,
    stop_reason: Option<String>,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts decoding a new response (or a retried attempt of one).
    /// Partial output of the previous attempt is discarded.
    pub fn begin_response(&mut self, reasoning_enabled: bool) -> Vec<RunEvent> {
        self.blocks.clear();
        self.open = None;
        self.stop_reason = None;

        if !reasoning_enabled && !self.label_shown {
            self.label_shown = true;
            return vec![RunEvent::AnswerLabel];
        }
        Vec::new()
    }

    pub fn apply(&mut self, event: StreamEvent) -> Result<Vec<RunEvent>, DecodeError> {
        let mut events = Vec::new();
        match event {
            StreamEvent::ContentBlockStart {
                index,
                content_block,
            } => {
                self.close_open(&mut events)?;
                self.open_block(index, content_block, &mut events);
            }
            StreamEvent::ContentBlockDelta { index, delta } => {
                self.apply_delta(index, delta, &mut events)?;
            }
            StreamEvent::ContentBlockStop { index } => {
                // Stops for blocks that are not open are ignored.
                if self.open.as_ref().is_some_and(|open| open.index() == index) {
                    self.close_open(&mut events)?;
                }
            }
            StreamEvent::MessageDelta { delta } => {
                if let Some(stop_reason) = delta.stop_reason {
                    self.stop_reason = Some(stop_reason);
                }
            }
            StreamEvent::MessageStart { .. }
            | StreamEvent::MessageStop
            | StreamEvent::Ping
            | StreamEvent::Error { .. }
            | StreamEvent::Unknown => {}
        }
        Ok(events)
    }

    /// Completes the response once the stream has ended cleanly.
    pub fn finish(&mut self) -> Result<DecodedResponse, DecodeError> {
        let mut trailing = Vec::new();
        self.close_open(&mut trailing)?;
        let stop_reason = self.stop_reason.take().ok_or(DecodeError::MissingStopReason)?;
        Ok(DecodedResponse {
            blocks: std::mem::take(&mut self.blocks),
            stop_reason,
            trailing,
        })
    }

    fn open_block(&mut self, index: usize, kind: StreamBlockKind, events: &mut Vec<RunEvent>) {
        let block = match kind {
            StreamBlockKind::Text { text } => {
                if !self.label_shown {
                    self.label_shown = true;
                    events.push(RunEvent::AnswerLabel);
                }
                if !text.is_empty() {
                    events.push(RunEvent::AnswerDelta(text.clone()));
                }
                OpenBlock::Text { index, text }
            }
            StreamBlockKind::Thinking { thinking } => {
                events.push(RunEvent::ReasoningStarted);
                if !thinking.is_empty() {
                    events.push(RunEvent::ReasoningDelta(thinking.clone()));
                }
                OpenBlock::Reasoning {
                    index,
                    text: thinking,
                    signature: None,
                }
            }
            StreamBlockKind::RedactedThinking { data } => OpenBlock::Redacted { index, data },
            StreamBlockKind::ToolUse { id, name, input } => OpenBlock::ToolUse {
                index,
                id,
                name,
                initial_input: input,
                partial_json: String::new(),
            },
            StreamBlockKind::Other => OpenBlock::Ignored { index },
        };
        self.open = Some(block);
    }

    fn apply_delta(
        &mut self,
        index: usize,
        delta: Delta,
        events: &mut Vec<RunEvent>,
    ) -> Result<(), DecodeError> {
        let Some(open) = self.open.as_mut() else {
            return Err(DecodeError::NoOpenBlock { index });
        };
        if open.index() != index {
            return Err(DecodeError::WrongIndex {
                index,
                open_index: open.index(),
            });
        }

        match (open, delta) {
            (OpenBlock::Text { text, .. }, Delta::TextDelta { text: chunk }) => {
                text.push_str(&chunk);
                events.push(RunEvent::AnswerDelta(chunk));
            }
            (OpenBlock::Reasoning { text, .. }, Delta::ThinkingDelta { thinking }) => {
                text.push_str(&thinking);
                events.push(RunEvent::ReasoningDelta(thinking));
            }
            (OpenBlock::Reasoning { signature, .. }, Delta::SignatureDelta { signature: sig }) => {
                signature.get_or_insert_with(String::new).push_str(&sig);
            }
            (OpenBlock::ToolUse { partial_json, .. }, Delta::InputJsonDelta { partial_json: chunk }) => {
                partial_json.push_str(&chunk);
            }
            (OpenBlock::Ignored { .. }, _) | (_, Delta::Other) => {}
            (open, delta) => {
                return Err(DecodeError::MismatchedDelta {
                    index,
                    open: open.kind(),
                    delta: delta_kind(&delta),
                });
            }
        }
        Ok(())
    }

    fn close_open(&mut self, events: &mut Vec<RunEvent>) -> Result<(), DecodeError> {
        let Some(open) = self.open.take() else {
            return Ok(());
        };
        match open {
            OpenBlock::Text { text, .. } => {
                if !text.is_empty() {
                    self.blocks.push(ContentBlock::Text { text });
                }
            }
            OpenBlock::Reasoning {
                text, signature, ..
            } => {
                events.push(RunEvent::ReasoningEnded);
                self.blocks.push(ContentBlock::Reasoning { text, signature });
            }
            OpenBlock::Redacted { data, .. } => {
                self.blocks.push(ContentBlock::RedactedReasoning { data });
            }
            OpenBlock::ToolUse {
                id,
                name,
                initial_input,
                partial_json,
                ..
            } => {
                let arguments = if partial_json.trim().is_empty() {
                    initial_input
                } else {
                    serde_json::from_str(&partial_json).map_err(|error| {
                        DecodeError::InvalidToolInput {
                            name: name.clone(),
                            message: error.to_string(),
                        }
                    })?
                };
                self.blocks.push(ContentBlock::ToolInvocation {
                    id,
                    name,
                    arguments,
                });
            }
            OpenBlock::Ignored { .. } => {}
        }
        Ok(())
    }
}
