use std::path::Path;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The user side, including tool results.
    Requester,
    /// The model side.
    Responder,
}

impl Role {
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Requester => "user",
            Self::Responder => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub data: Vec<u8>,
    pub media_type: String,
    pub filename: String,
}

impl Attachment {
    /// Reads an image file; the media type follows the extension.
    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let media_type = match extension.as_str() {
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "gif" => "image/gif",
            "webp" => "image/webp",
            _ => bail!("{} is not a supported image (png, jpeg, gif, webp)", path.display()),
        };
        let data = std::fs::read(path)
            .with_context(|| format!("failed to read image {}", path.display()))?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            data,
            media_type: media_type.to_string(),
            filename,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolPart {
    Text(String),
    Attachment(Attachment),
}

/// What a tool hands back to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolPayload {
    Text(String),
    Parts(Vec<ToolPart>),
}

impl ToolPayload {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Plain text view of the payload; attachments are omitted.
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ToolPart::Text(text) => Some(text.as_str()),
                    ToolPart::Attachment(_) => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    pub fn has_attachments(&self) -> bool {
        matches!(self, Self::Parts(parts) if parts.iter().any(|part| matches!(part, ToolPart::Attachment(_))))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Reasoning {
        text: String,
        signature: Option<String>,
    },
    /// Encrypted reasoning; only ever sent back verbatim.
    RedactedReasoning {
        data: String,
    },
    Attachment(Attachment),
    ToolInvocation {
        id: String,
        name: String,
        arguments: serde_json::Value,
    },
    ToolOutcome {
        invocation_id: String,
        payload: ToolPayload,
    },
}

impl ContentBlock {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text { text: value.into() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    role: Role,
    content: Vec<ContentBlock>,
}

impl Turn {
    pub fn requester(content: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Requester,
            content,
        }
    }

    pub fn responder(content: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Responder,
            content,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &[ContentBlock] {
        &self.content
    }

    pub fn invocation_ids(&self) -> Vec<&str> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolInvocation { id, .. } => Some(id.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn outcome_ids(&self) -> Vec<&str> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolOutcome { invocation_id, .. } => Some(invocation_id.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Concatenated `Text` blocks.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversationError {
    #[error("conversation must start with a requester turn")]
    MustStartWithRequester,
    #[error("two consecutive {0:?} turns")]
    RoleNotAlternating(Role),
    #[error("tool outcomes {outcomes:?} do not match the preceding invocations {invocations:?}")]
    OutcomeMismatch {
        invocations: Vec<String>,
        outcomes: Vec<String>,
    },
    #[error("tool invocations {0:?} were not answered by a tool-results turn")]
    UnansweredInvocations(Vec<String>),
}

/// Ordered turns exchanged with the model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Appends a turn after checking role alternation and invocation/outcome pairing.
    pub fn push(&mut self, turn: Turn) -> Result<(), ConversationError> {
        let Some(previous) = self.turns.last() else {
            if turn.role != Role::Requester {
                return Err(ConversationError::MustStartWithRequester);
            }
            if !turn.outcome_ids().is_empty() {
                return Err(ConversationError::OutcomeMismatch {
                    invocations: Vec::new(),
                    outcomes: owned(turn.outcome_ids()),
                });
            }
            self.turns.push(turn);
            return Ok(());
        };

        if previous.role == turn.role {
            return Err(ConversationError::RoleNotAlternating(turn.role));
        }

        let invocations = previous.invocation_ids();
        let outcomes = turn.outcome_ids();
        match turn.role {
            Role::Requester => {
                if invocations != outcomes {
                    return Err(ConversationError::OutcomeMismatch {
                        invocations: owned(invocations),
                        outcomes: owned(outcomes),
                    });
                }
            }
            Role::Responder => {
                if !outcomes.is_empty() {
                    return Err(ConversationError::OutcomeMismatch {
                        invocations: Vec::new(),
                        outcomes: owned(outcomes),
                    });
                }
            }
        }

        self.turns.push(turn);
        Ok(())
    }

    /// Adds user input: a new requester turn, or appended to a trailing
    /// requester turn (e.g. tool results left by a cancelled run).
    pub fn push_requester_input(
        &mut self,
        blocks: Vec<ContentBlock>,
    ) -> Result<(), ConversationError> {
        if let Some(last) = self.turns.last_mut() {
            if last.role == Role::Requester {
                last.content.extend(blocks);
                return Ok(());
            }
            let pending = last.invocation_ids();
            if !pending.is_empty() {
                return Err(ConversationError::UnansweredInvocations(owned(pending)));
            }
        }
        self.push(Turn::requester(blocks))
    }

    /// Text of the last responder turn, if any.
    pub fn final_answer(&self) -> Option<String> {
        self.turns
            .iter()
            .rev()
            .find(|turn| turn.role == Role::Responder)
            .map(Turn::text)
    }
}

fn owned(ids: Vec<&str>) -> Vec<String> {
    ids.into_iter().map(ToOwned::to_owned).collect()
}
