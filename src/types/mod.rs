mod api;
mod conversation;

pub use api::{Delta, MessageDelta, MessageStartData, StreamBlockKind, StreamErrorBody, StreamEvent};
pub use conversation::{
    Attachment, ContentBlock, Conversation, ConversationError, Role, ToolPart, ToolPayload, Turn,
};
