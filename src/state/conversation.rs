mod core;
mod export;
mod retry;
mod state;
mod streaming;


pub use self::core::STOPPED_BY_USER;
pub use export::{
    export_conversation, import_conversation, load_export, save_export, IMAGE_MARKER,
    SCREENSHOT_MARKER,
};
pub use retry::{RetryPolicy, RetryState};
pub use state::{ConversationController, RunError, RunStatus};
pub use streaming::{DecodeError, DecodedResponse, StreamDecoder};
