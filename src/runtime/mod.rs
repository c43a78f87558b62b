pub mod event;

pub use event::RunEvent;

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::ModelBackend;
use crate::config::RunSettings;
use crate::state::conversation::{ConversationController, RunStatus};
use crate::tools::ToolRegistry;
use crate::types::{Attachment, ContentBlock, Conversation, ConversationError};

/// What the user asked for: text plus optional images.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Instruction {
    pub text: String,
    pub attachments: Vec<Attachment>,
}

impl Instruction {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachments: Vec::new(),
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.attachments.is_empty()
    }

    /// Images go first so the model sees them before the question.
    fn into_blocks(self) -> Vec<ContentBlock> {
        let mut blocks: Vec<ContentBlock> = self
            .attachments
            .into_iter()
            .map(ContentBlock::Attachment)
            .collect();
        if !self.text.trim().is_empty() {
            blocks.push(ContentBlock::text(self.text));
        }
        blocks
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a run is already in progress")]
    RunInProgress,
    #[error("no run has been started")]
    NoActiveRun,
    #[error("instruction has neither text nor attachments")]
    EmptyInstruction,
    #[error(transparent)]
    Conversation(#[from] ConversationError),
    #[error("run task ended abnormally: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// The presentation side of one run.
pub struct RunHandle {
    pub events: mpsc::UnboundedReceiver<RunEvent>,
    cancel: CancellationToken,
}

impl RunHandle {
    pub async fn next_event(&mut self) -> Option<RunEvent> {
        self.events.recv().await
    }

    /// Asks the run to stop at the next cycle boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

struct ActiveRun {
    task: JoinHandle<(Conversation, RunStatus)>,
    snapshot: Conversation,
}

/// Owns the conversation between runs and lends it to one background run
/// at a time.
pub struct AgentSession<B: ModelBackend> {
    controller: ConversationController<B>,
    conversation: Conversation,
    active: Option<ActiveRun>,
}

impl<B: ModelBackend> AgentSession<B> {
    pub fn new(
        backend: Arc<B>,
        registry: Arc<ToolRegistry>,
        settings: watch::Receiver<RunSettings>,
    ) -> Self {
        Self::with_controller(ConversationController::new(backend, registry, settings))
    }

    pub fn with_controller(controller: ConversationController<B>) -> Self {
        Self {
            controller,
            conversation: Conversation::new(),
            active: None,
        }
    }

    /// The conversation as of the last finished run.
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// Replaces the idle conversation, e.g. with an imported export.
    pub fn restore(&mut self, conversation: Conversation) -> Result<(), SessionError> {
        self.ensure_idle()?;
        self.conversation = conversation;
        Ok(())
    }

    /// Starts a fresh task; earlier history is discarded.
    pub fn start_task(&mut self, instruction: Instruction) -> Result<RunHandle, SessionError> {
        self.ensure_idle()?;
        if instruction.is_empty() {
            return Err(SessionError::EmptyInstruction);
        }
        let mut conversation = Conversation::new();
        conversation.push_requester_input(instruction.into_blocks())?;
        self.conversation = conversation;
        Ok(self.spawn_run())
    }

    /// Continues the preserved history with another instruction.
    pub fn follow_up(&mut self, instruction: Instruction) -> Result<RunHandle, SessionError> {
        self.ensure_idle()?;
        if instruction.is_empty() {
            return Err(SessionError::EmptyInstruction);
        }
        self.conversation
            .push_requester_input(instruction.into_blocks())?;
        Ok(self.spawn_run())
    }

    /// Waits for the background run and takes the conversation back. A run
    /// task that panicked leaves the conversation as it was when started.
    pub async fn finish_run(&mut self) -> Result<RunStatus, SessionError> {
        let active = self.active.take().ok_or(SessionError::NoActiveRun)?;
        match active.task.await {
            Ok((conversation, status)) => {
                self.conversation = conversation;
                Ok(status)
            }
            Err(error) => {
                tracing::error!(%error, "run task did not finish");
                self.conversation = active.snapshot;
                Err(SessionError::Join(error))
            }
        }
    }

    fn ensure_idle(&self) -> Result<(), SessionError> {
        if self.active.is_some() {
            return Err(SessionError::RunInProgress);
        }
        Ok(())
    }

    fn spawn_run(&mut self) -> RunHandle {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let run_cancel = cancel.clone();
        let controller = self.controller.clone();
        let mut conversation = std::mem::take(&mut self.conversation);
        let snapshot = conversation.clone();

        tracing::debug!(turns = conversation.len(), "starting run");
        let task = tokio::spawn(async move {
            let status = controller
                .run(&mut conversation, &run_cancel, &events_tx)
                .await;
            (conversation, status)
        });
        self.active = Some(ActiveRun { task, snapshot });

        RunHandle {
            events: events_rx,
            cancel,
        }
    }
}
