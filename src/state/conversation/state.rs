use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;

use super::retry::RetryPolicy;
use super::streaming::DecodeError;
use crate::api::{BackendError, ModelBackend, RetryClass};
use crate::config::RunSettings;
use crate::tools::ToolRegistry;
use crate::types::ConversationError;

/// How a run ended.
#[derive(Debug)]
pub enum RunStatus {
    Completed,
    Cancelled,
    Failed(RunError),
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("{source} (gave up after {attempts} attempts)")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: BackendError,
    },
    #[error("malformed model response: {0}")]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Conversation(#[from] ConversationError),
}

/// Drives request / stream / tool cycles against a [`ModelBackend`].
pub struct ConversationController<B: ModelBackend> {
    pub(super) backend: Arc<B>,
    pub(super) registry: Arc<ToolRegistry>,
    pub(super) settings: watch::Receiver<RunSettings>,
    pub(super) rate_limit: RetryPolicy,
    pub(super) overload: RetryPolicy,
}

impl<B: ModelBackend> Clone for ConversationController<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            registry: Arc::clone(&self.registry),
            settings: self.settings.clone(),
            rate_limit: self.rate_limit,
            overload: self.overload,
        }
    }
}

impl<B: ModelBackend> ConversationController<B> {
    pub fn new(
        backend: Arc<B>,
        registry: Arc<ToolRegistry>,
        settings: watch::Receiver<RunSettings>,
    ) -> Self {
        Self {
            backend,
            registry,
            settings,
            rate_limit: RetryPolicy::RATE_LIMIT,
            overload: RetryPolicy::OVERLOAD,
        }
    }

    pub fn with_retry_policies(mut self, rate_limit: RetryPolicy, overload: RetryPolicy) -> Self {
        self.rate_limit = rate_limit;
        self.overload = overload;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub(super) fn policy_for(&self, class: RetryClass) -> &RetryPolicy {
        match class {
            RetryClass::RateLimit => &self.rate_limit,
            RetryClass::Overload => &self.overload,
        }
    }

    /// Settings as of now; read once per cycle.
    pub(super) fn snapshot_settings(&self) -> RunSettings {
        self.settings.borrow().clone()
    }
}
