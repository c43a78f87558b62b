pub mod client;
#[cfg(test)]
pub mod mock_client;
pub mod stream;
pub mod wire;

pub use client::ApiClient;
pub use stream::StreamParser;

use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

use crate::config::SamplingMode;
use crate::tools::ToolDescriptor;
use crate::types::{StreamEvent, Turn};

pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, BackendError>> + Send>>;

/// Everything needed to open one streamed model response.
#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    pub model: &'a str,
    pub system: &'a str,
    pub turns: &'a [Turn],
    pub tools: &'a [ToolDescriptor],
    pub sampling: SamplingMode,
}

/// Failures that can be retried with backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    RateLimit,
    Overload,
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("backend overloaded: {0}")]
    Overloaded(String),
    #[error("API endpoint '{url}' returned HTTP {status}: {body}")]
    Status { url: String, status: u16, body: String },
    #[error("{0}")]
    Transport(String),
    #[error("stream error ({kind}): {message}")]
    Stream { kind: String, message: String },
}

impl BackendError {
    pub fn retry_class(&self) -> Option<RetryClass> {
        match self {
            Self::RateLimited(_) => Some(RetryClass::RateLimit),
            Self::Overloaded(_) => Some(RetryClass::Overload),
            _ => None,
        }
    }

    /// Maps an SSE `error` event to the matching variant.
    pub fn from_stream_error(kind: &str, message: &str) -> Self {
        match kind {
            "rate_limit_error" => Self::RateLimited(message.to_string()),
            "overloaded_error" => Self::Overloaded(message.to_string()),
            _ => Self::Stream {
                kind: kind.to_string(),
                message: message.to_string(),
            },
        }
    }
}

/// A streaming language-model backend.
pub trait ModelBackend: Send + Sync + 'static {
    fn open_stream(
        &self,
        request: &ModelRequest<'_>,
    ) -> impl Future<Output = Result<EventStream, BackendError>> + Send;
}
