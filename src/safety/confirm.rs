use tokio::sync::{mpsc, oneshot};

use crate::runtime::RunEvent;

/// Asks a human whether a command may run.
///
/// Implementations may block; callers invoke this from the blocking pool only.
pub trait Confirmer: Send + Sync {
    fn confirm(&self, command: &str) -> bool;
}

/// A pending approval handed to the presentation layer.
///
/// Dropping it without answering counts as a denial.
#[derive(Debug)]
pub struct ConfirmationRequest {
    pub command: String,
    responder: oneshot::Sender<bool>,
}

impl ConfirmationRequest {
    pub fn new(command: impl Into<String>) -> (Self, oneshot::Receiver<bool>) {
        let (responder, response_rx) = oneshot::channel();
        (
            Self {
                command: command.into(),
                responder,
            },
            response_rx,
        )
    }

    pub fn respond(self, approved: bool) {
        let _ = self.responder.send(approved);
    }

    pub fn approve(self) {
        self.respond(true);
    }

    pub fn deny(self) {
        self.respond(false);
    }
}

/// Routes confirmations through the run's event channel and waits for the answer.
#[derive(Clone)]
pub struct ChannelConfirmer {
    events: mpsc::UnboundedSender<RunEvent>,
}

impl ChannelConfirmer {
    pub fn new(events: mpsc::UnboundedSender<RunEvent>) -> Self {
        Self { events }
    }
}

impl Confirmer for ChannelConfirmer {
    fn confirm(&self, command: &str) -> bool {
        let (request, response_rx) = ConfirmationRequest::new(command);
        if self
            .events
            .send(RunEvent::ConfirmationRequest(request))
            .is_err()
        {
            tracing::warn!("no listener for confirmation request; denying command");
            return false;
        }
        let approved = response_rx.blocking_recv().unwrap_or(false);
        tracing::info!(approved, "command confirmation answered");
        approved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_confirmer_returns_the_answer() {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let confirmer = ChannelConfirmer::new(events_tx);

        let waiter = tokio::task::spawn_blocking(move || confirmer.confirm("rm notes.txt"));
        match events_rx.recv().await {
            Some(RunEvent::ConfirmationRequest(request)) => {
                assert_eq!(request.command, "rm notes.txt");
                request.approve();
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_dropped_request_is_a_denial() {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let confirmer = ChannelConfirmer::new(events_tx);

        let waiter = tokio::task::spawn_blocking(move || confirmer.confirm("del a.txt"));
        let request = events_rx.recv().await;
        drop(request);
        assert!(!waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_closed_channel_is_a_denial() {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        drop(events_rx);
        let confirmer = ChannelConfirmer::new(events_tx);
        let approved = tokio::task::spawn_blocking(move || confirmer.confirm("del a.txt"))
            .await
            .unwrap();
        assert!(!approved);
    }
}
