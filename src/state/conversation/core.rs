use super::retry::{retry_notice, RetryState};
use super::state::{ConversationController, RunError, RunStatus};
use super::streaming::{DecodedResponse, StreamDecoder};
use crate::api::client::lift_error_event;
use crate::api::{wire, ModelBackend, ModelRequest};
use crate::config::RunSettings;
use crate::runtime::RunEvent;
use crate::safety::ChannelConfirmer;
use crate::tools::Capabilities;
use crate::types::{ContentBlock, Conversation, ToolPayload, Turn};
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

pub const STOPPED_BY_USER: &str = "Agent stopped by user.";

enum CycleOutcome {
    ToolsExecuted,
    Finished,
    Cancelled,
}

struct PendingCall {
    id: String,
    name: String,
    arguments: Value,
}

fn emit(events: &UnboundedSender<RunEvent>, event: RunEvent) {
    // A closed channel only means nobody is watching any more.
    let _ = events.send(event);
}

fn emit_all(events: &UnboundedSender<RunEvent>, batch: impl IntoIterator<Item = RunEvent>) {
    for event in batch {
        emit(events, event);
    }
}

impl<B: ModelBackend> ConversationController<B> {
    /// Runs cycles until the model answers, the run is cancelled or a
    /// terminal failure occurs. Exactly one terminal event is emitted.
    ///
    /// The conversation is only extended by whole cycles, so on failure it
    /// stays as it was after the last completed one.
    pub async fn run(
        &self,
        conversation: &mut Conversation,
        cancel: &CancellationToken,
        events: &UnboundedSender<RunEvent>,
    ) -> RunStatus {
        let mut decoder = StreamDecoder::new();
        let mut cycle = 0u32;

        loop {
            if cancel.is_cancelled() {
                return self.cancelled(events);
            }
            cycle += 1;
            let settings = self.snapshot_settings();

            match self
                .cycle(cycle, &settings, conversation, &mut decoder, cancel, events)
                .await
            {
                Ok(CycleOutcome::ToolsExecuted) => {}
                Ok(CycleOutcome::Finished) => {
                    tracing::info!(cycles = cycle, "run complete");
                    emit(events, RunEvent::RunComplete);
                    return RunStatus::Completed;
                }
                Ok(CycleOutcome::Cancelled) => return self.cancelled(events),
                Err(error) => {
                    tracing::error!(cycle, %error, "run failed");
                    emit(events, RunEvent::RunError(error.to_string()));
                    return RunStatus::Failed(error);
                }
            }
        }
    }

    fn cancelled(&self, events: &UnboundedSender<RunEvent>) -> RunStatus {
        tracing::info!("run cancelled");
        emit(events, RunEvent::ToolInfo(STOPPED_BY_USER.to_string()));
        emit(events, RunEvent::RunCancelled);
        RunStatus::Cancelled
    }

    async fn cycle(
        &self,
        cycle: u32,
        settings: &RunSettings,
        conversation: &mut Conversation,
        decoder: &mut StreamDecoder,
        cancel: &CancellationToken,
        events: &UnboundedSender<RunEvent>,
    ) -> Result<CycleOutcome, RunError> {
        emit(events, RunEvent::CallStarted(cycle));

        let tools = self.registry.enabled_tools(settings.capabilities);
        let request = ModelRequest {
            model: &settings.model,
            system: &settings.system_prompt,
            turns: conversation.turns(),
            tools: &tools,
            sampling: settings.sampling,
        };
        let audit = serde_json::to_string_pretty(&wire::audit_body(&request)).unwrap_or_default();
        emit(events, RunEvent::Payload(audit));
        tracing::info!(
            cycle,
            model = %settings.model,
            turns = request.turns.len(),
            tools = tools.len(),
            "requesting model response"
        );

        let Some(response) = self.stream_with_retry(&request, decoder, cancel, events).await?
        else {
            return Ok(CycleOutcome::Cancelled);
        };

        if !response.needs_tools() {
            conversation.push(Turn::responder(vec![ContentBlock::text(response.text())]))?;
            return Ok(CycleOutcome::Finished);
        }

        let calls: Vec<PendingCall> = response
            .blocks
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolInvocation {
                    id,
                    name,
                    arguments,
                } => Some(PendingCall {
                    id: id.clone(),
                    name: name.clone(),
                    arguments: arguments.clone(),
                }),
                _ => None,
            })
            .collect();
        conversation.push(Turn::responder(response.blocks))?;

        let outcomes = self
            .execute_tools(calls, settings.capabilities, events)
            .await;
        conversation.push(Turn::requester(outcomes))?;
        Ok(CycleOutcome::ToolsExecuted)
    }

    /// Opens and decodes one response, retrying rate-limit and overload
    /// failures. `None` means the run was cancelled during a backoff.
    async fn stream_with_retry(
        &self,
        request: &ModelRequest<'_>,
        decoder: &mut StreamDecoder,
        cancel: &CancellationToken,
        events: &UnboundedSender<RunEvent>,
    ) -> Result<Option<DecodedResponse>, RunError> {
        let mut retry = RetryState::default();
        loop {
            emit_all(
                events,
                decoder.begin_response(request.sampling.reasoning_enabled()),
            );

            let error = match self.stream_once(request, decoder, events).await {
                Ok(response) => return Ok(Some(response)),
                Err(RunError::Backend(error)) => error,
                Err(other) => return Err(other),
            };
            let Some(class) = error.retry_class() else {
                return Err(RunError::Backend(error));
            };
            let policy = *self.policy_for(class);
            let Some(delay) = retry.record_failure(&policy) else {
                return Err(RunError::RetriesExhausted {
                    attempts: retry.attempt_count,
                    source: error,
                });
            };

            tracing::warn!(
                attempt = retry.attempt_count,
                delay_ms = delay.as_millis() as u64,
                %error,
                "retrying model request"
            );
            emit(
                events,
                RunEvent::ToolInfo(retry_notice(
                    class,
                    delay,
                    retry.attempt_count,
                    policy.max_attempts,
                )),
            );
            tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn stream_once(
        &self,
        request: &ModelRequest<'_>,
        decoder: &mut StreamDecoder,
        events: &UnboundedSender<RunEvent>,
    ) -> Result<DecodedResponse, RunError> {
        let mut stream = self.backend.open_stream(request).await?;
        while let Some(item) = stream.next().await {
            let event = lift_error_event(item?)?;
            emit_all(events, decoder.apply(event)?);
        }
        let mut response = decoder.finish()?;
        emit_all(events, std::mem::take(&mut response.trailing));
        Ok(response)
    }

    /// Runs the calls one after another on the blocking pool. Every call gets
    /// an outcome; tool failures are reported to the model as text.
    async fn execute_tools(
        &self,
        calls: Vec<PendingCall>,
        capabilities: Capabilities,
        events: &UnboundedSender<RunEvent>,
    ) -> Vec<ContentBlock> {
        let mut outcomes = Vec::with_capacity(calls.len());
        for call in calls {
            emit(
                events,
                RunEvent::ToolCallStarted {
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                },
            );
            if let Some(activity) = self.registry.activity(&call.name, &call.arguments) {
                emit(events, RunEvent::ToolInfo(activity));
            }
            tracing::info!(tool = %call.name, id = %call.id, "executing tool");

            let registry = Arc::clone(&self.registry);
            let confirmer = ChannelConfirmer::new(events.clone());
            let name = call.name.clone();
            let arguments = call.arguments;
            let payload = tokio::task::spawn_blocking(move || {
                registry.resolve(&name, &arguments, capabilities, &confirmer)
            })
            .await
            .unwrap_or_else(|error| {
                tracing::error!(tool = %call.name, %error, "tool task aborted");
                ToolPayload::text(format!("Error: {} failed: {error}", call.name))
            });

            outcomes.push(ContentBlock::ToolOutcome {
                invocation_id: call.id,
                payload,
            });
        }
        outcomes
    }
}
