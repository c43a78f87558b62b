use agentdesk::api::{ApiClient, BackendError, ModelBackend, ModelRequest};
use agentdesk::config::{Config, RunSettings, SamplingMode};
use agentdesk::runtime::{AgentSession, Instruction, RunEvent};
use agentdesk::safety::SafetyGate;
use agentdesk::state::conversation::RunStatus;
use agentdesk::tools::{default_catalog, ToolRegistry};
use agentdesk::types::{ContentBlock, StreamEvent, Turn};
use futures::StreamExt;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn sse_response(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(body.to_string())
}

fn text_sse(text: &str) -> String {
    let delta = serde_json::json!({
        "type": "content_block_delta",
        "index": 0,
        "delta": {"type": "text_delta", "text": text}
    });
    format!(
        "event: message_start\ndata: {{\"type\":\"message_start\",\"message\":{{\"id\":\"msg_1\",\"role\":\"assistant\",\"content\":[]}}}}\n\n\
event: content_block_start\ndata: {{\"type\":\"content_block_start\",\"index\":0,\"content_block\":{{\"type\":\"text\",\"text\":\"\"}}}}\n\n\
event: content_block_delta\ndata: {delta}\n\n\
event: content_block_stop\ndata: {{\"type\":\"content_block_stop\",\"index\":0}}\n\n\
event: message_delta\ndata: {{\"type\":\"message_delta\",\"delta\":{{\"stop_reason\":\"end_turn\"}}}}\n\n\
event: message_stop\ndata: {{\"type\":\"message_stop\"}}\n\n"
    )
}

fn client_for(server: &MockServer) -> ApiClient {
    ApiClient::new(&Config {
        api_key: Some("test-api-key".to_string()),
        api_url: format!("{}/v1/messages", server.uri()),
        ..Config::default()
    })
}

fn hello_turns() -> Vec<Turn> {
    vec![Turn::requester(vec![ContentBlock::text("hello")])]
}

#[tokio::test]
async fn test_stream_events_arrive_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "test-api-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .respond_with(sse_response(&text_sse("Hi!")))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let turns = hello_turns();
    let request = ModelRequest {
        model: "claude-sonnet-4-5-20250929",
        system: "test",
        turns: &turns,
        tools: &[],
        sampling: SamplingMode::Temperature(1.0),
    };
    let events: Vec<StreamEvent> = client
        .open_stream(&request)
        .await
        .unwrap()
        .map(|event| event.unwrap())
        .collect()
        .await;

    assert_eq!(events.len(), 6);
    assert!(matches!(events[0], StreamEvent::MessageStart { .. }));
    assert!(matches!(events[5], StreamEvent::MessageStop));
}

#[tokio::test]
async fn test_http_status_codes_map_to_backend_errors() {
    let server = MockServer::start().await;
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(move |_req: &Request| {
            match counter.fetch_add(1, Ordering::SeqCst) {
                0 => ResponseTemplate::new(429).set_body_string("slow down"),
                1 => ResponseTemplate::new(529).set_body_string("overloaded"),
                _ => ResponseTemplate::new(401).set_body_string("bad key"),
            }
        })
        .mount(&server)
        .await;

    let client = client_for(&server);
    let turns = hello_turns();
    let request = ModelRequest {
        model: "claude-sonnet-4-5-20250929",
        system: "",
        turns: &turns,
        tools: &[],
        sampling: SamplingMode::Temperature(1.0),
    };

    assert!(matches!(
        client.open_stream(&request).await,
        Err(BackendError::RateLimited(body)) if body == "slow down"
    ));
    assert!(matches!(
        client.open_stream(&request).await,
        Err(BackendError::Overloaded(_))
    ));
    assert!(matches!(
        client.open_stream(&request).await,
        Err(BackendError::Status { status: 401, .. })
    ));
}

#[tokio::test]
async fn test_session_retries_rate_limit_against_http_backend() {
    let server = MockServer::start().await;
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let answer = text_sse("Recovered.");
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(move |request: &Request| {
            let body: Value = serde_json::from_slice(&request.body).unwrap();
            assert_eq!(body["stream"], true);
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                sse_response(
                    "event: error\ndata: {\"type\":\"error\",\"error\":{\"type\":\"rate_limit_error\",\"message\":\"Too many requests\"}}\n\n",
                )
            } else {
                sse_response(&answer)
            }
        })
        .mount(&server)
        .await;

    let registry = ToolRegistry::new(default_catalog(), SafetyGate::with_defaults().unwrap());
    let (_settings_tx, settings_rx) = watch::channel(RunSettings::default());
    let controller = agentdesk::state::conversation::ConversationController::new(
        Arc::new(client_for(&server)),
        Arc::new(registry),
        settings_rx,
    )
    .with_retry_policies(
        agentdesk::state::conversation::RetryPolicy {
            base: std::time::Duration::from_millis(5),
            cap: std::time::Duration::from_millis(5),
            max_attempts: 3,
        },
        agentdesk::state::conversation::RetryPolicy::OVERLOAD,
    );
    let mut session = AgentSession::with_controller(controller);

    let mut handle = session.start_task(Instruction::text("hello")).unwrap();
    let mut notices = Vec::new();
    while let Some(event) = handle.next_event().await {
        if let RunEvent::ToolInfo(text) = event {
            notices.push(text);
        }
    }
    let status = session.finish_run().await.unwrap();

    assert!(matches!(status, RunStatus::Completed));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(notices.len(), 1);
    assert!(notices[0].starts_with("Rate limited, retrying in"));
    assert_eq!(
        session.conversation().final_answer().as_deref(),
        Some("Recovered.")
    );
}
