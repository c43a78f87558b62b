use super::stream::StreamParser;
use super::{wire, BackendError, EventStream, ModelBackend, ModelRequest};
use crate::config::Config;
use crate::types::StreamEvent;
use crate::util::is_local_endpoint_url;
use futures::{stream, StreamExt};
use reqwest::StatusCode;

const HTTP_OVERLOADED: u16 = 529;

/// HTTP client for an Anthropic-Messages style streaming endpoint.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    api_key: Option<String>,
    api_url: String,
    anthropic_version: String,
}

impl ApiClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            api_url: config.api_url.clone(),
            anthropic_version: config.anthropic_version.clone(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn is_local_endpoint(&self) -> bool {
        is_local_endpoint_url(&self.api_url)
    }
}

impl ModelBackend for ApiClient {
    async fn open_stream(&self, request: &ModelRequest<'_>) -> Result<EventStream, BackendError> {
        let payload = wire::request_body(request);
        let mut http_request = self
            .http
            .post(&self.api_url)
            .header("content-type", "application/json")
            .json(&payload);
        if let Some(api_key) = &self.api_key {
            http_request = http_request.header("x-api-key", api_key);
        }
        if !self.anthropic_version.trim().is_empty() {
            http_request = http_request.header("anthropic-version", &self.anthropic_version);
        }

        tracing::debug!(url = %self.api_url, model = request.model, "opening stream");
        let response = http_request
            .send()
            .await
            .map_err(|error| map_api_request_error(error, &self.api_url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &self.api_url, body));
        }

        let request_url = self.api_url.clone();
        let mut parser = StreamParser::new();
        let events = response
            .bytes_stream()
            .map(move |chunk| match chunk {
                Ok(bytes) => parser
                    .process(&bytes)
                    .into_iter()
                    .map(lift_error_event)
                    .collect::<Vec<_>>(),
                Err(error) => vec![Err(map_api_request_error(error, &request_url))],
            })
            .flat_map(stream::iter);
        Ok(Box::pin(events))
    }
}

/// Turns an in-band SSE `error` event into a `BackendError`.
pub fn lift_error_event(event: StreamEvent) -> Result<StreamEvent, BackendError> {
    match event {
        StreamEvent::Error { error } => Err(BackendError::from_stream_error(
            &error.error_type,
            &error.message,
        )),
        other => Ok(other),
    }
}

fn status_error(status: StatusCode, request_url: &str, body: String) -> BackendError {
    match status.as_u16() {
        429 => BackendError::RateLimited(body),
        HTTP_OVERLOADED => BackendError::Overloaded(body),
        code => BackendError::Status {
            url: request_url.to_string(),
            status: code,
            body,
        },
    }
}

fn map_api_request_error(error: reqwest::Error, request_url: &str) -> BackendError {
    let message = if error.is_connect() && is_local_endpoint_url(request_url) {
        format!(
            "cannot reach local API endpoint '{request_url}': {error}. Start your local server or update ANTHROPIC_API_URL."
        )
    } else if error.is_connect() {
        format!("cannot reach API endpoint '{request_url}': {error}")
    } else if error.is_timeout() {
        format!("API request to '{request_url}' timed out: {error}")
    } else {
        format!("API request to '{request_url}' failed: {error}")
    };
    BackendError::Transport(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::RetryClass;
    use crate::types::StreamErrorBody;

    #[test]
    fn test_status_codes_map_to_retry_classes() {
        let url = "https://api.anthropic.com/v1/messages";
        assert_eq!(
            status_error(StatusCode::TOO_MANY_REQUESTS, url, String::new()).retry_class(),
            Some(RetryClass::RateLimit)
        );
        assert_eq!(
            status_error(StatusCode::from_u16(529).unwrap(), url, String::new()).retry_class(),
            Some(RetryClass::Overload)
        );
        match status_error(StatusCode::BAD_REQUEST, url, "bad".to_string()) {
            BackendError::Status { status, body, .. } => {
                assert_eq!(status, 400);
                assert_eq!(body, "bad");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_in_band_error_events_are_lifted() {
        let lifted = lift_error_event(StreamEvent::Error {
            error: StreamErrorBody {
                error_type: "overloaded_error".to_string(),
                message: "Overloaded".to_string(),
            },
        });
        assert!(matches!(lifted, Err(BackendError::Overloaded(_))));
        assert!(lift_error_event(StreamEvent::Ping).is_ok());
    }

    #[test]
    fn test_client_uses_configured_endpoint() {
        let config = Config {
            api_url: "http://localhost:8000/v1/messages".to_string(),
            ..Config::default()
        };
        let client = ApiClient::new(&config);
        assert_eq!(client.api_url(), "http://localhost:8000/v1/messages");
        assert!(client.is_local_endpoint());
    }
}
