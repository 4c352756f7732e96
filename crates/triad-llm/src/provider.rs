use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tracing::instrument;

use triad_core::backend::{BackendId, CompletionBackend};
use triad_core::errors::BackendError;
use triad_core::messages::ConversationHistory;

use crate::converter;

/// Connection settings for [`ChatCompletionsBackend`].
#[derive(Clone, Debug)]
pub struct HttpBackendConfig {
    pub api_url: String,
    pub api_key: SecretString,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

/// Backend speaking the OpenAI-compatible chat-completions protocol.
pub struct ChatCompletionsBackend {
    client: Client,
    api_url: String,
    api_key: SecretString,
    request_timeout: Duration,
}

impl ChatCompletionsBackend {
    pub fn new(config: HttpBackendConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| BackendError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_url: config.api_url,
            api_key: config.api_key,
            request_timeout: config.request_timeout,
        })
    }

    fn map_transport_error(&self, e: reqwest::Error) -> BackendError {
        if e.is_timeout() {
            BackendError::Timeout(self.request_timeout)
        } else {
            BackendError::Network(e.to_string())
        }
    }
}

#[async_trait]
impl CompletionBackend for ChatCompletionsBackend {
    fn name(&self) -> &str {
        "chat_completions"
    }

    #[instrument(skip(self, history), fields(backend = %backend, turns = history.len()))]
    async fn complete(
        &self,
        history: &ConversationHistory,
        backend: &BackendId,
        max_output_tokens: u32,
    ) -> Result<String, BackendError> {
        let body = converter::build_request_body(history, backend.as_str(), max_output_tokens);

        let resp = self
            .client
            .post(&self.api_url)
            .bearer_auth(self.api_key.expose_secret())
            .header("accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(BackendError::from_status(status, body));
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| BackendError::MalformedResponse(e.to_string()))?;

        converter::parse_completion(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(api_url: String) -> HttpBackendConfig {
        HttpBackendConfig {
            api_url,
            api_key: SecretString::from("test-key"),
            connect_timeout: Duration::from_secs(3),
            request_timeout: Duration::from_secs(10),
        }
    }

    fn backend_for(server: &MockServer) -> ChatCompletionsBackend {
        ChatCompletionsBackend::new(config(format!("{}/chat/completions", server.uri()))).unwrap()
    }

    fn history() -> ConversationHistory {
        let mut h = ConversationHistory::new();
        h.append_request("hello").unwrap();
        h
    }

    #[tokio::test]
    async fn successful_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "hi there"}}]
            })))
            .mount(&server)
            .await;

        let backend = backend_for(&server);
        let text = backend
            .complete(&history(), &BackendId::from("model-a"), 1500)
            .await
            .unwrap();
        assert_eq!(text, "hi there");
    }

    #[tokio::test]
    async fn rate_limit_status_maps_to_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let err = backend_for(&server)
            .complete(&history(), &BackendId::from("model-a"), 1500)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::RateLimited));
    }

    #[tokio::test]
    async fn server_error_maps_to_backend_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let err = backend_for(&server)
            .complete(&history(), &BackendId::from("model-a"), 1500)
            .await
            .unwrap_err();
        match err {
            BackendError::BackendStatus { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "unavailable");
            }
            other => panic!("expected BackendStatus, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_json_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = backend_for(&server)
            .complete(&history(), &BackendId::from("model-a"), 1500)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::MalformedResponse(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn unreachable_host_is_network_error() {
        let backend =
            ChatCompletionsBackend::new(config("http://127.0.0.1:9/chat/completions".into()))
                .unwrap();
        let err = backend
            .complete(&history(), &BackendId::from("model-a"), 10)
            .await
            .unwrap_err();
        assert!(
            matches!(err, BackendError::Network(_) | BackendError::Timeout(_)),
            "got: {err:?}"
        );
        assert!(!err.is_retryable());
    }
}
