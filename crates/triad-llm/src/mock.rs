use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use triad_core::backend::{BackendId, CompletionBackend};
use triad_core::errors::BackendError;
use triad_core::messages::{ConversationHistory, ConversationTurn};

/// Pre-programmed responses for deterministic testing without API calls.
#[derive(Clone, Debug)]
pub enum MockResponse {
    /// Return a completion.
    Text(String),
    /// Fail the call.
    Error(BackendError),
    /// Wait a duration, then resolve the inner response.
    Delay(Duration, Box<MockResponse>),
}

impl MockResponse {
    pub fn text(text: &str) -> Self {
        Self::Text(text.to_string())
    }

    pub fn delayed(delay: Duration, inner: MockResponse) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// A call observed by [`MockBackend`].
#[derive(Clone, Debug)]
pub struct RecordedCall {
    pub backend: BackendId,
    pub turns: Vec<ConversationTurn>,
    pub max_output_tokens: u32,
}

/// Backend that returns scripted responses in order, then a fallback
/// response (if any) for every further call.
pub struct MockBackend {
    responses: Mutex<VecDeque<MockResponse>>,
    fallback: Option<MockResponse>,
    calls: Mutex<Vec<RecordedCall>>,
    call_count: AtomicUsize,
}

impl MockBackend {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            fallback: None,
            calls: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    /// Every call resolves to `response`.
    pub fn always(response: MockResponse) -> Self {
        Self::new(Vec::new()).with_fallback(response)
    }

    pub fn with_fallback(mut self, response: MockResponse) -> Self {
        self.fallback = Some(response);
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Backends in the order they were called.
    pub fn backends_called(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .map(|c| c.backend.as_str().to_string())
            .collect()
    }
}

#[async_trait]
impl CompletionBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(
        &self,
        history: &ConversationHistory,
        backend: &BackendId,
        max_output_tokens: u32,
    ) -> Result<String, BackendError> {
        let idx = self.call_count.fetch_add(1, Ordering::Relaxed);
        self.calls.lock().push(RecordedCall {
            backend: backend.clone(),
            turns: history.turns().to_vec(),
            max_output_tokens,
        });

        let scripted = self.responses.lock().pop_front();
        let response = match scripted.or_else(|| self.fallback.clone()) {
            Some(r) => r,
            None => {
                return Err(BackendError::Other(format!(
                    "MockBackend: no response configured for call {idx}"
                )))
            }
        };

        resolve_response(response).await
    }
}

/// Resolve a MockResponse, unrolling nested delays iteratively.
async fn resolve_response(response: MockResponse) -> Result<String, BackendError> {
    let mut current = response;
    loop {
        match current {
            MockResponse::Text(text) => return Ok(text),
            MockResponse::Error(e) => return Err(e),
            MockResponse::Delay(duration, inner) => {
                tokio::time::sleep(duration).await;
                current = *inner;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history() -> ConversationHistory {
        let mut h = ConversationHistory::new();
        h.append_request("q").unwrap();
        h
    }

    #[tokio::test]
    async fn sequential_responses() {
        let mock = MockBackend::new(vec![MockResponse::text("first"), MockResponse::text("second")]);
        let id = BackendId::from("m");
        assert_eq!(mock.complete(&history(), &id, 10).await.unwrap(), "first");
        assert_eq!(mock.complete(&history(), &id, 10).await.unwrap(), "second");
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn exhausted_without_fallback_errors() {
        let mock = MockBackend::new(vec![MockResponse::text("only")]);
        let id = BackendId::from("m");
        let _ = mock.complete(&history(), &id, 10).await;
        let err = mock.complete(&history(), &id, 10).await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn fallback_repeats_forever() {
        let mock = MockBackend::always(MockResponse::Error(BackendError::RateLimited));
        let id = BackendId::from("m");
        for _ in 0..5 {
            assert!(matches!(
                mock.complete(&history(), &id, 10).await,
                Err(BackendError::RateLimited)
            ));
        }
        assert_eq!(mock.call_count(), 5);
    }

    #[tokio::test]
    async fn records_history_and_backend() {
        let mock = MockBackend::always(MockResponse::text("ok"));
        let _ = mock.complete(&history(), &BackendId::from("alpha"), 42).await;
        let calls = mock.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].backend.as_str(), "alpha");
        assert_eq!(calls[0].turns.len(), 1);
        assert_eq!(calls[0].turns[0].content(), "q");
        assert_eq!(calls[0].max_output_tokens, 42);
        assert_eq!(mock.backends_called(), vec!["alpha"]);
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_response_waits() {
        let mock = MockBackend::new(vec![MockResponse::delayed(
            Duration::from_secs(2),
            MockResponse::text("late"),
        )]);
        let start = tokio::time::Instant::now();
        let text = mock.complete(&history(), &BackendId::from("m"), 10).await.unwrap();
        assert_eq!(text, "late");
        assert!(start.elapsed() >= Duration::from_secs(2));
    }
}
