use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use triad_core::backend::{BackendId, CompletionBackend};
use triad_core::messages::ConversationHistory;

use crate::registry::BackendRegistry;

/// Wall-clock ceiling for one dispatch across every backend and retry.
pub const MAX_BUDGET: Duration = Duration::from_secs(15);
/// Tries per backend before falling back to the next one.
pub const ATTEMPTS_PER_BACKEND: u32 = 3;
/// First backoff delay; doubles on every retryable failure of the same backend.
pub const BASE_BACKOFF: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 1500;

/// Returned in place of a completion once every backend path is spent.
pub const SENTINEL_TEXT: &str = "⚠ DEGRADED SERVICE: every backend was rate-limited, unavailable, \
or out of time. Re-submit in a minute or two.";

/// Result of a dispatch. Always convertible to usable text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Completion { backend: BackendId, text: String },
    Degraded,
}

impl DispatchOutcome {
    pub fn text(&self) -> &str {
        match self {
            Self::Completion { text, .. } => text,
            Self::Degraded => SENTINEL_TEXT,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Self::Completion { text, .. } => text,
            Self::Degraded => SENTINEL_TEXT.to_string(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded)
    }
}

/// Delay before the try that follows failed try `attempt` (0-based): 1s, 2s, 4s.
pub fn backoff_delay(attempt: u32) -> Duration {
    BASE_BACKOFF * 2u32.pow(attempt)
}

/// Tries each registered backend in order under a single deadline.
///
/// - Retryable failures (rate limit, backend status) back off 1s → 2s → 4s
/// - Any other failure falls through to the next backend without sleeping
/// - A sleep that would end past the deadline is skipped and the backend abandoned
/// - Once the deadline passes no further attempt starts; the outcome is `Degraded`
///
/// An attempt already in flight when the deadline passes runs to completion.
pub struct FallbackDispatcher {
    backend: Arc<dyn CompletionBackend>,
    max_output_tokens: u32,
    total_attempts: AtomicU64,
    total_degraded: AtomicU64,
}

impl FallbackDispatcher {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self {
            backend,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            total_attempts: AtomicU64::new(0),
            total_degraded: AtomicU64::new(0),
        }
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    /// Backend calls started since construction.
    pub fn total_attempts(&self) -> u64 {
        self.total_attempts.load(Ordering::Relaxed)
    }

    /// Dispatches that ended in [`DispatchOutcome::Degraded`].
    pub fn total_degraded(&self) -> u64 {
        self.total_degraded.load(Ordering::Relaxed)
    }

    #[instrument(
        skip_all,
        fields(provider = self.backend.name(), turns = history.len(), backends = registry.len())
    )]
    pub async fn dispatch(
        &self,
        history: &ConversationHistory,
        registry: &BackendRegistry,
    ) -> DispatchOutcome {
        debug_assert!(history.awaiting_response(), "dispatch needs a pending requester turn");

        let started = Instant::now();
        let deadline = started + MAX_BUDGET;

        'backends: for backend in registry.iter() {
            if Instant::now() >= deadline {
                debug!(backend = %backend, "deadline reached before backend was tried");
                break;
            }

            for attempt in 0..ATTEMPTS_PER_BACKEND {
                if Instant::now() >= deadline {
                    debug!(backend = %backend, attempt, "deadline reached, abandoning backend");
                    continue 'backends;
                }

                self.total_attempts.fetch_add(1, Ordering::Relaxed);
                let error = match self
                    .backend
                    .complete(history, backend, self.max_output_tokens)
                    .await
                {
                    Ok(text) => {
                        info!(
                            backend = %backend,
                            attempt = attempt + 1,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "completion received"
                        );
                        return DispatchOutcome::Completion {
                            backend: backend.clone(),
                            text,
                        };
                    }
                    Err(e) => e,
                };

                if !error.is_retryable() {
                    warn!(
                        backend = %backend,
                        attempt = attempt + 1,
                        error_kind = error.error_kind(),
                        error = %error,
                        "non-retryable backend error, falling back"
                    );
                    continue 'backends;
                }

                let delay = backoff_delay(attempt);
                let remaining = deadline.saturating_duration_since(Instant::now());
                warn!(
                    backend = %backend,
                    attempt = attempt + 1,
                    error_kind = error.error_kind(),
                    error = %error,
                    delay_ms = delay.as_millis() as u64,
                    remaining_ms = remaining.as_millis() as u64,
                    "retryable backend error"
                );

                if remaining < delay {
                    debug!(backend = %backend, "backoff would overrun deadline, skipping sleep");
                    continue 'backends;
                }
                tokio::time::sleep(delay).await;
            }
        }

        self.total_degraded.fetch_add(1, Ordering::Relaxed);
        warn!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "all backends exhausted, returning degraded outcome"
        );
        DispatchOutcome::Degraded
    }
}
