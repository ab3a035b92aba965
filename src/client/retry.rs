use std::sync::Arc;

use async_trait::async_trait;

use super::ModelClient;
use crate::Result;
use crate::retry::{RetryConfig, RetryExecutor};
use crate::types::{Completion, CompletionRequest};

/// Decorator that wraps a [`ModelClient`] with retry logic.
///
/// On transient errors (as classified by
/// [`TalkWalkError::is_transient()`](crate::TalkWalkError::is_transient)),
/// retries with exponential backoff up to `config.max_attempts`. Respects
/// provider `retry_after` hints from `RateLimited` errors.
pub struct RetryingModelClient {
    inner: Arc<dyn ModelClient>,
    executor: RetryExecutor,
}

impl RetryingModelClient {
    /// Wrap a client with retry logic.
    pub fn new(inner: Arc<dyn ModelClient>, config: RetryConfig) -> Self {
        Self::with_executor(inner, RetryExecutor::new(config))
    }

    /// Wrap a client with an existing executor (custom sleeper).
    pub fn with_executor(inner: Arc<dyn ModelClient>, executor: RetryExecutor) -> Self {
        Self { inner, executor }
    }
}

#[async_trait]
impl ModelClient for RetryingModelClient {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        self.executor
            .execute(self.inner.name(), || self.inner.complete(request))
            .await
    }
}
