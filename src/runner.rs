//! Single-task execution: cache lookup, remote call, usage accounting.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::agents::TaskBehavior;
use crate::cache::{CacheStore, CachedPayload, DEFAULT_TTL, cache_key};
use crate::client::ModelClient;
use crate::retry::{RetryConfig, RetryExecutor};
use crate::telemetry;
use crate::types::{Completion, CompletionRequest, TaskCategory, TaskSpec, TokenUsage};
use crate::usage::UsageLedger;
use crate::{Result, TalkWalkError};

/// What one task produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    /// Structured value from the category's parser.
    pub value: Value,
    /// Raw model text the value was parsed from.
    pub text: String,
    /// Tokens charged for this task. Zero on a cache hit.
    pub usage: TokenUsage,
    pub cache_hit: bool,
}

/// Executes one [`TaskSpec`] at a time; share it across concurrent tasks.
///
/// ```rust,ignore
/// let runner = TaskRunner::new(client)
///     .cache(Arc::new(FileCache::open(".cache")?))
///     .timeout(Duration::from_secs(300));
/// let outcome = runner.run(&spec, behavior.as_ref(), &ledger).await?;
/// ```
pub struct TaskRunner {
    client: Arc<dyn ModelClient>,
    cache: Option<Arc<dyn CacheStore>>,
    executor: RetryExecutor,
    ttl: Duration,
    timeout: Option<Duration>,
    remote_calls: AtomicU32,
}

impl TaskRunner {
    /// A runner with no cache, default retries and no deadline.
    pub fn new(client: Arc<dyn ModelClient>) -> Self {
        Self {
            client,
            cache: None,
            executor: RetryExecutor::new(RetryConfig::default()),
            ttl: DEFAULT_TTL,
            timeout: None,
            remote_calls: AtomicU32::new(0),
        }
    }

    pub fn cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn retry(mut self, executor: RetryExecutor) -> Self {
        self.executor = executor;
        self
    }

    /// Lifetime of entries this runner writes.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Per-task deadline covering every retry attempt.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Remote attempts dispatched so far, retries included.
    pub fn remote_calls(&self) -> u32 {
        self.remote_calls.load(Ordering::Relaxed)
    }

    /// Run one task.
    ///
    /// Cache hits never touch `ledger`. Charged calls are recorded even when
    /// the response then fails to parse, since the tokens were spent.
    /// Nothing is cached unless the response parsed.
    #[instrument(skip_all, fields(category = %spec.category, model = %spec.model_id))]
    pub async fn run(
        &self,
        spec: &TaskSpec,
        behavior: &dyn TaskBehavior,
        ledger: &UsageLedger,
    ) -> Result<TaskOutcome> {
        let started = Instant::now();
        let result = self.run_inner(spec, behavior, ledger).await;

        metrics::histogram!(telemetry::TASK_DURATION_SECONDS, "category" => spec.category.as_str())
            .record(started.elapsed().as_secs_f64());
        if let Err(e) = &result {
            metrics::counter!(telemetry::TASK_FAILURES_TOTAL,
                "category" => spec.category.as_str(),
                "kind" => e.kind().as_str(),
            )
            .increment(1);
        }
        result
    }

    async fn run_inner(
        &self,
        spec: &TaskSpec,
        behavior: &dyn TaskBehavior,
        ledger: &UsageLedger,
    ) -> Result<TaskOutcome> {
        let key = match (&self.cache, spec.cacheable) {
            (Some(_), true) => Some(cache_key(spec.category, &spec.params)),
            _ => None,
        };

        if let Some(key) = &key
            && let Some(outcome) = self.lookup(key, spec, behavior)
        {
            return Ok(outcome);
        }

        let prompt = behavior.render_prompt(spec)?;
        let request = CompletionRequest::new(&spec.model_id, prompt, spec.max_output_tokens);

        let call = self
            .executor
            .execute(spec.category.as_str(), || self.attempt(&request, spec.category));
        let completion = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| TalkWalkError::Timeout(limit))?,
            None => call.await,
        }?;

        let usage = completion.usage();
        ledger.record(spec.category, &spec.model_id, usage);

        let value = behavior.parse(spec, &completion.text)?;

        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            let payload = CachedPayload::new(
                completion.text.clone(),
                completion.input_tokens,
                completion.output_tokens,
            );
            let ttl = spec.ttl.unwrap_or(self.ttl);
            if let Err(e) = cache.put(key, payload, ttl) {
                warn!(error = %e, "failed to write cache entry");
            }
        }

        Ok(TaskOutcome {
            value,
            text: completion.text,
            usage,
            cache_hit: false,
        })
    }

    /// Serve from cache if a fresh, parseable entry exists.
    fn lookup(
        &self,
        key: &str,
        spec: &TaskSpec,
        behavior: &dyn TaskBehavior,
    ) -> Option<TaskOutcome> {
        let cache = self.cache.as_ref()?;
        let category = spec.category.as_str();

        let entry = match cache.get(key) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                debug!(key, "cache miss");
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "category" => category)
                    .increment(1);
                return None;
            }
            Err(e) => {
                warn!(key, error = %e, "cache read failed, treating as miss");
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "category" => category)
                    .increment(1);
                return None;
            }
        };

        match behavior.parse(spec, &entry.payload.text) {
            Ok(value) => {
                debug!(key, "cache hit");
                metrics::counter!(telemetry::CACHE_HITS_TOTAL, "category" => category)
                    .increment(1);
                Some(TaskOutcome {
                    value,
                    text: entry.payload.text,
                    usage: TokenUsage::default(),
                    cache_hit: true,
                })
            }
            Err(e) => {
                warn!(key, error = %e, "cached response no longer parses, refetching");
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "category" => category)
                    .increment(1);
                None
            }
        }
    }

    async fn attempt(
        &self,
        request: &CompletionRequest,
        category: TaskCategory,
    ) -> Result<Completion> {
        self.remote_calls.fetch_add(1, Ordering::Relaxed);
        let result = self.client.complete(request).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(telemetry::REMOTE_CALLS_TOTAL,
            "category" => category.as_str(),
            "status" => status,
        )
        .increment(1);
        result
    }
}

impl std::fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRunner")
            .field("client", &self.client.name())
            .field("cache", &self.cache.as_ref().map(|c| c.name().to_string()))
            .field("executor", &self.executor)
            .field("ttl", &self.ttl)
            .field("timeout", &self.timeout)
            .finish()
    }
}
