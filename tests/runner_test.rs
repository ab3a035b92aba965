use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use talkwalk::agents::{AnalyzeBehavior, LocateBehavior, SynthesizeBehavior};
use talkwalk::{
    CacheEntry, CacheStore, CachedPayload, Completion, CompletionRequest, FailureKind, ManualClock,
    MemoryCache, ModelClient, Result, RetryConfig, RetryExecutor, Sleeper, TalkWalkError, TaskCategory,
    TaskRunner, TaskSpec, UsageLedger, cache_key,
};

/// Replays canned replies in order; repeats the last one when exhausted.
struct ScriptedClient {
    replies: Mutex<Vec<Result<Completion>>>,
    calls: AtomicU32,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedClient {
    fn new(replies: Vec<Result<Completion>>) -> Self {
        Self {
            replies: Mutex::new(replies),
            calls: AtomicU32::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn always(text: &str) -> Self {
        Self::new(vec![Ok(completion(text))])
    }

    fn call_count(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ModelClient for ScriptedClient {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.prompts.lock().unwrap().push(request.prompt.clone());
        let mut replies = self.replies.lock().unwrap();
        let reply = if replies.len() > 1 {
            replies.remove(0)
        } else {
            match &replies[0] {
                Ok(c) => Ok(c.clone()),
                Err(e) => Err(clone_error(e)),
            }
        };
        reply
    }
}

fn clone_error(e: &TalkWalkError) -> TalkWalkError {
    match e {
        TalkWalkError::RateLimited { retry_after } => TalkWalkError::RateLimited {
            retry_after: *retry_after,
        },
        TalkWalkError::AuthenticationFailed => TalkWalkError::AuthenticationFailed,
        other => TalkWalkError::Http(other.to_string()),
    }
}

/// Never waits.
struct NoSleep;

#[async_trait]
impl Sleeper for NoSleep {
    async fn sleep(&self, _duration: Duration) {}
}

/// A store whose disk has gone away: reads and/or writes fail with `CacheIo`.
struct FailingCache {
    fail_get: bool,
    fail_put: bool,
    puts: AtomicU32,
}

impl FailingCache {
    fn new(fail_get: bool, fail_put: bool) -> Self {
        Self {
            fail_get,
            fail_put,
            puts: AtomicU32::new(0),
        }
    }
}

impl CacheStore for FailingCache {
    fn name(&self) -> &str {
        "failing"
    }

    fn get(&self, _key: &str) -> Result<Option<CacheEntry>> {
        if self.fail_get {
            return Err(TalkWalkError::CacheIo("read failed: input/output error".into()));
        }
        Ok(None)
    }

    fn put(&self, _key: &str, _payload: CachedPayload, _ttl: Duration) -> Result<()> {
        self.puts.fetch_add(1, Ordering::Relaxed);
        if self.fail_put {
            return Err(TalkWalkError::CacheIo("write failed: no space left on device".into()));
        }
        Ok(())
    }

    fn clear_all(&self) -> Result<usize> {
        Ok(0)
    }

    fn clear_expired(&self) -> Result<usize> {
        Ok(0)
    }

    fn len(&self) -> Result<usize> {
        Ok(0)
    }
}

fn completion(text: &str) -> Completion {
    Completion {
        text: text.to_string(),
        input_tokens: 120,
        output_tokens: 30,
    }
}

fn locate_spec(company: &str) -> TaskSpec {
    TaskSpec::new(TaskCategory::Locate, "model-a")
        .max_output_tokens(2000)
        .param("company", company)
}

const LOCATE_REPLY: &str = r#"{"ticker": "ORCL", "tenk_url": "https://sec.gov/orcl"}"#;

fn runner(client: Arc<ScriptedClient>, cache: Arc<MemoryCache>) -> TaskRunner {
    TaskRunner::new(client)
        .cache(cache)
        .retry(RetryExecutor::with_sleeper(
            RetryConfig::new().max_attempts(3),
            Arc::new(NoSleep),
        ))
}

#[tokio::test]
async fn miss_calls_remote_and_records_usage() {
    let client = Arc::new(ScriptedClient::always(LOCATE_REPLY));
    let cache = Arc::new(MemoryCache::new());
    let ledger = UsageLedger::new();

    let outcome = runner(client.clone(), cache.clone())
        .run(&locate_spec("Oracle"), &LocateBehavior, &ledger)
        .await
        .unwrap();

    assert!(!outcome.cache_hit);
    assert_eq!(outcome.value["company"], "Oracle");
    assert_eq!(outcome.value["ticker"], "ORCL");
    assert_eq!(outcome.usage.total(), 150);
    assert_eq!(client.call_count(), 1);
    assert_eq!(ledger.totals().input_tokens, 120);
    assert_eq!(cache.len().unwrap(), 1);
}

#[tokio::test]
async fn hit_is_not_charged_twice() {
    let client = Arc::new(ScriptedClient::always(LOCATE_REPLY));
    let cache = Arc::new(MemoryCache::new());
    let ledger = UsageLedger::new();
    let runner = runner(client.clone(), cache);
    let spec = locate_spec("Oracle");

    let first = runner.run(&spec, &LocateBehavior, &ledger).await.unwrap();
    let after_first = ledger.snapshot();
    let second = runner.run(&spec, &LocateBehavior, &ledger).await.unwrap();

    assert!(second.cache_hit);
    assert_eq!(second.value, first.value);
    assert!(second.usage.is_zero());
    assert_eq!(client.call_count(), 1);
    assert_eq!(ledger.snapshot(), after_first);
    assert_eq!(runner.remote_calls(), 1);
}

#[tokio::test]
async fn non_cacheable_task_always_calls_remote() {
    let client = Arc::new(ScriptedClient::always("# Report"));
    let cache = Arc::new(MemoryCache::new());
    let ledger = UsageLedger::new();
    let runner = runner(client.clone(), cache.clone());
    let spec = TaskSpec::new(TaskCategory::Synthesize, "model-b")
        .cacheable(false)
        .param("analyses", serde_json::json!([]));

    runner.run(&spec, &SynthesizeBehavior, &ledger).await.unwrap();
    runner.run(&spec, &SynthesizeBehavior, &ledger).await.unwrap();

    assert_eq!(client.call_count(), 2);
    assert!(cache.is_empty().unwrap());
    assert_eq!(ledger.snapshot().get(TaskCategory::Synthesize).unwrap().calls, 2);
}

#[tokio::test]
async fn malformed_response_is_charged_but_not_cached() {
    let client = Arc::new(ScriptedClient::always("I'm sorry, I can't find that."));
    let cache = Arc::new(MemoryCache::new());
    let ledger = UsageLedger::new();

    let err = runner(client.clone(), cache.clone())
        .run(&locate_spec("Oracle"), &LocateBehavior, &ledger)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::MalformedResponse);
    // Parse failures are never retried.
    assert_eq!(client.call_count(), 1);
    assert_eq!(ledger.totals().total(), 150);
    assert!(cache.is_empty().unwrap());
}

#[tokio::test]
async fn remote_failure_is_distinct_from_malformed() {
    let client = Arc::new(ScriptedClient::new(vec![Err(
        TalkWalkError::AuthenticationFailed,
    )]));
    let cache = Arc::new(MemoryCache::new());
    let ledger = UsageLedger::new();

    let err = runner(client, cache.clone())
        .run(&locate_spec("Oracle"), &LocateBehavior, &ledger)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::PermanentRemote);
    assert!(ledger.snapshot().records.is_empty());
    assert!(cache.is_empty().unwrap());
}

#[tokio::test]
async fn transient_failures_are_retried_then_cached() {
    let client = Arc::new(ScriptedClient::new(vec![
        Err(TalkWalkError::RateLimited { retry_after: None }),
        Err(TalkWalkError::Api {
            status: 529,
            message: "overloaded".into(),
        }),
        Ok(completion(LOCATE_REPLY)),
    ]));
    let cache = Arc::new(MemoryCache::new());
    let ledger = UsageLedger::new();
    let runner = runner(client.clone(), cache.clone());

    let outcome = runner
        .run(&locate_spec("Oracle"), &LocateBehavior, &ledger)
        .await
        .unwrap();

    assert!(!outcome.cache_hit);
    assert_eq!(client.call_count(), 3);
    assert_eq!(runner.remote_calls(), 3);
    // Only the successful attempt is charged.
    assert_eq!(ledger.snapshot().total_calls(), 1);
    assert_eq!(cache.len().unwrap(), 1);
}

#[tokio::test]
async fn exhausted_retries_report_transient_kind() {
    let client = Arc::new(ScriptedClient::new(vec![Err(TalkWalkError::RateLimited {
        retry_after: None,
    })]));
    let ledger = UsageLedger::new();

    let err = runner(client.clone(), Arc::new(MemoryCache::new()))
        .run(&locate_spec("Oracle"), &LocateBehavior, &ledger)
        .await
        .unwrap_err();

    assert!(matches!(err, TalkWalkError::RetriesExhausted { attempts: 3, .. }));
    assert_eq!(err.kind(), FailureKind::TransientRemote);
    assert_eq!(client.call_count(), 3);
}

#[tokio::test]
async fn unparseable_cache_entry_is_refetched() {
    let client = Arc::new(ScriptedClient::always(LOCATE_REPLY));
    let cache = Arc::new(MemoryCache::new());
    let spec = locate_spec("Oracle");
    cache
        .put(
            &cache_key(spec.category, &spec.params),
            talkwalk::CachedPayload::new("garbage", 1, 1),
            Duration::from_secs(3600),
        )
        .unwrap();
    let ledger = UsageLedger::new();

    let outcome = runner(client.clone(), cache)
        .run(&spec, &LocateBehavior, &ledger)
        .await
        .unwrap();

    assert!(!outcome.cache_hit);
    assert_eq!(client.call_count(), 1);
}

fn runner_with_store(client: Arc<ScriptedClient>, cache: Arc<dyn CacheStore>) -> TaskRunner {
    TaskRunner::new(client)
        .cache(cache)
        .retry(RetryExecutor::with_sleeper(
            RetryConfig::new().max_attempts(3),
            Arc::new(NoSleep),
        ))
}

#[tokio::test]
async fn unreadable_cache_is_treated_as_miss() {
    let client = Arc::new(ScriptedClient::always(LOCATE_REPLY));
    let cache = Arc::new(FailingCache::new(true, false));
    let ledger = UsageLedger::new();

    let outcome = runner_with_store(client.clone(), cache.clone())
        .run(&locate_spec("Oracle"), &LocateBehavior, &ledger)
        .await
        .unwrap();

    assert!(!outcome.cache_hit);
    assert_eq!(outcome.value["ticker"], "ORCL");
    assert_eq!(client.call_count(), 1);
    assert_eq!(ledger.snapshot().total_calls(), 1);
}

#[tokio::test]
async fn failed_cache_write_does_not_fail_task() {
    let client = Arc::new(ScriptedClient::always(LOCATE_REPLY));
    let cache = Arc::new(FailingCache::new(false, true));
    let ledger = UsageLedger::new();

    let outcome = runner_with_store(client.clone(), cache.clone())
        .run(&locate_spec("Oracle"), &LocateBehavior, &ledger)
        .await
        .unwrap();

    assert!(!outcome.cache_hit);
    assert_eq!(outcome.value["company"], "Oracle");
    assert_eq!(cache.puts.load(Ordering::Relaxed), 1);
    assert_eq!(client.call_count(), 1);
    let snapshot = ledger.snapshot();
    let locate = snapshot.get(TaskCategory::Locate).unwrap();
    assert_eq!(locate.calls, 1);
    assert_eq!(locate.input_tokens, 120);
    assert_eq!(locate.output_tokens, 30);
}

#[tokio::test]
async fn task_ttl_overrides_runner_default() {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
    ));
    let cache = Arc::new(MemoryCache::with_clock(clock.clone()));
    let client = Arc::new(ScriptedClient::always(LOCATE_REPLY));
    let ledger = UsageLedger::new();
    let runner = runner(client.clone(), cache).ttl(Duration::from_secs(24 * 3600));

    let short = locate_spec("Oracle").ttl(Duration::from_secs(3600));
    let long = locate_spec("IBM");
    runner.run(&short, &LocateBehavior, &ledger).await.unwrap();
    runner.run(&long, &LocateBehavior, &ledger).await.unwrap();

    clock.advance(Duration::from_secs(2 * 3600));

    assert!(!runner.run(&short, &LocateBehavior, &ledger).await.unwrap().cache_hit);
    assert!(runner.run(&long, &LocateBehavior, &ledger).await.unwrap().cache_hit);
    assert_eq!(client.call_count(), 3);
}

#[tokio::test]
async fn missing_parameter_fails_before_remote_call() {
    let client = Arc::new(ScriptedClient::always("{}"));
    let ledger = UsageLedger::new();
    let spec = TaskSpec::new(TaskCategory::Analyze, "model-b").param("company", "IBM");

    let err = runner(client.clone(), Arc::new(MemoryCache::new()))
        .run(&spec, &AnalyzeBehavior, &ledger)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::Configuration);
    assert_eq!(client.call_count(), 0);
}

#[tokio::test]
async fn prompt_respects_spec_model_and_ceiling() {
    struct Capture(Mutex<Option<CompletionRequest>>);

    #[async_trait]
    impl ModelClient for Capture {
        fn name(&self) -> &str {
            "capture"
        }

        async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
            *self.0.lock().unwrap() = Some(request.clone());
            Ok(completion(LOCATE_REPLY))
        }
    }

    let client = Arc::new(Capture(Mutex::new(None)));
    let ledger = UsageLedger::new();
    TaskRunner::new(client.clone())
        .run(&locate_spec("Oracle"), &LocateBehavior, &ledger)
        .await
        .unwrap();

    let request = client.0.lock().unwrap().clone().unwrap();
    assert_eq!(request.model, "model-a");
    assert_eq!(request.max_tokens, 2000);
    assert!(request.prompt.contains("Oracle"));
}

struct Stalled;

#[async_trait]
impl ModelClient for Stalled {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<Completion> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(completion(LOCATE_REPLY))
    }
}

#[tokio::test(start_paused = true)]
async fn slow_task_times_out() {
    let ledger = UsageLedger::new();
    let err = TaskRunner::new(Arc::new(Stalled))
        .timeout(Duration::from_secs(5))
        .run(&locate_spec("Oracle"), &LocateBehavior, &ledger)
        .await
        .unwrap_err();

    assert!(matches!(err, TalkWalkError::Timeout(d) if d == Duration::from_secs(5)));
    assert_eq!(err.kind(), FailureKind::Timeout);
    assert!(ledger.snapshot().records.is_empty());
}
