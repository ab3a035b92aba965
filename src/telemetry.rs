//! Telemetry metric name constants.
//!
//! Centralised metric names for talkwalk operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `talkwalk_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `category`: task category ("locate", "analyze", "synthesize")
//! - `model`: model identifier passed to the remote client
//! - `status`: "ok" or "error"
//! - `direction`: "input" or "output"
//! - `kind`: failure kind (see [`FailureKind`](crate::FailureKind))

/// Remote model calls dispatched (one per attempt, retries included).
///
/// Labels: `category`, `status` ("ok" | "error").
pub const REMOTE_CALLS_TOTAL: &str = "talkwalk_remote_calls_total";

/// Retry attempts (not counting the initial request).
///
/// Labels: `category`.
pub const RETRIES_TOTAL: &str = "talkwalk_retries_total";

/// Response cache hits.
///
/// Labels: `category`.
pub const CACHE_HITS_TOTAL: &str = "talkwalk_cache_hits_total";

/// Response cache misses (expired entries count as misses).
///
/// Labels: `category`.
pub const CACHE_MISSES_TOTAL: &str = "talkwalk_cache_misses_total";

/// Tokens charged to the usage ledger.
///
/// Labels: `category`, `model`, `direction` ("input" | "output").
pub const TOKENS_TOTAL: &str = "talkwalk_tokens_total";

/// Task duration in seconds, cache hits included.
///
/// Labels: `category`.
pub const TASK_DURATION_SECONDS: &str = "talkwalk_task_duration_seconds";

/// Tasks that ended in a terminal failure.
///
/// Labels: `category`, `kind`.
pub const TASK_FAILURES_TOTAL: &str = "talkwalk_task_failures_total";
