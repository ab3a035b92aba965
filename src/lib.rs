//! talkwalk - "talk vs walk" analysis of corporate AI investment
//!
//! Compares how much large companies *talk* about AI (mentions in filings
//! and earnings calls) with how much they *walk* (disclosed AI capital
//! spending). A run has three phases:
//!
//! 1. **locate**: find each company's latest filings,
//! 2. **analyze**: extract per-company findings,
//! 3. **synthesize**: write one cross-company markdown report.
//!
//! Phases 1 and 2 fan out per company with bounded concurrency; failures
//! are isolated to the company that caused them. Remote responses are
//! cached on disk with a TTL, and token usage is accounted per phase.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use talkwalk::{AnthropicClient, Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> talkwalk::Result<()> {
//!     let config = Config::load(None)?;
//!     let client = Arc::new(AnthropicClient::new("sk-ant-your-key"));
//!     let orchestrator = Orchestrator::from_config(config, client);
//!
//!     let companies = vec!["Oracle".to_string(), "IBM".to_string()];
//!     let summary = orchestrator.run(&companies).await?;
//!
//!     println!("{}", summary.report);
//!     Ok(())
//! }
//! ```

pub mod agents;
pub mod cache;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod report;
pub mod retry;
pub mod runner;
pub mod telemetry;
pub mod types;
pub mod usage;
pub mod version;

// Re-export main types at crate root
pub use agents::{BehaviorRegistry, TaskBehavior};
pub use cache::{CacheEntry, CacheStore, CachedPayload, FileCache, MemoryCache, cache_key};
pub use client::{AnthropicClient, ModelClient, RetryingModelClient};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, Secrets};
pub use error::{FailureKind, Result, TalkWalkError};
pub use orchestrator::Orchestrator;
pub use retry::{Backoff, RetryConfig, RetryExecutor, Sleeper, TokioSleeper};
pub use runner::{TaskOutcome, TaskRunner};
pub use usage::{ModelRate, RateTable, UsageLedger, UsageRecord, UsageSnapshot};

// Re-export all types
pub use types::{
    CompanyAnalysis, CompanyFindings, Completion, CompletionRequest, DocumentReference,
    ExcludedCompany, RunSummary, TaskCategory, TaskParams, TaskSpec, TokenUsage,
};
