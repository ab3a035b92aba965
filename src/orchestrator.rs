//! Three-phase pipeline: locate → analyze → synthesize.
//!
//! # Concurrency
//!
//! Within Phases 1 and 2 up to `limits.concurrency` tasks run at once.
//! Results are yielded in submission order (`buffered`, not
//! `buffer_unordered`), so the Phase 2 list always matches the input order
//! regardless of which task finished first. Each phase's stream is drained
//! completely before the next phase starts.
//!
//! # Failure isolation
//!
//! A company that fails Phase 1 or Phase 2 is recorded in
//! [`RunSummary::excluded`] and appears in the synthesis input as a
//! [`CompanyAnalysis::Unavailable`] placeholder. Other companies are not
//! affected. A Phase 3 failure fails the whole run.

use std::sync::Arc;
use std::time::Instant;

use futures_util::StreamExt;
use futures_util::stream;
use serde::de::DeserializeOwned;
use tracing::{info, instrument, warn};

use crate::agents::{BehaviorRegistry, TaskBehavior};
use crate::cache::{CacheStore, FileCache};
use crate::client::ModelClient;
use crate::config::Config;
use crate::retry::RetryExecutor;
use crate::runner::{TaskOutcome, TaskRunner};
use crate::types::{
    CompanyAnalysis, CompanyFindings, DocumentReference, ExcludedCompany, RunSummary,
    TaskCategory, TaskSpec,
};
use crate::usage::UsageLedger;
use crate::{Result, TalkWalkError};

/// Runs the pipeline for a list of companies.
pub struct Orchestrator {
    config: Config,
    client: Arc<dyn ModelClient>,
    cache: Option<Arc<dyn CacheStore>>,
    registry: BehaviorRegistry,
    executor: RetryExecutor,
}

impl Orchestrator {
    /// An orchestrator with default behaviors and no cache.
    pub fn new(config: Config, client: Arc<dyn ModelClient>) -> Self {
        let executor = RetryExecutor::new(config.retry_config());
        Self {
            config,
            client,
            cache: None,
            registry: BehaviorRegistry::with_defaults(),
            executor,
        }
    }

    /// Like [`new`](Self::new), opening the file cache when `cache.enabled`.
    ///
    /// A cache directory that cannot be opened is logged and the run
    /// proceeds uncached.
    pub fn from_config(config: Config, client: Arc<dyn ModelClient>) -> Self {
        let cache: Option<Arc<dyn CacheStore>> = if config.cache.enabled {
            match FileCache::open(&config.cache.dir) {
                Ok(cache) => Some(Arc::new(cache)),
                Err(e) => {
                    warn!(
                        dir = %config.cache.dir.display(),
                        error = %e,
                        "cache unavailable, running without cache"
                    );
                    None
                }
            }
        } else {
            None
        };
        let mut orchestrator = Self::new(config, client);
        orchestrator.cache = cache;
        orchestrator
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.cache = None;
        self
    }

    pub fn with_registry(mut self, registry: BehaviorRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Replace the retry executor (e.g. with a recording sleeper).
    pub fn with_retry_executor(mut self, executor: RetryExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Remove every cache entry. Zero when caching is off.
    pub fn clear_cache(&self) -> Result<usize> {
        match &self.cache {
            Some(cache) => {
                let removed = cache.clear_all()?;
                info!(removed, "cleared cache");
                Ok(removed)
            }
            None => Ok(0),
        }
    }

    /// Remove stale cache entries. Zero when caching is off.
    pub fn clear_expired_cache(&self) -> Result<usize> {
        match &self.cache {
            Some(cache) => {
                let removed = cache.clear_expired()?;
                info!(removed, "cleared expired cache entries");
                Ok(removed)
            }
            None => Ok(0),
        }
    }

    fn task(&self, category: TaskCategory) -> TaskSpec {
        TaskSpec::new(category, self.config.model_for(category))
            .max_output_tokens(self.config.max_tokens_for(category))
            .ttl(self.config.cache_ttl_for(category))
    }

    fn runner(&self) -> TaskRunner {
        let runner = TaskRunner::new(self.client.clone())
            .retry(self.executor.clone())
            .ttl(self.config.cache_ttl())
            .timeout(self.config.task_timeout());
        match &self.cache {
            Some(cache) => runner.cache(cache.clone()),
            None => runner,
        }
    }

    /// Run all three phases over `companies`.
    ///
    /// Fails only on configuration errors (empty input, missing behavior)
    /// or a Phase 3 failure; per-company failures are reported in the
    /// summary instead.
    #[instrument(skip_all, fields(companies = companies.len()))]
    pub async fn run(&self, companies: &[String]) -> Result<RunSummary> {
        if companies.is_empty() {
            return Err(TalkWalkError::InvalidInput(
                "at least one company is required".to_string(),
            ));
        }

        let started = Instant::now();
        let locate = self.registry.get(TaskCategory::Locate)?;
        let analyze = self.registry.get(TaskCategory::Analyze)?;
        let synthesize = self.registry.get(TaskCategory::Synthesize)?;

        let runner = self.runner();
        let ledger = UsageLedger::new();
        let limit = self.config.concurrency();
        let mut excluded = Vec::new();
        let mut cache_hits = 0u32;

        // Phase 1
        info!(companies = companies.len(), concurrency = limit, "phase 1: locating documents");
        let results = self
            .fan_out(&runner, &ledger, locate.as_ref(), limit, companies.iter().map(|company| {
                Some(self.task(TaskCategory::Locate).param("company", company.as_str()))
            }))
            .await;

        let mut documents: Vec<Result<DocumentReference>> = Vec::with_capacity(companies.len());
        for (company, result) in companies.iter().zip(results) {
            let doc = result
                .unwrap_or_else(|| Err(TalkWalkError::InvalidInput("task not scheduled".into())))
                .and_then(|outcome| {
                    cache_hits += u32::from(outcome.cache_hit);
                    decode::<DocumentReference>(TaskCategory::Locate, outcome)
                });
            if let Err(e) = &doc {
                warn!(
                    company = %company,
                    error = %e,
                    "excluding company: document location failed"
                );
                excluded.push(exclusion(company, TaskCategory::Locate, e));
            }
            documents.push(doc);
        }
        let located: Vec<DocumentReference> =
            documents.iter().filter_map(|d| d.as_ref().ok()).cloned().collect();
        info!(located = located.len(), "phase 1 complete");

        // Phase 2
        info!(companies = located.len(), "phase 2: analyzing companies");
        let specs: Vec<Option<TaskSpec>> = companies
            .iter()
            .zip(&documents)
            .map(|(company, doc)| {
                let doc = doc.as_ref().ok()?;
                let value = serde_json::to_value(doc).ok()?;
                Some(
                    self.task(TaskCategory::Analyze)
                        .param("company", company.as_str())
                        .param("documents", value),
                )
            })
            .collect();
        let results = self
            .fan_out(&runner, &ledger, analyze.as_ref(), limit, specs.into_iter())
            .await;

        let analyses: Vec<CompanyAnalysis> = companies
            .iter()
            .zip(&documents)
            .zip(results)
            .map(|((company, doc), result)| {
                settle_analysis(company, doc, result, &mut cache_hits, &mut excluded)
            })
            .collect();
        let available = analyses.iter().filter(|a| a.is_available()).count();
        info!(available, excluded = excluded.len(), "phase 2 complete");

        // Phase 3
        info!("phase 3: synthesizing report");
        let spec = self
            .task(TaskCategory::Synthesize)
            .cacheable(false)
            .param("analyses", serde_json::to_value(&analyses)?);
        let outcome = runner.run(&spec, synthesize.as_ref(), &ledger).await?;
        cache_hits += u32::from(outcome.cache_hit);
        let report = match outcome.value {
            serde_json::Value::String(body) => body,
            _ => outcome.text,
        };

        let usage = ledger.snapshot();
        let estimated_cost = match usage.estimate_cost(&self.config.rate_table()) {
            Ok(cost) => Some(cost),
            Err(e) => {
                warn!(error = %e, "cost estimate unavailable");
                None
            }
        };

        let summary = RunSummary {
            located,
            analyses,
            report,
            usage,
            estimated_cost,
            elapsed: started.elapsed(),
            excluded,
            cache_hits,
            remote_calls: runner.remote_calls(),
        };
        info!(
            elapsed_secs = summary.elapsed.as_secs_f64(),
            remote_calls = summary.remote_calls,
            cache_hits = summary.cache_hits,
            "run complete"
        );
        Ok(summary)
    }

    /// Run one phase. `None` specs are skipped and yield `None` in place,
    /// so the output lines up index-for-index with the input.
    async fn fan_out(
        &self,
        runner: &TaskRunner,
        ledger: &UsageLedger,
        behavior: &dyn TaskBehavior,
        limit: usize,
        specs: impl Iterator<Item = Option<TaskSpec>>,
    ) -> Vec<Option<Result<TaskOutcome>>> {
        stream::iter(specs)
            .map(|spec| async move {
                match spec {
                    Some(spec) => Some(runner.run(&spec, behavior, ledger).await),
                    None => None,
                }
            })
            .buffered(limit)
            .collect()
            .await
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("client", &self.client.name())
            .field("cache", &self.cache.as_ref().map(|c| c.name().to_string()))
            .field("registry", &self.registry)
            .field("concurrency", &self.config.concurrency())
            .finish()
    }
}

fn decode<T: DeserializeOwned>(category: TaskCategory, outcome: TaskOutcome) -> Result<T> {
    serde_json::from_value(outcome.value).map_err(|e| TalkWalkError::MalformedResponse {
        category: category.to_string(),
        reason: e.to_string(),
    })
}

fn exclusion(company: &str, phase: TaskCategory, error: &TalkWalkError) -> ExcludedCompany {
    ExcludedCompany {
        company: company.to_string(),
        phase,
        kind: error.kind(),
        reason: error.to_string(),
    }
}

/// Fold one company's Phase 2 result into its analysis. A located company
/// that ends up without findings is always recorded as excluded.
fn settle_analysis(
    company: &str,
    document: &Result<DocumentReference>,
    result: Option<Result<TaskOutcome>>,
    cache_hits: &mut u32,
    excluded: &mut Vec<ExcludedCompany>,
) -> CompanyAnalysis {
    if let Err(e) = document {
        // Already excluded in Phase 1.
        return CompanyAnalysis::Unavailable {
            company: company.to_string(),
            kind: e.kind(),
        };
    }

    let result = result.unwrap_or_else(|| {
        Err(TalkWalkError::InvalidInput(
            "analysis task was not scheduled".into(),
        ))
    });
    let findings = result.and_then(|outcome| {
        *cache_hits += u32::from(outcome.cache_hit);
        decode::<CompanyFindings>(TaskCategory::Analyze, outcome)
    });

    match findings {
        Ok(findings) => CompanyAnalysis::Available(findings),
        Err(e) => {
            warn!(company = %company, error = %e, "excluding company: analysis failed");
            excluded.push(exclusion(company, TaskCategory::Analyze, &e));
            CompanyAnalysis::Unavailable {
                company: company.to_string(),
                kind: e.kind(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FailureKind;

    fn located(company: &str) -> Result<DocumentReference> {
        Ok(DocumentReference {
            company: company.to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn unscheduled_analysis_is_excluded() {
        let mut hits = 0;
        let mut excluded = Vec::new();

        let analysis = settle_analysis("IBM", &located("IBM"), None, &mut hits, &mut excluded);

        assert_eq!(
            analysis,
            CompanyAnalysis::Unavailable {
                company: "IBM".into(),
                kind: FailureKind::Configuration,
            }
        );
        assert_eq!(excluded.len(), 1);
        assert_eq!(excluded[0].company, "IBM");
        assert_eq!(excluded[0].phase, TaskCategory::Analyze);
        assert_eq!(excluded[0].kind, FailureKind::Configuration);
        assert_eq!(hits, 0);
    }

    #[test]
    fn locate_failure_is_not_excluded_twice() {
        let mut hits = 0;
        let mut excluded = Vec::new();
        let document = Err(TalkWalkError::EmptyResponse);

        let analysis = settle_analysis("SAP", &document, None, &mut hits, &mut excluded);

        assert!(!analysis.is_available());
        assert!(excluded.is_empty());
    }

    #[test]
    fn cached_findings_count_as_hit() {
        let mut hits = 0;
        let mut excluded = Vec::new();
        let outcome = TaskOutcome {
            value: serde_json::json!({
                "company": "IBM",
                "gen_ai_mentions": 3,
                "ml_mentions": 1,
                "capex_ai": "$1B",
                "cfo_quote": "Soon.",
                "key_insights": "Invests."
            }),
            text: String::new(),
            usage: Default::default(),
            cache_hit: true,
        };

        let analysis =
            settle_analysis("IBM", &located("IBM"), Some(Ok(outcome)), &mut hits, &mut excluded);

        assert!(analysis.is_available());
        assert!(excluded.is_empty());
        assert_eq!(hits, 1);
    }
}
