//! Token usage ledger and cost estimation.
//!
//! The ledger accumulates tokens per task category for the lifetime of one
//! orchestrator run. Totals only ever grow; cache hits are never recorded.
//! Cost is estimated from a static per-model [`RateTable`].

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::telemetry;
use crate::types::{TaskCategory, TokenUsage};
use crate::{Result, TalkWalkError};

/// USD per million tokens for one model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelRate {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl ModelRate {
    pub const fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }

    /// Cost of a token count at this rate.
    pub fn cost(&self, usage: TokenUsage) -> f64 {
        (usage.input_tokens as f64 / 1_000_000.0) * self.input_per_million
            + (usage.output_tokens as f64 / 1_000_000.0) * self.output_per_million
    }
}

/// Static `model_id → rate` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RateTable {
    rates: HashMap<String, ModelRate>,
}

impl RateTable {
    /// An empty table: every lookup fails.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Built-in Anthropic rates.
    pub fn builtin() -> Self {
        Self::empty()
            .with_rate("claude-opus-4-5-20251101", ModelRate::new(15.00, 75.00))
            .with_rate("claude-sonnet-4-5-20250929", ModelRate::new(3.00, 15.00))
            .with_rate("claude-haiku-4-5-20250929", ModelRate::new(0.80, 4.00))
    }

    pub fn with_rate(mut self, model: impl Into<String>, rate: ModelRate) -> Self {
        self.insert(model, rate);
        self
    }

    pub fn insert(&mut self, model: impl Into<String>, rate: ModelRate) {
        self.rates.insert(model.into(), rate);
    }

    /// Overlay `other` on top of this table (entries in `other` win).
    pub fn merge(mut self, other: &RateTable) -> Self {
        for (model, rate) in &other.rates {
            self.rates.insert(model.clone(), *rate);
        }
        self
    }

    pub fn get(&self, model: &str) -> Option<ModelRate> {
        self.rates.get(model).copied()
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

/// Accumulated usage for one task category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub category: TaskCategory,
    /// Model the category's calls were charged against.
    pub model_id: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Charged (non-cached) invocations.
    pub calls: u64,
}

impl UsageRecord {
    pub fn usage(&self) -> TokenUsage {
        TokenUsage::new(self.input_tokens, self.output_tokens)
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Point-in-time copy of a ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    /// Per-category records, in the order categories were first charged.
    pub records: Vec<UsageRecord>,
}

impl UsageSnapshot {
    /// Aggregate over all categories.
    pub fn totals(&self) -> TokenUsage {
        let mut total = TokenUsage::default();
        for record in &self.records {
            total += record.usage();
        }
        total
    }

    pub fn total_calls(&self) -> u64 {
        self.records.iter().map(|r| r.calls).sum()
    }

    pub fn get(&self, category: TaskCategory) -> Option<&UsageRecord> {
        self.records.iter().find(|r| r.category == category)
    }

    /// Estimated cost in USD.
    ///
    /// Fails with [`TalkWalkError::UnknownModelRate`] if any charged model is
    /// missing from `rates`; an understated cost is worse than none.
    pub fn estimate_cost(&self, rates: &RateTable) -> Result<f64> {
        self.records.iter().try_fold(0.0, |acc, record| {
            let rate = rates
                .get(&record.model_id)
                .ok_or_else(|| TalkWalkError::UnknownModelRate(record.model_id.clone()))?;
            Ok(acc + rate.cost(record.usage()))
        })
    }
}

/// Thread-safe per-category usage accumulator.
///
/// Shared by every task of a run; `record` holds the lock for the whole
/// update so concurrent records of the same category never lose tokens.
#[derive(Debug, Default)]
pub struct UsageLedger {
    records: Mutex<Vec<UsageRecord>>,
}

impl UsageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add usage to a category's running total.
    ///
    /// A category keeps the model it was first charged against; mixing
    /// models within one category is not supported by the pipeline.
    pub fn record(&self, category: TaskCategory, model_id: &str, usage: TokenUsage) {
        {
            let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
            match records.iter_mut().find(|r| r.category == category) {
                Some(record) => {
                    record.input_tokens += usage.input_tokens;
                    record.output_tokens += usage.output_tokens;
                    record.calls += 1;
                }
                None => records.push(UsageRecord {
                    category,
                    model_id: model_id.to_string(),
                    input_tokens: usage.input_tokens,
                    output_tokens: usage.output_tokens,
                    calls: 1,
                }),
            }
        }

        metrics::counter!(telemetry::TOKENS_TOTAL,
            "category" => category.as_str(),
            "model" => model_id.to_owned(),
            "direction" => "input",
        )
        .increment(usage.input_tokens);
        metrics::counter!(telemetry::TOKENS_TOTAL,
            "category" => category.as_str(),
            "model" => model_id.to_owned(),
            "direction" => "output",
        )
        .increment(usage.output_tokens);
    }

    /// Aggregate totals across all categories.
    pub fn totals(&self) -> TokenUsage {
        self.snapshot().totals()
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        UsageSnapshot {
            records: records.clone(),
        }
    }

    /// Shorthand for `snapshot().estimate_cost(rates)`.
    pub fn estimate_cost(&self, rates: &RateTable) -> Result<f64> {
        self.snapshot().estimate_cost(rates)
    }
}
