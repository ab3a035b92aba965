//! Task specification types

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::TalkWalkError;

/// Kind of work a task performs. Each category has one registered behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    /// Phase 1: find filings and transcripts for one company.
    Locate,
    /// Phase 2: extract talk/walk findings for one company.
    Analyze,
    /// Phase 3: cross-company synthesis.
    Synthesize,
}

impl TaskCategory {
    pub const ALL: [TaskCategory; 3] = [
        TaskCategory::Locate,
        TaskCategory::Analyze,
        TaskCategory::Synthesize,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskCategory::Locate => "locate",
            TaskCategory::Analyze => "analyze",
            TaskCategory::Synthesize => "synthesize",
        }
    }
}

impl fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskCategory {
    type Err = TalkWalkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "locate" => Ok(TaskCategory::Locate),
            "analyze" => Ok(TaskCategory::Analyze),
            "synthesize" => Ok(TaskCategory::Synthesize),
            other => Err(TalkWalkError::UnknownCategory(other.to_string())),
        }
    }
}

/// Named task inputs. Keys are kept sorted, so two parameter sets with the
/// same pairs serialize identically whatever order they were inserted in.
pub type TaskParams = BTreeMap<String, serde_json::Value>;

/// One logical unit of work handed to the task runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub category: TaskCategory,
    pub model_id: String,
    /// Hard ceiling on output tokens passed to the remote call.
    pub max_output_tokens: u32,
    pub cacheable: bool,
    /// Cache lifetime for this task's entry; the runner default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<Duration>,
    pub params: TaskParams,
}

impl TaskSpec {
    pub fn new(category: TaskCategory, model_id: impl Into<String>) -> Self {
        Self {
            category,
            model_id: model_id.into(),
            max_output_tokens: 4000,
            cacheable: true,
            ttl: None,
            params: TaskParams::new(),
        }
    }

    pub fn max_output_tokens(mut self, n: u32) -> Self {
        self.max_output_tokens = n;
        self
    }

    pub fn cacheable(mut self, cacheable: bool) -> Self {
        self.cacheable = cacheable;
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Add (or replace) a named parameter.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Look up a parameter as a string.
    pub fn param_str(&self, name: &str) -> Option<&str> {
        self.params.get(name).and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_round_trips_through_str() {
        for category in TaskCategory::ALL {
            assert_eq!(category.as_str().parse::<TaskCategory>().unwrap(), category);
        }
        assert!("summarize".parse::<TaskCategory>().is_err());
    }

    #[test]
    fn spec_builder() {
        let spec = TaskSpec::new(TaskCategory::Analyze, "m")
            .max_output_tokens(3000)
            .cacheable(false)
            .ttl(Duration::from_secs(60))
            .param("company", "IBM");
        assert_eq!(spec.max_output_tokens, 3000);
        assert_eq!(spec.ttl, Some(Duration::from_secs(60)));
        assert!(!spec.cacheable);
        assert_eq!(spec.param_str("company"), Some("IBM"));
    }
}
