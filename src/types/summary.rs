//! Run summary returned by the orchestrator

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::findings::{CompanyAnalysis, DocumentReference};
use super::task::TaskCategory;
use crate::FailureKind;
use crate::usage::UsageSnapshot;

/// A company left out of the final analysis, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedCompany {
    pub company: String,
    /// Phase the company dropped out in.
    pub phase: TaskCategory,
    pub kind: FailureKind,
    pub reason: String,
}

/// Everything a run produced. This is the only surface the CLI and report
/// layers depend on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Phase 1: located documents, in input order, successful companies only.
    pub located: Vec<DocumentReference>,
    /// Phase 2: one entry per input company, in input order.
    pub analyses: Vec<CompanyAnalysis>,
    /// Phase 3: synthesized report body.
    pub report: String,
    pub usage: UsageSnapshot,
    /// Estimated USD cost; `None` when a charged model has no known rate.
    pub estimated_cost: Option<f64>,
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
    pub excluded: Vec<ExcludedCompany>,
    pub cache_hits: u32,
    pub remote_calls: u32,
}

impl RunSummary {
    pub fn is_excluded(&self, company: &str) -> bool {
        self.excluded.iter().any(|e| e.company == company)
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
