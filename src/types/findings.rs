//! Per-company phase outputs

use serde::{Deserialize, Serialize};

use crate::FailureKind;

/// Where a company's filings live. Produced by the locate phase and passed
/// through to analysis without further interpretation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentReference {
    pub company: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fiscal_year_end: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenk_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub investor_relations_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub earnings_transcript_url: Option<String>,
}

impl DocumentReference {
    /// Source URLs worth citing, skipping blanks and "N/A" placeholders.
    pub fn sources(&self) -> Vec<(&'static str, &str)> {
        [
            ("tenk_url", self.tenk_url.as_deref()),
            ("investor_relations_url", self.investor_relations_url.as_deref()),
            ("earnings_transcript_url", self.earnings_transcript_url.as_deref()),
        ]
        .into_iter()
        .filter_map(|(name, url)| match url {
            Some(u) if !u.trim().is_empty() && u != "N/A" => Some((name, u)),
            _ => None,
        })
        .collect()
    }
}

/// Talk (mention counts) vs walk (disclosed spend) for one company.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyFindings {
    pub company: String,
    #[serde(default)]
    pub gen_ai_mentions: u32,
    #[serde(default)]
    pub ml_mentions: u32,
    #[serde(default = "not_disclosed")]
    pub capex_ai: String,
    #[serde(default = "no_quote")]
    pub cfo_quote: String,
    #[serde(default)]
    pub key_insights: String,
    #[serde(default)]
    pub documents_analyzed: Vec<String>,
}

fn not_disclosed() -> String {
    "Not disclosed".to_string()
}

fn no_quote() -> String {
    "No quote found".to_string()
}

impl CompanyFindings {
    /// Total "talk": all AI-related mentions.
    pub fn total_mentions(&self) -> u32 {
        self.gen_ai_mentions.saturating_add(self.ml_mentions)
    }
}

/// Phase 2 outcome for one company, in input order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CompanyAnalysis {
    Available(CompanyFindings),
    /// Placeholder kept so synthesis still sees every input company.
    Unavailable { company: String, kind: FailureKind },
}

impl CompanyAnalysis {
    pub fn company(&self) -> &str {
        match self {
            CompanyAnalysis::Available(f) => &f.company,
            CompanyAnalysis::Unavailable { company, .. } => company,
        }
    }

    pub fn findings(&self) -> Option<&CompanyFindings> {
        match self {
            CompanyAnalysis::Available(f) => Some(f),
            CompanyAnalysis::Unavailable { .. } => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, CompanyAnalysis::Available(_))
    }
}
