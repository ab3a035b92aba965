use serde_json::Value;

use super::{TaskBehavior, compose_prompt, extract_json, malformed, required_str};
use crate::Result;
use crate::types::{DocumentReference, TaskCategory, TaskSpec};

const ROLE: &str = "\
You are a financial research agent who locates public company documents.

Your job for each company:
1. Identify its most recent fiscal year.
2. Give the SEC EDGAR URL of its latest 10-K filing.
3. Give its investor relations URL.
4. Give an earnings call transcript URL if one is available.

Output ONLY valid JSON. No markdown, no explanations.";

/// Phase 1: find filings for one company.
///
/// Parameters: `company`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocateBehavior;

impl TaskBehavior for LocateBehavior {
    fn category(&self) -> TaskCategory {
        TaskCategory::Locate
    }

    fn render_prompt(&self, spec: &TaskSpec) -> Result<String> {
        let company = required_str(spec, "company")?;
        let task = format!(
            r#"Locate the most recent 10-K filing and earnings call transcript for {company}.

Return a single JSON object with exactly these fields:
{{
  "company": "{company}",
  "ticker": "<stock ticker>",
  "fiscal_year_end": "<YYYY-MM-DD>",
  "tenk_url": "<SEC EDGAR URL>",
  "investor_relations_url": "<URL>",
  "earnings_transcript_url": "<URL or N/A>"
}}

Output ONLY the JSON object."#
        );
        Ok(compose_prompt(ROLE, "", &task))
    }

    fn parse(&self, spec: &TaskSpec, text: &str) -> Result<Value> {
        let company = required_str(spec, "company")?;
        let value = extract_json(text)
            .ok_or_else(|| malformed(self.category(), "no JSON found in response"))?;

        // Some models answer with a one-element array despite the prompt.
        let mut object = match value {
            Value::Object(map) => map,
            Value::Array(items) => match items.into_iter().next() {
                Some(Value::Object(map)) => map,
                _ => return Err(malformed(self.category(), "expected a JSON object")),
            },
            _ => return Err(malformed(self.category(), "expected a JSON object")),
        };
        // The caller's spelling wins so later phases can match on it.
        object.insert("company".into(), Value::String(company.to_string()));

        let doc: DocumentReference = serde_json::from_value(Value::Object(object))
            .map_err(|e| malformed(self.category(), e.to_string()))?;
        serde_json::to_value(doc).map_err(|e| malformed(self.category(), e.to_string()))
    }
}
