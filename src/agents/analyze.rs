use serde_json::Value;

use super::{TaskBehavior, compose_prompt, extract_json, malformed, required_str};
use crate::types::{CompanyFindings, DocumentReference, TaskCategory, TaskSpec};
use crate::{Result, TalkWalkError};

/// Phase 2: extract talk-vs-walk findings for one company.
///
/// Parameters: `company`, `documents` (a serialized [`DocumentReference`]).
#[derive(Debug, Clone, Copy, Default)]
pub struct AnalyzeBehavior;

impl AnalyzeBehavior {
    fn documents(spec: &TaskSpec) -> Result<DocumentReference> {
        let value = spec.params.get("documents").cloned().ok_or_else(|| {
            TalkWalkError::InvalidInput("analyze task requires a `documents` parameter".into())
        })?;
        serde_json::from_value(value)
            .map_err(|e| TalkWalkError::InvalidInput(format!("invalid `documents` parameter: {e}")))
    }
}

impl TaskBehavior for AnalyzeBehavior {
    fn category(&self) -> TaskCategory {
        TaskCategory::Analyze
    }

    fn render_prompt(&self, spec: &TaskSpec) -> Result<String> {
        let company = required_str(spec, "company")?;
        let documents = Self::documents(spec)?;

        let role = format!(
            "You are an expert financial analyst covering {company}.\n\n\
             Your job:\n\
             1. Count mentions of \"Generative AI\", \"Gen AI\", \"GenAI\" and similar terms.\n\
             2. Count mentions of \"Machine Learning\", \"ML\" and similar terms.\n\
             3. Extract capital expenditure figures attributed to AI infrastructure.\n\
             4. Find ONE CFO or CEO quote about the ROI timeline of AI investments.\n\n\
             Be precise and cite specific numbers. Output ONLY valid JSON, no markdown."
        );

        let mut context = vec![format!("Analyzing: {company}")];
        let sources = documents.sources();
        if !sources.is_empty() {
            context.push("Document sources:".to_string());
            for (name, url) in sources {
                context.push(format!("  - {name}: {url}"));
            }
        }

        let task = format!(
            r#"Based on {company}'s most recent public filings and earnings calls:

1. Count mentions of "Generative AI" / "Gen AI" terminology.
2. Count mentions of "Machine Learning" / "ML" terminology.
3. Identify any disclosed AI-specific CapEx or infrastructure spending.
4. Find a CFO/CEO quote about AI investment ROI timelines.

Output as JSON:
{{
  "gen_ai_mentions": <number>,
  "ml_mentions": <number>,
  "capex_ai": "<amount or 'Not disclosed'>",
  "cfo_quote": "<quote or 'No quote found'>",
  "key_insights": "<2-3 sentence summary>"
}}"#
        );

        Ok(compose_prompt(&role, &context.join("\n"), &task))
    }

    fn parse(&self, spec: &TaskSpec, text: &str) -> Result<Value> {
        let company = required_str(spec, "company")?;
        let documents = Self::documents(spec)?;

        let Some(Value::Object(mut object)) = extract_json(text) else {
            return Err(malformed(self.category(), "expected a JSON object"));
        };
        object.insert("company".into(), Value::String(company.to_string()));
        object.remove("documents_analyzed");

        let mut findings: CompanyFindings = serde_json::from_value(Value::Object(object))
            .map_err(|e| malformed(self.category(), e.to_string()))?;
        findings.documents_analyzed = documents
            .sources()
            .into_iter()
            .filter(|(name, _)| *name != "investor_relations_url")
            .map(|(_, url)| url.to_string())
            .collect();

        serde_json::to_value(findings).map_err(|e| malformed(self.category(), e.to_string()))
    }
}
