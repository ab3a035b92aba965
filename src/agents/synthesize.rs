use serde_json::{Value, json};

use super::{TaskBehavior, compose_prompt, malformed};
use crate::types::{CompanyAnalysis, TaskCategory, TaskSpec};
use crate::{Result, TalkWalkError};

const ROLE: &str = "\
You are a synthesis agent who writes cross-company financial analysis reports.

Your job:
1. Compare the data across companies.
2. Build clear comparison tables in markdown.
3. Identify patterns and trends.
4. Give actionable insights and an executive summary.

Output well-formatted markdown with a clear structure.";

const TASK: &str = r#"Write a "Talk vs Walk" analysis report on corporate AI investment.

Structure:

# AI Investment Analysis: Talk vs Walk

## Executive Summary
(3-4 sentences summarizing key findings)

## Talk vs Walk Comparison Table
| Company | Gen AI Mentions | ML Mentions | Total "Talk" | AI CapEx "Walk" | Talk/Walk Analysis |
|---------|-----------------|-------------|--------------|-----------------|--------------------|
Sort by Total "Talk" (descending). List companies with no data as "Data unavailable".

## Key Findings
- Which companies are investing most heavily?
- Which show high rhetoric but low disclosed investment?
- Which have the clearest ROI timelines?

## CFO/CEO Perspectives on ROI
Summarize each company's leadership stance on AI returns and timelines.

## Investment Patterns
Infrastructure vs application spending, disclosure transparency, timeline
confidence, and sector differences.

## Conclusions and Recommendations
### For Investors
(3-5 bullet points)
### For Enterprises
(3-5 bullet points)
### Overall Assessment
(2-3 paragraphs)

Use clear markdown. Be specific and cite numbers."#;

/// Phase 3: one cross-company report.
///
/// Parameters: `analyses` (the ordered Phase 2 list, placeholders included).
/// The parsed value is the report body as a JSON string.
#[derive(Debug, Clone, Copy, Default)]
pub struct SynthesizeBehavior;

impl SynthesizeBehavior {
    fn analyses(spec: &TaskSpec) -> Result<Vec<CompanyAnalysis>> {
        let value = spec.params.get("analyses").cloned().ok_or_else(|| {
            TalkWalkError::InvalidInput("synthesize task requires an `analyses` parameter".into())
        })?;
        serde_json::from_value(value)
            .map_err(|e| TalkWalkError::InvalidInput(format!("invalid `analyses` parameter: {e}")))
    }
}

impl TaskBehavior for SynthesizeBehavior {
    fn category(&self) -> TaskCategory {
        TaskCategory::Synthesize
    }

    fn render_prompt(&self, spec: &TaskSpec) -> Result<String> {
        let analyses = Self::analyses(spec)?;

        let mut rows: Vec<(u32, Value)> = analyses
            .iter()
            .map(|analysis| match analysis {
                CompanyAnalysis::Available(f) => (
                    f.total_mentions(),
                    json!({
                        "company": f.company,
                        "gen_ai_mentions": f.gen_ai_mentions,
                        "ml_mentions": f.ml_mentions,
                        "total_mentions": f.total_mentions(),
                        "capex_ai": f.capex_ai,
                        "cfo_quote": f.cfo_quote,
                        "insights": f.key_insights,
                    }),
                ),
                CompanyAnalysis::Unavailable { company, kind } => (
                    0,
                    json!({
                        "company": company,
                        "status": "data unavailable",
                        "reason": kind.as_str(),
                    }),
                ),
            })
            .collect();
        // Stable: ties keep input order.
        rows.sort_by(|a, b| b.0.cmp(&a.0));
        let rows: Vec<Value> = rows.into_iter().map(|(_, row)| row).collect();

        let data = serde_json::to_string_pretty(&rows)?;
        let context = format!("Company Analysis Data:\n{data}");
        Ok(compose_prompt(ROLE, &context, TASK))
    }

    fn parse(&self, _spec: &TaskSpec, text: &str) -> Result<Value> {
        let body = text.trim();
        if body.is_empty() {
            return Err(malformed(self.category(), "empty report"));
        }
        Ok(Value::String(body.to_string()))
    }
}
