//! Markdown report assembly and the plain-text usage summary.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, TimeZone};
use tracing::info;

use crate::types::RunSummary;
use crate::usage::{RateTable, UsageSnapshot};
use crate::{Result, TalkWalkError};

const REPORT_TITLE: &str = "AI Investment Analysis - Talk vs Walk";

/// `ai_investment_analysis_<YYYYmmdd_HHMMSS>.md`
pub fn default_report_name<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("ai_investment_analysis_{}.md", at.format("%Y%m%d_%H%M%S"))
}

/// Full markdown document for a run: front matter, the synthesized body,
/// excluded companies (if any) and a token usage table.
pub fn render_report(summary: &RunSummary, rates: &RateTable) -> String {
    render_report_at(summary, rates, &Local::now())
}

fn render_report_at<Tz: TimeZone>(
    summary: &RunSummary,
    rates: &RateTable,
    generated: &DateTime<Tz>,
) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let mut out = String::new();
    let _ = writeln!(out, "---");
    let _ = writeln!(out, "title: {REPORT_TITLE}");
    let _ = writeln!(out, "generated: {}", generated.format("%Y-%m-%d %H:%M:%S"));
    let _ = writeln!(out, "analysis_type: Multi-Agent Research System");
    let _ = writeln!(out, "---");
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", summary.report.trim_end());

    if !summary.excluded.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "## Excluded Companies");
        let _ = writeln!(out);
        let _ = writeln!(out, "| Company | Phase | Failure | Detail |");
        let _ = writeln!(out, "|---------|-------|---------|--------|");
        for e in &summary.excluded {
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} |",
                e.company,
                e.phase,
                e.kind,
                e.reason.replace('|', "\\|")
            );
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "## Token Usage");
    let _ = writeln!(out);
    let _ = writeln!(out, "| Phase | Model | Calls | Input | Output | Total |");
    let _ = writeln!(out, "|-------|-------|-------|-------|--------|-------|");
    for r in &summary.usage.records {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} | {} |",
            r.category,
            r.model_id,
            r.calls,
            r.input_tokens,
            r.output_tokens,
            r.total_tokens()
        );
    }
    let totals = summary.usage.totals();
    let _ = writeln!(
        out,
        "| **total** | | {} | {} | {} | {} |",
        summary.usage.total_calls(),
        totals.input_tokens,
        totals.output_tokens,
        totals.total()
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "Estimated cost: {}", format_cost(&summary.usage, rates));
    let _ = writeln!(
        out,
        "Cache hits: {}; remote calls: {}.",
        summary.cache_hits, summary.remote_calls
    );
    out
}

/// Write `body` into `dir` (created if needed).
///
/// `filename` defaults to [`default_report_name`] for the current local time.
pub fn save_report(dir: &Path, filename: Option<&str>, body: &str) -> Result<PathBuf> {
    let name = match filename {
        Some(name) if !name.trim().is_empty() => name.to_string(),
        _ => default_report_name(&Local::now()),
    };
    fs::create_dir_all(dir).map_err(|e| {
        TalkWalkError::Configuration(format!("Failed to create output dir {dir:?}: {e}"))
    })?;
    let path = dir.join(name);
    fs::write(&path, body)?;
    info!(path = %path.display(), "report saved");
    Ok(path)
}

/// Plain-text usage summary for the terminal.
pub fn usage_summary(usage: &UsageSnapshot, rates: &RateTable) -> String {
    let rule = "=".repeat(60);
    let totals = usage.totals();
    let mut out = String::new();
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "TOKEN USAGE SUMMARY");
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out);
    let _ = writeln!(out, "Total Tokens: {}", group_thousands(totals.total()));
    let _ = writeln!(out, "  Input:  {}", group_thousands(totals.input_tokens));
    let _ = writeln!(out, "  Output: {}", group_thousands(totals.output_tokens));
    if !usage.records.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "By Phase:");
        for r in &usage.records {
            let _ = writeln!(out, "  {} ({}, {} calls):", r.category, r.model_id, r.calls);
            let _ = writeln!(out, "    Input:  {}", group_thousands(r.input_tokens));
            let _ = writeln!(out, "    Output: {}", group_thousands(r.output_tokens));
            let _ = writeln!(out, "    Total:  {}", group_thousands(r.total_tokens()));
        }
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "Estimated Cost: {}", format_cost(usage, rates));
    let _ = write!(out, "{rule}");
    out
}

fn format_cost(usage: &UsageSnapshot, rates: &RateTable) -> String {
    match usage.estimate_cost(rates) {
        Ok(cost) => format!("${cost:.4}"),
        Err(e) => format!("unavailable ({e})"),
    }
}

/// `1234567` → `1,234,567`
fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use crate::FailureKind;
    use crate::types::{ExcludedCompany, TaskCategory, TokenUsage};
    use crate::usage::{ModelRate, UsageLedger};

    fn summary(usage: UsageSnapshot) -> RunSummary {
        RunSummary {
            located: vec![],
            analyses: vec![],
            report: "# AI Investment Analysis\n\nBody.\n".into(),
            usage,
            estimated_cost: None,
            elapsed: Duration::from_secs(3),
            excluded: vec![ExcludedCompany {
                company: "SAP".into(),
                phase: TaskCategory::Analyze,
                kind: FailureKind::MalformedResponse,
                reason: "bad | json".into(),
            }],
            cache_hits: 1,
            remote_calls: 2,
        }
    }

    #[test]
    fn group_thousands_inserts_separators() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(1234567), "1,234,567");
    }

    #[test]
    fn default_name_uses_timestamp() {
        let at = Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(
            default_report_name(&at),
            "ai_investment_analysis_20250304_050607.md"
        );
    }

    #[test]
    fn report_has_front_matter_exclusions_and_usage() {
        let ledger = UsageLedger::new();
        ledger.record(TaskCategory::Locate, "m", TokenUsage::new(1000, 500));
        let rates = RateTable::empty().with_rate("m", ModelRate::new(1.0, 2.0));
        let at = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();

        let report = render_report_at(&summary(ledger.snapshot()), &rates, &at);
        assert!(report.starts_with("---\ntitle: AI Investment Analysis - Talk vs Walk\n"));
        assert!(report.contains("generated: 2025-01-02 03:04:05"));
        assert!(report.contains("Body."));
        assert!(report.contains("| SAP | analyze | malformed-response | bad \\| json |"));
        assert!(report.contains("| locate | m | 1 | 1000 | 500 | 1500 |"));
        assert!(report.contains("Estimated cost: $0.0020"));
    }

    #[test]
    fn unknown_rate_renders_unavailable() {
        let ledger = UsageLedger::new();
        ledger.record(TaskCategory::Analyze, "mystery", TokenUsage::new(1, 1));
        let text = usage_summary(&ledger.snapshot(), &RateTable::builtin());
        assert!(text.contains("Estimated Cost: unavailable"));
        assert!(text.contains("mystery"));
    }
}
