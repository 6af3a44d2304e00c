use super::types::{ReportMetadata, TestResults};
use super::{ReportFormat, ReportRenderer};
use crate::error::RenderError;
use crate::runner::state::RunSummary;
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

pub struct JsonRenderer;

/// Borrowed view with the same shape as [`TestResults`]
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResultsView<'a> {
    metadata: &'a ReportMetadata,
    summary: &'a RunSummary,
}

impl ReportRenderer for JsonRenderer {
    fn format(&self) -> ReportFormat {
        ReportFormat::Json
    }

    fn file_name(&self) -> &'static str {
        "test_report.json"
    }

    fn render(
        &self,
        summary: &RunSummary,
        metadata: &ReportMetadata,
    ) -> Result<Vec<u8>, RenderError> {
        serde_json::to_vec_pretty(&ResultsView { metadata, summary }).map_err(|e| {
            RenderError::Encode {
                format: "json",
                message: e.to_string(),
            }
        })
    }
}

/// Load a JSON report written by [`JsonRenderer`]
pub fn read_results(path: &Path) -> Result<TestResults> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read results: {}", path.display()))?;
    let results: TestResults = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse results: {}", path.display()))?;

    let s = &results.summary;
    if !s.is_consistent() {
        anyhow::bail!(
            "Inconsistent results in {}: total={} passed={} failed={} skipped={} errored={} outcomes={}",
            path.display(),
            s.total,
            s.passed,
            s.failed,
            s.skipped,
            s.errored,
            s.outcomes.len()
        );
    }
    Ok(results)
}
