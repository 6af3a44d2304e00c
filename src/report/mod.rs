pub mod analysis;
pub mod chart;
pub mod docx;
pub mod html;
pub mod json;
pub mod logs;
pub mod junit;
pub mod types;

use crate::error::RenderError;
use crate::runner::state::RunSummary;
use anyhow::{Context, Result};
use log::info;
use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use types::ReportMetadata;

/// A report sink. Rendering is pure; persisting is done by [`write_report`].
pub trait ReportRenderer: Send + Sync {
    fn format(&self) -> ReportFormat;

    /// File name inside the output directory
    fn file_name(&self) -> &'static str;

    fn render(&self, summary: &RunSummary, metadata: &ReportMetadata)
        -> Result<Vec<u8>, RenderError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Json,
    Html,
    Junit,
    Docx,
}

impl ReportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportFormat::Json => "json",
            ReportFormat::Html => "html",
            ReportFormat::Junit => "junit",
            ReportFormat::Docx => "docx",
        }
    }

    pub fn renderer(&self) -> Box<dyn ReportRenderer> {
        match self {
            ReportFormat::Json => Box::new(json::JsonRenderer),
            ReportFormat::Html => Box::new(html::HtmlRenderer),
            ReportFormat::Junit => Box::new(junit::JunitRenderer),
            ReportFormat::Docx => Box::new(docx::DocxRenderer),
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(ReportFormat::Json),
            "html" => Ok(ReportFormat::Html),
            "junit" | "xml" => Ok(ReportFormat::Junit),
            "docx" | "word" => Ok(ReportFormat::Docx),
            other => Err(format!(
                "Unknown format: {} (expected json, html, junit or docx)",
                other
            )),
        }
    }
}

/// Replace characters XML 1.0 cannot carry (most C0 controls, U+FFFE/U+FFFF)
/// with U+FFFD.
pub(crate) fn sanitize_xml(text: &str) -> Cow<'_, str> {
    fn allowed(c: char) -> bool {
        matches!(c,
            '\t' | '\n' | '\r'
            | '\u{20}'..='\u{D7FF}'
            | '\u{E000}'..='\u{FFFD}'
            | '\u{10000}'..='\u{10FFFF}')
    }

    if text.chars().all(allowed) {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(
            text.chars()
                .map(|c| if allowed(c) { c } else { '\u{FFFD}' })
                .collect(),
        )
    }
}

/// Render and persist one report into `output_dir`, creating it if needed
pub fn write_report(
    renderer: &dyn ReportRenderer,
    summary: &RunSummary,
    metadata: &ReportMetadata,
    output_dir: &Path,
) -> Result<PathBuf, RenderError> {
    let bytes = renderer.render(summary, metadata)?;

    std::fs::create_dir_all(output_dir).map_err(|source| RenderError::Write {
        path: output_dir.to_path_buf(),
        source,
    })?;

    let path = output_dir.join(renderer.file_name());
    std::fs::write(&path, bytes).map_err(|source| RenderError::Write {
        path: path.clone(),
        source,
    })?;

    info!("Generated {} report: {}", renderer.format(), path.display());
    Ok(path)
}

/// Write every requested format; one failing sink does not stop the others
pub fn write_reports(
    formats: &[ReportFormat],
    summary: &RunSummary,
    metadata: &ReportMetadata,
    output_dir: &Path,
) -> (Vec<PathBuf>, Vec<RenderError>) {
    let mut written = Vec::new();
    let mut errors = Vec::new();
    for format in formats {
        match write_report(format.renderer().as_ref(), summary, metadata, output_dir) {
            Ok(path) => written.push(path),
            Err(e) => errors.push(e),
        }
    }
    (written, errors)
}

/// Re-render a saved JSON result in another format
pub fn generate_report(
    results_path: &Path,
    format: ReportFormat,
    output_dir: &Path,
) -> Result<PathBuf> {
    let results = json::read_results(results_path)?;
    let path = write_report(
        format.renderer().as_ref(),
        &results.summary,
        &results.metadata,
        output_dir,
    )
    .with_context(|| format!("Failed to render {} report", format))?;
    Ok(path)
}
