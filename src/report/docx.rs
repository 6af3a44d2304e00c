//! Word report: a minimal WordprocessingML package written with quick-xml
//! and zipped.

use super::analysis::{
    endpoint_stats, failure_breakdown, false_positives, format_duration, response_stats,
};
use super::types::ReportMetadata;
use super::{sanitize_xml, ReportFormat, ReportRenderer};
use crate::error::RenderError;
use crate::runner::state::{OutcomeStatus, RunSummary};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/><Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/></Types>"#;

const PACKAGE_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/></Relationships>"#;

const WORD_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

const GREEN: &str = "008000";
const RED: &str = "FF0000";
const ORANGE: &str = "C07000";

pub struct DocxRenderer;

impl ReportRenderer for DocxRenderer {
    fn format(&self) -> ReportFormat {
        ReportFormat::Docx
    }

    fn file_name(&self) -> &'static str {
        "test_report.docx"
    }

    fn render(
        &self,
        summary: &RunSummary,
        metadata: &ReportMetadata,
    ) -> Result<Vec<u8>, RenderError> {
        let encode = |message: String| RenderError::Encode {
            format: "docx",
            message,
        };

        let document = build_document(summary, metadata).map_err(|e| encode(e.to_string()))?;
        let core = build_core_properties(metadata).map_err(|e| encode(e.to_string()))?;

        package(&[
            ("[Content_Types].xml", CONTENT_TYPES.as_bytes()),
            ("_rels/.rels", PACKAGE_RELS.as_bytes()),
            ("docProps/core.xml", &core),
            ("word/document.xml", &document),
        ])
        .map_err(encode)
    }
}

fn package(parts: &[(&str, &[u8])]) -> Result<Vec<u8>, String> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, bytes) in parts {
        zip.start_file(*name, options)
            .map_err(|e| format!("Failed to start {} in package: {}", name, e))?;
        zip.write_all(bytes)
            .map_err(|e| format!("Failed to write {} in package: {}", name, e))?;
    }

    let cursor = zip
        .finish()
        .map_err(|e| format!("Failed to finish package: {}", e))?;
    Ok(cursor.into_inner())
}

#[derive(Debug, Clone, Copy, Default)]
struct RunStyle {
    bold: bool,
    color: Option<&'static str>,
    /// Half-points
    size: Option<u32>,
    mono: bool,
}

impl RunStyle {
    fn bold() -> Self {
        Self {
            bold: true,
            ..Self::default()
        }
    }

    fn colored(color: &'static str) -> Self {
        Self {
            bold: true,
            color: Some(color),
            ..Self::default()
        }
    }
}

type Cell = (String, RunStyle);

fn plain(text: impl Into<String>) -> Cell {
    (text.into(), RunStyle::default())
}

struct DocWriter {
    writer: Writer<Cursor<Vec<u8>>>,
}

impl DocWriter {
    fn new() -> Result<Self, quick_xml::Error> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;

        let mut document = BytesStart::new("w:document");
        document.push_attribute(("xmlns:w", WORD_NS));
        writer.write_event(Event::Start(document))?;
        writer.write_event(Event::Start(BytesStart::new("w:body")))?;
        Ok(Self { writer })
    }

    fn start(&mut self, name: &str) -> Result<(), quick_xml::Error> {
        self.writer.write_event(Event::Start(BytesStart::new(name)))
    }

    fn end(&mut self, name: &str) -> Result<(), quick_xml::Error> {
        self.writer.write_event(Event::End(BytesEnd::new(name)))
    }

    /// Empty element with a `w:val` attribute
    fn val(&mut self, name: &str, value: &str) -> Result<(), quick_xml::Error> {
        let mut element = BytesStart::new(name);
        element.push_attribute(("w:val", value));
        self.writer.write_event(Event::Empty(element))
    }

    fn run(&mut self, text: &str, style: RunStyle) -> Result<(), quick_xml::Error> {
        self.start("w:r")?;

        if style.bold || style.color.is_some() || style.size.is_some() || style.mono {
            self.start("w:rPr")?;
            if style.mono {
                let mut fonts = BytesStart::new("w:rFonts");
                fonts.push_attribute(("w:ascii", "Consolas"));
                fonts.push_attribute(("w:hAnsi", "Consolas"));
                self.writer.write_event(Event::Empty(fonts))?;
            }
            if style.bold {
                self.writer.write_event(Event::Empty(BytesStart::new("w:b")))?;
            }
            if let Some(color) = style.color {
                self.val("w:color", color)?;
            }
            if let Some(size) = style.size {
                self.val("w:sz", &size.to_string())?;
            }
            self.end("w:rPr")?;
        }

        for (i, line) in text.lines().enumerate() {
            if i > 0 {
                self.writer.write_event(Event::Empty(BytesStart::new("w:br")))?;
            }
            let mut t = BytesStart::new("w:t");
            t.push_attribute(("xml:space", "preserve"));
            self.writer.write_event(Event::Start(t))?;
            self.writer
                .write_event(Event::Text(BytesText::new(&sanitize_xml(line))))?;
            self.end("w:t")?;
        }

        self.end("w:r")
    }

    fn paragraph(&mut self, text: &str, style: RunStyle) -> Result<(), quick_xml::Error> {
        self.start("w:p")?;
        self.run(text, style)?;
        self.end("w:p")
    }

    fn heading(&mut self, text: &str, level: u8) -> Result<(), quick_xml::Error> {
        let size = match level {
            0 => 40,
            1 => 32,
            _ => 26,
        };
        self.paragraph(
            text,
            RunStyle {
                bold: true,
                size: Some(size),
                ..RunStyle::default()
            },
        )
    }

    fn page_break(&mut self) -> Result<(), quick_xml::Error> {
        self.start("w:p")?;
        self.start("w:r")?;
        self.val("w:br", "page")?;
        self.end("w:r")?;
        self.end("w:p")
    }

    fn table(&mut self, header: &[&str], rows: &[Vec<Cell>]) -> Result<(), quick_xml::Error> {
        self.start("w:tbl")?;

        self.start("w:tblPr")?;
        let mut width = BytesStart::new("w:tblW");
        width.push_attribute(("w:w", "0"));
        width.push_attribute(("w:type", "auto"));
        self.writer.write_event(Event::Empty(width))?;
        self.start("w:tblBorders")?;
        for side in ["w:top", "w:left", "w:bottom", "w:right", "w:insideH", "w:insideV"] {
            let mut border = BytesStart::new(side);
            border.push_attribute(("w:val", "single"));
            border.push_attribute(("w:sz", "4"));
            border.push_attribute(("w:space", "0"));
            border.push_attribute(("w:color", "auto"));
            self.writer.write_event(Event::Empty(border))?;
        }
        self.end("w:tblBorders")?;
        self.end("w:tblPr")?;

        if !header.is_empty() {
            let cells: Vec<Cell> = header
                .iter()
                .map(|h| (h.to_string(), RunStyle::bold()))
                .collect();
            self.row(&cells)?;
        }
        for row in rows {
            self.row(row)?;
        }

        self.end("w:tbl")?;
        // Word merges adjacent tables without a paragraph between them
        self.paragraph("", RunStyle::default())
    }

    fn row(&mut self, cells: &[Cell]) -> Result<(), quick_xml::Error> {
        self.start("w:tr")?;
        for (text, style) in cells {
            self.start("w:tc")?;
            self.paragraph(text, *style)?;
            self.end("w:tc")?;
        }
        self.end("w:tr")
    }

    fn finish(mut self) -> Result<Vec<u8>, quick_xml::Error> {
        self.writer
            .write_event(Event::Empty(BytesStart::new("w:sectPr")))?;
        self.end("w:body")?;
        self.end("w:document")?;
        Ok(self.writer.into_inner().into_inner())
    }
}

fn status_cell(status: &OutcomeStatus) -> Cell {
    let color = match status {
        OutcomeStatus::Passed => GREEN,
        OutcomeStatus::Skipped { .. } => ORANGE,
        _ => RED,
    };
    (status.label().to_string(), RunStyle::colored(color))
}

fn build_document(
    summary: &RunSummary,
    metadata: &ReportMetadata,
) -> Result<Vec<u8>, quick_xml::Error> {
    let mut doc = DocWriter::new()?;

    // Header
    doc.heading("API Test Report", 0)?;
    doc.table(
        &[],
        &[
            vec![(String::from("Project"), RunStyle::bold()), plain(&metadata.project_name)],
            vec![(String::from("Environment"), RunStyle::bold()), plain(&metadata.environment_name)],
            vec![(String::from("Test Cycle"), RunStyle::bold()), plain(&metadata.test_cycle)],
            vec![
                (String::from("Date"), RunStyle::bold()),
                plain(metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string()),
            ],
        ],
    )?;

    // Summary
    doc.heading("Test Execution Summary", 1)?;
    doc.table(
        &["Metric", "Value"],
        &[
            vec![plain("Total Tests"), plain(summary.total.to_string())],
            vec![plain("Passed"), (summary.passed.to_string(), RunStyle::colored(GREEN))],
            vec![plain("Failed"), (summary.failed.to_string(), RunStyle::colored(RED))],
            vec![plain("Skipped"), (summary.skipped.to_string(), RunStyle::colored(ORANGE))],
            vec![plain("Errored"), (summary.errored.to_string(), RunStyle::colored(RED))],
            vec![
                plain("False Positives"),
                (false_positives(summary).to_string(), RunStyle::colored(ORANGE)),
            ],
            vec![plain("Pass Rate"), plain(format!("{:.1}%", summary.pass_rate()))],
            vec![plain("Duration"), plain(format_duration(summary.duration_ms))],
        ],
    )?;

    // Failure analysis
    doc.heading("Failure Statistics", 2)?;
    // Distribution is a table here; the charts live in the HTML report.
    let breakdown = failure_breakdown(summary);
    let problems: u32 = breakdown.iter().map(|(_, n)| n).sum();
    let failure_rows: Vec<Vec<Cell>> = breakdown
        .into_iter()
        .map(|(category, count)| {
            let share = if problems == 0 {
                0.0
            } else {
                f64::from(count) * 100.0 / f64::from(problems)
            };
            vec![
                plain(category),
                plain(count.to_string()),
                plain(format!("{:.1}%", share)),
            ]
        })
        .collect();
    doc.table(&["Failure Type", "Count", "Share"], &failure_rows)?;

    // Per-unit table
    doc.heading("Detailed Test Cases", 1)?;
    if summary.outcomes.is_empty() {
        doc.paragraph("No tests were discovered.", RunStyle::default())?;
    } else {
        let rows: Vec<Vec<Cell>> = summary
            .outcomes
            .iter()
            .map(|o| {
                vec![
                    plain(&o.unit_id),
                    plain(&o.name),
                    status_cell(&o.status),
                    plain(format!("{:.3}", o.duration_ms as f64 / 1000.0)),
                    plain(o.status.message().unwrap_or("")),
                ]
            })
            .collect();
        doc.table(
            &["Test Case ID", "Test Name", "Status", "Duration (s)", "Message"],
            &rows,
        )?;
    }

    // Response times
    if let Some(stats) = response_stats(summary) {
        doc.heading("Response Time Statistics", 2)?;
        doc.table(
            &[],
            &[
                vec![plain("Average"), plain(format!("{:.2} sec", stats.average_ms / 1000.0))],
                vec![plain("Max"), plain(format!("{:.2} sec", stats.max_ms as f64 / 1000.0))],
                vec![plain("Min"), plain(format!("{:.2} sec", stats.min_ms as f64 / 1000.0))],
            ],
        )?;

        let rows: Vec<Vec<Cell>> = endpoint_stats(summary)
            .into_iter()
            .map(|ep| {
                vec![
                    plain(ep.endpoint),
                    plain(ep.count.to_string()),
                    plain(format!("{:.2}", ep.average_ms / 1000.0)),
                    plain(format!("{:.2}", ep.max_ms as f64 / 1000.0)),
                ]
            })
            .collect();
        doc.table(&["Endpoint", "Calls", "Average (s)", "Max (s)"], &rows)?;
    }

    // Environment
    doc.heading("Environment Information", 1)?;
    let env = &metadata.env;
    doc.table(
        &[],
        &[
            vec![(String::from("Base API URL"), RunStyle::bold()), plain(&metadata.base_url)],
            vec![(String::from("Tool Version"), RunStyle::bold()), plain(&env.tool_version)],
            vec![
                (String::from("Platform"), RunStyle::bold()),
                plain(format!("{} ({})", env.os, env.arch)),
            ],
            vec![(String::from("Hostname"), RunStyle::bold()), plain(&env.hostname)],
            vec![(String::from("CPU Cores"), RunStyle::bold()), plain(env.cpu_cores.to_string())],
        ],
    )?;

    if let (Some(start), Some(end)) = (summary.started_at, summary.finished_at) {
        doc.heading("Execution Information", 1)?;
        doc.table(
            &[],
            &[
                vec![
                    (String::from("Test Execution Started"), RunStyle::bold()),
                    plain(start.format("%Y-%m-%d %H:%M:%S").to_string()),
                ],
                vec![
                    (String::from("Test Execution Finished"), RunStyle::bold()),
                    plain(end.format("%Y-%m-%d %H:%M:%S").to_string()),
                ],
                vec![
                    (String::from("Total Test Duration"), RunStyle::bold()),
                    plain(format_duration(summary.duration_ms)),
                ],
            ],
        )?;
    }

    // Error details
    let problems: Vec<_> = summary
        .outcomes
        .iter()
        .filter(|o| o.status.is_problem())
        .collect();
    if !problems.is_empty() {
        doc.page_break()?;
        doc.heading("Test Errors Report", 1)?;
        doc.paragraph(
            &format!(
                "The following {} test(s) encountered errors:",
                problems.len()
            ),
            RunStyle::default(),
        )?;

        for outcome in problems {
            doc.heading(&format!("{} [{}]", outcome.name, outcome.status.label()), 2)?;
            let text = match &outcome.status {
                OutcomeStatus::Failed {
                    diagnostic: Some(diagnostic),
                    ..
                } => diagnostic.as_str(),
                other => other.message().unwrap_or(""),
            };
            doc.paragraph(
                text,
                RunStyle {
                    mono: true,
                    ..RunStyle::default()
                },
            )?;
        }
    }

    doc.finish()
}

fn build_core_properties(metadata: &ReportMetadata) -> Result<Vec<u8>, quick_xml::Error> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;

    let mut root = BytesStart::new("cp:coreProperties");
    root.push_attribute((
        "xmlns:cp",
        "http://schemas.openxmlformats.org/package/2006/metadata/core-properties",
    ));
    root.push_attribute(("xmlns:dc", "http://purl.org/dc/elements/1.1/"));
    root.push_attribute(("xmlns:dcterms", "http://purl.org/dc/terms/"));
    root.push_attribute(("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"));
    writer.write_event(Event::Start(root))?;

    let title = format!(
        "{} - {} - {}",
        metadata.project_name, metadata.environment_name, metadata.test_cycle
    );
    for (tag, text) in [("dc:title", title.as_str()), ("dc:creator", "pytx")] {
        writer.write_event(Event::Start(BytesStart::new(tag)))?;
        writer.write_event(Event::Text(BytesText::new(&sanitize_xml(text))))?;
        writer.write_event(Event::End(BytesEnd::new(tag)))?;
    }

    let mut created = BytesStart::new("dcterms:created");
    created.push_attribute(("xsi:type", "dcterms:W3CDTF"));
    writer.write_event(Event::Start(created))?;
    let stamp = metadata
        .generated_at
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string();
    writer.write_event(Event::Text(BytesText::new(&stamp)))?;
    writer.write_event(Event::End(BytesEnd::new("dcterms:created")))?;

    writer.write_event(Event::End(BytesEnd::new("cp:coreProperties")))?;
    Ok(writer.into_inner().into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::tests::sample;
    use crate::runner::state::{ResultAggregator, RunLabels};
    use std::io::Read;

    fn part(bytes: &[u8], name: &str) -> String {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut file = archive.by_name(name).unwrap();
        let mut content = String::new();
        file.read_to_string(&mut content).unwrap();
        content
    }

    fn assert_well_formed(xml: &str) {
        let mut reader = quick_xml::Reader::from_str(xml);
        loop {
            match reader.read_event() {
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => panic!("malformed xml: {}", e),
            }
        }
    }

    #[test]
    fn test_package_has_required_parts() {
        let (summary, metadata) = sample();
        let bytes = DocxRenderer.render(&summary, &metadata).unwrap();

        let archive = zip::ZipArchive::new(Cursor::new(bytes.as_slice())).unwrap();
        let mut names: Vec<_> = archive.file_names().map(|s| s.to_string()).collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "[Content_Types].xml",
                "_rels/.rels",
                "docProps/core.xml",
                "word/document.xml"
            ]
        );
    }

    #[test]
    fn test_document_content() {
        let (summary, metadata) = sample();
        let bytes = DocxRenderer.render(&summary, &metadata).unwrap();
        let xml = part(&bytes, "word/document.xml");
        assert_well_formed(&xml);

        assert!(xml.contains("Billing"));
        assert!(xml.contains("Sprint 7"));
        assert!(xml.contains("Detailed Test Cases"));
        for name in ["list_invoices", "get_invoice", "create_invoice"] {
            assert!(xml.contains(name));
        }
        assert!(xml.contains("Bad Request (400)"));
        assert!(xml.contains("Test Errors Report"));
        assert!(xml.contains("got 400 &lt;bad&gt;"));

        let core = part(&bytes, "docProps/core.xml");
        assert_well_formed(&core);
        assert!(core.contains("Billing - Staging - Sprint 7"));
    }

    #[test]
    fn test_summary_rows_and_failure_share() {
        let (summary, metadata) = sample();
        let xml = part(&DocxRenderer.render(&summary, &metadata).unwrap(), "word/document.xml");
        assert!(xml.contains("False Positives"));
        assert!(xml.contains("Share"));
        // the sample's only problem is the 400
        assert!(xml.contains("100.0%"));
    }

    #[test]
    fn test_control_characters_are_replaced() {
        let (mut summary, metadata) = sample();
        summary.outcomes[2].status = OutcomeStatus::failed("proxy said \u{1b}[31mboom\u{0}");
        let bytes = DocxRenderer.render(&summary, &metadata).unwrap();
        let xml = part(&bytes, "word/document.xml");

        assert!(!xml.contains('\u{1b}'));
        assert!(!xml.contains('\u{0}'));
        assert!(xml.contains("[31mboom"));
        assert_well_formed(&xml);
    }

    #[test]
    fn test_empty_run_document() {
        let summary = ResultAggregator::new(RunLabels {
            project_name: "Empty".to_string(),
            ..RunLabels::default()
        })
        .finalize();
        let metadata = ReportMetadata::new(&summary, "http://localhost");
        let bytes = DocxRenderer.render(&summary, &metadata).unwrap();
        let xml = part(&bytes, "word/document.xml");
        assert_well_formed(&xml);
        assert!(xml.contains("No tests were discovered."));
        assert!(!xml.contains("Test Errors Report"));
    }
}
