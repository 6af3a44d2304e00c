use super::types::ReportMetadata;
use super::{sanitize_xml, ReportFormat, ReportRenderer};
use crate::error::RenderError;
use crate::runner::state::{Outcome, OutcomeStatus, RunSummary};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;

pub struct JunitRenderer;

impl ReportRenderer for JunitRenderer {
    fn format(&self) -> ReportFormat {
        ReportFormat::Junit
    }

    fn file_name(&self) -> &'static str {
        "junit.xml"
    }

    fn render(
        &self,
        summary: &RunSummary,
        metadata: &ReportMetadata,
    ) -> Result<Vec<u8>, RenderError> {
        generate_junit_xml(summary, metadata)
            .map(String::into_bytes)
            .map_err(|e| RenderError::Encode {
                format: "junit",
                message: e.to_string(),
            })
    }
}

fn seconds(ms: u64) -> String {
    format!("{:.3}", ms as f64 / 1000.0)
}

/// Generate a JUnit XML document, one `<testsuite>` per test file
pub fn generate_junit_xml(
    summary: &RunSummary,
    metadata: &ReportMetadata,
) -> Result<String, quick_xml::Error> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut suites_start = BytesStart::new("testsuites");
    let project = sanitize_xml(&metadata.project_name);
    suites_start.push_attribute(("name", project.as_ref()));
    suites_start.push_attribute(("tests", summary.total.to_string().as_str()));
    suites_start.push_attribute(("failures", summary.failed.to_string().as_str()));
    suites_start.push_attribute(("errors", summary.errored.to_string().as_str()));
    suites_start.push_attribute(("skipped", summary.skipped.to_string().as_str()));
    suites_start.push_attribute(("time", seconds(summary.duration_ms).as_str()));
    writer.write_event(Event::Start(suites_start))?;

    // Group by file, keeping first-seen order
    let mut groups: Vec<(&str, Vec<&Outcome>)> = Vec::new();
    for outcome in &summary.outcomes {
        match groups.iter_mut().find(|(path, _)| *path == outcome.path) {
            Some((_, members)) => members.push(outcome),
            None => groups.push((outcome.path.as_str(), vec![outcome])),
        }
    }

    for (path, members) in groups {
        let count = |f: fn(&OutcomeStatus) -> bool| {
            members.iter().filter(|o| f(&o.status)).count().to_string()
        };
        let time: u64 = members.iter().map(|o| o.duration_ms).sum();

        let suite_name = sanitize_xml(
            members
                .first()
                .and_then(|o| o.suite.as_deref())
                .unwrap_or(path),
        );
        let mut suite_start = BytesStart::new("testsuite");
        suite_start.push_attribute(("name", suite_name.as_ref()));
        suite_start.push_attribute(("file", path));
        suite_start.push_attribute(("tests", members.len().to_string().as_str()));
        suite_start.push_attribute((
            "failures",
            count(|s| matches!(s, OutcomeStatus::Failed { .. })).as_str(),
        ));
        suite_start.push_attribute((
            "errors",
            count(|s| matches!(s, OutcomeStatus::Errored { .. })).as_str(),
        ));
        suite_start.push_attribute((
            "skipped",
            count(|s| matches!(s, OutcomeStatus::Skipped { .. })).as_str(),
        ));
        suite_start.push_attribute(("time", seconds(time).as_str()));
        suite_start.push_attribute(("id", metadata.run_id.as_str()));
        if let Some(started) = members.first().map(|o| o.started_at.to_rfc3339()) {
            suite_start.push_attribute(("timestamp", started.as_str()));
        }
        writer.write_event(Event::Start(suite_start))?;

        for outcome in members {
            write_test_case(&mut writer, outcome)?;
        }

        writer.write_event(Event::End(BytesEnd::new("testsuite")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("testsuites")))?;

    let result = writer.into_inner().into_inner();
    Ok(String::from_utf8_lossy(&result).into_owned())
}

fn write_test_case<W: std::io::Write>(
    writer: &mut Writer<W>,
    outcome: &Outcome,
) -> Result<(), quick_xml::Error> {
    let name = sanitize_xml(&outcome.name);
    let classname = outcome
        .path
        .trim_end_matches(".yaml")
        .trim_end_matches(".yml")
        .replace(['/', '\\'], ".");

    let mut case_start = BytesStart::new("testcase");
    case_start.push_attribute(("name", name.as_ref()));
    case_start.push_attribute(("classname", classname.as_str()));
    case_start.push_attribute(("time", seconds(outcome.duration_ms).as_str()));

    let (tag, kind, message, body) = match &outcome.status {
        OutcomeStatus::Passed => {
            writer.write_event(Event::Empty(case_start))?;
            return Ok(());
        }
        OutcomeStatus::Failed {
            message,
            diagnostic,
        } => (
            "failure",
            Some("AssertionError"),
            message.as_str(),
            diagnostic.as_deref(),
        ),
        OutcomeStatus::Errored { detail } => ("error", Some("Error"), detail.as_str(), None),
        OutcomeStatus::Skipped { reason } => ("skipped", None, reason.as_str(), None),
    };

    writer.write_event(Event::Start(case_start))?;

    let message = sanitize_xml(message);
    let mut start = BytesStart::new(tag);
    start.push_attribute(("message", message.as_ref()));
    if let Some(kind) = kind {
        start.push_attribute(("type", kind));
    }
    match body {
        Some(text) => {
            writer.write_event(Event::Start(start))?;
            writer.write_event(Event::Text(BytesText::new(&sanitize_xml(text))))?;
            writer.write_event(Event::End(BytesEnd::new(tag)))?;
        }
        None => writer.write_event(Event::Empty(start))?,
    }

    writer.write_event(Event::End(BytesEnd::new("testcase")))?;
    Ok(())
}
