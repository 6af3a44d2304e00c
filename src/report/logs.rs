//! Plain-text run logs written next to the reports:
//! `executed_tests.log`, `test_errors.log` and `all_test_methods.log`.

use crate::error::RenderError;
use crate::runner::state::{OutcomeStatus, RunSummary};
use log::info;
use std::fmt::Write;
use std::path::{Path, PathBuf};

pub const EXECUTED_LOG: &str = "executed_tests.log";
pub const ERRORS_LOG: &str = "test_errors.log";
pub const METHODS_LOG: &str = "all_test_methods.log";

/// One ATTEMPTING line per unit followed by its result
pub fn executed_log(summary: &RunSummary) -> String {
    let mut out = String::new();
    for outcome in &summary.outcomes {
        let _ = writeln!(out, "ATTEMPTING: {}", outcome.unit_id);
        let _ = match &outcome.status {
            OutcomeStatus::Passed => writeln!(out, "  SUCCESS: {}", outcome.unit_id),
            OutcomeStatus::Skipped { reason } => {
                writeln!(out, "  SKIPPED: {} ({})", outcome.unit_id, reason)
            }
            other => writeln!(out, "  ERROR: {} ({})", outcome.unit_id, other.label()),
        };
    }
    out
}

/// Full entry for every failed or errored unit, diagnostic included
pub fn errors_log(summary: &RunSummary) -> String {
    let mut out = String::new();
    for outcome in summary.outcomes.iter().filter(|o| o.status.is_problem()) {
        let _ = writeln!(
            out,
            "[{}] {} ({})",
            outcome.finished_at.format("%Y-%m-%d %H:%M:%S"),
            outcome.unit_id,
            outcome.status.label()
        );
        let _ = writeln!(out, "{}", outcome.status.message().unwrap_or(""));
        if let OutcomeStatus::Failed {
            diagnostic: Some(diagnostic),
            ..
        } = &outcome.status
        {
            let _ = writeln!(out, "{}", diagnostic);
        }
        out.push('\n');
    }
    out
}

pub fn methods_log(summary: &RunSummary) -> String {
    summary
        .outcomes
        .iter()
        .map(|o| format!("{}\n", o.unit_id))
        .collect()
}

/// Write all three logs into `output_dir`, creating it if needed
pub fn write_run_logs(
    summary: &RunSummary,
    output_dir: &Path,
) -> Result<Vec<PathBuf>, RenderError> {
    std::fs::create_dir_all(output_dir).map_err(|source| RenderError::Write {
        path: output_dir.to_path_buf(),
        source,
    })?;

    let mut written = Vec::new();
    for (name, content) in [
        (EXECUTED_LOG, executed_log(summary)),
        (ERRORS_LOG, errors_log(summary)),
        (METHODS_LOG, methods_log(summary)),
    ] {
        let path = output_dir.join(name);
        std::fs::write(&path, content).map_err(|source| RenderError::Write {
            path: path.clone(),
            source,
        })?;
        written.push(path);
    }

    info!("Wrote run logs to {}", output_dir.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::tests::sample;
    use tempfile::TempDir;

    #[test]
    fn test_executed_log_lines() {
        let (summary, _) = sample();
        let log = executed_log(&summary);
        let lines: Vec<&str> = log.lines().collect();

        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], format!("ATTEMPTING: {}", summary.outcomes[0].unit_id));
        assert_eq!(lines[1], format!("  SUCCESS: {}", summary.outcomes[0].unit_id));
        assert_eq!(lines[5], format!("  ERROR: {} (Failed)", summary.outcomes[2].unit_id));
    }

    #[test]
    fn test_errors_log_holds_only_problems() {
        let (summary, _) = sample();
        let log = errors_log(&summary);
        assert!(log.contains(&format!("{} (Failed)", summary.outcomes[2].unit_id)));
        assert!(log.contains("Expected status 201, got 400 <bad>"));
        assert!(!log.contains(&summary.outcomes[0].unit_id));
    }

    #[test]
    fn test_write_run_logs() {
        let (summary, _) = sample();
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("output");

        let written = write_run_logs(&summary, &out).unwrap();
        assert_eq!(
            written,
            vec![out.join(EXECUTED_LOG), out.join(ERRORS_LOG), out.join(METHODS_LOG)]
        );

        let methods = std::fs::read_to_string(out.join(METHODS_LOG)).unwrap();
        assert_eq!(methods.lines().count(), 3);
        assert!(methods.contains(&summary.outcomes[1].unit_id));
    }

    #[test]
    fn test_write_run_logs_reports_write_failure() {
        let (summary, _) = sample();
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("taken");
        std::fs::write(&blocker, "file in the way").unwrap();

        let err = write_run_logs(&summary, &blocker).unwrap_err();
        assert!(matches!(err, RenderError::Write { .. }));
    }
}
