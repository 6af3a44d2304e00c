use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Terminal status of one unit execution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutcomeStatus {
    Passed,
    Failed {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        diagnostic: Option<String>,
    },
    Skipped {
        reason: String,
    },
    Errored {
        detail: String,
    },
}

impl OutcomeStatus {
    pub fn failed(message: impl Into<String>) -> Self {
        OutcomeStatus::Failed {
            message: message.into(),
            diagnostic: None,
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        OutcomeStatus::Skipped {
            reason: reason.into(),
        }
    }

    pub fn errored(detail: impl Into<String>) -> Self {
        OutcomeStatus::Errored {
            detail: detail.into(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            OutcomeStatus::Passed => "Passed",
            OutcomeStatus::Failed { .. } => "Failed",
            OutcomeStatus::Skipped { .. } => "Skipped",
            OutcomeStatus::Errored { .. } => "Errored",
        }
    }

    /// Message shown in the per-unit report table
    pub fn message(&self) -> Option<&str> {
        match self {
            OutcomeStatus::Passed => None,
            OutcomeStatus::Failed { message, .. } => Some(message),
            OutcomeStatus::Skipped { reason } => Some(reason),
            OutcomeStatus::Errored { detail } => Some(detail),
        }
    }

    pub fn is_problem(&self) -> bool {
        matches!(
            self,
            OutcomeStatus::Failed { .. } | OutcomeStatus::Errored { .. }
        )
    }
}

/// One HTTP attempt made by a unit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResponseTiming {
    pub endpoint: String,
    pub method: String,
    pub duration_ms: u64,
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub error: Option<String>,
    pub attempt: u32,
}

/// Result of one unit execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub unit_id: String,
    pub name: String,
    pub path: String,
    /// Name of the suite the unit was declared in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suite: Option<String>,
    pub status: OutcomeStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    #[serde(default)]
    pub timings: Vec<ResponseTiming>,
}

/// Aggregate over all outcomes of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: String,
    pub project_name: String,
    pub environment_name: String,
    pub test_cycle: String,
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub errored: u32,
    /// Earliest unit start to latest unit end
    pub duration_ms: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outcomes: Vec<Outcome>,
}

impl RunSummary {
    /// Counts agree with the outcome list
    pub fn is_consistent(&self) -> bool {
        let (p, f, s, e) = self
            .outcomes
            .iter()
            .fold((0, 0, 0, 0), |(p, f, s, e), o| match o.status {
                OutcomeStatus::Passed => (p + 1, f, s, e),
                OutcomeStatus::Failed { .. } => (p, f + 1, s, e),
                OutcomeStatus::Skipped { .. } => (p, f, s + 1, e),
                OutcomeStatus::Errored { .. } => (p, f, s, e + 1),
            });

        self.total as usize == self.outcomes.len()
            && self.total == self.passed + self.failed + self.skipped + self.errored
            && (p, f, s, e) == (self.passed, self.failed, self.skipped, self.errored)
    }

    pub fn has_problems(&self) -> bool {
        self.failed > 0 || self.errored > 0
    }

    /// Percentage of executed (non-skipped) units that passed
    pub fn pass_rate(&self) -> f64 {
        let executed = self.total.saturating_sub(self.skipped);
        if executed == 0 {
            0.0
        } else {
            self.passed as f64 / executed as f64 * 100.0
        }
    }

    pub fn timings(&self) -> impl Iterator<Item = &ResponseTiming> {
        self.outcomes.iter().flat_map(|o| o.timings.iter())
    }
}

/// Labels copied from the run configuration
#[derive(Debug, Clone, Default)]
pub struct RunLabels {
    pub run_id: String,
    pub project_name: String,
    pub environment_name: String,
    pub test_cycle: String,
}

/// Accumulates outcomes in arrival order. `finalize` consumes the
/// aggregator, so nothing can be added once the summary exists.
#[derive(Debug)]
pub struct ResultAggregator {
    labels: RunLabels,
    outcomes: Vec<Outcome>,
    passed: u32,
    failed: u32,
    skipped: u32,
    errored: u32,
    first_start: Option<DateTime<Utc>>,
    last_end: Option<DateTime<Utc>>,
}

impl ResultAggregator {
    pub fn new(labels: RunLabels) -> Self {
        Self {
            labels,
            outcomes: Vec::new(),
            passed: 0,
            failed: 0,
            skipped: 0,
            errored: 0,
            first_start: None,
            last_end: None,
        }
    }

    pub fn add(&mut self, outcome: Outcome) {
        match outcome.status {
            OutcomeStatus::Passed => self.passed += 1,
            OutcomeStatus::Failed { .. } => self.failed += 1,
            OutcomeStatus::Skipped { .. } => self.skipped += 1,
            OutcomeStatus::Errored { .. } => self.errored += 1,
        }

        self.first_start = Some(match self.first_start {
            Some(t) => t.min(outcome.started_at),
            None => outcome.started_at,
        });
        self.last_end = Some(match self.last_end {
            Some(t) => t.max(outcome.finished_at),
            None => outcome.finished_at,
        });

        self.outcomes.push(outcome);
    }

    pub fn finalize(self) -> RunSummary {
        let duration_ms = match (self.first_start, self.last_end) {
            (Some(start), Some(end)) => (end - start).num_milliseconds().max(0) as u64,
            _ => 0,
        };

        RunSummary {
            run_id: self.labels.run_id,
            project_name: self.labels.project_name,
            environment_name: self.labels.environment_name,
            test_cycle: self.labels.test_cycle,
            total: self.outcomes.len() as u32,
            passed: self.passed,
            failed: self.failed,
            skipped: self.skipped,
            errored: self.errored,
            duration_ms,
            started_at: self.first_start,
            finished_at: self.last_end,
            outcomes: self.outcomes,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Duration;

    pub(crate) fn outcome(name: &str, status: OutcomeStatus, start_ms: i64, end_ms: i64) -> Outcome {
        let base = DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        Outcome {
            unit_id: format!("test_{}.yaml::{}", name, name),
            name: name.to_string(),
            path: format!("test_{}.yaml", name),
            suite: None,
            status,
            started_at: base + Duration::milliseconds(start_ms),
            finished_at: base + Duration::milliseconds(end_ms),
            duration_ms: (end_ms - start_ms) as u64,
            timings: Vec::new(),
        }
    }

    fn labels() -> RunLabels {
        RunLabels {
            run_id: "run-1".to_string(),
            project_name: "Billing".to_string(),
            environment_name: "Staging".to_string(),
            test_cycle: "Regression".to_string(),
        }
    }

    #[test]
    fn test_counts_partition_outcomes() {
        let mut agg = ResultAggregator::new(labels());
        agg.add(outcome("a", OutcomeStatus::Passed, 0, 10));
        agg.add(outcome("b", OutcomeStatus::failed("boom"), 10, 20));
        agg.add(outcome("c", OutcomeStatus::skipped("no data"), 20, 20));
        agg.add(outcome("d", OutcomeStatus::errored("panic"), 20, 35));
        agg.add(outcome("e", OutcomeStatus::Passed, 35, 40));
        assert_eq!(agg.outcomes.len(), 5);

        let summary = agg.finalize();
        assert_eq!(summary.total, 5);
        assert_eq!(summary.passed, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.errored, 1);
        assert!(summary.is_consistent());
        assert!(summary.has_problems());
        assert_eq!(summary.project_name, "Billing");
    }

    #[test]
    fn test_duration_is_wall_clock_span() {
        let mut agg = ResultAggregator::new(labels());
        // Overlapping units, as in a concurrent run
        agg.add(outcome("a", OutcomeStatus::Passed, 0, 100));
        agg.add(outcome("b", OutcomeStatus::Passed, 10, 80));
        agg.add(outcome("c", OutcomeStatus::Passed, 50, 120));

        let summary = agg.finalize();
        assert_eq!(summary.duration_ms, 120);
        let sum: u64 = summary.outcomes.iter().map(|o| o.duration_ms).sum();
        assert!(sum > summary.duration_ms);
    }

    #[test]
    fn test_empty_run() {
        let summary = ResultAggregator::new(labels()).finalize();
        assert_eq!(summary.total, 0);
        assert_eq!(summary.duration_ms, 0);
        assert!(summary.started_at.is_none());
        assert!(summary.is_consistent());
        assert_eq!(summary.pass_rate(), 0.0);
    }

    #[test]
    fn test_pass_rate_tolerates_inconsistent_counts() {
        let mut summary = ResultAggregator::new(labels()).finalize();
        summary.total = 1;
        summary.skipped = 5;
        assert!(!summary.is_consistent());
        assert_eq!(summary.pass_rate(), 0.0);
    }

    #[test]
    fn test_order_is_preserved() {
        let mut agg = ResultAggregator::new(labels());
        for name in ["c", "a", "b"] {
            agg.add(outcome(name, OutcomeStatus::Passed, 0, 1));
        }
        let names: Vec<_> = agg.finalize().outcomes.into_iter().map(|o| o.name).collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_status_serialization_is_tagged() {
        let status = OutcomeStatus::failed("Expected status 200, got 404");
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["type"], "failed");
        assert_eq!(json["message"], "Expected status 200, got 404");
        assert!(json.get("diagnostic").is_none());
    }
}
