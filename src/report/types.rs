use crate::runner::state::RunSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sysinfo::{CpuRefreshKind, RefreshKind, System};

/// Machine the run executed on
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnvInfo {
    pub tool_version: String,
    pub os: String,
    pub arch: String,
    pub hostname: String,
    pub cpu_cores: usize,
}

impl EnvInfo {
    pub fn detect() -> Self {
        let sys = System::new_with_specifics(
            RefreshKind::new().with_cpu(CpuRefreshKind::new()),
        );
        let cpu_cores = match sys.cpus().len() {
            0 => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            n => n,
        };

        Self {
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            hostname: System::host_name()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "unknown".to_string()),
            cpu_cores,
        }
    }
}

/// Header information printed on every report
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetadata {
    pub run_id: String,
    pub project_name: String,
    pub environment_name: String,
    pub test_cycle: String,
    pub base_url: String,
    pub generated_at: DateTime<Utc>,
    pub env: EnvInfo,
}

impl ReportMetadata {
    pub fn new(summary: &RunSummary, base_url: &str) -> Self {
        Self {
            run_id: summary.run_id.clone(),
            project_name: summary.project_name.clone(),
            environment_name: summary.environment_name.clone(),
            test_cycle: summary.test_cycle.clone(),
            base_url: base_url.to_string(),
            generated_at: Utc::now(),
            env: EnvInfo::detect(),
        }
    }
}

/// Persisted JSON document, re-readable for `pytx report`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResults {
    pub metadata: ReportMetadata,
    pub summary: RunSummary,
}
