pub mod api;
pub mod discovery;
pub mod events;
pub mod executor;
pub mod session;
pub mod state;
pub mod unit;

use crate::error::{PipelineError, RenderError};
use crate::report::types::ReportMetadata;
use crate::report::logs::write_run_logs;
use crate::report::{write_reports, ReportFormat};
use crate::utils::config::{Config, RunConfig};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub use discovery::Discovery;
pub use events::*;
pub use executor::{CancelToken, TestExecutor};
pub use session::{establish_with_retry, HttpSessionProvider, Session, SessionProvider};
pub use state::*;
pub use unit::{TestBody, TestUnit, UnitRun};

/// Everything a finished run produced
#[derive(Debug)]
pub struct RunReport {
    pub summary: RunSummary,
    pub metadata: ReportMetadata,
    /// Report files that were written
    pub written: Vec<PathBuf>,
    /// Run logs written next to the reports
    pub logs: Vec<PathBuf>,
    /// Sinks that failed; the summary above is complete regardless
    pub render_errors: Vec<RenderError>,
}

impl RunReport {
    pub fn render_failed(&self) -> bool {
        !self.render_errors.is_empty()
    }
}

/// Discovery → session → executor → aggregator → renderers
pub struct Pipeline {
    run_config: Arc<RunConfig>,
    config: Config,
    provider: Arc<dyn SessionProvider>,
    formats: Vec<ReportFormat>,
    output_dir: PathBuf,
    emitter: Arc<EventEmitter>,
    cancel: CancelToken,
}

impl Pipeline {
    pub fn new(run_config: RunConfig, config: Config) -> Self {
        let provider = HttpSessionProvider::new(
            Duration::from_millis(config.request_timeout_ms),
            config.auth_endpoint.clone(),
        );
        Self {
            run_config: Arc::new(run_config),
            config,
            provider: Arc::new(provider),
            formats: vec![ReportFormat::Docx, ReportFormat::Json],
            output_dir: PathBuf::from("output"),
            emitter: Arc::new(EventEmitter::default()),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn SessionProvider>) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_formats(mut self, formats: Vec<ReportFormat>) -> Self {
        self.formats = formats;
        self
    }

    pub fn with_output_dir(mut self, output_dir: PathBuf) -> Self {
        self.output_dir = output_dir;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn run_config(&self) -> &RunConfig {
        &self.run_config
    }

    fn log(&self, message: String) {
        info!("{}", message);
        self.emitter.emit(TestEvent::Log { message });
    }

    /// Subscribe to run events
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<TestEvent> {
        self.emitter.subscribe()
    }

    /// Discover test files under the configured directory and run them
    pub async fn run(&self) -> Result<RunReport, PipelineError> {
        let discovery = Discovery::scan(&self.run_config.test_dir, &self.config.pattern)?
            .with_request_timeout(Duration::from_millis(self.config.request_timeout_ms))
            .with_tags(self.config.tags.clone());
        self.log(format!(
            "Found {} test file(s) in {}",
            discovery.files().len(),
            discovery.root().display()
        ));
        self.run_units(discovery.units()).await
    }

    /// Run an explicit sequence of units. Nothing is pulled from `units`
    /// until the session is established.
    pub async fn run_units<I>(&self, units: I) -> Result<RunReport, PipelineError>
    where
        I: IntoIterator<Item = TestUnit>,
    {
        let run_id = Uuid::new_v4().to_string();
        self.emitter.emit(TestEvent::RunStarted {
            run_id: run_id.clone(),
            test_dir: self.run_config.test_dir.display().to_string(),
            concurrency: self.config.concurrency.max(1),
        });

        let session = establish_with_retry(
            self.provider.as_ref(),
            &self.run_config,
            self.config.session_attempts,
            self.config.session_backoff_ms,
        )
        .await?;
        session.ensure_bound_to(&self.run_config)?;
        let session = Arc::new(session);
        self.emitter.emit(TestEvent::SessionEstablished {
            base_url: session.base_url().to_string(),
            user: session.user().to_string(),
        });

        let executor = TestExecutor::new(session.clone(), self.emitter.clone())
            .with_unit_timeout(self.config.unit_timeout)
            .with_concurrency(self.config.concurrency)
            .with_cancel_token(self.cancel.clone())
            .with_run_timeout(self.config.run_timeout);

        let mut aggregator = ResultAggregator::new(RunLabels {
            run_id,
            project_name: self.run_config.project_name.clone(),
            environment_name: self.run_config.environment_name.clone(),
            test_cycle: self.run_config.test_cycle.clone(),
        });
        executor.run_all(units, &mut aggregator).await;
        session.close();

        let summary = aggregator.finalize();
        if self.cancel.is_cancelled() {
            warn!("Run was cancelled; report covers a partial run");
        }
        self.emitter.emit(TestEvent::RunFinished {
            summary: summary.clone(),
        });

        let metadata = ReportMetadata::new(&summary, &self.run_config.base_api_url);
        let (written, mut render_errors) =
            write_reports(&self.formats, &summary, &metadata, &self.output_dir);
        let logs = match write_run_logs(&summary, &self.output_dir) {
            Ok(paths) => paths,
            Err(e) => {
                render_errors.push(e);
                Vec::new()
            }
        };
        for path in &written {
            self.log(format!("Report written: {}", path.display()));
        }
        for e in &render_errors {
            warn!("{}", e);
            self.emitter.emit(TestEvent::Log {
                message: format!("Report failed: {}", e),
            });
        }

        Ok(RunReport {
            summary,
            metadata,
            written,
            logs,
            render_errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct StubProvider {
        reject: bool,
    }

    #[async_trait]
    impl SessionProvider for StubProvider {
        async fn establish(&self, config: &RunConfig) -> Result<Session, SessionError> {
            if self.reject {
                return Err(SessionError::Auth {
                    url: format!("{}/login", config.base_api_url),
                    status: 401,
                    message: "invalid credentials".to_string(),
                });
            }
            Ok(Session::new(
                reqwest::Client::new(),
                &config.base_api_url,
                &config.test_user,
                Some("token".to_string()),
                None,
            ))
        }
    }

    struct Fixed(OutcomeStatus);

    #[async_trait]
    impl TestBody for Fixed {
        async fn run(&self, _session: &Session) -> UnitRun {
            self.0.clone().into()
        }
    }

    fn run_config(dir: &TempDir) -> RunConfig {
        RunConfig {
            base_api_url: "http://localhost:9".to_string(),
            test_user: "qa@example.com".to_string(),
            test_password: "secret".to_string(),
            project_name: "Billing".to_string(),
            environment_name: "Staging".to_string(),
            test_cycle: "Regression".to_string(),
            test_dir: dir.path().to_path_buf(),
        }
    }

    fn unit(name: &str, status: OutcomeStatus) -> TestUnit {
        TestUnit::new(
            &format!("inline::{}", name),
            name,
            PathBuf::from("inline"),
            Arc::new(Fixed(status)),
        )
    }

    #[tokio::test]
    async fn test_programmatic_units() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        let pipeline = Pipeline::new(run_config(&dir), Config::default())
            .with_provider(Arc::new(StubProvider { reject: false }))
            .with_formats(vec![ReportFormat::Json])
            .with_output_dir(out.clone());

        let report = pipeline
            .run_units(vec![
                unit("a", OutcomeStatus::Passed),
                unit("b", OutcomeStatus::skipped("not ready")),
            ])
            .await
            .unwrap();

        assert_eq!(report.summary.total, 2);
        assert_eq!(report.summary.skipped, 1);
        assert_eq!(report.summary.project_name, "Billing");
        assert!(!report.render_failed());
        assert_eq!(report.written, vec![out.join("test_report.json")]);
        assert_eq!(report.logs.len(), 3);
        assert!(out.join("executed_tests.log").exists());
    }

    #[tokio::test]
    async fn test_reports_are_announced_as_log_events() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        let pipeline = Pipeline::new(run_config(&dir), Config::default())
            .with_provider(Arc::new(StubProvider { reject: false }))
            .with_formats(vec![ReportFormat::Json])
            .with_output_dir(out.clone());
        let mut events = pipeline.subscribe();

        pipeline
            .run_units(vec![unit("a", OutcomeStatus::Passed)])
            .await
            .unwrap();

        let mut messages = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let TestEvent::Log { message } = event {
                messages.push(message);
            }
        }
        assert_eq!(
            messages,
            vec![format!("Report written: {}", out.join("test_report.json").display())]
        );
    }

    #[tokio::test]
    async fn test_rejected_session_consumes_nothing() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = pulled.clone();
        let units = (0..3).map(move |i| {
            counter.fetch_add(1, Ordering::SeqCst);
            unit(&format!("u{}", i), OutcomeStatus::Passed)
        });

        let pipeline = Pipeline::new(run_config(&dir), Config::default())
            .with_provider(Arc::new(StubProvider { reject: true }))
            .with_output_dir(out.clone());

        let err = pipeline.run_units(units).await.unwrap_err();
        assert_eq!(err.stage(), "session");
        assert_eq!(pulled.load(Ordering::SeqCst), 0);
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn test_missing_test_dir_is_discovery_error() {
        let dir = TempDir::new().unwrap();
        let mut config = run_config(&dir);
        config.test_dir = dir.path().join("missing");
        let pipeline = Pipeline::new(config, Config::default())
            .with_provider(Arc::new(StubProvider { reject: false }));

        let err = pipeline.run().await.unwrap_err();
        assert_eq!(err.stage(), "discovery");
    }

    #[tokio::test]
    async fn test_render_failure_keeps_summary() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("taken");
        std::fs::write(&blocker, "file in the way").unwrap();

        let pipeline = Pipeline::new(run_config(&dir), Config::default())
            .with_provider(Arc::new(StubProvider { reject: false }))
            .with_formats(vec![ReportFormat::Json, ReportFormat::Html])
            .with_output_dir(blocker);

        let report = pipeline
            .run_units(vec![unit("a", OutcomeStatus::failed("nope"))])
            .await
            .unwrap();
        assert!(report.render_failed());
        // two report sinks plus the run logs
        assert_eq!(report.render_errors.len(), 3);
        assert!(report.logs.is_empty());
        assert_eq!(report.summary.failed, 1);
        assert!(report.summary.is_consistent());
    }
}
