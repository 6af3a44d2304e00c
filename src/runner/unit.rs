use super::session::Session;
use super::state::{OutcomeStatus, ResponseTiming};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// What a test body reports back to the executor
#[derive(Debug, Clone)]
pub struct UnitRun {
    pub status: OutcomeStatus,
    pub timings: Vec<ResponseTiming>,
}

impl UnitRun {
    pub fn new(status: OutcomeStatus) -> Self {
        Self {
            status,
            timings: Vec::new(),
        }
    }

    pub fn with_timings(mut self, timings: Vec<ResponseTiming>) -> Self {
        self.timings = timings;
        self
    }
}

impl From<OutcomeStatus> for UnitRun {
    fn from(status: OutcomeStatus) -> Self {
        Self::new(status)
    }
}

/// The executable part of a test unit. Implementations may only read the session.
#[async_trait]
pub trait TestBody: Send + Sync {
    async fn run(&self, session: &Session) -> UnitRun;
}

/// One discovered, independently executable test
#[derive(Clone)]
pub struct TestUnit {
    pub id: String,
    pub name: String,
    pub path: PathBuf,
    /// Suite name declared by the test file, if any
    pub suite: Option<String>,
    pub description: Option<String>,
    pub body: Arc<dyn TestBody>,
}

impl TestUnit {
    pub fn new(id: &str, name: &str, path: PathBuf, body: Arc<dyn TestBody>) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            path,
            suite: None,
            description: None,
            body,
        }
    }

    pub fn with_suite(mut self, suite: Option<String>) -> Self {
        self.suite = suite;
        self
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }
}

impl std::fmt::Debug for TestUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestUnit")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("path", &self.path)
            .finish()
    }
}

/// Body standing in for a test file that could not be loaded
pub struct BrokenUnit {
    pub error: String,
}

#[async_trait]
impl TestBody for BrokenUnit {
    async fn run(&self, _session: &Session) -> UnitRun {
        OutcomeStatus::errored(self.error.clone()).into()
    }
}

/// Body that always skips
pub struct SkippedUnit {
    pub reason: String,
}

#[async_trait]
impl TestBody for SkippedUnit {
    async fn run(&self, _session: &Session) -> UnitRun {
        OutcomeStatus::skipped(self.reason.clone()).into()
    }
}
