use crate::error::ConfigError;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Resolved configuration of one run. Built once, never mutated.
#[derive(Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub base_api_url: String,
    pub test_user: String,
    pub test_password: String,
    pub project_name: String,
    pub environment_name: String,
    pub test_cycle: String,
    pub test_dir: PathBuf,
}

impl RunConfig {
    pub const BASE_API_URL: &'static str = "BASE_API_URL";
    pub const TEST_USER: &'static str = "TEST_USER";
    pub const TEST_PASSWORD: &'static str = "TEST_PASSWORD";
    pub const PROJECT_NAME: &'static str = "PROJECT_NAME";
    pub const ENVIRONMENT: &'static str = "ENVIROMENT";
    pub const ENVIRONMENT_ALT: &'static str = "ENVIRONMENT";
    pub const TEST_CYCLE: &'static str = "TEST_CYCLE";

    /// Build from a variable lookup. Values are opaque and only checked for presence.
    pub fn from_lookup<F>(test_dir: &Path, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &'static str| -> Result<String, ConfigError> {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::MissingVar(key))
        };

        let environment_name = match lookup(Self::ENVIRONMENT).filter(|v| !v.is_empty()) {
            Some(v) => v,
            None => lookup(Self::ENVIRONMENT_ALT)
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::MissingVar(Self::ENVIRONMENT))?,
        };

        Ok(Self {
            base_api_url: require(Self::BASE_API_URL)?
                .trim_end_matches('/')
                .to_string(),
            test_user: require(Self::TEST_USER)?,
            test_password: require(Self::TEST_PASSWORD)?,
            project_name: require(Self::PROJECT_NAME)?,
            environment_name,
            test_cycle: require(Self::TEST_CYCLE)?,
            test_dir: test_dir.to_path_buf(),
        })
    }

    /// Load `env_file` (if it exists) into the process environment, then resolve.
    /// Variables already set in the environment win over the file.
    pub fn from_env(test_dir: &Path, env_file: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = env_file {
            match dotenvy::from_path(path) {
                Ok(()) => log::debug!("Loaded environment from {}", path.display()),
                Err(dotenvy::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                    log::debug!("No env file at {}", path.display());
                }
                Err(e) => {
                    return Err(ConfigError::EnvFile {
                        path: path.to_path_buf(),
                        message: e.to_string(),
                    })
                }
            }
        }

        Self::from_lookup(test_dir, |key| std::env::var(key).ok())
    }
}

impl fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunConfig")
            .field("base_api_url", &self.base_api_url)
            .field("test_user", &self.test_user)
            .field("test_password", &"***")
            .field("project_name", &self.project_name)
            .field("environment_name", &self.environment_name)
            .field("test_cycle", &self.test_cycle)
            .field("test_dir", &self.test_dir)
            .finish()
    }
}

/// Engine tunables
#[derive(Debug, Clone)]
pub struct Config {
    /// Glob matched against file names during discovery
    pub pattern: String,

    /// Only run cases carrying one of these tags (empty = all)
    pub tags: Vec<String>,

    /// Units executing at the same time
    pub concurrency: usize,

    /// Upper bound for a single unit
    pub unit_timeout: Duration,

    /// Upper bound for the whole run (None = unbounded)
    pub run_timeout: Option<Duration>,

    /// Session handshake attempts for transient network failures
    pub session_attempts: u32,

    /// First backoff delay between session attempts, doubled each time (ms)
    pub session_backoff_ms: u64,

    /// Timeout of a single HTTP request (ms)
    pub request_timeout_ms: u64,

    /// Custom authentication endpoint; `/login` then `/authenticate` when unset
    pub auth_endpoint: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pattern: "test_*.y*ml".to_string(),
            tags: Vec::new(),
            concurrency: 1,
            unit_timeout: Duration::from_secs(60),
            run_timeout: None,
            session_attempts: 3,
            session_backoff_ms: 500,
            request_timeout_ms: 10_000,
            auth_endpoint: None,
        }
    }
}
