//! Error taxonomy for a test run.
//!
//! Run-fatal errors (`ConfigError`, `DiscoveryError`, `SessionError`) abort
//! the pipeline before any unit executes. `RenderError` happens after the run
//! and is reported next to the finished summary instead of replacing it.
//! Per-unit problems never show up here; they are folded into
//! [`crate::runner::state::OutcomeStatus`].

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Failed to load env file {path}: {message}")]
    EnvFile { path: PathBuf, message: String },
}

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Test directory '{0}' not found")]
    NotFound(PathBuf),

    #[error("'{0}' is not a directory")]
    NotADirectory(PathBuf),

    #[error("Test directory '{path}' is not readable: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid test file pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Authentication rejected by {url} (status {status}): {message}")]
    Auth {
        url: String,
        status: u16,
        message: String,
    },

    #[error("Could not reach {url}: {message}")]
    Network { url: String, message: String },

    #[error("Session was opened for {bound} and cannot be reused for {requested}")]
    CredentialMismatch { bound: String, requested: String },

    #[error("Session is closed")]
    Closed,
}

impl SessionError {
    /// Only transport-level failures are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, SessionError::Network { .. })
    }
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Failed to encode {format} report: {message}")]
    Encode {
        format: &'static str,
        message: String,
    },

    #[error("Failed to write report to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A run-fatal error labelled with the pipeline stage that produced it.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("[config] {0}")]
    Config(#[from] ConfigError),

    #[error("[discovery] {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("[session] {0}")]
    Session(#[from] SessionError),
}

impl PipelineError {
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::Config(_) => "config",
            PipelineError::Discovery(_) => "discovery",
            PipelineError::Session(_) => "session",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_network_errors_are_transient() {
        let network = SessionError::Network {
            url: "http://localhost/login".to_string(),
            message: "connection refused".to_string(),
        };
        let auth = SessionError::Auth {
            url: "http://localhost/login".to_string(),
            status: 401,
            message: "bad password".to_string(),
        };
        assert!(network.is_transient());
        assert!(!auth.is_transient());
        assert!(!SessionError::Closed.is_transient());
    }

    #[test]
    fn test_pipeline_error_carries_stage_label() {
        let err: PipelineError = DiscoveryError::NotFound(PathBuf::from("missing")).into();
        assert_eq!(err.stage(), "discovery");
        assert_eq!(err.to_string(), "[discovery] Test directory 'missing' not found");
    }
}
