pub mod error;
pub mod parser;
pub mod report;
pub mod runner;
pub mod utils;

// Re-export common items
pub use error::{ConfigError, DiscoveryError, PipelineError, RenderError, SessionError};
pub use report::{generate_report, ReportFormat, ReportRenderer};
pub use runner::{Pipeline, RunReport, RunSummary, TestBody, TestUnit};
pub use utils::config::{Config, RunConfig};
