pub mod config;
pub mod types;

// Re-export commonly used types for convenience
pub use config::{BackendKind, Config, ConfigError};
pub use types::{
    ExecutionStatus, Language, OverallStatus, RunResult, SampleResult, SampleRunResponse,
    Submission, SubmissionReport, TestCase, TestOutcome, Visibility, REDACTED,
};
