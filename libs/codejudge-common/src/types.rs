use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Placeholder written over hidden test case content in reports
pub const REDACTED: &str = "[hidden]";

/// Strongly-typed language enum
/// Every variant must have a toolchain in codejudge-core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Java,
    Python,
    Rust,
}

impl Language {
    /// Returns all language variants
    /// This is the single source of truth for available languages
    pub fn all_variants() -> &'static [Language] {
        &[Language::Java, Language::Python, Language::Rust]
    }
}

impl FromStr for Language {
    type Err = String;

    /// Case-insensitive parse
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "java" => Ok(Language::Java),
            "python" => Ok(Language::Python),
            "rust" => Ok(Language::Rust),
            other => Err(format!("Unsupported language: {}", other)),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::Java => write!(f, "java"),
            Language::Python => write!(f, "python"),
            Language::Rust => write!(f, "rust"),
        }
    }
}

/// Whether the learner may see a test case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Sample,
    Hidden,
}

/// Test Case Definition (Immutable Input)
/// Owned by the problem store - the judge never mutates them.
/// `declaration_order` decides report ordering, not `id` and not
/// completion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub id: u32,
    pub declaration_order: u32,
    pub input: String,
    pub expected_output: String,
    pub visibility: Visibility,
}

impl TestCase {
    pub fn is_sample(&self) -> bool {
        self.visibility == Visibility::Sample
    }
}

/// Submission (Immutable)
/// One learner's source plus the test cases it is judged against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub language: Language,
    pub source_code: String,
    pub test_cases: Vec<TestCase>,
}

impl Submission {
    pub fn new(language: Language, source_code: impl Into<String>, test_cases: Vec<TestCase>) -> Self {
        Self {
            id: Uuid::new_v4(),
            language,
            source_code: source_code.into(),
            test_cases,
        }
    }

    /// The designated sample: first `Sample` test case in declaration order
    pub fn sample(&self) -> Option<&TestCase> {
        self.test_cases
            .iter()
            .filter(|tc| tc.is_sample())
            .min_by_key(|tc| tc.declaration_order)
    }
}

/// Raw output of one process run
/// Produced by an execution engine, consumed immediately by the evaluator.
/// Classification is not the engine's job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub timed_out: bool,
    /// Either stream hit the capture cap
    #[serde(default)]
    pub truncated: bool,
    pub execution_time_ms: u64,
}

/// Per-Test Verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Passed,
    Failed,
    RuntimeError,
    CompileError,
    Timeout,
    InternalError,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionStatus::Passed => "passed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::RuntimeError => "runtime_error",
            ExecutionStatus::CompileError => "compile_error",
            ExecutionStatus::Timeout => "timeout",
            ExecutionStatus::InternalError => "internal_error",
        };
        f.write_str(s)
    }
}

/// Submission-level verdict
///
/// ## Precedence
/// CompileError > InternalError > Failed > Accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Accepted,
    Failed,
    CompileError,
    InternalError,
}

/// Per-Test Result as seen by the caller
/// `input` and `expected` are redacted for hidden test cases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub test_id: u32,
    pub declaration_order: u32,
    pub visibility: Visibility,
    pub input: String,
    pub expected: String,
    pub actual: String,
    pub status: ExecutionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<String>,
    #[serde(default)]
    pub truncated: bool,
    pub execution_time_ms: u64,
}

/// Aggregated verdict for one submission
/// `outcomes` are always in declaration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionReport {
    pub submission_id: Uuid,
    pub overall_status: OverallStatus,
    pub passed_count: u32,
    pub total_count: u32,
    pub outcomes: Vec<TestOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Interactive "run" result for the sample test case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleResult {
    pub input: String,
    pub expected: String,
    pub actual: String,
    pub status: ExecutionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<String>,
}

/// Response of the "run" action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleRunResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<SampleResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SampleRunResponse {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }
}
