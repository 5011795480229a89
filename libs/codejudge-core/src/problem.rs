/// Problem Repository - Where Test Cases Come From
///
/// **Core Responsibility:**
/// Hand the judge the ordered test cases of a problem. The judge only reads.
///
/// - `JsonProblemRepository`: one `<id>.json` file per problem
/// - `InMemoryProblemRepository`: embedding and tests

use crate::error::{JudgeError, Result};
use async_trait::async_trait;
use codejudge_common::{TestCase, Visibility};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

#[async_trait]
pub trait ProblemRepository: Send + Sync {
    /// Test cases of `problem_id`, in declaration order
    async fn test_cases(&self, problem_id: &str) -> Result<Vec<TestCase>>;
}

/// On-disk problem definition
#[derive(Debug, Deserialize)]
pub struct ProblemFile {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub test_cases: Vec<TestCaseEntry>,
}

/// Test case as written in a problem file; order defaults to position
#[derive(Debug, Deserialize)]
pub struct TestCaseEntry {
    pub id: u32,
    #[serde(default)]
    pub declaration_order: Option<u32>,
    pub input: String,
    pub expected_output: String,
    #[serde(default = "default_visibility")]
    pub visibility: Visibility,
}

fn default_visibility() -> Visibility {
    Visibility::Hidden
}

impl ProblemFile {
    pub fn into_test_cases(self) -> Vec<TestCase> {
        let mut cases: Vec<TestCase> = self
            .test_cases
            .into_iter()
            .enumerate()
            .map(|(position, entry)| TestCase {
                id: entry.id,
                declaration_order: entry.declaration_order.unwrap_or(position as u32),
                input: entry.input,
                expected_output: entry.expected_output,
                visibility: entry.visibility,
            })
            .collect();
        cases.sort_by_key(|tc| tc.declaration_order);
        cases
    }
}

/// Reads `<dir>/<problem_id>.json`
#[derive(Debug, Clone)]
pub struct JsonProblemRepository {
    dir: PathBuf,
}

impl JsonProblemRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, problem_id: &str) -> Result<PathBuf> {
        // Ids become file names; refuse anything that could leave `dir`
        let valid = !problem_id.is_empty()
            && problem_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(JudgeError::ProblemNotFound(problem_id.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", problem_id)))
    }
}

#[async_trait]
impl ProblemRepository for JsonProblemRepository {
    async fn test_cases(&self, problem_id: &str) -> Result<Vec<TestCase>> {
        let path = self.path_for(problem_id)?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(JudgeError::ProblemNotFound(problem_id.to_string()));
            }
            Err(e) => return Err(JudgeError::Io(e)),
        };

        let problem: ProblemFile =
            serde_json::from_str(&content).map_err(|e| JudgeError::InvalidProblem {
                problem: problem_id.to_string(),
                reason: e.to_string(),
            })?;

        tracing::debug!(
            problem_id,
            title = problem.title.as_deref().unwrap_or(""),
            test_count = problem.test_cases.len(),
            "Loaded problem"
        );

        Ok(problem.into_test_cases())
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryProblemRepository {
    problems: HashMap<String, Vec<TestCase>>,
}

impl InMemoryProblemRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, problem_id: impl Into<String>, mut test_cases: Vec<TestCase>) {
        test_cases.sort_by_key(|tc| tc.declaration_order);
        self.problems.insert(problem_id.into(), test_cases);
    }
}

#[async_trait]
impl ProblemRepository for InMemoryProblemRepository {
    async fn test_cases(&self, problem_id: &str) -> Result<Vec<TestCase>> {
        self.problems
            .get(problem_id)
            .cloned()
            .ok_or_else(|| JudgeError::ProblemNotFound(problem_id.to_string()))
    }
}
