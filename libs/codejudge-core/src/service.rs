/// Judge Service - Calling-Layer Facade
///
/// Problem id + language + source in; a sample response or a full report
/// out. Every call is a new submission with its own id.

use crate::engine::ExecutionEngine;
use crate::error::{JudgeError, Result};
use crate::executor::Orchestrator;
use crate::problem::ProblemRepository;
use codejudge_common::{
    Config, ExecutionStatus, Language, OverallStatus, SampleResult, SampleRunResponse,
    Submission, SubmissionReport,
};
use std::sync::Arc;
use uuid::Uuid;

pub struct JudgeService<E: ExecutionEngine + ?Sized, R: ProblemRepository> {
    orchestrator: Orchestrator<E>,
    problems: R,
}

impl<E: ExecutionEngine + ?Sized + 'static, R: ProblemRepository> JudgeService<E, R> {
    pub fn new(engine: Arc<E>, problems: R, config: Config) -> Result<Self> {
        Ok(Self {
            orchestrator: Orchestrator::new(engine, config)?,
            problems,
        })
    }

    /// Run the problem's sample test case only
    pub async fn run_sample(
        &self,
        problem_id: &str,
        language: Language,
        source_code: &str,
    ) -> SampleRunResponse {
        let submission = match self.submission(problem_id, language, source_code).await {
            Ok(submission) => submission,
            Err(e) => return SampleRunResponse::failure(e.to_string()),
        };

        if submission.sample().is_none() {
            tracing::warn!(problem_id, "Problem has no sample test case");
            return SampleRunResponse::failure(JudgeError::NoSampleTestCase.to_string());
        }

        let report = self.orchestrator.run_sample(&submission).await;
        sample_response(report)
    }

    /// Judge the source against every test case of the problem
    pub async fn run_all(
        &self,
        problem_id: &str,
        language: Language,
        source_code: &str,
    ) -> SubmissionReport {
        match self.submission(problem_id, language, source_code).await {
            Ok(submission) => self.orchestrator.run_all(&submission).await,
            Err(e) => {
                tracing::error!(problem_id, error = %e, "Could not load problem");
                SubmissionReport {
                    submission_id: Uuid::new_v4(),
                    overall_status: OverallStatus::InternalError,
                    passed_count: 0,
                    total_count: 0,
                    outcomes: Vec::new(),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn submission(
        &self,
        problem_id: &str,
        language: Language,
        source_code: &str,
    ) -> Result<Submission> {
        let test_cases = self.problems.test_cases(problem_id).await?;
        Ok(Submission::new(language, source_code, test_cases))
    }
}

fn sample_response(report: SubmissionReport) -> SampleRunResponse {
    let Some(outcome) = report.outcomes.into_iter().next() else {
        return SampleRunResponse::failure(
            report
                .error
                .unwrap_or_else(|| JudgeError::NoSampleTestCase.to_string()),
        );
    };

    let success = outcome.status != ExecutionStatus::InternalError
        && report.overall_status != OverallStatus::InternalError;
    let error = if success {
        None
    } else {
        report.error.or_else(|| outcome.diagnostics.clone())
    };

    SampleRunResponse {
        success,
        result: Some(SampleResult {
            input: outcome.input,
            expected: outcome.expected,
            actual: outcome.actual,
            status: outcome.status,
            diagnostics: outcome.diagnostics,
        }),
        error,
    }
}
