/// Orchestrator - Per-Submission Pipeline
///
/// **Responsibility:**
/// Acquire workspace → compile once → run + evaluate each requested test
/// case → aggregate in declaration order → release workspace.
///
/// **Guarantees:**
/// - Never returns an error: every fault ends up as an `InternalError`
///   report, and the workspace is released on every path (explicitly on the
///   normal path, by `Drop` if the future is cancelled)
/// - A failed compile stamps every requested test case `CompileError` and
///   the engine's `run` is never called
/// - One run failing (runtime error, timeout, even a panic inside the engine)
///   does not stop its siblings unless `fail_fast` is set
///
/// This module is the glue layer - it knows nothing about:
/// - How code executes (engine's job)
/// - How outputs are judged (evaluator's job)

use crate::engine::{Artifact, CompileOutcome, ExecutionEngine};
use crate::error::{JudgeError, Result};
use crate::evaluator;
use crate::toolchain::toolchain;
use crate::workspace::{Workspace, WorkspaceManager};
use codejudge_common::{
    Config, ExecutionStatus, OverallStatus, Submission, SubmissionReport, TestCase, TestOutcome,
};
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

pub const FAIL_FAST_SKIP: &str = "skipped: fail-fast";

pub struct Orchestrator<E: ExecutionEngine + ?Sized> {
    engine: Arc<E>,
    workspaces: WorkspaceManager,
    config: Config,
}

impl<E: ExecutionEngine + ?Sized + 'static> Orchestrator<E> {
    pub fn new(engine: Arc<E>, config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            engine,
            workspaces: WorkspaceManager::new(config.workspace_root.clone()),
            config,
        })
    }

    /// Interactive "run": only the designated sample test case
    pub async fn run_sample(&self, submission: &Submission) -> SubmissionReport {
        match submission.sample() {
            Some(sample) => self.judge(submission, vec![sample.clone()]).await,
            None => failure_report(submission.id, &[], &JudgeError::NoSampleTestCase),
        }
    }

    /// Authoritative "submit": every test case
    pub async fn run_all(&self, submission: &Submission) -> SubmissionReport {
        self.judge(submission, submission.test_cases.clone()).await
    }

    async fn judge(&self, submission: &Submission, mut cases: Vec<TestCase>) -> SubmissionReport {
        let start = Instant::now();
        cases.sort_by_key(|tc| tc.declaration_order);

        tracing::info!(
            submission_id = %submission.id,
            language = %submission.language,
            test_count = cases.len(),
            engine = self.engine.name(),
            workspace_root = %self.workspaces.root().display(),
            "Starting submission"
        );

        let workspace = match self
            .workspaces
            .acquire(
                submission.id,
                toolchain(submission.language).source_file,
                &submission.source_code,
            )
            .await
        {
            Ok(ws) => ws,
            Err(e) => {
                tracing::error!(submission_id = %submission.id, error = %e, "Workspace allocation failed");
                return failure_report(submission.id, &cases, &e);
            }
        };

        let mut report = self.judge_in(&workspace, submission, &cases).await;

        if let Err(e) = workspace.release().await {
            tracing::error!(submission_id = %submission.id, error = %e, "Workspace cleanup failed");
            report.overall_status = OverallStatus::InternalError;
            report.error = Some(e.to_string());
        }

        tracing::info!(
            submission_id = %submission.id,
            status = ?report.overall_status,
            passed = report.passed_count,
            total = report.total_count,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Submission finished"
        );

        report
    }

    async fn judge_in(
        &self,
        workspace: &Workspace,
        submission: &Submission,
        cases: &[TestCase],
    ) -> SubmissionReport {
        let compiled = self
            .engine
            .compile(workspace, submission.language, self.config.compile_timeout())
            .await;

        let artifact = match compiled {
            Ok(CompileOutcome::Compiled(artifact)) => {
                tracing::info!(submission_id = %submission.id, "Compilation succeeded");
                artifact
            }
            Ok(CompileOutcome::Failed {
                diagnostics,
                timed_out,
            }) => {
                tracing::info!(
                    submission_id = %submission.id,
                    timed_out,
                    "Compilation failed; all tests marked compile_error"
                );
                let requested: Vec<&TestCase> = cases.iter().collect();
                return evaluator::aggregate(
                    submission.id,
                    evaluator::compile_error_outcomes(&requested, &diagnostics),
                );
            }
            Err(e) => {
                tracing::error!(submission_id = %submission.id, error = %e, "Compiler could not run");
                return failure_report(submission.id, cases, &e);
            }
        };

        let outcomes = if self.config.max_parallel_tests <= 1 {
            self.run_sequential(&artifact, cases).await
        } else {
            self.run_parallel(Arc::new(artifact), cases).await
        };

        let mut report = evaluator::aggregate(submission.id, outcomes);
        if report.overall_status == OverallStatus::InternalError {
            report.error = report
                .outcomes
                .iter()
                .find(|o| o.status == ExecutionStatus::InternalError)
                .and_then(|o| o.diagnostics.clone());
        }
        report
    }

    async fn run_sequential(&self, artifact: &Artifact, cases: &[TestCase]) -> Vec<TestOutcome> {
        let mut outcomes = Vec::with_capacity(cases.len());
        let mut halted = false;

        for tc in cases {
            if halted {
                outcomes.push(skipped(tc));
                continue;
            }

            let outcome = run_one(self.engine.as_ref(), artifact, tc, self.config.run_timeout()).await;
            if self.config.fail_fast && outcome.status != ExecutionStatus::Passed {
                tracing::warn!(test_id = tc.id, status = %outcome.status, "Fail-fast: skipping remaining tests");
                halted = true;
            }
            outcomes.push(outcome);
        }

        outcomes
    }

    /// Bounded worker pool; each run still gets its own process and buffers
    async fn run_parallel(&self, artifact: Arc<Artifact>, cases: &[TestCase]) -> Vec<TestOutcome> {
        let permits = Arc::new(Semaphore::new(self.config.max_parallel_tests));
        let halted = Arc::new(AtomicBool::new(false));
        let fail_fast = self.config.fail_fast;
        let deadline = self.config.run_timeout();

        let mut tasks = JoinSet::new();
        for (index, tc) in cases.iter().cloned().enumerate() {
            let engine = Arc::clone(&self.engine);
            let artifact = Arc::clone(&artifact);
            let permits = Arc::clone(&permits);
            let halted = Arc::clone(&halted);

            tasks.spawn(async move {
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return (index, evaluator::internal_error_outcome(&tc, "worker pool closed")),
                };
                if fail_fast && halted.load(Ordering::SeqCst) {
                    return (index, skipped(&tc));
                }

                let outcome = run_one(engine.as_ref(), &artifact, &tc, deadline).await;
                if fail_fast && outcome.status != ExecutionStatus::Passed {
                    halted.store(true, Ordering::SeqCst);
                }
                (index, outcome)
            });
        }

        let mut slots: Vec<Option<TestOutcome>> = vec![None; cases.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => slots[index] = Some(outcome),
                Err(e) => tracing::error!(error = %e, "Test task failed to join"),
            }
        }

        slots
            .into_iter()
            .zip(cases)
            .map(|(slot, tc)| {
                slot.unwrap_or_else(|| evaluator::internal_error_outcome(tc, "test task aborted"))
            })
            .collect()
    }
}

/// Run and evaluate one test case; engine faults and panics become InternalError
async fn run_one<E: ExecutionEngine + ?Sized>(
    engine: &E,
    artifact: &Artifact,
    tc: &TestCase,
    deadline: Duration,
) -> TestOutcome {
    let run = AssertUnwindSafe(engine.run(artifact, &tc.input, deadline))
        .catch_unwind()
        .await;

    let outcome = match run {
        Ok(Ok(result)) => evaluator::evaluate(result, tc),
        Ok(Err(e)) => {
            tracing::error!(test_id = tc.id, error = %e, "Run failed inside the engine");
            evaluator::internal_error_outcome(tc, &e.to_string())
        }
        Err(_) => {
            tracing::error!(test_id = tc.id, "Engine panicked during run");
            evaluator::internal_error_outcome(tc, "engine panicked during run")
        }
    };

    tracing::debug!(test_id = tc.id, status = %outcome.status, "Test evaluated");
    outcome
}

fn skipped(tc: &TestCase) -> TestOutcome {
    evaluator::outcome(
        tc,
        String::new(),
        ExecutionStatus::Failed,
        Some(FAIL_FAST_SKIP.to_string()),
    )
}

/// Whole-submission failure: every requested case InternalError
fn failure_report(submission_id: Uuid, cases: &[TestCase], error: &JudgeError) -> SubmissionReport {
    let message = error.to_string();
    let outcomes = cases
        .iter()
        .map(|tc| evaluator::internal_error_outcome(tc, &message))
        .collect();

    let mut report = evaluator::aggregate(submission_id, outcomes);
    report.overall_status = OverallStatus::InternalError;
    report.error = Some(message);
    report
}
