/// Verdict Evaluator - Language-Agnostic Classification
///
/// **Core Responsibility:**
/// Classify each raw run and compare its output with the expected output.
///
/// **Critical Properties:**
/// - Knows nothing about processes, containers or workspaces
/// - Pure functions: (run result, test case) → outcome
///
/// **Classification Rules (priority order):**
/// 1. timed out → Timeout
/// 2. non-zero exit → RuntimeError
/// 3. normalized stdout == normalized expected → Passed
/// 4. otherwise → Failed
///
/// Normalization trims trailing whitespace and newlines only.
///
/// **Redaction:**
/// Hidden test cases never leave the judge with their input or expected
/// output; `actual` and `status` are kept.

use codejudge_common::{
    ExecutionStatus, OverallStatus, RunResult, SubmissionReport, TestCase, TestOutcome,
    Visibility, REDACTED,
};
use uuid::Uuid;

pub fn normalize(output: &str) -> &str {
    output.trim_end()
}

pub fn classify(run: &RunResult, expected_output: &str) -> ExecutionStatus {
    if run.timed_out {
        ExecutionStatus::Timeout
    } else if run.exit_code != 0 {
        ExecutionStatus::RuntimeError
    } else if normalize(&run.stdout) == normalize(expected_output) {
        ExecutionStatus::Passed
    } else {
        ExecutionStatus::Failed
    }
}

/// Build an outcome for `test_case`, redacting hidden content
pub fn outcome(
    test_case: &TestCase,
    actual: String,
    status: ExecutionStatus,
    diagnostics: Option<String>,
) -> TestOutcome {
    let (input, expected) = match test_case.visibility {
        Visibility::Sample => (test_case.input.clone(), test_case.expected_output.clone()),
        Visibility::Hidden => (REDACTED.to_string(), REDACTED.to_string()),
    };

    TestOutcome {
        test_id: test_case.id,
        declaration_order: test_case.declaration_order,
        visibility: test_case.visibility,
        input,
        expected,
        actual,
        status,
        diagnostics,
        truncated: false,
        execution_time_ms: 0,
    }
}

/// Judge one run against its test case
pub fn evaluate(run: RunResult, test_case: &TestCase) -> TestOutcome {
    let status = classify(&run, &test_case.expected_output);

    match status {
        ExecutionStatus::Passed => {
            tracing::debug!(test_id = test_case.id, "Output matched");
        }
        ExecutionStatus::Failed => {
            tracing::debug!(test_id = test_case.id, "Output mismatch");
        }
        ExecutionStatus::Timeout => {
            tracing::warn!(
                test_id = test_case.id,
                execution_time_ms = run.execution_time_ms,
                "Execution timed out; test cannot pass"
            );
        }
        _ => {
            tracing::warn!(
                test_id = test_case.id,
                exit_code = run.exit_code,
                "Execution failed with runtime error; test cannot pass"
            );
        }
    }

    let diagnostics = match status {
        ExecutionStatus::RuntimeError | ExecutionStatus::Timeout if !run.stderr.trim().is_empty() => {
            Some(run.stderr.trim_end().to_string())
        }
        _ => None,
    };

    let mut result = outcome(test_case, normalize(&run.stdout).to_string(), status, diagnostics);
    result.truncated = run.truncated;
    result.execution_time_ms = run.execution_time_ms;
    result
}

/// Every requested test case stamped CompileError, Runner never involved
pub fn compile_error_outcomes(test_cases: &[&TestCase], diagnostics: &str) -> Vec<TestOutcome> {
    test_cases
        .iter()
        .map(|tc| {
            outcome(
                tc,
                String::new(),
                ExecutionStatus::CompileError,
                Some(diagnostics.to_string()),
            )
        })
        .collect()
}

pub fn internal_error_outcome(test_case: &TestCase, message: &str) -> TestOutcome {
    outcome(
        test_case,
        String::new(),
        ExecutionStatus::InternalError,
        Some(message.to_string()),
    )
}

/// Submission-level verdict
///
/// CompileError > InternalError > Failed > Accepted. An empty submission is
/// not Accepted.
pub fn overall_status(outcomes: &[TestOutcome]) -> OverallStatus {
    let any = |status: ExecutionStatus| outcomes.iter().any(|o| o.status == status);

    if any(ExecutionStatus::CompileError) {
        OverallStatus::CompileError
    } else if any(ExecutionStatus::InternalError) {
        OverallStatus::InternalError
    } else if !outcomes.is_empty() && outcomes.iter().all(|o| o.status == ExecutionStatus::Passed) {
        OverallStatus::Accepted
    } else {
        OverallStatus::Failed
    }
}

/// Assemble the report, ordering outcomes by declaration order
pub fn aggregate(submission_id: Uuid, mut outcomes: Vec<TestOutcome>) -> SubmissionReport {
    outcomes.sort_by_key(|o| o.declaration_order);

    let passed_count = outcomes
        .iter()
        .filter(|o| o.status == ExecutionStatus::Passed)
        .count() as u32;
    let overall_status = overall_status(&outcomes);

    tracing::info!(
        submission_id = %submission_id,
        passed = passed_count,
        total = outcomes.len(),
        status = ?overall_status,
        "Evaluation complete"
    );

    SubmissionReport {
        submission_id,
        overall_status,
        passed_count,
        total_count: outcomes.len() as u32,
        outcomes,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case(id: u32, expected: &str, visibility: Visibility) -> TestCase {
        TestCase {
            id,
            declaration_order: id,
            input: format!("input {}", id),
            expected_output: expected.to_string(),
            visibility,
        }
    }

    fn ran(stdout: &str, exit_code: i32, timed_out: bool) -> RunResult {
        RunResult {
            stdout: stdout.to_string(),
            exit_code,
            timed_out,
            ..Default::default()
        }
    }

    #[test]
    fn test_sum_scenario_passes() {
        let tc = TestCase {
            id: 1,
            declaration_order: 0,
            input: "2 3".to_string(),
            expected_output: "5".to_string(),
            visibility: Visibility::Sample,
        };

        let out = evaluate(ran("5\n", 0, false), &tc);

        assert_eq!(out.status, ExecutionStatus::Passed);
        assert_eq!(out.actual, "5");
        assert_eq!(out.input, "2 3");
        assert_eq!(out.expected, "5");
    }

    #[test]
    fn test_trailing_whitespace_is_ignored() {
        let tc = case(1, "hello\n\n", Visibility::Sample);
        assert_eq!(evaluate(ran("hello  \t\n", 0, false), &tc).status, ExecutionStatus::Passed);
    }

    #[test]
    fn test_leading_whitespace_is_significant() {
        let tc = case(1, "hello", Visibility::Sample);
        assert_eq!(evaluate(ran("  hello", 0, false), &tc).status, ExecutionStatus::Failed);
    }

    #[test]
    fn test_inner_lines_must_match_exactly() {
        let tc = case(1, "1\n2\n3", Visibility::Sample);
        assert_eq!(classify(&ran("1\n2\n3\n", 0, false), &tc.expected_output), ExecutionStatus::Passed);
        assert_eq!(classify(&ran("1\n2 \n3\n", 0, false), &tc.expected_output), ExecutionStatus::Failed);
    }

    #[test]
    fn test_mismatch_is_failed() {
        let tc = case(1, "6", Visibility::Sample);
        let out = evaluate(ran("5\n", 0, false), &tc);
        assert_eq!(out.status, ExecutionStatus::Failed);
        assert_eq!(out.diagnostics, None);
    }

    #[test]
    fn test_timeout_beats_everything() {
        // Even matching output does not pass once the deadline fired
        let tc = case(1, "5", Visibility::Sample);
        assert_eq!(classify(&ran("5", 137, true), &tc.expected_output), ExecutionStatus::Timeout);
    }

    #[test]
    fn test_nonzero_exit_is_runtime_error() {
        let tc = case(1, "0", Visibility::Sample);
        let mut run = ran("0\n", 1, false);
        run.stderr = "Exception in thread \"main\" java.lang.ArithmeticException: / by zero\n".to_string();

        let out = evaluate(run, &tc);

        assert_eq!(out.status, ExecutionStatus::RuntimeError);
        assert!(out.diagnostics.unwrap().contains("ArithmeticException"));
    }

    #[test]
    fn test_hidden_case_is_redacted() {
        let tc = case(7, "secret", Visibility::Hidden);
        let out = evaluate(ran("wrong\n", 0, false), &tc);

        assert_eq!(out.input, REDACTED);
        assert_eq!(out.expected, REDACTED);
        assert_eq!(out.actual, "wrong");
        assert_eq!(out.status, ExecutionStatus::Failed);
        assert_eq!(out.visibility, Visibility::Hidden);
    }

    #[test]
    fn test_run_metadata_is_carried() {
        let tc = case(1, "x", Visibility::Sample);
        let mut run = ran("x", 0, false);
        run.truncated = true;
        run.execution_time_ms = 42;

        let out = evaluate(run, &tc);
        assert!(out.truncated);
        assert_eq!(out.execution_time_ms, 42);
    }

    #[test]
    fn test_compile_error_outcomes_keep_redaction() {
        let sample = case(1, "a", Visibility::Sample);
        let hidden = case(2, "b", Visibility::Hidden);

        let outs = compile_error_outcomes(&[&sample, &hidden], "Main.java:1: error");

        assert_eq!(outs.len(), 2);
        assert!(outs.iter().all(|o| o.status == ExecutionStatus::CompileError));
        assert_eq!(outs[0].diagnostics.as_deref(), Some("Main.java:1: error"));
        assert_eq!(outs[0].input, "input 1");
        assert_eq!(outs[1].input, REDACTED);
    }

    #[test]
    fn test_overall_status_precedence() {
        let tc = case(1, "x", Visibility::Sample);
        let passed = outcome(&tc, "x".into(), ExecutionStatus::Passed, None);
        let failed = outcome(&tc, "y".into(), ExecutionStatus::Failed, None);
        let internal = internal_error_outcome(&tc, "spawn failed");
        let compile = outcome(&tc, String::new(), ExecutionStatus::CompileError, None);

        assert_eq!(overall_status(&[passed.clone(), passed.clone()]), OverallStatus::Accepted);
        assert_eq!(overall_status(&[passed.clone(), failed.clone()]), OverallStatus::Failed);
        assert_eq!(overall_status(&[failed.clone(), internal.clone()]), OverallStatus::InternalError);
        assert_eq!(overall_status(&[internal, compile]), OverallStatus::CompileError);
        assert_eq!(overall_status(&[]), OverallStatus::Failed);
    }

    #[test]
    fn test_aggregate_orders_by_declaration() {
        let mut first = case(10, "a", Visibility::Sample);
        first.declaration_order = 0;
        let mut second = case(3, "b", Visibility::Hidden);
        second.declaration_order = 1;
        let mut third = case(7, "c", Visibility::Hidden);
        third.declaration_order = 2;

        let outcomes = vec![
            evaluate(ran("c", 0, false), &third),
            evaluate(ran("a", 0, false), &first),
            evaluate(ran("x", 0, false), &second),
        ];

        let report = aggregate(Uuid::new_v4(), outcomes);

        let ids: Vec<u32> = report.outcomes.iter().map(|o| o.test_id).collect();
        assert_eq!(ids, vec![10, 3, 7]);
        assert_eq!(report.passed_count, 2);
        assert_eq!(report.total_count, 3);
        assert_eq!(report.overall_status, OverallStatus::Failed);
    }
}
