//! End-to-end judging with the local toolchain.
//!
//! These need `python3` on PATH and are skipped when it is missing.

use codejudge_common::{
    Config, ExecutionStatus, Language, OverallStatus, Submission, TestCase, Visibility, REDACTED,
};
use codejudge_core::{JsonProblemRepository, JudgeService, LocalEngine, Orchestrator};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

const SUM: &str = "a, b = map(int, input().split())\nprint(a + b)\n";
const DIVIDE: &str = "a, b = map(int, input().split())\nprint(a // b)\n";
const SPIN: &str = "while True:\n    pass\n";
const BROKEN: &str = "def main(:\n    print(1)\n";

fn python_available() -> bool {
    std::process::Command::new("python3")
        .arg("--version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

macro_rules! require_python {
    () => {
        if !python_available() {
            eprintln!("python3 not found, skipping");
            return;
        }
    };
}

fn config(root: &Path) -> Config {
    let mut config = Config::default();
    config.workspace_root = root.to_path_buf();
    config
}

fn orchestrator(config: Config) -> Orchestrator<LocalEngine> {
    let engine = Arc::new(LocalEngine::from_config(&config));
    Orchestrator::new(engine, config).unwrap()
}

fn case(id: u32, input: &str, expected: &str, visibility: Visibility) -> TestCase {
    TestCase {
        id,
        declaration_order: id,
        input: input.to_string(),
        expected_output: expected.to_string(),
        visibility,
    }
}

fn leftover_workspaces(root: &Path) -> usize {
    std::fs::read_dir(root).map(|d| d.count()).unwrap_or(0)
}

#[tokio::test]
async fn test_sum_is_accepted() {
    require_python!();
    let root = tempfile::tempdir().unwrap();
    let orch = orchestrator(config(root.path()));
    let submission = Submission::new(
        Language::Python,
        SUM,
        vec![
            case(1, "2 3", "5", Visibility::Sample),
            case(2, "10 -4", "6", Visibility::Hidden),
        ],
    );

    let report = orch.run_all(&submission).await;

    assert_eq!(report.overall_status, OverallStatus::Accepted);
    assert_eq!(report.passed_count, 2);
    assert_eq!(report.outcomes[0].actual, "5");
    assert_eq!(report.outcomes[1].input, REDACTED);
    assert_eq!(leftover_workspaces(root.path()), 0);
}

#[tokio::test]
async fn test_runtime_error_does_not_stop_siblings() {
    require_python!();
    let root = tempfile::tempdir().unwrap();
    let orch = orchestrator(config(root.path()));
    let submission = Submission::new(
        Language::Python,
        DIVIDE,
        vec![
            case(1, "6 3", "2", Visibility::Sample),
            case(2, "1 0", "0", Visibility::Hidden),
            case(3, "9 3", "3", Visibility::Hidden),
        ],
    );

    let report = orch.run_all(&submission).await;

    assert_eq!(report.overall_status, OverallStatus::Failed);
    assert_eq!(report.outcomes[0].status, ExecutionStatus::Passed);
    assert_eq!(report.outcomes[1].status, ExecutionStatus::RuntimeError);
    assert!(report.outcomes[1]
        .diagnostics
        .as_deref()
        .unwrap_or_default()
        .contains("ZeroDivisionError"));
    assert_eq!(report.outcomes[2].status, ExecutionStatus::Passed);
    assert_eq!(report.passed_count, 2);
}

#[tokio::test]
async fn test_infinite_loop_times_out() {
    require_python!();
    let root = tempfile::tempdir().unwrap();
    let orch = orchestrator(config(root.path()));
    let submission = Submission::new(
        Language::Python,
        SPIN,
        vec![case(1, "", "", Visibility::Sample)],
    );

    let start = Instant::now();
    let report = orch.run_sample(&submission).await;

    assert_eq!(report.outcomes[0].status, ExecutionStatus::Timeout);
    assert!(report.outcomes[0].execution_time_ms < 2500);
    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(leftover_workspaces(root.path()), 0);
}

#[tokio::test]
async fn test_syntax_error_is_compile_error() {
    require_python!();
    let root = tempfile::tempdir().unwrap();
    let orch = orchestrator(config(root.path()));
    let submission = Submission::new(
        Language::Python,
        BROKEN,
        vec![
            case(1, "1", "1", Visibility::Sample),
            case(2, "2", "2", Visibility::Hidden),
        ],
    );

    let report = orch.run_all(&submission).await;

    assert_eq!(report.overall_status, OverallStatus::CompileError);
    assert_eq!(report.passed_count, 0);
    assert!(report
        .outcomes
        .iter()
        .all(|o| o.status == ExecutionStatus::CompileError));
    assert!(report.outcomes[0]
        .diagnostics
        .as_deref()
        .unwrap_or_default()
        .contains("SyntaxError"));
}

#[tokio::test]
async fn test_parallel_run_keeps_declaration_order() {
    require_python!();
    let root = tempfile::tempdir().unwrap();
    let mut cfg = config(root.path());
    cfg.max_parallel_tests = 4;
    let orch = orchestrator(cfg);
    let cases = (0..8)
        .map(|i| case(i, &format!("{} {}", i, i), &(2 * i).to_string(), Visibility::Hidden))
        .collect();
    let submission = Submission::new(Language::Python, SUM, cases);

    let report = orch.run_all(&submission).await;

    assert_eq!(report.overall_status, OverallStatus::Accepted);
    let ids: Vec<u32> = report.outcomes.iter().map(|o| o.test_id).collect();
    assert_eq!(ids, (0..8).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_service_reads_problem_files() {
    require_python!();
    let root = tempfile::tempdir().unwrap();
    let problems = tempfile::tempdir().unwrap();
    std::fs::write(
        problems.path().join("sum.json"),
        r#"{
            "id": "sum",
            "test_cases": [
                { "id": 1, "input": "2 3", "expected_output": "5", "visibility": "sample" },
                { "id": 2, "input": "4 4", "expected_output": "8", "visibility": "hidden" }
            ]
        }"#,
    )
    .unwrap();

    let cfg = config(root.path());
    let engine = Arc::new(LocalEngine::from_config(&cfg));
    let service =
        JudgeService::new(engine, JsonProblemRepository::new(problems.path()), cfg).unwrap();

    let response = service.run_sample("sum", Language::Python, SUM).await;
    assert!(response.success);
    assert_eq!(response.result.unwrap().status, ExecutionStatus::Passed);

    let report = service.run_all("sum", Language::Python, SUM).await;
    assert_eq!(report.overall_status, OverallStatus::Accepted);
    assert_eq!(report.total_count, 2);
}
