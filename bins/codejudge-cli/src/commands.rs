// CLI commands for judging submissions
use anyhow::{Context, Result};
use codejudge_common::{BackendKind, Config, Language};
use codejudge_core::{engine_from_config, toolchain, JsonProblemRepository, JudgeService};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Flag values that take precedence over the environment
#[derive(Debug, Default)]
pub struct Overrides {
    pub backend: Option<BackendKind>,
    pub run_timeout_ms: Option<u64>,
    pub compile_timeout_ms: Option<u64>,
    pub output_limit_bytes: Option<usize>,
    pub max_parallel_tests: Option<usize>,
    pub fail_fast: bool,
    pub workspace_root: Option<PathBuf>,
}

/// Environment first, then flags, then validation
pub fn build_config(overrides: &Overrides) -> Result<Config> {
    let config = Config::from_env().context("Invalid JUDGE_* environment")?;
    finish_config(config, overrides)
}

fn finish_config(mut config: Config, overrides: &Overrides) -> Result<Config> {
    apply_overrides(&mut config, overrides);
    config.validate().context("Invalid judge configuration")?;
    Ok(config)
}

fn apply_overrides(config: &mut Config, overrides: &Overrides) {
    if let Some(backend) = overrides.backend {
        config.backend = backend;
    }
    if let Some(ms) = overrides.run_timeout_ms {
        config.run_timeout_ms = ms;
    }
    if let Some(ms) = overrides.compile_timeout_ms {
        config.compile_timeout_ms = ms;
    }
    if let Some(bytes) = overrides.output_limit_bytes {
        config.output_limit_bytes = bytes;
    }
    if let Some(n) = overrides.max_parallel_tests {
        config.max_parallel_tests = n;
    }
    if overrides.fail_fast {
        config.fail_fast = true;
    }
    if let Some(root) = &overrides.workspace_root {
        config.workspace_root = root.clone();
    }
}

fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read source file {}", path.display()))
}

fn service(
    config: Config,
    problems_dir: &Path,
) -> Result<JudgeService<dyn codejudge_core::ExecutionEngine, JsonProblemRepository>> {
    let engine = engine_from_config(&config).context("Failed to initialise execution engine")?;
    let problems = JsonProblemRepository::new(problems_dir);
    tracing::debug!(
        problems_dir = %problems_dir.display(),
        workspace_root = %config.workspace_root.display(),
        "Judge configured"
    );
    JudgeService::new(engine, problems, config).context("Failed to build judge")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize response")?;
    println!("{}", json);
    Ok(())
}

/// Run the sample test case and print the response
pub async fn run_sample(
    config: Config,
    problems_dir: &Path,
    problem: &str,
    source: &Path,
    language: Language,
) -> Result<()> {
    let source_code = read_source(source)?;
    let judge = service(config, problems_dir)?;

    let response = judge.run_sample(problem, language, &source_code).await;
    print_json(&response)
}

/// Judge every test case and print the report
pub async fn submit(
    config: Config,
    problems_dir: &Path,
    problem: &str,
    source: &Path,
    language: Language,
) -> Result<()> {
    let source_code = read_source(source)?;
    let judge = service(config, problems_dir)?;

    let report = judge.run_all(problem, language, &source_code).await;
    print_json(&report)
}

pub fn list_languages() {
    println!("{:<8} {:<10} {:<32} {:<16} {}", "Name", "Source", "Compile", "Run", "Image");
    println!("{}", "─".repeat(100));

    for lang in Language::all_variants() {
        let tc = toolchain(*lang);
        println!(
            "{:<8} {:<10} {:<32} {:<16} {}",
            lang.to_string(),
            tc.source_file,
            tc.compile.display(),
            tc.run.display(),
            tc.image
        );
    }

    println!("\nTotal: {} language(s)", Language::all_variants().len());
}
