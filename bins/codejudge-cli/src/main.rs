mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use codejudge_common::{BackendKind, Language};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "codejudge")]
#[command(about = "Codejudge - Compile, run and judge submissions against test cases", long_about = None)]
struct Cli {
    /// Directory holding <problem>.json files
    #[arg(long, global = true, default_value = "problems")]
    problems_dir: PathBuf,

    /// Execution backend (local or docker)
    #[arg(long, global = true)]
    backend: Option<BackendKind>,

    /// Per-test run deadline in milliseconds
    #[arg(long, global = true)]
    run_timeout_ms: Option<u64>,

    /// Compile deadline in milliseconds
    #[arg(long, global = true)]
    compile_timeout_ms: Option<u64>,

    /// Captured bytes per stream before truncation
    #[arg(long, global = true)]
    output_limit_bytes: Option<usize>,

    /// Test cases run concurrently per submission
    #[arg(long, global = true)]
    max_parallel_tests: Option<usize>,

    /// Stop running test cases after the first non-passing one
    #[arg(long, global = true)]
    fail_fast: bool,

    /// Where per-submission workspaces are created
    #[arg(long, global = true)]
    workspace_root: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a source file against the problem's sample test case
    Run {
        /// Problem id
        #[arg(short, long)]
        problem: String,

        /// Source file to judge
        #[arg(short, long)]
        source: PathBuf,

        /// Source language
        #[arg(short, long, default_value = "java")]
        language: Language,
    },

    /// Judge a source file against every test case of the problem
    Submit {
        /// Problem id
        #[arg(short, long)]
        problem: String,

        /// Source file to judge
        #[arg(short, long)]
        source: PathBuf,

        /// Source language
        #[arg(short, long, default_value = "java")]
        language: Language,
    },

    /// List supported languages and their toolchains
    ListLangs,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match &cli.command {
        Commands::Run {
            problem,
            source,
            language,
        } => {
            let config = commands::build_config(&cli.overrides())?;
            commands::run_sample(config, &cli.problems_dir, problem, source, *language).await?;
        }
        Commands::Submit {
            problem,
            source,
            language,
        } => {
            let config = commands::build_config(&cli.overrides())?;
            commands::submit(config, &cli.problems_dir, problem, source, *language).await?;
        }
        Commands::ListLangs => {
            commands::list_languages();
        }
    }

    Ok(())
}

impl Cli {
    fn overrides(&self) -> commands::Overrides {
        commands::Overrides {
            backend: self.backend,
            run_timeout_ms: self.run_timeout_ms,
            compile_timeout_ms: self.compile_timeout_ms,
            output_limit_bytes: self.output_limit_bytes,
            max_parallel_tests: self.max_parallel_tests,
            fail_fast: self.fail_fast,
            workspace_root: self.workspace_root.clone(),
        }
    }
}

/// Logs go to stderr; stdout carries only the JSON response
fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
