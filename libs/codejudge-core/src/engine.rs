/// Execution Engine - Abstraction for Compile and Run Backends
///
/// **Core Responsibility:**
/// Turn a workspace into an artifact once, then run that artifact against
/// one test input at a time and hand back raw outputs.
///
/// **Critical Architectural Boundary:**
/// - Engine knows HOW to execute (local toolchain, Docker, ...)
/// - Engine does NOT know scoring rules
/// - Engine does NOT evaluate correctness
/// - Engine returns raw outputs for the Evaluator to judge
///
/// **Why This Exists:**
/// Swapping the local toolchain for a hosted execution service must not
/// touch the orchestrator or the evaluator.

use crate::compiler;
use crate::docker::DockerEngine;
use crate::error::Result;
use crate::runner::{run_process, ProcessSpec};
use crate::toolchain::toolchain;
use crate::workspace::Workspace;
use async_trait::async_trait;
use codejudge_common::{BackendKind, Config, Language, RunResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Capture and teardown limits shared by every process an engine starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionLimits {
    pub output_limit: usize,
    pub kill_grace: Duration,
}

impl ExecutionLimits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            output_limit: config.output_limit_bytes,
            kill_grace: config.kill_grace(),
        }
    }
}

/// Compiled program, ready to be run any number of times
///
/// Only a successful compile produces one, so running before compiling
/// cannot be expressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    dir: PathBuf,
    language: Language,
}

impl Artifact {
    pub(crate) fn new(dir: PathBuf, language: Language) -> Self {
        Self { dir, language }
    }

    /// Workspace directory holding the compiled output
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn language(&self) -> Language {
        self.language
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileOutcome {
    Compiled(Artifact),
    Failed { diagnostics: String, timed_out: bool },
}

/// Execution engine trait
///
/// Any implementation must guarantee:
/// 1. `compile` is bounded by `deadline`; overrunning is a `Failed` outcome
/// 2. `run` starts a fresh process (or container) per call
/// 3. `run` returns at or shortly after `deadline`, with `timed_out` set
///    and nothing left running
/// 4. stdout/stderr are captured into bounded buffers
/// 5. `Err` only for faults of the engine itself, never for the program's
///    own failures
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    fn name(&self) -> &'static str;

    async fn compile(
        &self,
        workspace: &Workspace,
        language: Language,
        deadline: Duration,
    ) -> Result<CompileOutcome>;

    async fn run(&self, artifact: &Artifact, input: &str, deadline: Duration) -> Result<RunResult>;
}

/// Runs the locally installed toolchain as bounded subprocesses
#[derive(Debug, Clone)]
pub struct LocalEngine {
    limits: ExecutionLimits,
}

impl LocalEngine {
    pub fn new(limits: ExecutionLimits) -> Self {
        Self { limits }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(ExecutionLimits::from_config(config))
    }
}

#[async_trait]
impl ExecutionEngine for LocalEngine {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn compile(
        &self,
        workspace: &Workspace,
        language: Language,
        deadline: Duration,
    ) -> Result<CompileOutcome> {
        compiler::compile_local(workspace, language, deadline, &self.limits).await
    }

    async fn run(&self, artifact: &Artifact, input: &str, deadline: Duration) -> Result<RunResult> {
        let tc = toolchain(artifact.language());
        let program = local_program(tc.run.program, artifact.dir());

        run_process(ProcessSpec {
            program: &program,
            args: tc.run.args(),
            cwd: artifact.dir(),
            stdin: Some(input),
            deadline,
            output_limit: self.limits.output_limit,
            kill_grace: self.limits.kill_grace,
        })
        .await
    }
}

/// Programs like `./main` live in the artifact directory; resolve them there
/// rather than relative to our own working directory
fn local_program(program: &str, dir: &Path) -> String {
    match program.strip_prefix("./") {
        Some(name) => dir.join(name).to_string_lossy().into_owned(),
        None => program.to_string(),
    }
}

/// Build the engine selected by `config.backend`
pub fn engine_from_config(config: &Config) -> Result<Arc<dyn ExecutionEngine>> {
    let engine: Arc<dyn ExecutionEngine> = match config.backend {
        BackendKind::Local => Arc::new(LocalEngine::from_config(config)),
        BackendKind::Docker => Arc::new(DockerEngine::from_config(config)?),
    };
    tracing::info!(backend = engine.name(), "Execution engine ready");
    Ok(engine)
}
