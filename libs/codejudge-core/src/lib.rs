pub mod compiler;
pub mod docker;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod problem;
pub mod runner;
pub mod service;
pub mod toolchain;
pub mod workspace;

pub use docker::DockerEngine;
pub use engine::{engine_from_config, Artifact, CompileOutcome, ExecutionEngine, ExecutionLimits, LocalEngine};
pub use error::{JudgeError, Result};
pub use executor::Orchestrator;
pub use problem::{InMemoryProblemRepository, JsonProblemRepository, ProblemRepository};
pub use runner::{run_process, ProcessSpec};
pub use service::JudgeService;
pub use toolchain::{toolchain, Toolchain};
pub use workspace::{Workspace, WorkspaceManager};
