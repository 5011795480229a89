use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_RUN_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_COMPILE_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_MAX_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_KILL_GRACE_MS: u64 = 250;
pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 256 * 1024;
pub const DEFAULT_MAX_PARALLEL_TESTS: usize = 1;
pub const DEFAULT_DOCKER_MEMORY_MB: u64 = 256;
pub const DEFAULT_DOCKER_CPUS: f64 = 0.5;

const MAX_KILL_GRACE_MS: u64 = 5000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("{name} ({value}ms) exceeds max_timeout_ms ({max}ms)")]
    AboveMaxTimeout { name: &'static str, value: u64, max: u64 },

    #[error("kill_grace_ms ({0}ms) exceeds {max}ms", max = MAX_KILL_GRACE_MS)]
    GraceTooLong(u64),

    #[error("unknown backend: {0} (expected local or docker)")]
    UnknownBackend(String),

    #[error("invalid value for {key}: {value:?}")]
    InvalidEnv { key: &'static str, value: String },
}

/// Which execution backend runs compile and run steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Local,
    Docker,
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(BackendKind::Local),
            "docker" => Ok(BackendKind::Docker),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

/// Judge configuration
/// Provides defaults with environment variable overrides
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Wall-clock deadline for one test case run
    pub run_timeout_ms: u64,
    /// Wall-clock deadline for compiling one submission
    pub compile_timeout_ms: u64,
    /// Upper bound accepted for either deadline
    pub max_timeout_ms: u64,
    /// Time allowed for tearing down a killed process tree
    pub kill_grace_ms: u64,
    /// Capture cap per output stream
    pub output_limit_bytes: usize,
    /// Worker pool size for test case runs within one submission
    pub max_parallel_tests: usize,
    /// Stop starting new runs after the first non-passing outcome
    pub fail_fast: bool,
    /// Parent directory of per-submission workspaces
    pub workspace_root: PathBuf,
    pub backend: BackendKind,
    pub docker_memory_limit_mb: u64,
    pub docker_cpu_limit: f64,
}

impl Config {
    /// Defaults overridden by `JUDGE_*` environment variables
    ///
    /// A variable that is set but does not parse is an error, never a silent
    /// fallback to the default.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let var = |key: &'static str| lookup(key).map(|value| (key, value));

        Ok(Self {
            run_timeout_ms: parsed(var("JUDGE_RUN_TIMEOUT_MS"), defaults.run_timeout_ms)?,
            compile_timeout_ms: parsed(var("JUDGE_COMPILE_TIMEOUT_MS"), defaults.compile_timeout_ms)?,
            max_timeout_ms: parsed(var("JUDGE_MAX_TIMEOUT_MS"), defaults.max_timeout_ms)?,
            kill_grace_ms: parsed(var("JUDGE_KILL_GRACE_MS"), defaults.kill_grace_ms)?,
            output_limit_bytes: parsed(var("JUDGE_OUTPUT_LIMIT_BYTES"), defaults.output_limit_bytes)?,
            max_parallel_tests: parsed(var("JUDGE_MAX_PARALLEL_TESTS"), defaults.max_parallel_tests)?,
            fail_fast: parsed(var("JUDGE_FAIL_FAST"), defaults.fail_fast)?,
            workspace_root: var("JUDGE_WORKSPACE_ROOT")
                .map(|(_, value)| PathBuf::from(value))
                .unwrap_or(defaults.workspace_root),
            backend: match var("JUDGE_BACKEND") {
                Some((_, value)) => value.parse()?,
                None => defaults.backend,
            },
            docker_memory_limit_mb: parsed(var("JUDGE_DOCKER_MEMORY_MB"), defaults.docker_memory_limit_mb)?,
            docker_cpu_limit: parsed(var("JUDGE_DOCKER_CPUS"), defaults.docker_cpu_limit)?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.run_timeout_ms == 0 {
            return Err(ConfigError::Zero("run_timeout_ms"));
        }
        if self.compile_timeout_ms == 0 {
            return Err(ConfigError::Zero("compile_timeout_ms"));
        }
        if self.output_limit_bytes == 0 {
            return Err(ConfigError::Zero("output_limit_bytes"));
        }
        if self.max_parallel_tests == 0 {
            return Err(ConfigError::Zero("max_parallel_tests"));
        }
        for (name, value) in [
            ("run_timeout_ms", self.run_timeout_ms),
            ("compile_timeout_ms", self.compile_timeout_ms),
        ] {
            if value > self.max_timeout_ms {
                return Err(ConfigError::AboveMaxTimeout {
                    name,
                    value,
                    max: self.max_timeout_ms,
                });
            }
        }
        if self.kill_grace_ms > MAX_KILL_GRACE_MS {
            return Err(ConfigError::GraceTooLong(self.kill_grace_ms));
        }
        if self.docker_memory_limit_mb == 0 {
            return Err(ConfigError::Zero("docker_memory_limit_mb"));
        }
        // also catches NaN
        if !(self.docker_cpu_limit > 0.0) {
            return Err(ConfigError::Zero("docker_cpu_limit"));
        }
        Ok(())
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_millis(self.run_timeout_ms)
    }

    pub fn compile_timeout(&self) -> Duration {
        Duration::from_millis(self.compile_timeout_ms)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            run_timeout_ms: DEFAULT_RUN_TIMEOUT_MS,
            compile_timeout_ms: DEFAULT_COMPILE_TIMEOUT_MS,
            max_timeout_ms: DEFAULT_MAX_TIMEOUT_MS,
            kill_grace_ms: DEFAULT_KILL_GRACE_MS,
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
            max_parallel_tests: DEFAULT_MAX_PARALLEL_TESTS,
            fail_fast: false,
            workspace_root: default_workspace_root(),
            backend: BackendKind::Local,
            docker_memory_limit_mb: DEFAULT_DOCKER_MEMORY_MB,
            docker_cpu_limit: DEFAULT_DOCKER_CPUS,
        }
    }
}

fn default_workspace_root() -> PathBuf {
    env::temp_dir().join("codejudge")
}

fn parsed<T: FromStr>(var: Option<(&'static str, String)>, default: T) -> Result<T, ConfigError> {
    match var {
        None => Ok(default),
        Some((key, value)) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidEnv { key, value }),
    }
}
