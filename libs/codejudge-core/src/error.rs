use codejudge_common::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JudgeError {
    #[error("Workspace error at {path}: {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Docker error: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("Problem not found: {0}")]
    ProblemNotFound(String),

    #[error("No sample test case found")]
    NoSampleTestCase,

    #[error("Invalid problem {problem}: {reason}")]
    InvalidProblem { problem: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl JudgeError {
    pub(crate) fn workspace(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        JudgeError::Workspace {
            path: path.into(),
            source,
        }
    }
}

/// Result type for judge operations
pub type Result<T> = std::result::Result<T, JudgeError>;
