//! Error types for ctest-fanout operations.
//!
//! Defines error types for each stage of an orchestration run:
//! - Container runtime calls (CLI or Engine API)
//! - Execution environment construction
//! - Test discovery
//! - Failure log salvage
//!
//! Per-test failures are not errors: they are recorded as
//! [`RunResult`](crate::runner::RunResult) values.

use thiserror::Error;

/// Errors raised by a [`ContainerRuntime`](crate::execution::ContainerRuntime) backend.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Failed to launch container runtime: {0}")]
    LaunchFailed(String),

    #[error("Docker daemon not available: {0}")]
    DaemonUnavailable(String),

    #[error("Container '{id}' not found")]
    ContainerNotFound { id: String },

    #[error("'{operation}' exited with non-zero code {code}: {stderr}")]
    NonZeroExit {
        operation: String,
        code: i64,
        stderr: String,
    },

    #[error("Docker API error: {0}")]
    Api(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that abort construction of the shared execution image.
#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error("Build archive not found: {0}")]
    ArchiveNotFound(String),

    #[error("Failed to create base container '{container}': exit {code}")]
    UnpackFailed { container: String, code: i64 },

    #[error("Failed to create base image '{image}': {reason}")]
    CommitFailed { image: String, reason: String },

    #[error("Failed to remove base container '{container}': {reason}")]
    CleanupFailed { container: String, reason: String },

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Errors that abort test discovery.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Failed to discover tests with label '{label}' (exit {code})\nstdout:\n{stdout}\nstderr:\n{stderr}")]
    QueryFailed {
        label: String,
        code: String,
        stdout: String,
        stderr: String,
    },

    #[error("Failed to parse test listing: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Test listing contains an entry with an empty name")]
    EmptyName,

    #[error("Test '{0}' appears more than once in the listing")]
    DuplicateName(String),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Errors local to salvaging one failed test's logs.
#[derive(Debug, Error)]
pub enum SalvageError {
    #[error("Failed to export container '{container}': {source}")]
    Export {
        container: String,
        #[source]
        source: RuntimeError,
    },

    #[error("Malformed archive entry: {0}")]
    Archive(String),

    #[error("Salvage worker panicked: {0}")]
    Join(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that end an orchestration run before any test executes.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Config(#[from] crate::pipeline::ConfigError),

    #[error(transparent)]
    Environment(#[from] EnvironmentError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_failure_surfaces_raw_output() {
        let err = DiscoveryError::QueryFailed {
            label: "nightly".to_string(),
            code: "8".to_string(),
            stdout: "partial listing".to_string(),
            stderr: "ctest: no build tree".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("nightly"));
        assert!(message.contains("partial listing"));
        assert!(message.contains("ctest: no build tree"));
    }

    #[test]
    fn test_environment_error_wraps_runtime() {
        let err: EnvironmentError = RuntimeError::LaunchFailed("no docker".to_string()).into();
        assert_eq!(
            err.to_string(),
            "Failed to launch container runtime: no docker"
        );
    }
}
