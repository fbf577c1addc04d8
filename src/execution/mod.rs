//! Container runtime layer.
//!
//! The orchestrator only needs five things from a container runtime: run a
//! container to completion while streaming its output, commit, remove, and
//! export. [`ContainerRuntime`] captures exactly that; two backends implement
//! it:
//!
//! - [`DockerCli`] spawns the `docker` client for every operation.
//! - [`DockerClient`] talks to the Engine API through bollard.
//!
//! # Example
//!
//! ```ignore
//! use ctest_fanout::execution::{ContainerConfig, ContainerRuntime, DockerCli, Quiet};
//!
//! let runtime = DockerCli::new(None);
//! let config = ContainerConfig::new("ubuntu:22.04", ["echo", "hello"]).with_auto_remove();
//! let result = runtime.run(&config, &Quiet).await?;
//! assert!(result.success());
//! ```

pub mod docker_cli;
pub mod docker_client;
pub mod lines;
pub mod runtime;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use docker_cli::DockerCli;
pub use docker_client::DockerClient;
pub use lines::LineCapture;
pub use runtime::{
    ContainerConfig, ContainerRuntime, ExecResult, ExportStream, LineSink, OutputStream, Quiet,
};

use crate::error::RuntimeError;

/// Which runtime backend to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// The `docker` command-line client.
    #[default]
    Cli,
    /// The Docker Engine API.
    Api,
}

/// Builds the runtime for `backend`, connecting to `host` when given.
pub fn connect(
    backend: Backend,
    host: Option<&str>,
) -> Result<Arc<dyn ContainerRuntime>, RuntimeError> {
    match backend {
        Backend::Cli => Ok(Arc::new(DockerCli::new(host.map(str::to_string)))),
        Backend::Api => Ok(Arc::new(DockerClient::connect(host)?)),
    }
}
