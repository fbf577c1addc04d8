//! The narrow capability interface the orchestrator needs from a container
//! runtime.
//!
//! Everything above this layer (environment builder, scheduler, salvager)
//! talks to a [`ContainerRuntime`] trait object, so the whole pipeline can be
//! driven against an in-memory fake in tests.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::RuntimeError;

/// Byte stream of a container filesystem export (a tar archive).
pub type ExportStream = BoxStream<'static, Result<Vec<u8>, RuntimeError>>;

/// Which output stream a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Receives complete output lines from a running container as they arrive.
pub trait LineSink: Send + Sync {
    /// Called once per line, without the trailing newline.
    fn line(&self, stream: OutputStream, line: &str);
}

/// A sink that drops every line. Output is still captured in [`ExecResult`].
#[derive(Debug, Default, Clone, Copy)]
pub struct Quiet;

impl LineSink for Quiet {
    fn line(&self, _stream: OutputStream, _line: &str) {}
}

/// Configuration for running a container.
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    /// Container name; `None` lets the runtime pick one.
    pub name: Option<String>,
    /// Image to run.
    pub image: String,
    /// Command to run in the container.
    pub cmd: Vec<String>,
    /// Environment variables (`KEY=VALUE`).
    pub env: Vec<String>,
    /// Working directory inside the container.
    pub working_dir: Option<String>,
    /// Volume mounts (`host:container[:ro]`).
    pub volumes: Vec<String>,
    /// Security options (e.g. `seccomp=unconfined`).
    pub security_opts: Vec<String>,
    /// Run an init process as PID 1.
    pub init: bool,
    /// Remove the container once it exits.
    pub auto_remove: bool,
}

impl ContainerConfig {
    /// Creates a new container configuration for the given image and command.
    pub fn new<I, S>(image: impl Into<String>, cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: None,
            image: image.into(),
            cmd: cmd.into_iter().map(Into::into).collect(),
            env: Vec::new(),
            working_dir: None,
            volumes: Vec::new(),
            security_opts: Vec::new(),
            init: false,
            auto_remove: false,
        }
    }

    /// Sets the container name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Adds environment variables.
    pub fn with_env(mut self, env: Vec<String>) -> Self {
        self.env = env;
        self
    }

    /// Sets the working directory.
    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Adds a volume mount.
    pub fn with_volume(mut self, volume: impl Into<String>) -> Self {
        self.volumes.push(volume.into());
        self
    }

    /// Adds a security option.
    pub fn with_security_opt(mut self, opt: impl Into<String>) -> Self {
        self.security_opts.push(opt.into());
        self
    }

    /// Runs an init process inside the container.
    pub fn with_init(mut self) -> Self {
        self.init = true;
        self
    }

    /// Removes the container when it exits.
    pub fn with_auto_remove(mut self) -> Self {
        self.auto_remove = true;
        self
    }
}

/// Result of running a container to completion.
#[derive(Debug, Clone, Default)]
pub struct ExecResult {
    /// Exit code, or `None` if the process was terminated without one.
    pub exit_code: Option<i64>,
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
}

impl ExecResult {
    /// Returns true if the process exited with code 0.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Exit code rendered for diagnostics.
    pub fn code_label(&self) -> String {
        match self.exit_code {
            Some(code) => code.to_string(),
            None => "none".to_string(),
        }
    }
}

/// Container operations the orchestrator depends on.
///
/// Every call returns `Err` only when the runtime itself could not carry out
/// the request. A container whose command fails is a successful `run` with a
/// non-zero [`ExecResult::exit_code`].
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Runs a container to completion, streaming output lines into `sink`
    /// while also capturing them in full.
    async fn run(
        &self,
        config: &ContainerConfig,
        sink: &dyn LineSink,
    ) -> Result<ExecResult, RuntimeError>;

    /// Commits a stopped container's filesystem as a new image.
    async fn commit(&self, container: &str, image: &str) -> Result<(), RuntimeError>;

    /// Removes a container.
    async fn remove(&self, container: &str, force: bool) -> Result<(), RuntimeError>;

    /// Exports a container's filesystem as a tar byte stream.
    async fn export(&self, container: &str) -> Result<ExportStream, RuntimeError>;
}
