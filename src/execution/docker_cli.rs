//! Container runtime backed by the `docker` command-line client.
//!
//! Every operation spawns `docker [--host H] <subcommand> ...` through
//! `tokio::process`, so the orchestrator behaves exactly like a shell script
//! driving the same CLI, including honouring a remote daemon.

use std::process::Stdio;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::debug;

use crate::error::RuntimeError;
use crate::execution::lines::LineCapture;
use crate::execution::runtime::{
    ContainerConfig, ContainerRuntime, ExecResult, ExportStream, LineSink, OutputStream,
};

const READ_CHUNK: usize = 64 * 1024;

/// `docker` CLI wrapper.
#[derive(Debug, Clone, Default)]
pub struct DockerCli {
    host: Option<String>,
}

impl DockerCli {
    /// Creates a client for the default daemon, or `host` when given.
    pub fn new(host: Option<String>) -> Self {
        Self {
            host: host.filter(|h| !h.is_empty()),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new("docker");
        if let Some(host) = &self.host {
            cmd.args(["--host", host]);
        }
        cmd.stdin(Stdio::null());
        cmd
    }

    /// Builds the argument list for `docker run`.
    pub fn run_args(config: &ContainerConfig) -> Vec<String> {
        let mut args = vec!["run".to_string()];
        if config.auto_remove {
            args.push("--rm".to_string());
        }
        if let Some(name) = &config.name {
            args.extend(["--name".to_string(), name.clone()]);
        }
        for opt in &config.security_opts {
            args.extend(["--security-opt".to_string(), opt.clone()]);
        }
        for env in &config.env {
            args.extend(["-e".to_string(), env.clone()]);
        }
        for volume in &config.volumes {
            args.extend(["-v".to_string(), volume.clone()]);
        }
        if let Some(dir) = &config.working_dir {
            args.extend(["--workdir".to_string(), dir.clone()]);
        }
        if config.init {
            args.push("--init".to_string());
        }
        args.push(config.image.clone());
        args.extend(config.cmd.iter().cloned());
        args
    }

    async fn status_of(&self, operation: &str, args: &[&str]) -> Result<(), RuntimeError> {
        let output = self
            .command()
            .args(args)
            .output()
            .await
            .map_err(|e| RuntimeError::LaunchFailed(format!("docker {operation}: {e}")))?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if stderr.contains("No such container") {
            return Err(RuntimeError::ContainerNotFound {
                id: args.last().map(|s| s.to_string()).unwrap_or_default(),
            });
        }
        Err(RuntimeError::NonZeroExit {
            operation: format!("docker {operation}"),
            code: output.status.code().map(i64::from).unwrap_or(-1),
            stderr,
        })
    }
}

async fn capture<R>(
    mut reader: R,
    stream: OutputStream,
    sink: &dyn LineSink,
) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut capture = LineCapture::new(stream);
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        capture.push(&buf[..n], sink);
    }
    Ok(capture.finish(sink))
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn run(
        &self,
        config: &ContainerConfig,
        sink: &dyn LineSink,
    ) -> Result<ExecResult, RuntimeError> {
        let args = Self::run_args(config);
        debug!(args = ?args, "docker run");

        let mut child = self
            .command()
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RuntimeError::LaunchFailed(format!("docker run: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RuntimeError::LaunchFailed("stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RuntimeError::LaunchFailed("stderr not captured".to_string()))?;

        let (stdout, stderr, status) = tokio::join!(
            capture(stdout, OutputStream::Stdout, sink),
            capture(stderr, OutputStream::Stderr, sink),
            child.wait(),
        );

        Ok(ExecResult {
            exit_code: status?.code().map(i64::from),
            stdout: stdout?,
            stderr: stderr?,
        })
    }

    async fn commit(&self, container: &str, image: &str) -> Result<(), RuntimeError> {
        self.status_of("commit", &["commit", container, image]).await
    }

    async fn remove(&self, container: &str, force: bool) -> Result<(), RuntimeError> {
        if force {
            self.status_of("rm", &["rm", "-f", container]).await
        } else {
            self.status_of("rm", &["rm", container]).await
        }
    }

    async fn export(&self, container: &str) -> Result<ExportStream, RuntimeError> {
        let mut child = self
            .command()
            .args(["export", container])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RuntimeError::LaunchFailed(format!("docker export: {e}")))?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| RuntimeError::LaunchFailed("stdout not captured".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| RuntimeError::LaunchFailed("stderr not captured".to_string()))?;

        // stderr is read on its own task so it cannot block the export pipe.
        let stderr_task = tokio::spawn(async move {
            let mut text = String::new();
            let _ = stderr.read_to_string(&mut text).await;
            text
        });

        let container = container.to_string();
        let stream = async_stream::stream! {
            let mut buf = vec![0u8; READ_CHUNK];
            loop {
                match stdout.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        yield Ok::<Vec<u8>, RuntimeError>(buf[..n].to_vec());
                    }
                    Err(e) => {
                        yield Err(RuntimeError::Io(e));
                        return;
                    }
                }
            }

            match child.wait().await {
                Ok(status) if status.success() => {}
                Ok(status) => {
                    let stderr = stderr_task.await.unwrap_or_default();
                    if stderr.contains("No such container") {
                        yield Err(RuntimeError::ContainerNotFound { id: container });
                        return;
                    }
                    yield Err(RuntimeError::NonZeroExit {
                        operation: "docker export".to_string(),
                        code: status.code().map(i64::from).unwrap_or(-1),
                        stderr: stderr.trim().to_string(),
                    });
                }
                Err(e) => {
                    yield Err(RuntimeError::Io(e));
                }
            }
        };

        Ok(stream.boxed())
    }
}
