//! Docker Engine API backend using the bollard crate.
//!
//! Same contract as [`DockerCli`](super::DockerCli) but talks to the daemon
//! directly instead of spawning the CLI for every operation.

use async_trait::async_trait;
use bollard::container::{
    AttachContainerOptions, AttachContainerResults, Config, CreateContainerOptions, LogOutput,
    RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::CommitContainerOptions;
use bollard::models::HostConfig;
use bollard::{Docker, API_DEFAULT_VERSION};
use futures::StreamExt;
use tracing::{debug, warn};

use crate::error::RuntimeError;
use crate::execution::lines::LineCapture;
use crate::execution::runtime::{
    ContainerConfig, ContainerRuntime, ExecResult, ExportStream, LineSink, OutputStream,
};

const CONNECT_TIMEOUT_SECS: u64 = 120;

/// Docker client wrapper for container operations.
pub struct DockerClient {
    docker: Docker,
}

impl DockerClient {
    /// Connects to `host` when given (`unix://` socket or `tcp://`/`http://`
    /// endpoint), otherwise to the local default socket.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::DaemonUnavailable` if the client cannot be set up.
    pub fn connect(host: Option<&str>) -> Result<Self, RuntimeError> {
        let docker = match host.filter(|h| !h.is_empty()) {
            Some(host) if host.starts_with("unix://") => {
                Docker::connect_with_socket(host, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION)
            }
            Some(host) => {
                Docker::connect_with_http(host, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION)
            }
            None => Docker::connect_with_local_defaults(),
        }
        .map_err(|e| RuntimeError::DaemonUnavailable(format!("Failed to connect: {e}")))?;

        Ok(Self { docker })
    }

    /// Creates a new Docker client from an existing bollard Docker instance.
    pub fn from_docker(docker: Docker) -> Self {
        Self { docker }
    }

    async fn create(&self, config: &ContainerConfig) -> Result<String, RuntimeError> {
        let host_config = HostConfig {
            binds: if config.volumes.is_empty() {
                None
            } else {
                Some(config.volumes.clone())
            },
            security_opt: if config.security_opts.is_empty() {
                None
            } else {
                Some(config.security_opts.clone())
            },
            init: Some(config.init),
            ..Default::default()
        };

        let container_config = Config {
            image: Some(config.image.clone()),
            cmd: Some(config.cmd.clone()),
            env: if config.env.is_empty() {
                None
            } else {
                Some(config.env.clone())
            },
            working_dir: config.working_dir.clone(),
            host_config: Some(host_config),
            tty: Some(false),
            attach_stdin: Some(false),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let options = config.name.as_ref().map(|name| CreateContainerOptions {
            name: name.clone(),
            platform: None,
        });

        let response = self
            .docker
            .create_container(options, container_config)
            .await
            .map_err(|e| RuntimeError::LaunchFailed(format!("Failed to create container: {e}")))?;

        Ok(response.id)
    }

    /// Waits for a container to stop and returns its exit code.
    async fn wait(&self, id: &str) -> Result<i64, RuntimeError> {
        let options = WaitContainerOptions {
            condition: "not-running",
        };

        let mut stream = self.docker.wait_container(id, Some(options));

        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard reports a non-zero exit as an error carrying the code.
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(RuntimeError::Api(format!("Error waiting for container: {e}"))),
            None => Err(RuntimeError::Api(
                "Container wait returned no status".to_string(),
            )),
        }
    }
}

/// Splits `repo[:tag]` into its parts, defaulting the tag to `latest`.
fn split_image_ref(image: &str) -> (String, String) {
    let name_start = image.rfind('/').map(|i| i + 1).unwrap_or(0);
    match image[name_start..].rfind(':') {
        Some(i) => (
            image[..name_start + i].to_string(),
            image[name_start + i + 1..].to_string(),
        ),
        None => (image.to_string(), "latest".to_string()),
    }
}

#[async_trait]
impl ContainerRuntime for DockerClient {
    async fn run(
        &self,
        config: &ContainerConfig,
        sink: &dyn LineSink,
    ) -> Result<ExecResult, RuntimeError> {
        let id = self.create(config).await?;
        debug!(container = %id, image = %config.image, "created container");

        // Attach before starting so no early output is missed.
        let AttachContainerResults { mut output, .. } = self
            .docker
            .attach_container(
                &id,
                Some(AttachContainerOptions::<String> {
                    stdout: Some(true),
                    stderr: Some(true),
                    stream: Some(true),
                    logs: Some(true),
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| RuntimeError::LaunchFailed(format!("Failed to attach: {e}")))?;

        self.docker
            .start_container(&id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| RuntimeError::LaunchFailed(format!("Failed to start container: {e}")))?;

        let mut stdout = LineCapture::new(OutputStream::Stdout);
        let mut stderr = LineCapture::new(OutputStream::Stderr);

        while let Some(chunk) = output.next().await {
            match chunk {
                Ok(LogOutput::StdOut { message }) | Ok(LogOutput::Console { message }) => {
                    stdout.push(&message, sink);
                }
                Ok(LogOutput::StdErr { message }) => {
                    stderr.push(&message, sink);
                }
                Ok(_) => {}
                Err(e) => {
                    return Err(RuntimeError::Api(format!("Error reading output: {e}")));
                }
            }
        }

        let exit_code = self.wait(&id).await?;

        if config.auto_remove {
            if let Err(e) = self.remove(&id, true).await {
                warn!(container = %id, error = %e, "Failed to remove finished container");
            }
        }

        Ok(ExecResult {
            exit_code: Some(exit_code),
            stdout: stdout.finish(sink),
            stderr: stderr.finish(sink),
        })
    }

    async fn commit(&self, container: &str, image: &str) -> Result<(), RuntimeError> {
        let (repo, tag) = split_image_ref(image);
        let options = CommitContainerOptions {
            container: container.to_string(),
            repo,
            tag,
            pause: true,
            ..Default::default()
        };

        self.docker
            .commit_container(options, Config::<String>::default())
            .await
            .map_err(|e| RuntimeError::Api(format!("Failed to commit container: {e}")))?;

        Ok(())
    }

    async fn remove(&self, container: &str, force: bool) -> Result<(), RuntimeError> {
        let options = RemoveContainerOptions {
            force,
            v: true,
            ..Default::default()
        };

        self.docker
            .remove_container(container, Some(options))
            .await
            .map_err(|e| {
                if e.to_string().contains("No such container") {
                    RuntimeError::ContainerNotFound {
                        id: container.to_string(),
                    }
                } else {
                    RuntimeError::Api(format!("Failed to remove container: {e}"))
                }
            })?;

        Ok(())
    }

    async fn export(&self, container: &str) -> Result<ExportStream, RuntimeError> {
        let id = container.to_string();
        let stream = self.docker.export_container(container).map(move |chunk| {
            chunk.map(|bytes| bytes.to_vec()).map_err(|e| match e {
                BollardError::DockerResponseServerError {
                    status_code: 404, ..
                } => RuntimeError::ContainerNotFound { id: id.clone() },
                e => RuntimeError::Api(format!("Error reading export: {e}")),
            })
        });

        Ok(stream.boxed())
    }
}
