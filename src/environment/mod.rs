//! Construction of the shared, immutable execution image.
//!
//! A build artifact archive is unpacked once inside a named container, the
//! container is committed as an image, and every test then runs from that
//! image. Any failure here is fatal: a partial environment would invalidate
//! every test that runs on it.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::ctest::command;
use crate::error::EnvironmentError;
use crate::execution::{ContainerConfig, ContainerRuntime, LineSink};
use crate::pipeline::OrchestratorConfig;

/// The committed image every unit runs from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionEnvironment {
    /// Committed image reference.
    pub image: String,
    /// Directory the build archive was unpacked into.
    pub work_dir: String,
    /// Build tree, relative to `work_dir`.
    pub build_dir: String,
}

/// Resolves the archive to an absolute host path for the bind mount.
fn resolve_archive(path: &Path) -> Result<PathBuf, EnvironmentError> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| EnvironmentError::ArchiveNotFound(format!("{}: {e}", path.display())))?
            .join(path)
    };
    if !absolute.is_file() {
        return Err(EnvironmentError::ArchiveNotFound(absolute.display().to_string()));
    }
    Ok(absolute)
}

/// Mount point of the archive inside the base container.
fn mount_target(archive: &Path) -> String {
    let file_name = archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "build.tar".to_string());
    format!("/{file_name}")
}

/// Builds the execution image described by `config`.
///
/// Steps: remove a stale base container, unpack the archive inside a fresh
/// one, commit it, remove it. No step is retried.
pub async fn build_environment(
    runtime: &dyn ContainerRuntime,
    config: &OrchestratorConfig,
    sink: &dyn LineSink,
) -> Result<ExecutionEnvironment, EnvironmentError> {
    let archive = resolve_archive(&config.build_archive)?;
    let target = mount_target(&archive);
    let container = config.base_container();
    let image = config.base_image();

    if let Err(e) = runtime.remove(&container, true).await {
        debug!(container = %container, error = %e, "No stale base container to remove");
    }

    info!(
        source = %config.source_image,
        archive = %archive.display(),
        work_dir = %config.work_dir,
        "Creating base container"
    );
    let unpack = ContainerConfig::new(config.source_image.clone(), command::unpack_archive(&target))
        .with_name(container.clone())
        .with_volume(format!("{}:{}:ro", archive.display(), target))
        .with_working_dir(config.work_dir.clone());

    let output = runtime.run(&unpack, sink).await?;
    if !output.success() {
        if let Err(e) = runtime.remove(&container, true).await {
            warn!(container = %container, error = %e, "Failed to remove broken base container");
        }
        return Err(EnvironmentError::UnpackFailed {
            container,
            code: output.exit_code.unwrap_or(-1),
        });
    }

    runtime
        .commit(&container, &image)
        .await
        .map_err(|e| EnvironmentError::CommitFailed {
            image: image.clone(),
            reason: e.to_string(),
        })?;
    info!(image = %image, "Committed base image");

    runtime
        .remove(&container, false)
        .await
        .map_err(|e| EnvironmentError::CleanupFailed {
            container: container.clone(),
            reason: e.to_string(),
        })?;

    Ok(ExecutionEnvironment {
        image,
        work_dir: config.work_dir.clone(),
        build_dir: config.build_dir.clone(),
    })
}
