//! Failure log salvage.
//!
//! For each failed test, the container's filesystem is exported and piped
//! through a filter that keeps only diagnostic paths, then gzip-compressed
//! straight to `{prefix}-{name}-logs.tar.gz`.
//!
//! # Pipeline
//!
//! ```text
//! runtime.export ──► bounded mpsc ──► ChannelReader ──► tar::Archive
//!   (async)                             (blocking)          │ filter
//!                                                           ▼
//!                          file ◄── GzEncoder ◄── tar::Builder
//! ```
//!
//! The channel is bounded, so the export can never run more than a few
//! chunks ahead of the disk: no exported filesystem is held in memory.
//!
//! A test whose container never started, or is gone by the time it is
//! exported, still gets an archive. It holds a single `launch-error.txt`
//! with the outcome and whatever output was captured.

pub mod filter;
pub mod reader;

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flate2::write::GzEncoder;
use flate2::Compression;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::ctest::sanitize_name;
use crate::error::{RuntimeError, SalvageError};
use crate::execution::ContainerRuntime;
use crate::runner::{RunResult, UnitOutcome};

pub use filter::{repack_entries, PathFilter, RepackStats};
pub use reader::ChannelReader;

/// Chunks buffered between the export stream and the tar reader.
const CHANNEL_DEPTH: usize = 8;

/// Entry name of the report written when there is no filesystem to export.
pub const LAUNCH_REPORT_ENTRY: &str = "launch-error.txt";

/// Where an archive's content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveSource {
    /// Filtered export of the container filesystem.
    Filesystem,
    /// Captured output only; the container never ran or no longer exists.
    LaunchReport,
}

/// What a salvage run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SalvageReport {
    pub archive: PathBuf,
    pub stats: RepackStats,
    pub source: ArchiveSource,
}

/// Extracts log archives from failed test containers.
pub struct Salvager {
    runtime: Arc<dyn ContainerRuntime>,
    filter: PathFilter,
    output_dir: PathBuf,
    prefix: String,
}

impl Salvager {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        filter: PathFilter,
        output_dir: impl Into<PathBuf>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            runtime,
            filter,
            output_dir: output_dir.into(),
            prefix: sanitize_name(&prefix.into()),
        }
    }

    /// Output path for a test's archive.
    pub fn archive_path(&self, result: &RunResult) -> PathBuf {
        self.output_dir
            .join(format!("{}-{}-logs.tar.gz", self.prefix, result.item.slug()))
    }

    /// Exports `result`'s container and writes its filtered log archive.
    ///
    /// Launch failures, and containers the runtime no longer knows, get a
    /// launch report instead. On error the partial archive is removed.
    pub async fn salvage(&self, result: &RunResult) -> Result<SalvageReport, SalvageError> {
        let archive = self.archive_path(result);

        if matches!(result.outcome, UnitOutcome::LaunchFailed(_)) {
            return self.save_launch_report(result, archive);
        }

        debug!(test = %result.name(), container = %result.container, "Exporting container");
        match self.stream_to_archive(&result.container, &archive).await {
            Ok(stats) => {
                info!(
                    test = %result.name(),
                    archive = %archive.display(),
                    kept = stats.kept,
                    dropped = stats.dropped,
                    bytes = stats.bytes,
                    "Saved failure logs"
                );
                Ok(SalvageReport {
                    archive,
                    stats,
                    source: ArchiveSource::Filesystem,
                })
            }
            Err(SalvageError::Export {
                source: RuntimeError::ContainerNotFound { .. },
                ..
            }) => {
                warn!(
                    test = %result.name(),
                    container = %result.container,
                    "Container no longer exists, saving captured output only"
                );
                self.save_launch_report(result, archive)
            }
            Err(e) => {
                let _ = std::fs::remove_file(&archive);
                Err(e)
            }
        }
    }

    fn save_launch_report(
        &self,
        result: &RunResult,
        archive: PathBuf,
    ) -> Result<SalvageReport, SalvageError> {
        match write_launch_report(result, &archive) {
            Ok(stats) => {
                info!(
                    test = %result.name(),
                    archive = %archive.display(),
                    "Saved launch report"
                );
                Ok(SalvageReport {
                    archive,
                    stats,
                    source: ArchiveSource::LaunchReport,
                })
            }
            Err(e) => {
                let _ = std::fs::remove_file(&archive);
                Err(e)
            }
        }
    }

    async fn stream_to_archive(
        &self,
        container: &str,
        archive: &Path,
    ) -> Result<RepackStats, SalvageError> {
        let mut export = self
            .runtime
            .export(container)
            .await
            .map_err(|source| SalvageError::Export {
                container: container.to_string(),
                source,
            })?;

        let (tx, rx) = mpsc::channel::<io::Result<Vec<u8>>>(CHANNEL_DEPTH);
        let filter = self.filter.clone();
        let dest = archive.to_path_buf();
        let writer = tokio::task::spawn_blocking(move || {
            write_archive(ChannelReader::new(rx), &filter, &dest)
        });

        let pump = async move {
            while let Some(chunk) = export.next().await {
                match chunk {
                    Ok(bytes) => {
                        // The writer hung up: it has finished or failed on its own.
                        if tx.send(Ok(bytes)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(io::Error::other(e.to_string()))).await;
                        return Err(e);
                    }
                }
            }
            Ok(())
        };

        let (pumped, written) = tokio::join!(pump, writer);
        pumped.map_err(|source| SalvageError::Export {
            container: container.to_string(),
            source,
        })?;
        written.map_err(|e| SalvageError::Join(e.to_string()))?
    }
}

/// Filters `source` into a gzip-compressed tar at `dest`.
pub fn write_archive<R: io::Read>(
    source: R,
    filter: &PathFilter,
    dest: &Path,
) -> Result<RepackStats, SalvageError> {
    let file = File::create(dest)?;
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    let stats = repack_entries(source, filter, &mut builder)?;

    let encoder = builder.into_inner()?;
    let mut writer = encoder.finish()?;
    writer.flush()?;
    Ok(stats)
}

/// Text of the launch report for `result`.
pub fn launch_report(result: &RunResult) -> String {
    format!(
        "test: {}\ncontainer: {}\noutcome: {}\nduration_ms: {}\n\n--- stdout ---\n{}\n--- stderr ---\n{}\n",
        result.name(),
        result.container,
        result.outcome,
        result.duration.as_millis(),
        result.stdout,
        result.stderr,
    )
}

/// Writes a gzip-compressed tar at `dest` holding only [`LAUNCH_REPORT_ENTRY`].
pub fn write_launch_report(result: &RunResult, dest: &Path) -> Result<RepackStats, SalvageError> {
    let body = launch_report(result);
    let file = File::create(dest)?;
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    let mut header = tar::Header::new_gnu();
    header.set_size(body.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(chrono::Utc::now().timestamp().max(0) as u64);
    header.set_entry_type(tar::EntryType::Regular);
    builder.append_data(&mut header, LAUNCH_REPORT_ENTRY, body.as_bytes())?;

    let encoder = builder.into_inner()?;
    let mut writer = encoder.finish()?;
    writer.flush()?;
    Ok(RepackStats {
        kept: 1,
        dropped: 0,
        bytes: body.len() as u64,
    })
}
