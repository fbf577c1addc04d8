//! Orchestrator for one end-to-end test run.
//!
//! This module provides the `Orchestrator` that coordinates:
//! - Execution image construction
//! - Test discovery and the optional readiness probe
//! - Batched test execution
//! - Log salvage for failed tests
//! - Cleanup of leftover test containers

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::discovery::{self, WorkItem};
use crate::environment::{self, ExecutionEnvironment};
use crate::error::{OrchestratorError, RuntimeError};
use crate::execution::ContainerRuntime;
use crate::report::Summary;
use crate::runner::{RunResult, Tagged, Transcript, UnitRunner};
use crate::salvage::{PathFilter, Salvager};
use crate::scheduler::BatchScheduler;

use super::config::OrchestratorConfig;

/// Tag for output of the base container.
const ENVIRONMENT_TAG: &str = "environment";

/// Drives a whole run against one container runtime.
pub struct Orchestrator {
    config: OrchestratorConfig,
    runtime: Arc<dyn ContainerRuntime>,
    transcript: Arc<dyn Transcript>,
}

impl Orchestrator {
    /// Creates an orchestrator after validating `config`.
    pub fn new(
        config: OrchestratorConfig,
        runtime: Arc<dyn ContainerRuntime>,
        transcript: Arc<dyn Transcript>,
    ) -> Result<Self, OrchestratorError> {
        config.validate()?;
        Ok(Self {
            config,
            runtime,
            transcript,
        })
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Builds the execution image and lists the tests carrying the label.
    pub async fn prepare(
        &self,
    ) -> Result<(ExecutionEnvironment, Vec<WorkItem>), OrchestratorError> {
        let sink = Tagged::new(ENVIRONMENT_TAG, self.transcript.as_ref());
        let env =
            environment::build_environment(self.runtime.as_ref(), &self.config, &sink).await?;
        let items =
            discovery::discover(self.runtime.as_ref(), &env, &self.config.tests_label).await?;
        Ok((env, items))
    }

    /// Runs every discovered test and salvages logs for the failures.
    ///
    /// Only environment and discovery failures are returned as errors. Test
    /// failures and salvage failures end up in the [`Summary`].
    pub async fn run(&self) -> Result<Summary, OrchestratorError> {
        let started = Instant::now();
        info!(
            image = %self.config.source_image,
            label = %self.config.tests_label,
            run_suffix = %self.config.run_suffix,
            "Starting test run"
        );

        let (env, items) = self.prepare().await?;
        if items.is_empty() {
            warn!(label = %self.config.tests_label, "No tests carry the label");
        } else if self.config.readiness_probe {
            discovery::probe_readiness(self.runtime.as_ref(), &env, &items[0]).await;
        }

        let runner = UnitRunner::new(self.runtime.clone(), env, self.transcript.clone())
            .with_timeout(self.config.test_timeout)
            .with_run_suffix(self.config.run_suffix.clone())
            .with_container_env(self.config.container_env.clone())
            .with_remove_passed(!self.config.keep_containers);
        let scheduler = BatchScheduler::new(runner, self.config.batch_size()?);

        let results = scheduler.run_all(&items).await;
        let mut summary = Summary::from_results(&results);

        if !summary.is_success() {
            match std::fs::create_dir_all(&self.config.output_dir) {
                Ok(()) => self.salvage_failures(&results, &mut summary).await,
                Err(e) => {
                    warn!(
                        dir = %self.config.output_dir.display(),
                        error = %e,
                        "Cannot create log directory, keeping failed containers"
                    );
                    let message = format!(
                        "cannot create {}: {e}",
                        self.config.output_dir.display()
                    );
                    let failed: Vec<String> =
                        summary.failed_names().into_iter().map(String::from).collect();
                    for name in &failed {
                        summary.record_salvage_error(name, message.clone());
                    }
                }
            }
        }

        info!(
            passed = summary.passed,
            failed = summary.failed,
            elapsed_secs = started.elapsed().as_secs(),
            "Test run complete"
        );
        Ok(summary)
    }

    /// Salvages logs of every failed result, in result order.
    async fn salvage_failures(&self, results: &[RunResult], summary: &mut Summary) {
        let filter = PathFilter::new(
            &self.config.work_dir,
            &self.config.build_dir,
            self.config.error_log_paths.clone(),
        );
        let salvager = Salvager::new(
            self.runtime.clone(),
            filter,
            self.config.output_dir.clone(),
            self.config.log_tarball_prefix.clone(),
        );

        for result in results.iter().filter(|r| !r.is_success()) {
            let salvaged = match salvager.salvage(result).await {
                Ok(report) => {
                    debug!(test = %result.name(), source = ?report.source, "Archive recorded");
                    summary.record_archive(result.name(), report.archive);
                    true
                }
                Err(e) => {
                    warn!(test = %result.name(), error = %e, "Failed to salvage logs");
                    summary.record_salvage_error(result.name(), e.to_string());
                    false
                }
            };

            if self.config.keep_containers {
                continue;
            }
            // Without an archive the container is the only copy of the logs.
            if !salvaged {
                warn!(
                    test = %result.name(),
                    container = %result.container,
                    "Keeping container for manual export"
                );
                continue;
            }
            match self.runtime.remove(&result.container, true).await {
                Ok(()) => {}
                Err(RuntimeError::ContainerNotFound { .. }) => {
                    debug!(container = %result.container, "Test container already gone");
                }
                Err(e) => {
                    warn!(
                        container = %result.container,
                        error = %e,
                        "Failed to remove test container"
                    );
                }
            }
        }
    }
}
