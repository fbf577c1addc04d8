//! Runs one test in its own container.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::ctest::command;
use crate::discovery::WorkItem;
use crate::environment::ExecutionEnvironment;
use crate::execution::{ContainerConfig, ContainerRuntime};

use super::result::{RunResult, UnitOutcome};
use super::transcript::{Tagged, Transcript};

/// Launches one disposable container per test.
///
/// `run` never returns an error: a runtime that cannot start the container
/// yields [`UnitOutcome::LaunchFailed`], so a batch always resolves fully.
pub struct UnitRunner {
    runtime: Arc<dyn ContainerRuntime>,
    env: ExecutionEnvironment,
    timeout: Duration,
    run_suffix: String,
    container_env: Vec<String>,
    remove_passed: bool,
    transcript: Arc<dyn Transcript>,
}

impl UnitRunner {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        env: ExecutionEnvironment,
        transcript: Arc<dyn Transcript>,
    ) -> Self {
        Self {
            runtime,
            env,
            timeout: Duration::from_secs(1500),
            run_suffix: "local".to_string(),
            container_env: Vec::new(),
            remove_passed: false,
            transcript,
        }
    }

    /// Sets the per-test timeout handed to ctest.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the run-scoped suffix that makes container names unique.
    pub fn with_run_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.run_suffix = suffix.into();
        self
    }

    /// Sets extra `KEY=VALUE` environment for test containers.
    pub fn with_container_env(mut self, env: Vec<String>) -> Self {
        self.container_env = env;
        self
    }

    /// Removes a test's container as soon as it passes.
    pub fn with_remove_passed(mut self, remove: bool) -> Self {
        self.remove_passed = remove;
        self
    }

    /// Container name for `item`: `{slug}-{suffix}`.
    pub fn container_name(&self, item: &WorkItem) -> String {
        format!("{}-{}", item.slug(), self.run_suffix)
    }

    /// Container configuration for `item`.
    pub fn container_config(&self, item: &WorkItem) -> ContainerConfig {
        ContainerConfig::new(
            self.env.image.clone(),
            command::run_test(&self.env.build_dir, &item.name, self.timeout),
        )
        .with_name(self.container_name(item))
        .with_security_opt("seccomp=unconfined")
        .with_env(self.container_env.clone())
        .with_init()
    }

    /// Runs `item` to completion.
    pub async fn run(&self, item: &WorkItem) -> RunResult {
        let container = self.container_name(item);
        let config = self.container_config(item);
        let sink = Tagged::new(&item.name, self.transcript.as_ref());
        let start = Instant::now();

        debug!(test = %item.name, container = %container, "Launching test container");
        let (outcome, stdout, stderr) = match self.runtime.run(&config, &sink).await {
            Ok(output) => {
                let outcome = match output.exit_code {
                    Some(code) => UnitOutcome::Exited(code),
                    None => UnitOutcome::Killed,
                };
                (outcome, output.stdout, output.stderr)
            }
            Err(e) => {
                warn!(test = %item.name, error = %e, "Failed to launch test container");
                (UnitOutcome::LaunchFailed(e.to_string()), String::new(), String::new())
            }
        };

        let duration = start.elapsed();
        info!(
            test = %item.name,
            outcome = %outcome,
            duration_ms = duration.as_millis() as u64,
            "Test finished"
        );

        if self.remove_passed && outcome.is_success() {
            if let Err(e) = self.runtime.remove(&container, true).await {
                warn!(container = %container, error = %e, "Failed to remove passed container");
            }
        }

        RunResult {
            item: item.clone(),
            container,
            outcome,
            stdout,
            stderr,
            duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RuntimeError;
    use crate::execution::{ExecResult, ExportStream, LineSink, OutputStream};
    use crate::runner::Console;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Scripted {
        result: fn() -> Result<ExecResult, RuntimeError>,
        removed: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(result: fn() -> Result<ExecResult, RuntimeError>) -> Arc<Self> {
            Arc::new(Self {
                result,
                removed: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ContainerRuntime for Scripted {
        async fn run(
            &self,
            _config: &ContainerConfig,
            sink: &dyn LineSink,
        ) -> Result<ExecResult, RuntimeError> {
            sink.line(OutputStream::Stdout, "running");
            (self.result)()
        }

        async fn commit(&self, _container: &str, _image: &str) -> Result<(), RuntimeError> {
            Ok(())
        }

        async fn remove(&self, container: &str, _force: bool) -> Result<(), RuntimeError> {
            self.removed.lock().unwrap().push(container.to_string());
            Ok(())
        }

        async fn export(&self, container: &str) -> Result<ExportStream, RuntimeError> {
            Err(RuntimeError::ContainerNotFound {
                id: container.to_string(),
            })
        }
    }

    fn env() -> ExecutionEnvironment {
        ExecutionEnvironment {
            image: "baseimage-run1".to_string(),
            work_dir: "/__w/repo/repo".to_string(),
            build_dir: "build".to_string(),
        }
    }

    fn runner(runtime: Arc<Scripted>) -> UnitRunner {
        UnitRunner::new(runtime, env(), Arc::new(Console))
            .with_run_suffix("run1")
            .with_timeout(Duration::from_secs(60))
    }

    #[test]
    fn test_container_config() {
        let runtime = Scripted::new(|| Ok(ExecResult::default()));
        let runner = runner(runtime).with_container_env(vec!["GITHUB_ACTIONS=True".to_string()]);
        let config = runner.container_config(&WorkItem::new("net/sync"));

        assert_eq!(config.name.as_deref(), Some("net_sync-run1"));
        assert_eq!(config.image, "baseimage-run1");
        assert_eq!(config.security_opts, vec!["seccomp=unconfined"]);
        assert_eq!(config.env, vec!["GITHUB_ACTIONS=True"]);
        assert!(config.init);
        assert!(!config.auto_remove);
        assert!(config.cmd[2].contains("-R '^net/sync$' --timeout 60"));
    }

    #[tokio::test]
    async fn test_exit_code_is_recorded() {
        let runtime = Scripted::new(|| {
            Ok(ExecResult {
                exit_code: Some(8),
                stdout: "1 test failed\n".to_string(),
                stderr: String::new(),
            })
        });
        let result = runner(runtime).run(&WorkItem::new("db_test")).await;

        assert_eq!(result.outcome, UnitOutcome::Exited(8));
        assert_eq!(result.container, "db_test-run1");
        assert_eq!(result.stdout, "1 test failed\n");
        assert!(!result.is_success());
    }

    #[tokio::test]
    async fn test_launch_error_becomes_result() {
        let runtime = Scripted::new(|| Err(RuntimeError::LaunchFailed("no docker".to_string())));
        let result = runner(runtime).run(&WorkItem::new("db_test")).await;

        match result.outcome {
            UnitOutcome::LaunchFailed(msg) => assert!(msg.contains("no docker")),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_exit_code_is_killed() {
        let runtime = Scripted::new(|| Ok(ExecResult::default()));
        let result = runner(runtime).run(&WorkItem::new("db_test")).await;
        assert_eq!(result.outcome, UnitOutcome::Killed);
    }

    #[tokio::test]
    async fn test_passed_container_removed_when_requested() {
        let runtime = Scripted::new(|| {
            Ok(ExecResult {
                exit_code: Some(0),
                ..Default::default()
            })
        });
        let runner = runner(runtime.clone()).with_remove_passed(true);

        let passed = runner.run(&WorkItem::new("ok_test")).await;
        assert!(passed.is_success());
        assert_eq!(*runtime.removed.lock().unwrap(), vec!["ok_test-run1"]);
    }
}
