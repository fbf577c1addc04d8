//! CLI command definitions for ctest-fanout.
//!
//! Every flag has an environment fallback so the binary can run as a
//! workflow step with its inputs passed through the environment.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use crate::execution::{self, Backend, ContainerRuntime};
use crate::pipeline::{
    github_work_dir, parse_path_list, Orchestrator, OrchestratorConfig, DEFAULT_BATCH_SIZE,
};
use crate::report::annotate_failure;
use crate::runner::Console;

/// Fans a labelled CTest suite out over disposable containers.
#[derive(Parser)]
#[command(name = "ctest-fanout")]
#[command(about = "Run a labelled CTest suite in parallel containers and salvage failure logs")]
#[command(version)]
#[command(
    long_about = "ctest-fanout unpacks a prebuilt build tree into a container image once, then runs every test carrying a CTest label in its own container, a batch at a time.\n\nFor each failed test the container's filesystem is exported and the configured log paths are saved as {prefix}-{test}-logs.tar.gz.\n\nExample usage:\n  ctest-fanout run --image ghcr.io/org/builder:22.04 --tests-label nightly --log-tarball-prefix linux --error-log-paths '[\"build/Testing\"]'"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Build the execution image, run every labelled test, salvage failure logs.
    Run(RunArgs),

    /// Build the execution image and print the tests carrying the label.
    #[command(alias = "ls")]
    List(ListArgs),
}

/// Options shared by every subcommand.
#[derive(Parser, Debug, Clone)]
pub struct EnvironmentArgs {
    /// Image the build tree is unpacked into.
    #[arg(long, env = "CONTAINER")]
    pub image: String,

    /// Prebuilt build tree archive.
    #[arg(long, env = "BUILD_ARCHIVE", default_value = "build.tar.zst")]
    pub build_archive: PathBuf,

    /// Directory the archive is unpacked into. Defaults to the Actions
    /// workspace of `GITHUB_REPOSITORY`.
    #[arg(long, env = "WORK_DIR")]
    pub work_dir: Option<String>,

    /// Build tree relative to the working directory.
    #[arg(long, env = "BUILD_DIR", default_value = "build")]
    pub build_dir: String,

    /// CTest label selecting the tests.
    #[arg(long, env = "TESTS_LABEL")]
    pub tests_label: String,

    /// Prefix for log archives and the run suffix.
    #[arg(long, env = "LOG_TARBALL_PREFIX")]
    pub log_tarball_prefix: String,

    /// Docker daemon to talk to.
    #[arg(long, env = "DOCKER_HOST")]
    pub docker_host: Option<String>,

    /// Container runtime backend.
    #[arg(long, value_enum, default_value_t = Backend::Cli)]
    pub backend: Backend,

    /// Run-scoped suffix for container and image names.
    #[arg(long, env = "RUN_SUFFIX")]
    pub run_suffix: Option<String>,
}

/// Arguments for the run command.
#[derive(Parser, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub env: EnvironmentArgs,

    /// Paths kept in log archives, relative to the working directory, as a
    /// JSON array or a comma-separated list.
    #[arg(long, env = "ERROR_LOG_PATHS")]
    pub error_log_paths: Option<String>,

    /// Per-test timeout in seconds.
    #[arg(long, env = "TEST_TIMEOUT", default_value = "1500")]
    pub test_timeout: u64,

    /// Number of tests run at the same time.
    #[arg(long, env = "BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Directory log archives are written to.
    #[arg(short = 'o', long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Extra KEY=VALUE environment for test containers.
    #[arg(long = "container-env", default_value = "GITHUB_ACTIONS=True")]
    pub container_env: Vec<String>,

    /// Leave test containers behind after the run.
    #[arg(long)]
    pub keep_containers: bool,

    /// Write a JSON summary to this path.
    #[arg(long)]
    pub summary_json: Option<PathBuf>,

    /// Skip the readiness probe.
    #[arg(long)]
    pub skip_probe: bool,
}

/// Arguments for the list command.
#[derive(Parser, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub env: EnvironmentArgs,

    /// Print the listing as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<ExitCode> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Commands::Run(args) => run_tests_command(args).await,
        Commands::List(args) => run_list_command(args).await,
    }
}

impl EnvironmentArgs {
    fn resolve_work_dir(&self) -> anyhow::Result<String> {
        if let Some(dir) = &self.work_dir {
            return Ok(dir.clone());
        }
        let repository = std::env::var("GITHUB_REPOSITORY")
            .context("--work-dir not given and GITHUB_REPOSITORY is not set")?;
        github_work_dir(&repository)
            .with_context(|| format!("GITHUB_REPOSITORY '{repository}' is not owner/name"))
    }

    fn config(&self) -> anyhow::Result<OrchestratorConfig> {
        let mut config = OrchestratorConfig::new(
            self.image.clone(),
            self.resolve_work_dir()?,
            self.tests_label.clone(),
            self.log_tarball_prefix.clone(),
        )
        .with_build_archive(self.build_archive.clone())
        .with_build_dir(self.build_dir.clone());
        if let Some(suffix) = &self.run_suffix {
            config = config.with_run_suffix(suffix.clone());
        }
        Ok(config)
    }

    fn connect(&self) -> anyhow::Result<Arc<dyn ContainerRuntime>> {
        let host = self.docker_host.as_deref().filter(|h| !h.is_empty());
        info!(
            backend = ?self.backend,
            host = host.unwrap_or("default /var/run/docker.sock"),
            "Using Docker host"
        );
        execution::connect(self.backend, host).context("Failed to connect to container runtime")
    }
}

impl RunArgs {
    /// Converts the arguments into an orchestrator configuration.
    pub fn config(&self) -> anyhow::Result<OrchestratorConfig> {
        let error_log_paths = match &self.error_log_paths {
            Some(raw) => parse_path_list(raw)?,
            None => Vec::new(),
        };
        Ok(self
            .env
            .config()?
            .with_error_log_paths(error_log_paths)
            .with_test_timeout(Duration::from_secs(self.test_timeout))
            .with_batch_size(self.batch_size)
            .with_output_dir(self.output_dir.clone())
            .with_container_env(self.container_env.clone())
            .with_keep_containers(self.keep_containers)
            .with_readiness_probe(!self.skip_probe))
    }
}

async fn run_tests_command(args: RunArgs) -> anyhow::Result<ExitCode> {
    let config = args.config()?;
    let runtime = args.env.connect()?;
    let orchestrator = Orchestrator::new(config, runtime, Arc::new(Console))?;

    let summary = orchestrator.run().await?;
    println!("{}", summary.render());

    if let Some(path) = &args.summary_json {
        summary
            .write_json(path)
            .with_context(|| format!("Failed to write summary to {}", path.display()))?;
        info!(path = %path.display(), "Wrote summary");
    }

    if summary.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        annotate_failure(&format!(
            "Some tests failed: {}",
            summary.failed_names().join(", ")
        ));
        Ok(ExitCode::FAILURE)
    }
}

async fn run_list_command(args: ListArgs) -> anyhow::Result<ExitCode> {
    let config = args.env.config()?;
    let runtime = args.env.connect()?;
    let orchestrator = Orchestrator::new(config, runtime, Arc::new(Console))?;

    let (_, items) = orchestrator.prepare().await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        for item in &items {
            println!("{}", item.name);
        }
        println!("{} tests", items.len());
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    const REQUIRED: [&str; 7] = [
        "--image",
        "ghcr.io/org/builder:22.04",
        "--tests-label",
        "nightly",
        "--log-tarball-prefix",
        "linux",
        "--work-dir=/__w/chain/chain",
    ];

    fn parse_run(extra: &[&str]) -> RunArgs {
        let mut args = vec!["ctest-fanout", "run"];
        args.extend(REQUIRED);
        args.extend(extra);
        match Cli::try_parse_from(args).expect("should parse").command {
            Commands::Run(args) => args,
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_command_defaults() {
        let args = parse_run(&[]);
        assert_eq!(args.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(args.test_timeout, 1500);
        assert_eq!(args.container_env, vec!["GITHUB_ACTIONS=True"]);
        assert_eq!(args.env.backend, Backend::Cli);
        assert!(!args.keep_containers);
        assert!(!args.skip_probe);

        let config = args.config().unwrap();
        assert_eq!(config.work_dir, "/__w/chain/chain");
        assert_eq!(config.build_archive, PathBuf::from("build.tar.zst"));
        assert!(config.error_log_paths.is_empty());
        assert!(config.readiness_probe);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_run_command_with_options() {
        let args = parse_run(&[
            "--error-log-paths",
            r#"["build/Testing","build/logs"]"#,
            "--test-timeout",
            "90",
            "--batch-size",
            "4",
            "--backend",
            "api",
            "--run-suffix",
            "42-test-linux-7",
            "--container-env",
            "A=1",
            "--container-env",
            "B=2",
            "--keep-containers",
            "--skip-probe",
        ]);
        let config = args.config().unwrap();
        assert_eq!(config.error_log_paths, vec!["build/Testing", "build/logs"]);
        assert_eq!(config.test_timeout, Duration::from_secs(90));
        assert_eq!(config.batch_size, 4);
        assert_eq!(config.container_env, vec!["A=1", "B=2"]);
        assert_eq!(config.base_image(), "baseimage-42-test-linux-7");
        assert!(config.keep_containers);
        assert!(!config.readiness_probe);
        assert_eq!(args.env.backend, Backend::Api);
    }

    #[test]
    fn test_zero_batch_size_fails_validation() {
        let config = parse_run(&["--batch-size", "0"]).config().unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_list_command() {
        let mut args = vec!["ctest-fanout", "ls", "--json"];
        args.extend(REQUIRED);
        let cli = Cli::try_parse_from(args).expect("should parse");
        match cli.command {
            Commands::List(args) => {
                assert!(args.json);
                assert_eq!(args.env.tests_label, "nightly");
            }
            _ => panic!("Expected List command"),
        }
    }

    #[test]
    fn test_missing_image_is_rejected() {
        if std::env::var_os("CONTAINER").is_some() {
            return;
        }
        let result = Cli::try_parse_from(["ctest-fanout", "run", "--tests-label", "x"]);
        assert!(result.is_err());
    }
}
