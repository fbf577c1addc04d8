//! Configuration for an orchestration run.
//!
//! Read once at startup; every component receives the values it needs from
//! here, including the run-scoped suffix that makes container and image
//! names unique.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::ctest::sanitize_name;

/// Default number of tests run concurrently.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Errors that can occur while building the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required value was not provided.
    #[error("Missing configuration value: {0}")]
    Missing(String),

    /// A value could not be parsed.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    // Environment settings
    /// Image the base container is created from.
    pub source_image: String,
    /// Prebuilt build tree archive on the host.
    pub build_archive: PathBuf,
    /// Directory inside the container the archive is unpacked into.
    pub work_dir: String,
    /// Build tree relative to `work_dir`.
    pub build_dir: String,

    // Test settings
    /// CTest label selecting the tests to run.
    pub tests_label: String,
    /// Hard per-test timeout handed to ctest.
    pub test_timeout: Duration,
    /// Number of tests run concurrently.
    pub batch_size: usize,
    /// Extra `KEY=VALUE` environment for test containers.
    pub container_env: Vec<String>,
    /// Run the readiness probe against the first test.
    pub readiness_probe: bool,

    // Salvage settings
    /// Path prefixes (relative to `work_dir`) kept in log archives.
    pub error_log_paths: Vec<String>,
    /// Prefix for log archive names.
    pub log_tarball_prefix: String,
    /// Directory log archives are written to.
    pub output_dir: PathBuf,
    /// Leave test containers behind instead of removing them.
    pub keep_containers: bool,

    /// Run-scoped suffix for container and image names.
    pub run_suffix: String,
}

impl OrchestratorConfig {
    /// Creates a configuration with defaults for everything but the required
    /// values.
    pub fn new(
        source_image: impl Into<String>,
        work_dir: impl Into<String>,
        tests_label: impl Into<String>,
        log_tarball_prefix: impl Into<String>,
    ) -> Self {
        let log_tarball_prefix = log_tarball_prefix.into();
        Self {
            source_image: source_image.into(),
            build_archive: PathBuf::from("build.tar.zst"),
            work_dir: work_dir.into(),
            build_dir: "build".to_string(),
            tests_label: tests_label.into(),
            test_timeout: Duration::from_secs(1500),
            batch_size: DEFAULT_BATCH_SIZE,
            container_env: vec!["GITHUB_ACTIONS=True".to_string()],
            readiness_probe: true,
            error_log_paths: Vec::new(),
            run_suffix: default_run_suffix(&log_tarball_prefix),
            log_tarball_prefix,
            output_dir: PathBuf::from("."),
            keep_containers: false,
        }
    }

    /// Sets the build archive path.
    pub fn with_build_archive(mut self, path: impl Into<PathBuf>) -> Self {
        self.build_archive = path.into();
        self
    }

    /// Sets the build directory.
    pub fn with_build_dir(mut self, dir: impl Into<String>) -> Self {
        self.build_dir = dir.into();
        self
    }

    /// Sets the per-test timeout.
    pub fn with_test_timeout(mut self, timeout: Duration) -> Self {
        self.test_timeout = timeout;
        self
    }

    /// Sets the batch size.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Sets the extra container environment.
    pub fn with_container_env(mut self, env: Vec<String>) -> Self {
        self.container_env = env;
        self
    }

    /// Enables or disables the readiness probe.
    pub fn with_readiness_probe(mut self, enabled: bool) -> Self {
        self.readiness_probe = enabled;
        self
    }

    /// Sets the salvaged path prefixes.
    pub fn with_error_log_paths(mut self, paths: Vec<String>) -> Self {
        self.error_log_paths = paths;
        self
    }

    /// Sets the archive output directory.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Keeps test containers after the run.
    pub fn with_keep_containers(mut self, keep: bool) -> Self {
        self.keep_containers = keep;
        self
    }

    /// Overrides the run suffix.
    pub fn with_run_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.run_suffix = sanitize_name(&suffix.into());
        self
    }

    /// Name of the container the archive is unpacked in.
    pub fn base_container(&self) -> String {
        format!("base-{}", self.run_suffix)
    }

    /// Name of the committed execution image. Image names must be lowercase.
    pub fn base_image(&self) -> String {
        format!("baseimage-{}", self.run_suffix).to_lowercase()
    }

    /// Batch size as a non-zero count.
    pub fn batch_size(&self) -> Result<NonZeroUsize, ConfigError> {
        NonZeroUsize::new(self.batch_size).ok_or_else(|| {
            ConfigError::ValidationFailed("batch_size must be at least 1".to_string())
        })
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source_image.trim().is_empty() {
            return Err(ConfigError::Missing("source image".to_string()));
        }
        if self.tests_label.trim().is_empty() {
            return Err(ConfigError::Missing("tests label".to_string()));
        }
        if self.log_tarball_prefix.trim().is_empty() {
            return Err(ConfigError::Missing("log tarball prefix".to_string()));
        }
        if !self.work_dir.starts_with('/') {
            return Err(ConfigError::ValidationFailed(format!(
                "work_dir must be an absolute path, got '{}'",
                self.work_dir
            )));
        }
        if self.build_dir.trim_matches('/').is_empty() {
            return Err(ConfigError::ValidationFailed(
                "build_dir cannot be empty".to_string(),
            ));
        }
        if self.test_timeout.as_secs() == 0 {
            return Err(ConfigError::ValidationFailed(
                "test_timeout must be at least one second".to_string(),
            ));
        }
        if self.run_suffix.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "run_suffix cannot be empty".to_string(),
            ));
        }
        if let Some(bad) = self.container_env.iter().find(|e| !e.contains('=')) {
            return Err(ConfigError::InvalidValue {
                key: "container_env".to_string(),
                message: format!("'{bad}' is not KEY=VALUE"),
            });
        }
        self.batch_size()?;
        Ok(())
    }
}

/// `{GITHUB_RUN_ID}-{GITHUB_JOB}-{prefix}-{random}`, with `local` standing in
/// for variables that are not set.
pub fn default_run_suffix(prefix: &str) -> String {
    let var = |key: &str| {
        std::env::var(key)
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "local".to_string())
    };
    let random = Uuid::new_v4().as_u128() % 10_000;
    sanitize_name(&format!(
        "{}-{}-{}-{}",
        var("GITHUB_RUN_ID"),
        var("GITHUB_JOB"),
        prefix,
        random
    ))
}

/// Working directory GitHub Actions container jobs use for `owner/name`.
pub fn github_work_dir(repository: &str) -> Option<String> {
    let name = repository.split('/').nth(1).filter(|n| !n.is_empty())?;
    Some(format!("/__w/{name}/{name}"))
}

/// Parses salvage prefixes given either as a JSON array or a comma-separated
/// list.
pub fn parse_path_list(raw: &str) -> Result<Vec<String>, ConfigError> {
    let raw = raw.trim();
    if raw.starts_with('[') {
        return serde_json::from_str(raw).map_err(|e| ConfigError::InvalidValue {
            key: "error-log-paths".to_string(),
            message: e.to_string(),
        });
    }
    Ok(raw
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> OrchestratorConfig {
        OrchestratorConfig::new(
            "ghcr.io/org/builder:22.04",
            "/__w/repo/repo",
            "wasm",
            "linux",
        )
        .with_run_suffix("77-Test-linux-12")
    }

    #[test]
    fn test_defaults() {
        let config = config();
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.build_dir, "build");
        assert_eq!(config.build_archive, PathBuf::from("build.tar.zst"));
        assert_eq!(config.container_env, vec!["GITHUB_ACTIONS=True"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_derived_names() {
        let config = config();
        assert_eq!(config.base_container(), "base-77-Test-linux-12");
        assert_eq!(config.base_image(), "baseimage-77-test-linux-12");
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let config = config().with_batch_size(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_relative_work_dir_rejected() {
        let config = OrchestratorConfig::new("img", "work", "wasm", "linux");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_container_env_rejected() {
        let config = config().with_container_env(vec!["NOVALUE".to_string()]);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_default_run_suffix_is_name_safe() {
        let suffix = default_run_suffix("linux/arm64");
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')));
        assert!(suffix.contains("linux_arm64"));
    }

    #[test]
    fn test_github_work_dir() {
        assert_eq!(
            github_work_dir("org/chain").as_deref(),
            Some("/__w/chain/chain")
        );
        assert_eq!(github_work_dir("nope"), None);
    }

    #[test]
    fn test_parse_path_list() {
        assert_eq!(
            parse_path_list(r#"["build/Testing", "build/logs"]"#).unwrap(),
            vec!["build/Testing", "build/logs"]
        );
        assert_eq!(
            parse_path_list(" build/Testing , build/logs ,").unwrap(),
            vec!["build/Testing", "build/logs"]
        );
        assert!(parse_path_list("[unterminated").is_err());
    }
}
