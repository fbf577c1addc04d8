//! End-to-end orchestration of a test run.
//!
//! # Pipeline Flow
//!
//! 1. **Environment**: the build archive is unpacked in a base container
//!    and committed as the execution image
//! 2. **Discovery**: the image is queried for tests carrying the label
//! 3. **Execution**: tests run in batches, one container per test
//! 4. **Salvage**: each failed container is exported into a log archive
//! 5. **Report**: results are aggregated into a [`Summary`](crate::report::Summary)
//!
//! # Example
//!
//! ```rust,ignore
//! use ctest_fanout::execution::{connect, Backend};
//! use ctest_fanout::pipeline::{Orchestrator, OrchestratorConfig};
//! use ctest_fanout::runner::Console;
//! use std::sync::Arc;
//!
//! let config = OrchestratorConfig::new("ghcr.io/org/builder", "/__w/repo/repo", "nightly", "linux")
//!     .with_error_log_paths(vec!["build/Testing".to_string()]);
//! let runtime = connect(Backend::Cli, None)?;
//! let summary = Orchestrator::new(config, runtime, Arc::new(Console))?.run().await?;
//! println!("{}", summary.render());
//! ```

pub mod config;
pub mod orchestrator;

pub use config::{
    default_run_suffix, github_work_dir, parse_path_list, ConfigError, OrchestratorConfig,
    DEFAULT_BATCH_SIZE,
};
pub use orchestrator::Orchestrator;
