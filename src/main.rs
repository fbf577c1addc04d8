//! ctest-fanout CLI entry point.
//!
//! Initializes logging and delegates to the CLI module for command handling.

use std::process::ExitCode;

use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first to get log_level
    let cli = ctest_fanout::cli::parse_cli();

    // Priority: RUST_LOG env var > --log-level CLI arg > default "info"
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| cli.log_level.clone());

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_filter)))
        .init();

    match ctest_fanout::cli::run_with_cli(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = ?e, "Uncaught exception");
            ctest_fanout::report::annotate_failure(&format!("Uncaught exception {e:#}"));
            ExitCode::FAILURE
        }
    }
}
