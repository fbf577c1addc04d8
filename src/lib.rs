//! ctest-fanout: parallel CTest execution in disposable containers.
//!
//! This library unpacks a prebuilt build tree into a shared container image,
//! runs a labelled test suite against it in bounded batches, and salvages
//! filtered log archives from the containers of failed tests.

// Core modules
pub mod cli;
pub mod ctest;
pub mod discovery;
pub mod environment;
pub mod error;
pub mod execution;
pub mod pipeline;
pub mod report;
pub mod runner;
pub mod salvage;
pub mod scheduler;

// Re-export commonly used error types
pub use error::{DiscoveryError, EnvironmentError, OrchestratorError, RuntimeError, SalvageError};
