//! Command-line interface for ctest-fanout.
//!
//! Provides the `run` and `list` commands.

mod commands;

pub use commands::{
    parse_cli, run, run_with_cli, Cli, Commands, EnvironmentArgs, ListArgs, RunArgs,
};
