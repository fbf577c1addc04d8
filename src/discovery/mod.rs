//! Test discovery against the committed execution image.
//!
//! Runs a labelled `ctest --show-only=json-v1` query in a throwaway container
//! and turns the listing into an ordered sequence of [`WorkItem`]s. The order
//! of the listing is the order of every later result.

pub mod probe;

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info};

use crate::ctest::{command, sanitize_name, CtestListing};
use crate::environment::ExecutionEnvironment;
use crate::error::DiscoveryError;
use crate::execution::{ContainerConfig, ContainerRuntime, Quiet};

pub use probe::{probe_readiness, ProbeReport};

/// One independently schedulable test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkItem {
    /// CTest test name.
    pub name: String,
    /// Labels attached to the test.
    pub labels: Vec<String>,
    /// Test command line, empty if the executable was not built.
    pub command: Vec<String>,
    /// Working directory the test runs in, when set.
    pub working_directory: Option<String>,
}

impl WorkItem {
    /// Creates a work item with only a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: Vec::new(),
            command: Vec::new(),
            working_directory: None,
        }
    }

    /// Name fragment safe for container names and file names.
    pub fn slug(&self) -> String {
        sanitize_name(&self.name)
    }
}

/// Parses a `json-v1` listing into work items, preserving listing order.
///
/// Empty names are rejected, as are names that collide once sanitized: both
/// would make container names ambiguous.
pub fn parse_work_items(raw: &str) -> Result<Vec<WorkItem>, DiscoveryError> {
    let listing = CtestListing::parse(raw)?;
    let mut seen = HashSet::new();
    let mut items = Vec::with_capacity(listing.tests.len());

    for entry in listing.tests {
        if entry.name.trim().is_empty() {
            return Err(DiscoveryError::EmptyName);
        }
        if !seen.insert(sanitize_name(&entry.name)) {
            return Err(DiscoveryError::DuplicateName(entry.name));
        }
        items.push(WorkItem {
            labels: entry.labels(),
            working_directory: entry.working_directory(),
            command: entry.command,
            name: entry.name,
        });
    }

    Ok(items)
}

/// Queries the image for tests carrying `label`.
///
/// # Errors
///
/// A non-zero exit from the query is fatal and carries the raw query output.
pub async fn discover(
    runtime: &dyn ContainerRuntime,
    env: &ExecutionEnvironment,
    label: &str,
) -> Result<Vec<WorkItem>, DiscoveryError> {
    let config = ContainerConfig::new(env.image.clone(), command::list_tests(&env.build_dir, label))
        .with_auto_remove();

    debug!(image = %env.image, label, "Querying tests");
    let output = runtime.run(&config, &Quiet).await?;

    if !output.success() {
        return Err(DiscoveryError::QueryFailed {
            label: label.to_string(),
            code: output.code_label(),
            stdout: output.stdout,
            stderr: output.stderr,
        });
    }

    let items = parse_work_items(&output.stdout)?;
    info!(label, count = items.len(), "Discovered tests");
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_preserves_listing_order() {
        let raw = r#"{"tests":[{"name":"zeta"},{"name":"alpha"},{"name":"mid"}]}"#;
        let names: Vec<_> = parse_work_items(raw)
            .unwrap()
            .into_iter()
            .map(|i| i.name)
            .collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_parse_carries_metadata() {
        let raw = r#"{"tests":[{
            "name":"db_test",
            "command":["/w/build/db_test"],
            "properties":[
                {"name":"LABELS","value":["long_running_tests"]},
                {"name":"WORKING_DIRECTORY","value":"/w/build"}
            ]
        }]}"#;
        let items = parse_work_items(raw).unwrap();
        assert_eq!(items[0].labels, vec!["long_running_tests"]);
        assert_eq!(items[0].command, vec!["/w/build/db_test"]);
        assert_eq!(items[0].working_directory.as_deref(), Some("/w/build"));
    }

    #[test]
    fn test_parse_rejects_empty_name() {
        let raw = r#"{"tests":[{"name":"  "}]}"#;
        assert!(matches!(
            parse_work_items(raw),
            Err(DiscoveryError::EmptyName)
        ));
    }

    #[test]
    fn test_parse_rejects_colliding_names() {
        let raw = r#"{"tests":[{"name":"suite/case"},{"name":"suite:case"}]}"#;
        match parse_work_items(raw) {
            Err(DiscoveryError::DuplicateName(name)) => assert_eq!(name, "suite:case"),
            other => panic!("expected duplicate error, got {other:?}"),
        }
    }

    #[test]
    fn test_slug() {
        assert_eq!(WorkItem::new("net/plugin:sync").slug(), "net_plugin_sync");
    }
}
