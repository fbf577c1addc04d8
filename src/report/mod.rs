//! Aggregation of run results into a pass/fail summary.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::runner::{RunResult, UnitOutcome};

const BANNER: &str = "==== Parallel test results ====";
const RULE: &str = "================================";

/// Per-test line of the summary.
#[derive(Debug, Clone, Serialize)]
pub struct ItemSummary {
    pub name: String,
    pub container: String,
    pub outcome: UnitOutcome,
    pub passed: bool,
    pub duration_ms: u64,
    /// Salvaged log archive, for failed tests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive: Option<PathBuf>,
    /// Why salvage failed, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub salvage_error: Option<String>,
}

/// Totals and per-test outcomes of one orchestration run.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub generated_at: DateTime<Utc>,
    pub passed: usize,
    pub failed: usize,
    pub items: Vec<ItemSummary>,
}

impl Summary {
    /// Builds the summary, in result order.
    pub fn from_results(results: &[RunResult]) -> Self {
        let items: Vec<ItemSummary> = results
            .iter()
            .map(|r| ItemSummary {
                name: r.item.name.clone(),
                container: r.container.clone(),
                outcome: r.outcome.clone(),
                passed: r.is_success(),
                duration_ms: r.duration.as_millis() as u64,
                archive: None,
                salvage_error: None,
            })
            .collect();
        let passed = items.iter().filter(|i| i.passed).count();

        Self {
            generated_at: Utc::now(),
            passed,
            failed: items.len() - passed,
            items,
        }
    }

    /// A single failing test fails the whole run.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Names of the failed tests, in order.
    pub fn failed_names(&self) -> Vec<&str> {
        self.items
            .iter()
            .filter(|i| !i.passed)
            .map(|i| i.name.as_str())
            .collect()
    }

    /// Records a salvaged archive for test `name`.
    pub fn record_archive(&mut self, name: &str, archive: PathBuf) {
        if let Some(item) = self.items.iter_mut().find(|i| i.name == name) {
            item.archive = Some(archive);
        }
    }

    /// Records a salvage failure for test `name`.
    pub fn record_salvage_error(&mut self, name: &str, error: impl Into<String>) {
        if let Some(item) = self.items.iter_mut().find(|i| i.name == name) {
            item.salvage_error = Some(error.into());
        }
    }

    /// Human-readable result table.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{BANNER}");
        for item in &self.items {
            let _ = writeln!(out, "Test {} → {}", item.name, item.outcome);
        }
        let _ = writeln!(out, "{RULE}");
        let _ = write!(out, "{} failed, {} passed", self.failed, self.passed);
        out
    }

    /// Writes the summary as pretty JSON.
    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
    }
}

/// Emits a GitHub Actions `::error::` annotation when running as a workflow
/// step.
pub fn annotate_failure(message: &str) {
    if std::env::var("GITHUB_ACTIONS").is_ok_and(|v| v == "true") {
        println!("::error::{}", message.replace('\n', "%0A"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::WorkItem;
    use std::time::Duration;

    fn result(name: &str, outcome: UnitOutcome) -> RunResult {
        RunResult {
            item: WorkItem::new(name),
            container: format!("{name}-run"),
            outcome,
            stdout: String::new(),
            stderr: String::new(),
            duration: Duration::from_millis(1500),
        }
    }

    fn sample() -> Summary {
        Summary::from_results(&[
            result("A", UnitOutcome::Exited(1)),
            result("B", UnitOutcome::Exited(0)),
            result("C", UnitOutcome::LaunchFailed("cannot start".to_string())),
        ])
    }

    #[test]
    fn test_totals() {
        let summary = sample();
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.passed, 1);
        assert!(!summary.is_success());
        assert_eq!(summary.failed_names(), vec!["A", "C"]);
    }

    #[test]
    fn test_render() {
        let text = sample().render();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], BANNER);
        assert_eq!(lines[1], "Test A → exit 1");
        assert_eq!(lines[2], "Test B → exit 0");
        assert_eq!(lines[3], "Test C → launch error: cannot start");
        assert_eq!(lines[4], RULE);
        assert_eq!(lines[5], "2 failed, 1 passed");
    }

    #[test]
    fn test_empty_run_succeeds() {
        let summary = Summary::from_results(&[]);
        assert!(summary.is_success());
        assert!(summary.render().ends_with("0 failed, 0 passed"));
    }

    #[test]
    fn test_json_includes_archives() {
        let mut summary = sample();
        summary.record_archive("A", PathBuf::from("linux-A-logs.tar.gz"));
        summary.record_salvage_error("C", "container not found");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        summary.write_json(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["failed"], 2);
        assert_eq!(value["items"][0]["archive"], "linux-A-logs.tar.gz");
        assert_eq!(value["items"][0]["duration_ms"], 1500);
        assert!(value["items"][1].get("archive").is_none());
        assert_eq!(value["items"][2]["salvage_error"], "container not found");
        assert_eq!(value["items"][2]["outcome"]["kind"], "launch_failed");
    }
}
