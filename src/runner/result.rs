//! Outcome record of running one test.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::discovery::WorkItem;

/// How a unit's container ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum UnitOutcome {
    /// The test process exited with this code.
    Exited(i64),
    /// The process ended without an exit code (e.g. killed by a signal).
    Killed,
    /// The runtime could not start the container at all.
    LaunchFailed(String),
}

impl UnitOutcome {
    /// Only a clean exit with code 0 is a pass.
    pub fn is_success(&self) -> bool {
        matches!(self, UnitOutcome::Exited(0))
    }

    /// Exit code if the process exited normally.
    pub fn exit_code(&self) -> Option<i64> {
        match self {
            UnitOutcome::Exited(code) => Some(*code),
            _ => None,
        }
    }
}

impl std::fmt::Display for UnitOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitOutcome::Exited(code) => write!(f, "exit {}", code),
            UnitOutcome::Killed => write!(f, "killed"),
            UnitOutcome::LaunchFailed(msg) => write!(f, "launch error: {}", msg),
        }
    }
}

/// Result of running one [`WorkItem`].
#[derive(Debug, Clone)]
pub struct RunResult {
    /// The test that ran.
    pub item: WorkItem,
    /// Name of the container the test ran in.
    pub container: String,
    /// How the container ended.
    pub outcome: UnitOutcome,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
    /// Wall-clock time from launch to resolution.
    pub duration: Duration,
}

impl RunResult {
    /// Returns true if the test passed.
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    /// Test name.
    pub fn name(&self) -> &str {
        &self.item.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_exit_zero_succeeds() {
        assert!(UnitOutcome::Exited(0).is_success());
        assert!(!UnitOutcome::Exited(8).is_success());
        assert!(!UnitOutcome::Exited(-1).is_success());
        assert!(!UnitOutcome::Killed.is_success());
        assert!(!UnitOutcome::LaunchFailed("no daemon".to_string()).is_success());
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(UnitOutcome::Exited(8).to_string(), "exit 8");
        assert_eq!(UnitOutcome::Killed.to_string(), "killed");
        assert_eq!(
            UnitOutcome::LaunchFailed("image missing".to_string()).to_string(),
            "launch error: image missing"
        );
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_string(&UnitOutcome::Exited(1)).unwrap();
        assert_eq!(json, r#"{"kind":"exited","detail":1}"#);
        let json = serde_json::to_string(&UnitOutcome::Killed).unwrap();
        assert_eq!(json, r#"{"kind":"killed"}"#);
    }
}
