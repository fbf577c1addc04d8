//! Diagnostic readiness probe for the execution image.
//!
//! Nothing here can fail the run: the probe only logs what it found.

use tracing::{info, warn};

use crate::ctest::command;
use crate::discovery::WorkItem;
use crate::environment::ExecutionEnvironment;
use crate::execution::{ContainerConfig, ContainerRuntime, Quiet};

/// Outcome of the readiness probe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeReport {
    /// Checks that passed.
    pub ok: Vec<String>,
    /// Checks that failed.
    pub failed: Vec<String>,
    /// Set when the probe container itself could not run.
    pub error: Option<String>,
}

impl ProbeReport {
    /// Builds a report from the probe's `ok:` / `FAIL:` lines.
    pub fn from_output(stdout: &str) -> Self {
        let mut report = Self::default();
        for line in stdout.lines() {
            if let Some(check) = line.strip_prefix("ok: ") {
                report.ok.push(check.to_string());
            } else if let Some(check) = line.strip_prefix("FAIL: ") {
                report.failed.push(check.to_string());
            }
        }
        report
    }

    pub fn is_ready(&self) -> bool {
        self.error.is_none() && self.failed.is_empty()
    }
}

/// Runs the readiness checks in the environment `item` would run in.
pub async fn probe_readiness(
    runtime: &dyn ContainerRuntime,
    env: &ExecutionEnvironment,
    item: &WorkItem,
) -> ProbeReport {
    let cmd = command::readiness_probe(
        &env.build_dir,
        item.working_directory.as_deref(),
        item.command.first().map(String::as_str),
    );
    let config = ContainerConfig::new(env.image.clone(), cmd).with_auto_remove();

    let report = match runtime.run(&config, &Quiet).await {
        Ok(output) => {
            let mut report = ProbeReport::from_output(&output.stdout);
            if !output.success() {
                report.error = Some(format!("probe exited with {}", output.code_label()));
            }
            report
        }
        Err(e) => ProbeReport {
            error: Some(e.to_string()),
            ..Default::default()
        },
    };

    for check in &report.ok {
        info!(test = %item.name, "Readiness {}", check);
    }
    for check in &report.failed {
        warn!(test = %item.name, "Readiness check failed: {}", check);
    }
    if let Some(error) = &report.error {
        warn!(test = %item.name, error = %error, "Readiness probe did not run");
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_from_output() {
        let report = ProbeReport::from_output(
            "ok: build directory build\nFAIL: /tmp not writable\nnoise\nok: ctest at /usr/bin/ctest\n",
        );
        assert_eq!(report.ok.len(), 2);
        assert_eq!(report.failed, vec!["/tmp not writable"]);
        assert!(!report.is_ready());
    }

    #[test]
    fn test_empty_report_is_ready() {
        assert!(ProbeReport::default().is_ready());
    }
}
