//! Batch-by-batch execution of the whole test list.

use std::num::NonZeroUsize;
use std::time::Instant;

use futures::future::join_all;
use tracing::info;

use crate::discovery::WorkItem;
use crate::runner::{RunResult, UnitRunner};

use super::plan::BatchPlan;

/// Pass/fail tally for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub passed: usize,
    pub failed: usize,
}

impl BatchStats {
    pub fn from_results(results: &[RunResult]) -> Self {
        let passed = results.iter().filter(|r| r.is_success()).count();
        Self {
            passed,
            failed: results.len() - passed,
        }
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed
    }
}

/// Runs tests in fixed-size batches.
///
/// Every test of a batch is launched at once and the scheduler waits for all
/// of them before starting the next batch, so at most `batch_size`
/// containers run at the same time. A failing test never stops the others.
pub struct BatchScheduler {
    runner: UnitRunner,
    batch_size: NonZeroUsize,
}

impl BatchScheduler {
    pub fn new(runner: UnitRunner, batch_size: NonZeroUsize) -> Self {
        Self { runner, batch_size }
    }

    pub fn runner(&self) -> &UnitRunner {
        &self.runner
    }

    /// Runs every item; results are in the order of `items`.
    pub async fn run_all(&self, items: &[WorkItem]) -> Vec<RunResult> {
        let plan = BatchPlan::new(items.len(), self.batch_size);
        let mut results = Vec::with_capacity(items.len());

        info!(
            tests = plan.total(),
            batches = plan.batch_count(),
            batch_size = plan.batch_size(),
            "Running tests"
        );

        for (k, range) in plan.batches().enumerate() {
            let started = Instant::now();
            info!(batch = k + 1, of = plan.batch_count(), size = range.len(), "Starting batch");

            // join_all yields results in input order regardless of completion order.
            let batch = join_all(items[range].iter().map(|item| self.runner.run(item))).await;

            let stats = BatchStats::from_results(&batch);
            info!(
                batch = k + 1,
                of = plan.batch_count(),
                passed = stats.passed,
                failed = stats.failed,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Batch complete"
            );
            results.extend(batch);
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::UnitOutcome;
    use std::time::Duration;

    fn result(name: &str, outcome: UnitOutcome) -> RunResult {
        RunResult {
            item: WorkItem::new(name),
            container: format!("{name}-x"),
            outcome,
            stdout: String::new(),
            stderr: String::new(),
            duration: Duration::ZERO,
        }
    }

    #[test]
    fn test_batch_stats() {
        let results = vec![
            result("a", UnitOutcome::Exited(1)),
            result("b", UnitOutcome::Exited(0)),
            result("c", UnitOutcome::LaunchFailed("boom".to_string())),
        ];
        let stats = BatchStats::from_results(&results);
        assert_eq!(stats, BatchStats { passed: 1, failed: 2 });
        assert_eq!(stats.total(), 3);
    }
}
