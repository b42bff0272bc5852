//! Converge engine
//!
//! Walks planned groups in order. Within a group, releases run concurrently
//! up to the configured limit; the next group starts only once every release
//! of the current one has finished. Each release goes through:
//!
//! ```text
//! status -> (diff) -> apply | delete | nothing
//! ```
//!
//! A failing release never cancels its siblings. Its dependents are skipped,
//! and with [`FailurePolicy::FailFast`] no later group starts.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use sherpfile_core::ReleaseId;

use crate::actions::{ConvergeOptions, FailurePolicy, Operation};
use crate::error::Result;
use crate::executor::{DiffOutcome, Executor, ReleaseTarget};
use crate::graph::{Group, PlannedRelease};
use crate::interrupt::Interrupt;
use crate::report::{ConvergeReport, ReleaseOutcome, ReleaseResult};

/// Drives releases through the executor
pub struct ConvergeEngine {
    executor: Arc<dyn Executor>,
    options: ConvergeOptions,
    interrupt: Interrupt,
}

impl ConvergeEngine {
    pub fn new(executor: Arc<dyn Executor>, options: ConvergeOptions) -> Self {
        Self {
            executor,
            options,
            interrupt: Interrupt::new(),
        }
    }

    /// Stop dispatching when `interrupt` is triggered
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn options(&self) -> &ConvergeOptions {
        &self.options
    }

    /// Converge `groups` in order
    ///
    /// Relative value files resolve against `base_dir`; `args` are appended
    /// to every mutating command. Results come back in declaration order.
    pub async fn converge(&self, groups: &[Group], base_dir: &Path, args: &[String]) -> ConvergeReport {
        let started_at = Utc::now();
        let mut results = Vec::new();
        let mut blocked: HashSet<ReleaseId> = HashSet::new();
        let mut halted = false;

        for group in groups {
            if self.interrupt.is_triggered() || halted {
                let reason = if halted {
                    "an earlier group failed"
                } else {
                    "interrupted"
                };
                for planned in &group.releases {
                    blocked.insert(planned.id.clone());
                    results.push(skipped(planned, reason.to_string()));
                }
                continue;
            }

            let mut runnable = Vec::new();
            for planned in &group.releases {
                match planned.waits_for.iter().find(|id| blocked.contains(*id)) {
                    Some(dependency) => {
                        blocked.insert(planned.id.clone());
                        results.push(skipped(planned, format!("'{}' did not converge", dependency)));
                    }
                    None => runnable.push(planned),
                }
            }

            tracing::info!(
                group = group.number,
                releases = runnable.len(),
                operation = %self.options.operation,
                "converging group"
            );

            let outcomes: Vec<ReleaseResult> = stream::iter(runnable)
                .map(|planned| {
                    let target = ReleaseTarget::new(planned.release.clone(), base_dir).with_args(args.to_vec());
                    async move {
                        let outcome = if self.interrupt.is_triggered() {
                            ReleaseOutcome::Skipped("interrupted".to_string())
                        } else {
                            self.converge_release(&target).await
                        };
                        ReleaseResult::new(planned.index, planned.id.clone(), outcome)
                    }
                })
                .buffer_unordered(self.options.workers())
                .collect()
                .await;

            let mut group_failed = false;
            for result in outcomes {
                if result.outcome.is_failure() || result.outcome.is_skipped() {
                    blocked.insert(result.id.clone());
                }
                group_failed |= result.outcome.is_failure();
                results.push(result);
            }

            if group_failed && self.options.failure_policy == FailurePolicy::FailFast {
                tracing::warn!(group = group.number, "release failed, not starting later groups");
                halted = true;
            }
        }

        if self.interrupt.is_triggered() {
            tracing::warn!("interrupted, in-flight releases were allowed to finish");
        }

        results.sort_by_key(|r| r.index);
        ConvergeReport {
            results,
            interrupted: self.interrupt.is_triggered(),
            started_at,
            finished_at: Utc::now(),
        }
    }

    async fn converge_release(&self, target: &ReleaseTarget) -> ReleaseOutcome {
        match self.drive(target).await {
            Ok(outcome) => {
                tracing::info!(release = %target.id(), outcome = outcome.label(), "release converged");
                outcome
            }
            Err(e) => {
                tracing::error!(release = %target.id(), "release failed: {}", e);
                ReleaseOutcome::Failed(e.to_string())
            }
        }
    }

    async fn drive(&self, target: &ReleaseTarget) -> Result<ReleaseOutcome> {
        let operation = self.options.operation;
        let status = self.executor.status(target).await?;

        if operation == Operation::Destroy || !target.release.desired() {
            if !status.exists {
                tracing::debug!(release = %target.id(), "was never installed, nothing to do");
                return Ok(ReleaseOutcome::NoOp);
            }
            if operation.is_read_only() {
                return Ok(ReleaseOutcome::Changed("release would be deleted".to_string()));
            }
            self.executor.delete(target).await?;
            return Ok(ReleaseOutcome::Deleted);
        }

        match operation {
            Operation::Apply | Operation::Diff => match self.executor.diff(target).await? {
                DiffOutcome::NoChanges => return Ok(ReleaseOutcome::NoOp),
                DiffOutcome::Changes(diff) if operation.is_read_only() => {
                    return Ok(ReleaseOutcome::Changed(diff));
                }
                DiffOutcome::Changes(_) => {}
            },
            Operation::Sync | Operation::Destroy => {}
        }

        self.executor.apply(target).await?;
        Ok(if status.exists {
            ReleaseOutcome::Upgraded
        } else {
            ReleaseOutcome::Installed
        })
    }
}

fn skipped(planned: &PlannedRelease, reason: String) -> ReleaseResult {
    ReleaseResult::new(planned.index, planned.id.clone(), ReleaseOutcome::Skipped(reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::NeedsPolicy;
    use crate::executor::{MockExecutor, Step};
    use crate::graph::ReleaseGraph;
    use crate::interrupt::Signal;
    use sherpfile_core::{ReleaseSpec, Selector};
    use std::time::Duration;

    fn release(name: &str, needs: &[&str]) -> ReleaseSpec {
        let mut r = ReleaseSpec::new(name, format!("charts/{}", name));
        r.namespace = "apps".to_string();
        r.needs = needs.iter().map(|n| n.to_string()).collect();
        r
    }

    fn plan(releases: &[ReleaseSpec], operation: Operation) -> Vec<Group> {
        ReleaseGraph::build(releases, &Selector::all(), NeedsPolicy::Strict)
            .unwrap()
            .groups(operation.is_reverse())
            .unwrap()
    }

    async fn run(mock: &MockExecutor, releases: &[ReleaseSpec], options: ConvergeOptions) -> ConvergeReport {
        let groups = plan(releases, options.operation);
        ConvergeEngine::new(Arc::new(mock.clone()), options)
            .converge(&groups, Path::new("/work"), &[])
            .await
    }

    fn outcomes(report: &ConvergeReport) -> Vec<(String, ReleaseOutcome)> {
        report
            .results
            .iter()
            .map(|r| (r.id.name.clone(), r.outcome.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_apply_upgrades_only_changed_releases() {
        let mock = MockExecutor::new()
            .with_deployed("backend")
            .with_deployed("frontend")
            .with_diff("backend", DiffOutcome::NoChanges)
            .with_diff("frontend", DiffOutcome::Changes("~ image".to_string()));
        let releases = vec![release("frontend", &["backend"]), release("backend", &[])];

        let report = run(&mock, &releases, ConvergeOptions::new(Operation::Apply)).await;

        assert_eq!(
            outcomes(&report),
            vec![
                ("frontend".to_string(), ReleaseOutcome::Upgraded),
                ("backend".to_string(), ReleaseOutcome::NoOp),
            ]
        );
        assert_eq!(mock.calls_for(Step::Diff), vec!["backend", "frontend"]);
        assert_eq!(mock.calls_for(Step::Apply), vec!["frontend"]);
    }

    #[tokio::test]
    async fn test_disabled_release_never_installed_is_noop() {
        let mock = MockExecutor::new();
        let mut backend = release("backend", &[]);
        backend.installed = Some(false);
        let releases = vec![release("frontend", &["backend"]), backend];

        let report = run(&mock, &releases, ConvergeOptions::new(Operation::Apply)).await;

        assert_eq!(
            outcomes(&report),
            vec![
                ("frontend".to_string(), ReleaseOutcome::Installed),
                ("backend".to_string(), ReleaseOutcome::NoOp),
            ]
        );
        assert!(mock.calls_for(Step::Delete).is_empty());
    }

    #[tokio::test]
    async fn test_disabled_deployed_release_is_deleted() {
        let mock = MockExecutor::new().with_deployed("legacy");
        let mut legacy = release("legacy", &[]);
        legacy.installed = Some(false);

        let report = run(&mock, &[legacy], ConvergeOptions::new(Operation::Sync)).await;

        assert_eq!(report.deleted().len(), 1);
        assert!(!mock.is_deployed("legacy"));
    }

    #[tokio::test]
    async fn test_sync_does_not_diff() {
        let mock = MockExecutor::new().with_deployed("api");
        let report = run(&mock, &[release("api", &[])], ConvergeOptions::new(Operation::Sync)).await;

        assert_eq!(report.upgraded().len(), 1);
        assert!(mock.calls_for(Step::Diff).is_empty());
    }

    #[tokio::test]
    async fn test_diff_reports_without_applying() {
        let mock = MockExecutor::new()
            .with_deployed("api")
            .with_diff("api", DiffOutcome::Changes("~ replicas".to_string()));
        let report = run(&mock, &[release("api", &[])], ConvergeOptions::new(Operation::Diff)).await;

        assert_eq!(report.changed().len(), 1);
        assert!(report.has_changes());
        assert!(mock.calls_for(Step::Apply).is_empty());
    }

    #[tokio::test]
    async fn test_destroy_deletes_dependents_first() {
        let mock = MockExecutor::new()
            .with_deployed("backend")
            .with_deployed("frontend");
        let releases = vec![
            release("frontend", &["backend"]),
            release("backend", &[]),
            release("absent", &[]),
        ];

        let report = run(&mock, &releases, ConvergeOptions::new(Operation::Destroy)).await;

        assert_eq!(mock.calls_for(Step::Delete), vec!["frontend", "backend"]);
        assert_eq!(report.deleted().len(), 2);
        assert_eq!(report.unchanged().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_is_isolated_within_group() {
        let mock = MockExecutor::new().with_failure("a", Step::Apply, "boom");
        let releases = vec![release("a", &[]), release("b", &[]), release("c", &["b"])];

        let report = run(&mock, &releases, ConvergeOptions::new(Operation::Sync)).await;

        let results = outcomes(&report);
        assert!(matches!(results[0].1, ReleaseOutcome::Failed(_)));
        assert_eq!(results[1].1, ReleaseOutcome::Installed);
        // Fail-fast: group 2 never starts
        assert_eq!(
            results[2].1,
            ReleaseOutcome::Skipped("an earlier group failed".to_string())
        );
        assert_eq!(report.first_error().unwrap(), "release 'apps/a': 'apply' failed for release 'a': boom");
    }

    #[tokio::test]
    async fn test_continue_on_error_skips_only_dependents() {
        let mock = MockExecutor::new().with_failure("a", Step::Status, "unreachable");
        let releases = vec![
            release("a", &[]),
            release("b", &[]),
            release("needs-a", &["a"]),
            release("needs-b", &["b"]),
        ];

        let report = run(
            &mock,
            &releases,
            ConvergeOptions::new(Operation::Sync).continue_on_error(),
        )
        .await;

        let results = outcomes(&report);
        assert!(results[0].1.is_failure());
        assert_eq!(results[1].1, ReleaseOutcome::Installed);
        assert_eq!(
            results[2].1,
            ReleaseOutcome::Skipped("'apps/a' did not converge".to_string())
        );
        assert_eq!(results[3].1, ReleaseOutcome::Installed);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let mock = MockExecutor::new().with_delay(Duration::from_millis(20));
        let releases: Vec<_> = (0..6).map(|i| release(&format!("r{}", i), &[])).collect();

        let report = run(
            &mock,
            &releases,
            ConvergeOptions::new(Operation::Sync).with_concurrency(2),
        )
        .await;

        assert_eq!(report.installed().len(), 6);
        assert_eq!(mock.max_in_flight(), 2);
    }

    #[tokio::test]
    async fn test_sequential_by_default() {
        let mock = MockExecutor::new().with_delay(Duration::from_millis(5));
        let releases: Vec<_> = (0..3).map(|i| release(&format!("r{}", i), &[])).collect();

        run(&mock, &releases, ConvergeOptions::new(Operation::Sync)).await;
        assert_eq!(mock.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_interrupt_stops_dispatch() {
        let mock = MockExecutor::new();
        let interrupt = Interrupt::new();
        interrupt.trigger(Signal::Interrupt);
        let releases = vec![release("a", &[]), release("b", &["a"])];
        let groups = plan(&releases, Operation::Sync);

        let report = ConvergeEngine::new(Arc::new(mock.clone()), ConvergeOptions::new(Operation::Sync))
            .with_interrupt(interrupt)
            .converge(&groups, Path::new("/work"), &[])
            .await;

        assert!(report.interrupted);
        assert_eq!(report.skipped().len(), 2);
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_results_follow_declaration_order() {
        let mock = MockExecutor::new();
        let releases = vec![
            release("c", &["b"]),
            release("b", &["a"]),
            release("a", &[]),
        ];

        let report = run(&mock, &releases, ConvergeOptions::new(Operation::Sync)).await;

        let names: Vec<_> = report.results.iter().map(|r| r.id.name.as_str()).collect();
        assert_eq!(names, vec!["c", "b", "a"]);
        assert_eq!(mock.calls_for(Step::Apply), vec!["a", "b", "c"]);
    }
}
