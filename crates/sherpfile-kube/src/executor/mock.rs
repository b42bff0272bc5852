//! Mock executor for testing
//!
//! Answers from memory, useful for unit tests without a cluster or a helm
//! binary. Every call is recorded for assertions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use super::{DiffOutcome, Executor, OutputDialect, ReleaseStatus, ReleaseTarget};
use crate::error::{KubeError, Result};

/// Executor step, used to record calls and inject failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Status,
    Diff,
    Apply,
    Delete,
}

/// One recorded call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorCall {
    pub step: Step,
    pub release: String,
}

#[derive(Debug, Default)]
struct MockState {
    /// release name -> deployed revision
    deployed: HashMap<String, u64>,
    /// release name -> scripted diff result
    diffs: HashMap<String, DiffOutcome>,
    /// (release name, step) -> error message
    failures: HashMap<(String, Step), String>,
    calls: Vec<ExecutorCall>,
}

/// In-memory executor for testing
#[derive(Clone, Default)]
pub struct MockExecutor {
    state: Arc<Mutex<MockState>>,
    delay: Duration,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MockExecutor {
    /// Create a mock with nothing deployed
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a release as deployed at revision 1
    pub fn with_deployed(self, name: &str) -> Self {
        self.lock().deployed.insert(name.to_string(), 1);
        self
    }

    /// Script the diff result of a release
    pub fn with_diff(self, name: &str, outcome: DiffOutcome) -> Self {
        self.lock().diffs.insert(name.to_string(), outcome);
        self
    }

    /// Make `step` fail for a release
    pub fn with_failure(self, name: &str, step: Step, message: &str) -> Self {
        self.lock()
            .failures
            .insert((name.to_string(), step), message.to_string());
        self
    }

    /// Sleep this long inside every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Calls recorded so far, in call order
    pub fn calls(&self) -> Vec<ExecutorCall> {
        self.lock().calls.clone()
    }

    /// Release names that saw `step`, in call order
    pub fn calls_for(&self, step: Step) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.step == step)
            .map(|c| c.release.clone())
            .collect()
    }

    /// Whether a release is currently deployed
    pub fn is_deployed(&self, name: &str) -> bool {
        self.lock().deployed.contains_key(name)
    }

    /// Highest number of calls that were running at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record the call, wait, then fail if a failure was scripted
    async fn enter(&self, step: Step, target: &ReleaseTarget) -> Result<()> {
        let name = target.release.name.clone();
        self.lock().calls.push(ExecutorCall {
            step,
            release: name.clone(),
        });

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.lock().failures.get(&(name.clone(), step)) {
            Some(message) => Err(KubeError::Command {
                release: name,
                command: format!("{:?}", step).to_lowercase(),
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Executor for MockExecutor {
    async fn status(&self, target: &ReleaseTarget) -> Result<ReleaseStatus> {
        self.enter(Step::Status, target).await?;
        Ok(match self.lock().deployed.get(&target.release.name) {
            Some(&revision) => ReleaseStatus::deployed(revision, OutputDialect::Json),
            None => ReleaseStatus::absent(),
        })
    }

    async fn diff(&self, target: &ReleaseTarget) -> Result<DiffOutcome> {
        self.enter(Step::Diff, target).await?;
        let state = self.lock();
        if let Some(outcome) = state.diffs.get(&target.release.name) {
            return Ok(outcome.clone());
        }
        // Unscripted: a release that is not deployed always has changes
        Ok(if state.deployed.contains_key(&target.release.name) {
            DiffOutcome::NoChanges
        } else {
            DiffOutcome::Changes(format!("+ {}", target.release.name))
        })
    }

    async fn apply(&self, target: &ReleaseTarget) -> Result<()> {
        self.enter(Step::Apply, target).await?;
        *self
            .lock()
            .deployed
            .entry(target.release.name.clone())
            .or_insert(0) += 1;
        Ok(())
    }

    async fn delete(&self, target: &ReleaseTarget) -> Result<()> {
        self.enter(Step::Delete, target).await?;
        self.lock().deployed.remove(&target.release.name);
        Ok(())
    }
}
