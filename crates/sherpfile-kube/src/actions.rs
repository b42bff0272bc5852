//! Operation kinds and converge options

use serde::{Deserialize, Serialize};

/// What a converge pass does to each release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Apply every installed release without diffing; delete disabled ones
    Sync,
    /// Diff first and upgrade only releases with changes
    Apply,
    /// Report changes without applying them
    Diff,
    /// Delete every release that exists
    Destroy,
}

impl Operation {
    /// Whether dependents are processed before their dependencies
    pub fn is_reverse(self) -> bool {
        matches!(self, Operation::Destroy)
    }

    /// Whether the pass only reads cluster state
    pub fn is_read_only(self) -> bool {
        matches!(self, Operation::Diff)
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Operation::Sync => "sync",
            Operation::Apply => "apply",
            Operation::Diff => "diff",
            Operation::Destroy => "destroy",
        };
        f.write_str(name)
    }
}

/// How `needs` pointing outside the selection are handled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NeedsPolicy {
    /// Any need outside the selection is an error
    #[default]
    Strict,
    /// Drop edges to unselected releases
    SkipNeeds,
    /// Pull in the direct needs of selected releases
    IncludeNeeds,
    /// Pull in every release reachable through needs
    IncludeTransitiveNeeds,
}

/// What happens to later groups once a release fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop before the next group; remaining releases are reported as skipped
    #[default]
    FailFast,
    /// Keep going; only dependents of failed releases are skipped
    ContinueOnError,
}

/// Options for one converge pass
#[derive(Debug, Clone)]
pub struct ConvergeOptions {
    /// Operation to perform
    pub operation: Operation,

    /// Maximum releases running at once within a group (0 or 1: sequential)
    pub concurrency: usize,

    /// Behaviour after a failure
    pub failure_policy: FailurePolicy,
}

impl ConvergeOptions {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            concurrency: 0,
            failure_policy: FailurePolicy::default(),
        }
    }

    /// Run up to `concurrency` releases at once
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Keep converging later groups after a failure
    pub fn continue_on_error(mut self) -> Self {
        self.failure_policy = FailurePolicy::ContinueOnError;
        self
    }

    /// Effective worker count
    pub fn workers(&self) -> usize {
        self.concurrency.max(1)
    }
}
