//! Converge results

use chrono::{DateTime, Utc};
use serde::Serialize;
use sherpfile_core::ReleaseId;

/// What happened to one release
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum ReleaseOutcome {
    Installed,
    Upgraded,
    Deleted,
    /// Nothing to do
    NoOp,
    /// Changes found but not applied (diff)
    Changed(String),
    /// Not attempted
    Skipped(String),
    Failed(String),
}

impl ReleaseOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, ReleaseOutcome::Failed(_))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, ReleaseOutcome::Skipped(_))
    }

    /// Whether the release changed, or would change
    pub fn is_change(&self) -> bool {
        matches!(
            self,
            ReleaseOutcome::Installed
                | ReleaseOutcome::Upgraded
                | ReleaseOutcome::Deleted
                | ReleaseOutcome::Changed(_)
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReleaseOutcome::Installed => "installed",
            ReleaseOutcome::Upgraded => "upgraded",
            ReleaseOutcome::Deleted => "deleted",
            ReleaseOutcome::NoOp => "unchanged",
            ReleaseOutcome::Changed(_) => "changed",
            ReleaseOutcome::Skipped(_) => "skipped",
            ReleaseOutcome::Failed(_) => "failed",
        }
    }
}

/// Outcome of one release
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseResult {
    /// Position in the document's release list
    pub index: usize,
    pub id: ReleaseId,
    #[serde(flatten)]
    pub outcome: ReleaseOutcome,
}

impl ReleaseResult {
    pub fn new(index: usize, id: ReleaseId, outcome: ReleaseOutcome) -> Self {
        Self { index, id, outcome }
    }
}

/// Results of a converge pass, in declaration order
#[derive(Debug, Clone, Serialize)]
pub struct ConvergeReport {
    pub results: Vec<ReleaseResult>,
    /// A signal stopped dispatching
    pub interrupted: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl Default for ConvergeReport {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            results: Vec::new(),
            interrupted: false,
            started_at: now,
            finished_at: now,
        }
    }
}

impl ConvergeReport {
    /// Append the results of a later pass
    pub fn append(&mut self, other: ConvergeReport) {
        self.results.extend(other.results);
        self.interrupted |= other.interrupted;
        self.started_at = self.started_at.min(other.started_at);
        self.finished_at = self.finished_at.max(other.finished_at);
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    fn matching(&self, pred: impl Fn(&ReleaseOutcome) -> bool) -> Vec<&ReleaseResult> {
        self.results.iter().filter(|r| pred(&r.outcome)).collect()
    }

    pub fn installed(&self) -> Vec<&ReleaseResult> {
        self.matching(|o| *o == ReleaseOutcome::Installed)
    }

    pub fn upgraded(&self) -> Vec<&ReleaseResult> {
        self.matching(|o| *o == ReleaseOutcome::Upgraded)
    }

    pub fn deleted(&self) -> Vec<&ReleaseResult> {
        self.matching(|o| *o == ReleaseOutcome::Deleted)
    }

    pub fn unchanged(&self) -> Vec<&ReleaseResult> {
        self.matching(|o| *o == ReleaseOutcome::NoOp)
    }

    pub fn changed(&self) -> Vec<&ReleaseResult> {
        self.matching(|o| matches!(o, ReleaseOutcome::Changed(_)))
    }

    pub fn skipped(&self) -> Vec<&ReleaseResult> {
        self.matching(ReleaseOutcome::is_skipped)
    }

    pub fn failed(&self) -> Vec<&ReleaseResult> {
        self.matching(ReleaseOutcome::is_failure)
    }

    pub fn has_failures(&self) -> bool {
        self.results.iter().any(|r| r.outcome.is_failure())
    }

    pub fn has_changes(&self) -> bool {
        self.results.iter().any(|r| r.outcome.is_change())
    }

    /// First failure in declaration order, as a message
    pub fn first_error(&self) -> Option<String> {
        self.results.iter().find_map(|r| match &r.outcome {
            ReleaseOutcome::Failed(error) => Some(format!("release '{}': {}", r.id, error)),
            _ => None,
        })
    }

    /// Wall-clock duration of the pass
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}
