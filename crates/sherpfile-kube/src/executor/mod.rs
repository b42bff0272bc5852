//! Executor capability
//!
//! The converge engine reaches the package manager only through
//! [`Executor`]:
//! - [`HelmExecutor`] runs the helm binary
//! - [`MockExecutor`] answers from memory, for tests

mod helm;
mod mock;

pub use helm::HelmExecutor;
pub use mock::{ExecutorCall, MockExecutor, Step};

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sherpfile_core::fs::resolve_path;
use sherpfile_core::{ReleaseId, ReleaseSpec, Values, ValuesEntry};

use crate::error::Result;

/// Output format a status answer was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputDialect {
    /// `--output json`
    Json,
    /// `KEY: value` lines
    Table,
    /// The release was not found; nothing was parsed
    Absent,
}

/// Deployed state of a release
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseStatus {
    pub exists: bool,
    pub revision: Option<u64>,
    pub status: String,
    pub dialect: OutputDialect,
}

impl ReleaseStatus {
    /// No deployed instance
    pub fn absent() -> Self {
        Self {
            exists: false,
            revision: None,
            status: String::new(),
            dialect: OutputDialect::Absent,
        }
    }

    /// A deployed instance at `revision`
    pub fn deployed(revision: u64, dialect: OutputDialect) -> Self {
        Self {
            exists: true,
            revision: Some(revision),
            status: "deployed".to_string(),
            dialect,
        }
    }
}

/// Result of diffing a release against the cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffOutcome {
    NoChanges,
    /// Changes were found; carries the diff text
    Changes(String),
}

/// One `values:` entry, ready to hand to the executor
#[derive(Debug, Clone, PartialEq)]
pub enum ValuesSource {
    /// Resolved against the target's base directory
    File(PathBuf),
    Inline(Values),
}

/// A release plus what the executor needs to act on it
#[derive(Debug, Clone)]
pub struct ReleaseTarget {
    pub release: ReleaseSpec,
    /// Directory relative value files resolve against
    pub base_dir: PathBuf,
    /// Extra arguments appended to every mutating command
    pub args: Vec<String>,
}

impl ReleaseTarget {
    pub fn new(release: ReleaseSpec, base_dir: impl AsRef<Path>) -> Self {
        Self {
            release,
            base_dir: base_dir.as_ref().to_path_buf(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn id(&self) -> ReleaseId {
        self.release.id()
    }

    /// Values entries in declaration order; later entries win
    pub fn values_sources(&self) -> Vec<ValuesSource> {
        self.release
            .values
            .iter()
            .map(|entry| match entry {
                ValuesEntry::File(file) => ValuesSource::File(resolve_path(&self.base_dir, file)),
                ValuesEntry::Inline(map) => ValuesSource::Inline(Values(serde_json::Value::Object(map.clone()))),
            })
            .collect()
    }
}

/// Flags selecting where a release lives
///
/// Depends only on the identity, so the same release always gets the same
/// flags.
pub fn identity_flags(id: &ReleaseId) -> Vec<String> {
    let mut flags = Vec::new();
    if !id.kube_context.is_empty() {
        flags.push("--kube-context".to_string());
        flags.push(id.kube_context.clone());
    }
    if !id.tiller_namespace.is_empty() {
        flags.push("--tiller-namespace".to_string());
        flags.push(id.tiller_namespace.clone());
    }
    if !id.namespace.is_empty() {
        flags.push("--namespace".to_string());
        flags.push(id.namespace.clone());
    }
    flags
}

/// Package manager operations used by the converge engine
///
/// Implementations must be Send + Sync for use across async tasks.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Query whether the release is deployed
    async fn status(&self, target: &ReleaseTarget) -> Result<ReleaseStatus>;

    /// Compare the desired release with the deployed one
    async fn diff(&self, target: &ReleaseTarget) -> Result<DiffOutcome>;

    /// Install or upgrade the release
    async fn apply(&self, target: &ReleaseTarget) -> Result<()>;

    /// Remove the release
    async fn delete(&self, target: &ReleaseTarget) -> Result<()>;
}
