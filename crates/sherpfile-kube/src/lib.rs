//! Sherpfile Kube - release planning and convergence
//!
//! This crate provides:
//! - **Release Graph**: `needs` resolution, selection policies and ordered groups
//! - **Executors**: Helm-backed and in-memory release operations
//! - **Converge Engine**: Concurrent, dependency-aware sync/apply/diff/destroy
//! - **Reports**: Per-release outcomes in declaration order

pub mod actions;
pub mod converge;
pub mod error;
pub mod executor;
pub mod graph;
pub mod interrupt;
pub mod report;

pub use actions::{ConvergeOptions, FailurePolicy, NeedsPolicy, Operation};
pub use converge::ConvergeEngine;
pub use error::{KubeError, Result};
pub use executor::{
    DiffOutcome, Executor, ExecutorCall, HelmExecutor, MockExecutor, OutputDialect, ReleaseStatus,
    ReleaseTarget, Step, ValuesSource,
};
pub use graph::{Group, GroupSummary, PlanSummary, PlannedRelease, ReleaseGraph, ReleaseNode};
pub use interrupt::{Interrupt, Signal};
pub use report::{ConvergeReport, ReleaseOutcome, ReleaseResult};
