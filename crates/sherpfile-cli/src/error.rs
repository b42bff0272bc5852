//! CLI error types with exit code handling
//!
//! Wraps the library errors so every failure renders through miette and
//! maps to a process exit code.

use miette::Diagnostic;
use sherpfile_core::CoreError;
use sherpfile_engine::EngineError;
use sherpfile_kube::KubeError;
use thiserror::Error;

use crate::exit_codes;

/// CLI error type
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// Document loading or rendering failed
    #[error(transparent)]
    #[diagnostic(transparent)]
    Engine(#[from] EngineError),

    /// Planning failed (needs, cycles, duplicates)
    #[error(transparent)]
    #[diagnostic(code(sherpfile::cli::plan))]
    Kube(#[from] KubeError),

    #[error(transparent)]
    #[diagnostic(code(sherpfile::cli::core))]
    Core(#[from] CoreError),

    /// No release matched the selectors in any document
    #[error(
        "no releases found that match selector ({selectors}) and environment ({environment}), in any helmfile"
    )]
    #[diagnostic(
        code(sherpfile::cli::no_match),
        help("check --selector, or pass --allow-no-matching-release")
    )]
    NoMatchingRelease { selectors: String, environment: String },

    /// At least one release failed to converge
    #[error("{count} release(s) failed: {first}")]
    #[diagnostic(code(sherpfile::cli::release_failed))]
    ReleasesFailed { count: usize, first: String },

    /// Output could not be written
    #[error("IO error: {message}")]
    #[diagnostic(code(sherpfile::cli::io))]
    Io { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Engine(_)
            | CliError::Kube(_)
            | CliError::Core(_)
            | CliError::NoMatchingRelease { .. }
            | CliError::ReleasesFailed { .. }
            | CliError::Io { .. } => exit_codes::ERROR,
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
