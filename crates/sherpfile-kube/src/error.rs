//! Error types for sherpfile-kube

use thiserror::Error;

/// Result type for sherpfile-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors raised while planning or converging releases
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    #[error(transparent)]
    Core(#[from] sherpfile_core::CoreError),

    /// Two releases share the same identity
    #[error("release '{id}' is declared more than once")]
    DuplicateRelease { id: String },

    /// A `needs` entry points at nothing
    #[error("release '{release}' needs '{need}', which is not declared in this document")]
    UnknownNeed { release: String, need: String },

    /// A `needs` entry points outside the selected releases
    #[error("release '{release}' needs '{need}', which is not selected\nHint: select '{need}' too, or pass --skip-needs / --include-needs")]
    NeedNotSelected { release: String, need: String },

    /// The `needs` graph has a cycle
    #[error("dependency cycle between releases: {}", releases.join(", "))]
    Cycle { releases: Vec<String> },

    /// The helm binary could not be started
    #[error("failed to run '{binary}': {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// A helm command exited with an error
    #[error("'{command}' failed for release '{release}': {message}")]
    Command {
        release: String,
        command: String,
        message: String,
    },

    /// Unreadable helm output
    #[error("cannot read status of release '{release}': {message}")]
    Status { release: String, message: String },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for KubeError {
    fn from(e: serde_json::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for KubeError {
    fn from(e: serde_yaml::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl KubeError {
    /// Whether this error comes from planning rather than execution
    pub fn is_graph_error(&self) -> bool {
        matches!(
            self,
            KubeError::DuplicateRelease { .. }
                | KubeError::UnknownNeed { .. }
                | KubeError::NeedNotSelected { .. }
                | KubeError::Cycle { .. }
                | KubeError::Core(_)
        )
    }
}
