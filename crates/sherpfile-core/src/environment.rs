//! Environments: named value sets selected at load time

use serde::{Deserialize, Serialize};

use crate::values::{ArrayMerge, Values, ValuesEntry};

/// Name of the environment used when none is requested
pub const DEFAULT_ENVIRONMENT: &str = "default";

/// A resolved environment attached to a rendering pass
///
/// Environments are never mutated once built; merging derives a new one.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Environment {
    /// Environment name
    pub name: String,

    /// Values from environment value files and overrides
    pub values: Values,

    /// Document-level default values, shadowed by `values`
    pub defaults: Values,
}

impl Environment {
    /// Create an environment with no values
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Values::new(),
            defaults: Values::new(),
        }
    }

    /// Create an environment holding `values`
    pub fn with_values(name: impl Into<String>, values: Values) -> Self {
        Self {
            values,
            ..Self::new(name)
        }
    }

    /// Derive a new environment with `other` layered on top of this one
    ///
    /// A non-empty name in `other` wins; values and defaults are deep merged.
    pub fn merge(&self, other: &Environment, arrays: ArrayMerge) -> Environment {
        let mut merged = self.clone();
        if !other.name.is_empty() {
            merged.name = other.name.clone();
        }
        merged.values.merge_with(&other.values, arrays);
        merged.defaults.merge_with(&other.defaults, arrays);
        merged
    }

    /// Derive a new environment with override values taking precedence
    pub fn with_overrides(&self, overrides: &Values, arrays: ArrayMerge) -> Environment {
        let mut merged = self.clone();
        merged.values.merge_with(overrides, arrays);
        merged
    }

    /// Defaults overlaid with values, as seen by templates
    pub fn merged_values(&self) -> Values {
        let mut result = self.defaults.clone();
        result.merge(&self.values);
        result
    }

    /// Check whether this is the implicit default environment
    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_ENVIRONMENT
    }
}

/// What to do when a referenced file does not exist
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissingFileHandler {
    /// Fail the load
    #[default]
    Error,
    /// Skip the file and log a warning
    Warn,
    /// Skip the file and log at info level
    Info,
    /// Skip the file and log at debug level
    Debug,
}

impl MissingFileHandler {
    /// Returns `true` when the missing file must fail the load; otherwise logs it
    pub fn should_fail(&self, message: &str) -> bool {
        match self {
            Self::Error => true,
            Self::Warn => {
                tracing::warn!("{}", message);
                false
            }
            Self::Info => {
                tracing::info!("{}", message);
                false
            }
            Self::Debug => {
                tracing::debug!("{}", message);
                false
            }
        }
    }
}

/// An `environments.<name>` entry as declared in a document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EnvironmentSpec {
    /// Value files and inline values, folded left to right
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<ValuesEntry>,

    /// Policy for value files that do not exist
    #[serde(default, skip_serializing_if = "is_default_handler")]
    pub missing_file_handler: MissingFileHandler,
}

fn is_default_handler(handler: &MissingFileHandler) -> bool {
    *handler == MissingFileHandler::Error
}
