//! Sherpfile Core - Core types for the declarative release orchestrator
//!
//! This crate provides the foundational types used throughout Sherpfile:
//! - `DesiredState`: One rendered document with its releases and nested documents
//! - `Values`: Configuration values with deep merge support
//! - `Environment`: Named value sets selected at load time
//! - `ReleaseSpec`: A deployable unit and its qualified identity
//! - `Selector`: Label-based release filtering
//! - `FileSystem`: File access capability used by the loader

pub mod context;
pub mod environment;
pub mod error;
pub mod fs;
pub mod release;
pub mod selector;
pub mod settings;
pub mod state;
pub mod values;

pub use context::TemplateContext;
pub use environment::{DEFAULT_ENVIRONMENT, Environment, EnvironmentSpec, MissingFileHandler};
pub use error::{CoreError, Result};
pub use fs::{FileSystem, MemoryFileSystem, OsFileSystem};
pub use release::{ReleaseId, ReleaseSpec, SetValue};
pub use selector::{LabelFilter, Selector};
pub use settings::Settings;
pub use state::{DesiredState, HelmDefaults, SubHelmfileSpec};
pub use values::{ArrayMerge, Values, ValuesEntry, parse_set_values};
