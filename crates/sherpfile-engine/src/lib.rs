//! Sherpfile Engine - loading documents into desired state
//!
//! This crate turns document files into [`sherpfile_core::DesiredState`]:
//! - MiniJinja rendering in two passes (tolerant, then strict)
//! - Environment resolution with layered values files
//! - Bases, multi-part documents and nested `helmfiles:`
//! - Human-readable template errors with suggestions

pub mod discovery;
pub mod environment;
pub mod error;
pub mod filters;
pub mod functions;
pub mod loader;
pub mod renderer;
pub mod suggestions;

pub use discovery::{DEFAULT_DIR, DEFAULT_FILE, discover, documents_in_dir};
pub use error::{EngineError, Result, TemplateError, TemplateErrorKind};
pub use loader::{DesiredStateLoader, LoadOptions, NestedDocument};
pub use renderer::{RenderMode, TemplateRenderer};
pub use suggestions::{AVAILABLE_FILTERS, AVAILABLE_FUNCTIONS};
