//! CLI commands

pub mod build;
pub mod converge;
pub mod list;
