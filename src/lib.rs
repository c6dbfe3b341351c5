//! rigging - task construction for Xcode-style projects
//!
//! This crate turns a project model (workspaces, projects, targets, build
//! phases and layered build settings) into a deterministic task graph for
//! an external execution engine.

pub mod builder;
pub mod core;
pub mod ops;
pub mod settings;
pub mod util;

/// Fixture builders for rigging unit tests.
///
/// This module is only available when compiling with `--cfg test`.
#[cfg(test)]
pub mod test_support;

pub use builder::{ConstructionError, TaskGraph};
pub use core::{Project, Target, Workspace};
pub use ops::{construct_task_graph, ConstructOptions, Construction, ToolSetup};
pub use util::diagnostic::Diagnostic;
