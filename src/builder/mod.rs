//! Task construction.
//!
//! Turns a loaded project model into a [`TaskGraph`]:
//!
//! 1. [`target_graph`] orders targets by their dependencies.
//! 2. [`configured`] binds each target to its platform, architectures and
//!    variants.
//! 3. [`producers`] turn each build phase into planned tasks.
//! 4. [`assembler`] inserts gates and edges and freezes the graph.

pub mod assembler;
pub mod configured;
pub mod context;
pub mod diagnostics;
pub mod graph;
pub mod producers;
pub mod target_graph;
pub mod task;
pub mod toolchain;

use miette::Diagnostic as MietteDiagnostic;
use thiserror::Error;

pub use context::{BuildContext, ProductInfo};
pub use diagnostics::DiagnosticsCollector;
pub use graph::TaskGraph;
pub use task::{Gate, PlannedTask, Stage};

/// Failures that abort a construction pass.
///
/// Everything else is reported as a diagnostic.
#[derive(Debug, Error, MietteDiagnostic)]
pub enum ConstructionError {
    #[error("unknown platform `{name}`")]
    #[diagnostic(
        code(rigging::platform::unknown),
        help("known platforms: {known}")
    )]
    UnknownPlatform { name: String, known: String },

    #[error("cycle in task graph: {}", tasks.join(" -> "))]
    #[diagnostic(
        code(rigging::graph::cycle),
        help("two tasks declare outputs that feed each other; this is a producer defect")
    )]
    TaskCycle { tasks: Vec<String> },

    #[error("internal error: {message}")]
    #[diagnostic(code(rigging::graph::internal))]
    Internal { message: String },
}
