//! High-level operations.
//!
//! This module contains the implementation of rigging commands.

pub mod construct;

#[cfg(test)]
mod scenario_tests;

pub use construct::{
    construct_task_graph, load_workspace, order_targets, resolve_target_settings,
    ConstructOptions, Construction, ToolSetup,
};
