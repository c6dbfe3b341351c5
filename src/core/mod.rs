//! The project model.
//!
//! This module contains the read-only input of task construction:
//! - Workspaces, projects and the group tree
//! - Targets (standard, aggregate, external, package product)
//! - Build phases, build files and build rules
//! - File types, GUIDs and the platform registry

pub mod file_type;
pub mod ids;
pub mod phase;
pub mod platform;
pub mod target;
pub mod workspace;

pub use file_type::{FileType, Language};
pub use ids::{Guid, GuidArena};
pub use phase::{BuildFile, BuildPhase, BuildRule, BuildableRef};
pub use platform::{Platform, PlatformFilter, PlatformRegistry};
pub use target::{ProductType, Target, TargetDependency};
pub use workspace::{BuildConfiguration, ModelError, Project, Workspace};
