//! Targets and product types.
//!
//! Targets are a closed sum type. Every producer matches on the variant
//! explicitly, so adding a target kind is a compile error everywhere it
//! needs handling.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::core::ids::Guid;
use crate::core::phase::{BuildFile, BuildPhase, BuildRule};
use crate::core::platform::{serialize_filter_set, PlatformFilter};
use crate::core::workspace::BuildConfiguration;

/// Kind of product a standard target builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProductType {
    Application,
    Framework,
    StaticLibrary,
    DynamicLibrary,
    ObjectLibrary,
    Bundle,
    AppExtension,
    UnitTestBundle,
    Tool,
}

impl ProductType {
    /// Whether the product is a bundle directory.
    pub fn is_wrapper(&self) -> bool {
        self.wrapper_extension().is_some()
    }

    /// Bundle extension for wrapper products.
    pub fn wrapper_extension(&self) -> Option<&'static str> {
        match self {
            ProductType::Application => Some("app"),
            ProductType::Framework => Some("framework"),
            ProductType::Bundle => Some("bundle"),
            ProductType::AppExtension => Some("appex"),
            ProductType::UnitTestBundle => Some("xctest"),
            _ => None,
        }
    }

    /// Mach-O type passed to the linker, if the product is linked.
    pub fn mach_o_type(&self) -> Option<&'static str> {
        match self {
            ProductType::Application | ProductType::Tool | ProductType::AppExtension => {
                Some("mh_execute")
            }
            ProductType::Framework | ProductType::DynamicLibrary => Some("mh_dylib"),
            ProductType::Bundle | ProductType::UnitTestBundle => Some("mh_bundle"),
            ProductType::StaticLibrary => Some("staticlib"),
            ProductType::ObjectLibrary => None,
        }
    }

    /// Whether the product is produced by `ld` (as opposed to libtool or
    /// the object library assembler).
    pub fn is_linked(&self) -> bool {
        !matches!(self, ProductType::StaticLibrary | ProductType::ObjectLibrary)
    }

    /// Whether a dependent can link against this product.
    pub fn is_library(&self) -> bool {
        matches!(
            self,
            ProductType::Framework
                | ProductType::StaticLibrary
                | ProductType::DynamicLibrary
                | ProductType::ObjectLibrary
        )
    }

    /// Whether the product is code signed on signing platforms.
    pub fn is_signable(&self) -> bool {
        !matches!(self, ProductType::StaticLibrary | ProductType::ObjectLibrary)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ProductType::Application => "application",
            ProductType::Framework => "framework",
            ProductType::StaticLibrary => "static library",
            ProductType::DynamicLibrary => "dynamic library",
            ProductType::ObjectLibrary => "object library",
            ProductType::Bundle => "bundle",
            ProductType::AppExtension => "app extension",
            ProductType::UnitTestBundle => "unit test bundle",
            ProductType::Tool => "command-line tool",
        }
    }
}

/// A dependency on another target, by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetDependency {
    pub name: String,
    /// Platforms the dependency applies to; empty means all.
    #[serde(default, serialize_with = "serialize_filter_set")]
    pub platform_filters: HashSet<PlatformFilter>,
}

impl TargetDependency {
    pub fn new(name: impl Into<String>) -> Self {
        TargetDependency {
            name: name.into(),
            platform_filters: HashSet::new(),
        }
    }
}

/// A custom task attached to a standard target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomTask {
    pub command_line: Vec<String>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default)]
    pub working_directory: Option<String>,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    pub execution_description: String,
}

/// A target that compiles and links a product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardTarget {
    #[serde(default)]
    pub guid: Guid,
    pub name: String,
    pub product_type: ProductType,
    #[serde(default)]
    pub build_phases: Vec<BuildPhase>,
    #[serde(default)]
    pub build_rules: Vec<BuildRule>,
    #[serde(default)]
    pub dependencies: Vec<TargetDependency>,
    #[serde(default)]
    pub build_configurations: Vec<BuildConfiguration>,
    #[serde(default)]
    pub custom_tasks: Vec<CustomTask>,
}

/// A target with only script and copy phases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateTarget {
    #[serde(default)]
    pub guid: Guid,
    pub name: String,
    #[serde(default)]
    pub build_phases: Vec<BuildPhase>,
    #[serde(default)]
    pub dependencies: Vec<TargetDependency>,
    #[serde(default)]
    pub build_configurations: Vec<BuildConfiguration>,
}

/// A target built by an external tool (e.g. `make`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalTarget {
    #[serde(default)]
    pub guid: Guid,
    pub name: String,
    pub tool_path: String,
    #[serde(default = "default_external_arguments")]
    pub arguments: String,
    #[serde(default)]
    pub working_directory: Option<String>,
    #[serde(default = "default_pass_settings")]
    pub pass_build_settings_in_environment: bool,
    #[serde(default)]
    pub dependencies: Vec<TargetDependency>,
    #[serde(default)]
    pub build_configurations: Vec<BuildConfiguration>,
}

fn default_external_arguments() -> String {
    "$(ACTION)".to_string()
}

fn default_pass_settings() -> bool {
    true
}

/// A package product: forwards its libraries to whoever links it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageProductTarget {
    #[serde(default)]
    pub guid: Guid,
    pub name: String,
    #[serde(default)]
    pub frameworks: Vec<BuildFile>,
    #[serde(default)]
    pub dependencies: Vec<TargetDependency>,
    #[serde(default)]
    pub build_configurations: Vec<BuildConfiguration>,
}

/// A target of any kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Target {
    Standard(StandardTarget),
    Aggregate(AggregateTarget),
    External(ExternalTarget),
    PackageProduct(PackageProductTarget),
}

impl Target {
    pub fn name(&self) -> &str {
        match self {
            Target::Standard(t) => &t.name,
            Target::Aggregate(t) => &t.name,
            Target::External(t) => &t.name,
            Target::PackageProduct(t) => &t.name,
        }
    }

    pub fn guid(&self) -> &Guid {
        match self {
            Target::Standard(t) => &t.guid,
            Target::Aggregate(t) => &t.guid,
            Target::External(t) => &t.guid,
            Target::PackageProduct(t) => &t.guid,
        }
    }

    pub(crate) fn guid_mut(&mut self) -> &mut Guid {
        match self {
            Target::Standard(t) => &mut t.guid,
            Target::Aggregate(t) => &mut t.guid,
            Target::External(t) => &mut t.guid,
            Target::PackageProduct(t) => &mut t.guid,
        }
    }

    pub fn dependencies(&self) -> &[TargetDependency] {
        match self {
            Target::Standard(t) => &t.dependencies,
            Target::Aggregate(t) => &t.dependencies,
            Target::External(t) => &t.dependencies,
            Target::PackageProduct(t) => &t.dependencies,
        }
    }

    pub fn build_configurations(&self) -> &[BuildConfiguration] {
        match self {
            Target::Standard(t) => &t.build_configurations,
            Target::Aggregate(t) => &t.build_configurations,
            Target::External(t) => &t.build_configurations,
            Target::PackageProduct(t) => &t.build_configurations,
        }
    }

    /// Ordered build phases (empty for external and package targets).
    pub fn build_phases(&self) -> &[BuildPhase] {
        match self {
            Target::Standard(t) => &t.build_phases,
            Target::Aggregate(t) => &t.build_phases,
            Target::External(_) | Target::PackageProduct(_) => &[],
        }
    }

    pub(crate) fn build_phases_mut(&mut self) -> &mut [BuildPhase] {
        match self {
            Target::Standard(t) => &mut t.build_phases,
            Target::Aggregate(t) => &mut t.build_phases,
            Target::External(_) | Target::PackageProduct(_) => &mut [],
        }
    }

    /// Product type of standard targets.
    pub fn product_type(&self) -> Option<ProductType> {
        match self {
            Target::Standard(t) => Some(t.product_type),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Target::Standard(_) => "standard",
            Target::Aggregate(_) => "aggregate",
            Target::External(_) => "external",
            Target::PackageProduct(_) => "package-product",
        }
    }

    /// Targets whose completion (not just their headers) gates dependents.
    pub fn gates_on_exit(&self) -> bool {
        matches!(self, Target::Aggregate(_) | Target::External(_))
    }

    /// Find a build configuration by name.
    pub fn configuration(&self, name: &str) -> Option<&BuildConfiguration> {
        self.build_configurations().iter().find(|c| c.name == name)
    }
}
