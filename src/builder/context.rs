//! Construction context - the read-only inputs of one pass.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::builder::toolchain::{ToolInfoCache, Toolchain};
use crate::builder::ConstructionError;
use crate::core::phase::BuildFile;
use crate::core::platform::{Platform, PlatformRegistry};
use crate::core::target::{ProductType, Target};
use crate::core::workspace::{Project, Workspace};
use crate::settings::resolver::UNDEFINED_ARCH;
use crate::settings::{ResolvedSettings, SettingsRequest, SettingsResolver, SettingsTable};

/// What dependents need to know about a target's product.
#[derive(Debug, Clone)]
pub struct ProductInfo {
    pub target: String,
    pub product_type: Option<ProductType>,
    pub product_name: String,
    pub full_product_name: String,
    /// `$(TARGET_BUILD_DIR)/$(FULL_PRODUCT_NAME)`
    pub product_path: String,
    /// Final binary, for targets that produce one.
    pub binary_path: Option<String>,
    pub module_name: String,
    /// Dependents wait for the whole target, not just its headers.
    pub gates_on_exit: bool,
    /// Libraries a package product forwards to whoever links it.
    pub forwarded: Vec<BuildFile>,
}

impl ProductInfo {
    fn from_settings(target: &Target, settings: &ResolvedSettings) -> Self {
        let scope = &settings.scope;
        let binary_path = target
            .product_type()
            .map(|_| scope.evaluate("$(TARGET_BUILD_DIR)/$(EXECUTABLE_PATH)"));
        let forwarded = match target {
            Target::PackageProduct(p) => p.frameworks.clone(),
            _ => Vec::new(),
        };
        ProductInfo {
            target: target.name().to_string(),
            product_type: target.product_type(),
            product_name: scope.get("PRODUCT_NAME").to_string(),
            full_product_name: scope.get("FULL_PRODUCT_NAME").to_string(),
            product_path: scope.evaluate("$(TARGET_BUILD_DIR)/$(FULL_PRODUCT_NAME)"),
            binary_path,
            module_name: scope.get("PRODUCT_MODULE_NAME").to_string(),
            gates_on_exit: target.gates_on_exit(),
            forwarded,
        }
    }
}

/// Read-only inputs shared by every producer of a pass.
pub struct BuildContext<'a> {
    pub workspace: &'a Workspace,
    pub platforms: &'a PlatformRegistry,
    /// The requested platform
    pub platform: &'a Platform,
    pub toolchain: &'a Toolchain,
    pub tool_info: &'a ToolInfoCache,
    /// Requested configuration name
    pub configuration: String,
    settings: SettingsResolver<'a>,
    products: BTreeMap<String, ProductInfo>,
}

impl fmt::Debug for BuildContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildContext")
            .field("workspace", &self.workspace.name)
            .field("platform", &self.platform.name)
            .field("toolchain", &self.toolchain.identifier)
            .field("configuration", &self.configuration)
            .field("products", &self.products.len())
            .finish()
    }
}

impl<'a> BuildContext<'a> {
    /// Create a context for one pass.
    ///
    /// Product information of every target is computed up front so
    /// producers can refer to other targets' products without resolving
    /// their settings again.
    pub fn new(
        workspace: &'a Workspace,
        platforms: &'a PlatformRegistry,
        platform_name: &str,
        toolchain: &'a Toolchain,
        tool_info: &'a ToolInfoCache,
        configuration: &str,
        overrides: SettingsTable,
    ) -> Result<Self, ConstructionError> {
        let platform = platforms
            .requestable()
            .find(|p| p.name == platform_name)
            .ok_or_else(|| ConstructionError::UnknownPlatform {
                name: platform_name.to_string(),
                known: platforms
                    .requestable()
                    .map(|p| p.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            })?;

        let mut ctx = BuildContext {
            workspace,
            platforms,
            platform,
            toolchain,
            tool_info,
            configuration: configuration.to_string(),
            settings: SettingsResolver::new(workspace, toolchain, overrides),
            products: BTreeMap::new(),
        };

        let mut products = BTreeMap::new();
        for (project, target) in workspace.targets_with_projects() {
            let settings = ctx.base_settings(project, target);
            products.insert(
                target.name().to_string(),
                ProductInfo::from_settings(target, &settings),
            );
        }
        ctx.products = products;

        tracing::debug!(
            "construction context: platform `{}`, configuration `{}`, {} product(s)",
            platform.name,
            configuration,
            ctx.products.len()
        );
        Ok(ctx)
    }

    /// Resolve settings for one (target, platform, arch, variant).
    pub fn resolve(
        &self,
        project: &Project,
        target: &Target,
        platform: &Platform,
        arch: &str,
        variant: &str,
    ) -> Arc<ResolvedSettings> {
        self.settings.resolve(&SettingsRequest {
            project,
            target,
            configuration: &self.configuration,
            platform,
            arch,
            variant,
        })
    }

    /// Architecture-neutral settings of a target on the requested platform.
    pub fn base_settings(&self, project: &Project, target: &Target) -> Arc<ResolvedSettings> {
        self.resolve(project, target, self.platform, UNDEFINED_ARCH, "normal")
    }

    /// Product of the target named `target`.
    pub fn product(&self, target: &str) -> Option<&ProductInfo> {
        self.products.get(target)
    }

    /// Product whose file name is `name` (e.g. `libCore.a`).
    pub fn product_named(&self, name: &str) -> Option<&ProductInfo> {
        self.products
            .values()
            .find(|p| !p.full_product_name.is_empty() && p.full_product_name == name)
    }

    /// Number of settings requests answered from the memo so far.
    pub fn settings_memo_hits(&self) -> usize {
        self.settings.memo_hits()
    }
}
