//! Configured targets.
//!
//! A configured target is a target bound to the platforms, architectures
//! and variants it builds for in this pass. Producers iterate these sets;
//! they never read `ARCHS` or `BUILD_VARIANTS` themselves.

use std::sync::Arc;

use crate::builder::context::BuildContext;
use crate::builder::diagnostics::TargetDiagnostics;
use crate::builder::target_graph::OrderedTarget;
use crate::core::platform::Platform;
use crate::core::target::Target;
use crate::core::workspace::Project;
use crate::settings::ResolvedSettings;

/// A target bound to its platform, architecture and variant selection.
#[derive(Debug, Clone)]
pub struct ConfiguredTarget<'a> {
    pub ordinal: usize,
    pub project: &'a Project,
    pub target: &'a Target,
    /// The requested platform.
    pub platform: &'a Platform,
    /// Zippered secondary platform, when `IS_ZIPPERED` is set.
    pub secondary: Option<&'a Platform>,
    /// Architectures that produce object code, in declared order.
    pub archs: Vec<String>,
    /// Architectures that only produce module interfaces.
    pub module_only_archs: Vec<String>,
    pub variants: Vec<String>,
    /// Architecture-neutral settings on the requested platform.
    pub base: Arc<ResolvedSettings>,
    /// Positions of dependency targets in build order.
    pub dependencies: Vec<usize>,
}

impl<'a> ConfiguredTarget<'a> {
    /// Bind an ordered target to this pass's selection.
    pub fn configure(
        ctx: &BuildContext<'a>,
        ordered: &OrderedTarget<'a>,
        diagnostics: &mut TargetDiagnostics,
    ) -> Self {
        let base = ctx.base_settings(ordered.project, ordered.target);
        diagnostics.settings_errors(&base.errors);
        let scope = &base.scope;
        let platform = ctx.platform;

        let requested = dedup(scope.list("ARCHS"));
        let valid = scope.list("VALID_ARCHS");
        let archs: Vec<String> = requested
            .iter()
            .filter(|a| valid.contains(a))
            .cloned()
            .collect();
        if archs.len() != requested.len() {
            tracing::debug!(
                "`{}`: dropped architectures not in VALID_ARCHS: {:?}",
                ordered.target.name(),
                requested.iter().filter(|a| !valid.contains(a)).collect::<Vec<_>>()
            );
        }

        let needs_archs = matches!(ordered.target, Target::Standard(_));
        if needs_archs && archs.is_empty() {
            diagnostics.error(format!(
                "No architectures to compile for (ARCHS={}, VALID_ARCHS={}).",
                scope.get("ARCHS"),
                scope.get("VALID_ARCHS")
            ));
        }

        let module_only_archs: Vec<String> = dedup(scope.list("SWIFT_MODULE_ONLY_ARCHS"))
            .into_iter()
            .filter(|a| !archs.contains(a))
            .collect();

        let mut variants = dedup(scope.list("BUILD_VARIANTS"));
        if variants.is_empty() {
            variants.push("normal".to_string());
        }

        let secondary = if scope.bool("IS_ZIPPERED") {
            let secondary = ctx.platforms.zippered_secondary(platform);
            if secondary.is_none() {
                diagnostics.warning(format!(
                    "IS_ZIPPERED is set but platform '{}' has no zippered counterpart",
                    platform.name
                ));
            }
            secondary
        } else {
            None
        };

        tracing::debug!(
            "configured `{}`: archs {:?}, module-only {:?}, variants {:?}{}",
            ordered.target.name(),
            archs,
            module_only_archs,
            variants,
            secondary
                .map(|p| format!(", zippered with {}", p.name))
                .unwrap_or_default()
        );

        ConfiguredTarget {
            ordinal: ordered.ordinal,
            project: ordered.project,
            target: ordered.target,
            platform,
            secondary,
            archs,
            module_only_archs,
            variants,
            base,
            dependencies: ordered.dependencies.clone(),
        }
    }

    /// Platforms to fan out over: the requested one, then the secondary.
    pub fn platforms(&self) -> Vec<&'a Platform> {
        let mut platforms = vec![self.platform];
        platforms.extend(self.secondary);
        platforms
    }

    /// Object-producing architectures followed by module-only ones.
    pub fn all_archs(&self) -> impl Iterator<Item = &str> {
        self.archs
            .iter()
            .chain(self.module_only_archs.iter())
            .map(String::as_str)
    }

    pub fn is_module_only(&self, arch: &str) -> bool {
        self.module_only_archs.iter().any(|a| a == arch)
    }

    pub fn name(&self) -> &'a str {
        self.target.name()
    }
}

fn dedup(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}
