//! Implementation of a task construction pass.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use rayon::prelude::*;

use crate::builder::assembler;
use crate::builder::diagnostics::{target_scope, DiagnosticsCollector, ORDERING_SCOPE};
use crate::builder::producers::{produce_target, TargetOutput};
use crate::builder::target_graph::{self, OrderedTarget};
use crate::builder::toolchain::{ToolInfoCache, Toolchain, ToolchainRegistry};
use crate::builder::{BuildContext, TaskGraph};
use crate::core::platform::PlatformRegistry;
use crate::core::workspace::Workspace;
use crate::settings::resolver::UNDEFINED_ARCH;
use crate::settings::{Scope, SettingsTable};
use crate::util::config::{Config, ToolchainConfig};
use crate::util::diagnostic::{suggestions, Diagnostic, Severity};

/// Options for one construction pass.
#[derive(Debug, Clone)]
pub struct ConstructOptions {
    /// Requested configuration name
    pub configuration: String,

    /// Requested platform identifier
    pub platform: String,

    /// Architecture override (empty = target settings decide)
    pub archs: Vec<String>,

    /// Build-setting overrides at command-line precedence
    pub overrides: BTreeMap<String, String>,

    /// Produce targets on the rayon pool
    pub parallel: bool,

    /// Number of threads (None = rayon default)
    pub jobs: Option<usize>,
}

impl Default for ConstructOptions {
    fn default() -> Self {
        ConstructOptions {
            configuration: "Debug".to_string(),
            platform: "macosx".to_string(),
            archs: Vec::new(),
            overrides: BTreeMap::new(),
            parallel: true,
            jobs: None,
        }
    }
}

impl ConstructOptions {
    /// Options taken from a loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        let defaults = ConstructOptions::default();
        ConstructOptions {
            configuration: config
                .build
                .configuration
                .clone()
                .unwrap_or(defaults.configuration),
            platform: config.build.platform.clone().unwrap_or(defaults.platform),
            archs: config.build.archs.clone().unwrap_or_default(),
            overrides: config.overrides.clone(),
            parallel: config.build.parallel,
            jobs: config.build.jobs,
        }
    }

    /// The override table handed to the settings resolver. An explicit
    /// architecture list becomes an `ARCHS` override.
    fn override_table(&self) -> Result<SettingsTable> {
        let (mut table, errors) = SettingsTable::from_map(&self.overrides);
        if let Some(error) = errors.into_iter().next() {
            bail!("invalid build setting override: {}", error);
        }
        if !self.archs.is_empty() {
            table.set("ARCHS", self.archs.join(" "));
        }
        Ok(table)
    }
}

/// Registries and tool information a pass reads.
#[derive(Debug)]
pub struct ToolSetup {
    pub platforms: PlatformRegistry,
    pub toolchain: Toolchain,
    pub tool_info: ToolInfoCache,
}

impl Default for ToolSetup {
    fn default() -> Self {
        let registry = ToolchainRegistry::default();
        let toolchain = registry
            .default_toolchain()
            .cloned()
            .unwrap_or_else(|| Toolchain::new("default", "/usr/bin"));
        ToolSetup {
            platforms: PlatformRegistry::builtin(),
            toolchain,
            tool_info: ToolInfoCache::default(),
        }
    }
}

impl ToolSetup {
    /// Select the toolchain and version probe named by configuration.
    pub fn from_config(config: &ToolchainConfig) -> Result<Self> {
        let registry = match &config.developer_dir {
            Some(dir) => ToolchainRegistry::with_developer_dir(dir),
            None => ToolchainRegistry::default(),
        };
        let toolchain = match &config.identifier {
            Some(id) => registry.lookup(id).cloned().ok_or_else(|| {
                anyhow::anyhow!(
                    "unknown toolchain `{}`\n\
                     hint: set `toolchain.identifier` to a registered toolchain or remove it",
                    id
                )
            })?,
            None => registry
                .default_toolchain()
                .cloned()
                .context("no toolchain registered")?,
        };
        let probe = config
            .tool_probe()
            .context("invalid [toolchain] configuration")?;
        tracing::debug!(
            "using toolchain `{}` at {}",
            toolchain.identifier,
            toolchain.bin_dir.display()
        );
        Ok(ToolSetup {
            platforms: PlatformRegistry::builtin(),
            toolchain,
            tool_info: ToolInfoCache::new(probe),
        })
    }

    fn context<'a>(&'a self, ws: &'a Workspace, opts: &ConstructOptions) -> Result<BuildContext<'a>> {
        let overrides = opts.override_table()?;
        let ctx = BuildContext::new(
            ws,
            &self.platforms,
            &opts.platform,
            &self.toolchain,
            &self.tool_info,
            &opts.configuration,
            overrides,
        )?;
        Ok(ctx)
    }
}

/// Result of a pass. A graph exists even when `diagnostics` contain
/// errors; callers treat either as a failed configuration.
#[derive(Debug)]
pub struct Construction {
    pub graph: TaskGraph,
    /// Diagnostics in canonical order.
    pub diagnostics: Vec<Diagnostic>,
}

impl Construction {
    pub fn has_errors(&self) -> bool {
        !self.graph.valid || self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_error()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count()
    }
}

/// Construct the task graph of every target in the workspace.
pub fn construct_task_graph(
    ws: &Workspace,
    tools: &ToolSetup,
    opts: &ConstructOptions,
) -> Result<Construction> {
    let ctx = tools.context(ws, opts)?;
    let collector = DiagnosticsCollector::new();

    let order = target_graph::order(&ctx);
    collector.append(ORDERING_SCOPE, order.diagnostics);

    let mut outputs = produce_all(&ctx, &order.targets, opts)?;
    for output in &mut outputs {
        collector.append(target_scope(output.ordinal), std::mem::take(&mut output.diagnostics));
    }

    let graph = assembler::assemble(outputs, &collector)
        .with_context(|| format!("failed to assemble the task graph of `{}`", ws.name))?;

    let mut diagnostics = collector.into_sorted();
    if !graph.valid {
        diagnostics.push(
            Diagnostic::note("the task graph has conflicting outputs and cannot be executed")
                .with_suggestion(suggestions::INVALID_GRAPH),
        );
    }
    tracing::info!(
        "constructed {} task(s) for {} target(s) ({} settings lookups memoized, {} tool probe(s))",
        graph.len(),
        graph.targets.len(),
        ctx.settings_memo_hits(),
        tools.tool_info.probe_count()
    );
    Ok(Construction { graph, diagnostics })
}

/// Produce every ordered target, in build order.
fn produce_all(
    ctx: &BuildContext<'_>,
    targets: &[OrderedTarget<'_>],
    opts: &ConstructOptions,
) -> Result<Vec<TargetOutput>> {
    if !opts.parallel || targets.len() < 2 {
        return Ok(targets.iter().map(|t| produce_target(ctx, t)).collect());
    }

    // `collect` on an indexed parallel iterator keeps input order
    let produce = || -> Vec<TargetOutput> {
        targets.par_iter().map(|t| produce_target(ctx, t)).collect()
    };
    match opts.jobs {
        Some(jobs) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(jobs)
                .build()
                .context("failed to start the production thread pool")?;
            Ok(pool.install(produce))
        }
        None => Ok(produce()),
    }
}

/// Target names in build order, plus ordering diagnostics.
pub fn order_targets(
    ws: &Workspace,
    tools: &ToolSetup,
    opts: &ConstructOptions,
) -> Result<(Vec<String>, Vec<Diagnostic>)> {
    let ctx = tools.context(ws, opts)?;
    let order = target_graph::order(&ctx);
    let names = order.names().into_iter().map(str::to_string).collect();
    Ok((names, order.diagnostics))
}

/// Resolved settings of one target, for `arch` or architecture-neutral.
pub fn resolve_target_settings(
    ws: &Workspace,
    tools: &ToolSetup,
    opts: &ConstructOptions,
    target: &str,
    arch: Option<&str>,
) -> Result<(Scope, Vec<Diagnostic>)> {
    let (project, found) = ws.find_target(target).ok_or_else(|| {
        let known: Vec<&str> = ws.targets().map(|t| t.name()).collect();
        anyhow::anyhow!(
            "unknown target `{}`\n\
             available targets: {}\n\
             hint: {}",
            target,
            if known.is_empty() {
                "(none)".to_string()
            } else {
                known.join(", ")
            },
            suggestions::TARGET_NOT_FOUND
        )
    })?;
    let ctx = tools.context(ws, opts)?;
    let resolved = ctx.resolve(
        project,
        found,
        ctx.platform,
        arch.unwrap_or(UNDEFINED_ARCH),
        "normal",
    );
    let diagnostics = resolved
        .errors
        .iter()
        .map(|e| Diagnostic::error(e.to_string()).in_target(target, &project.name))
        .collect();
    Ok((resolved.scope.clone(), diagnostics))
}

/// Load a workspace description plus the configuration next to it.
pub fn load_workspace(path: &Path) -> Result<(Workspace, Config)> {
    let ws = Workspace::load(path)
        .with_context(|| format!("failed to load workspace `{}`", path.display()))?;
    let project_config = crate::util::config::project_config_path(&ws.root);
    let global_config = crate::util::config::global_config_path();
    let config = crate::util::config::load_config(global_config.as_deref(), &project_config);
    Ok((ws, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use crate::core::target::ProductType;
    use crate::test_support::{ProjectBuilder, TargetBuilder};

    fn options() -> ConstructOptions {
        ConstructOptions {
            archs: vec!["arm64".to_string()],
            ..Default::default()
        }
    }

    fn workspace() -> Workspace {
        ProjectBuilder::new("P")
            .files(&["main.c", "core.c"])
            .target(TargetBuilder::standard("Core", ProductType::StaticLibrary).sources(&["core.c"]))
            .target(
                TargetBuilder::standard("Tool", ProductType::Tool)
                    .depends_on("Core")
                    .sources(&["main.c"])
                    .link_target("Core"),
            )
            .into_workspace()
    }

    #[test]
    fn test_construct_simple_workspace() {
        let ws = workspace();
        let result = construct_task_graph(&ws, &ToolSetup::default(), &options()).unwrap();
        assert!(!result.has_errors(), "{:?}", result.diagnostics);
        assert_eq!(result.graph.targets.len(), 2);
        assert_eq!(result.graph.targets[0].name, "Core");
        assert_eq!(result.graph.tasks_with_rule("CompileC").count(), 2);
        assert_eq!(result.graph.tasks_with_rule("Libtool").count(), 1);

        let ld = result.graph.tasks_with_rule("Ld").next().unwrap();
        assert!(ld.inputs.iter().any(|i| i.ends_with("/libCore.a")));
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let ws = workspace();
        let tools = ToolSetup::default();
        let parallel = construct_task_graph(&ws, &tools, &options()).unwrap();
        let sequential = construct_task_graph(
            &ws,
            &tools,
            &ConstructOptions {
                parallel: false,
                ..options()
            },
        )
        .unwrap();
        let pooled = construct_task_graph(
            &ws,
            &tools,
            &ConstructOptions {
                jobs: Some(2),
                ..options()
            },
        )
        .unwrap();
        assert_eq!(parallel.graph, sequential.graph);
        assert_eq!(parallel.graph.signature(), pooled.graph.signature());
        assert_eq!(parallel.diagnostics, sequential.diagnostics);
    }

    #[test]
    fn test_unknown_platform_fails_the_pass() {
        let ws = workspace();
        let opts = ConstructOptions {
            platform: "amiga".to_string(),
            ..options()
        };
        let err = construct_task_graph(&ws, &ToolSetup::default(), &opts).unwrap_err();
        assert!(err.to_string().contains("unknown platform `amiga`"));
    }

    #[test]
    fn test_overrides_and_archs() {
        let mut opts = options();
        opts.archs = vec!["x86_64".to_string()];
        opts.overrides.insert("GCC_OPTIMIZATION_LEVEL".into(), "3".into());
        let ws = workspace();
        let result = construct_task_graph(&ws, &ToolSetup::default(), &opts).unwrap();
        let compile = result.graph.tasks_with_rule("CompileC").next().unwrap();
        assert_eq!(compile.rule_info[4], "x86_64");
        assert!(compile.command_line.iter().any(|a| a == "-O3"));
    }

    #[test]
    fn test_malformed_override_rejected() {
        let mut opts = options();
        opts.overrides.insert("OTHER_CFLAGS[arch=arm64".into(), "-g".into());
        let err = construct_task_graph(&workspace(), &ToolSetup::default(), &opts).unwrap_err();
        assert!(err.to_string().contains("invalid build setting override"));
    }

    #[test]
    fn test_order_targets() {
        let (names, diagnostics) =
            order_targets(&workspace(), &ToolSetup::default(), &options()).unwrap();
        assert_eq!(names, vec!["Core", "Tool"]);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_resolve_target_settings() {
        let ws = workspace();
        let (scope, diagnostics) =
            resolve_target_settings(&ws, &ToolSetup::default(), &options(), "Core", Some("arm64"))
                .unwrap();
        assert!(diagnostics.is_empty());
        assert_eq!(scope.get("FULL_PRODUCT_NAME"), "libCore.a");
        assert_eq!(scope.get("CURRENT_ARCH"), "arm64");

        let err = resolve_target_settings(&ws, &ToolSetup::default(), &options(), "Nope", None)
            .unwrap_err();
        assert!(err.to_string().contains("available targets: Core, Tool"));
    }

    #[test]
    fn test_options_from_config() {
        let mut config = Config::default();
        config.build.platform = Some("iphoneos".into());
        config.build.archs = Some(vec!["arm64".into()]);
        config.overrides.insert("A".into(), "1".into());
        let opts = ConstructOptions::from_config(&config);
        assert_eq!(opts.platform, "iphoneos");
        assert_eq!(opts.configuration, "Debug");
        assert_eq!(opts.archs, vec!["arm64"]);
        assert_eq!(opts.overrides["A"], "1");
    }

    #[test]
    fn test_tool_setup_from_config() {
        let config = ToolchainConfig {
            developer_dir: Some(PathBuf::from("/Dev")),
            ..Default::default()
        };
        let tools = ToolSetup::from_config(&config).unwrap();
        assert_eq!(tools.toolchain.bin_dir, PathBuf::from("/Dev/usr/bin"));

        let missing = ToolchainConfig {
            identifier: Some("swift-nightly".into()),
            ..Default::default()
        };
        assert!(ToolSetup::from_config(&missing).is_err());
    }
}
