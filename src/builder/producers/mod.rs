//! Phase task producers.
//!
//! One [`TargetProducer`] runs per configured target. It walks the build
//! phases in declared order, hands each to the producer for its kind, and
//! finally emits link and product tasks. Every producer is a pure function
//! of the configured target, its scopes and the read-only context; the
//! only state is what this target has emitted so far.

mod artifact_bundle;
mod copy_files;
mod headers;
mod link;
mod product;
mod resources;
mod rez;
mod script;
mod sources;
mod swift;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use crate::builder::configured::ConfiguredTarget;
use crate::builder::context::BuildContext;
use crate::builder::diagnostics::TargetDiagnostics;
use crate::builder::graph::{DependencySummary, TargetSummary};
use crate::builder::target_graph::OrderedTarget;
use crate::builder::task::PlannedTask;
use crate::builder::toolchain::Tool;
use crate::core::file_type::{FileType, Language};
use crate::core::phase::{BuildFile, BuildPhase, BuildRule, BuildableRef};
use crate::core::platform::{canonical_filters, filters_admit, Platform};
use crate::core::target::Target;
use crate::settings::{ResolvedSettings, Scope};
use crate::util::diagnostic::Diagnostic;

const BITCODE_DEPRECATED: &str =
    "Building with bitcode is deprecated. Please update your project and/or target settings to disable bitcode.";

/// Everything produced for one target.
#[derive(Debug, Clone)]
pub struct TargetOutput {
    pub ordinal: usize,
    pub summary: TargetSummary,
    pub tasks: Vec<PlannedTask>,
    pub diagnostics: Vec<Diagnostic>,
    /// Positions of dependency targets in build order.
    pub dependencies: Vec<usize>,
    /// Dependents wait for this target's exit gate rather than its
    /// generated-headers gate.
    pub gates_on_exit: bool,
}

impl TargetOutput {
    pub fn name(&self) -> &str {
        &self.summary.name
    }
}

/// Produce all planned tasks of one target.
pub fn produce_target(ctx: &BuildContext<'_>, ordered: &OrderedTarget<'_>) -> TargetOutput {
    let mut diagnostics = TargetDiagnostics::new(ordered.target.name(), &ordered.project.name);
    let configured = ConfiguredTarget::configure(ctx, ordered, &mut diagnostics);

    let mut producer = TargetProducer::new(ctx, &configured, diagnostics);
    producer.run();

    let tasks = producer.tasks;
    let diagnostics = producer.diagnostics.into_vec();
    tracing::debug!(
        "produced {} task(s) and {} diagnostic(s) for `{}`",
        tasks.len(),
        diagnostics.len(),
        configured.name()
    );

    TargetOutput {
        ordinal: configured.ordinal,
        summary: summarize(&configured),
        tasks,
        diagnostics,
        dependencies: configured.dependencies.clone(),
        gates_on_exit: configured.target.gates_on_exit(),
    }
}

fn summarize(target: &ConfiguredTarget<'_>) -> TargetSummary {
    TargetSummary {
        name: target.name().to_string(),
        project: target.project.name.clone(),
        kind: target
            .target
            .product_type()
            .map(|p| p.display_name())
            .unwrap_or(target.target.kind_name())
            .to_string(),
        platform: target.platform.name.clone(),
        zippered_platform: target.secondary.map(|p| p.name.clone()),
        archs: target.archs.clone(),
        module_only_archs: target.module_only_archs.clone(),
        variants: target.variants.clone(),
        dependencies: target
            .target
            .dependencies()
            .iter()
            .map(|d| DependencySummary {
                name: d.name.clone(),
                platform_filters: canonical_filters(&d.platform_filters),
            })
            .collect(),
    }
}

/// Where a resolved build file came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Origin {
    /// A file reference in the group tree.
    File,
    /// The product of the named target.
    Product(String),
    /// A named passthrough item (e.g. an SDK library).
    Named,
}

/// A build file resolved to a concrete path.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedItem {
    pub path: String,
    pub file_type: FileType,
    pub origin: Origin,
}

/// A source file waiting for compilation.
#[derive(Debug, Clone)]
pub(crate) struct SourceInput {
    pub path: String,
    pub language: Language,
    pub additional_args: Vec<String>,
    /// Compile only for this architecture (rule outputs produced per arch).
    pub only_arch: Option<String>,
}

impl SourceInput {
    fn builds_for(&self, arch: &str) -> bool {
        self.only_arch.as_deref().map_or(true, |a| a == arch)
    }
}

/// An entry of the link command line, in declared order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LinkItem {
    Framework { name: String, path: Option<String> },
    Library { path: String },
    SystemLibrary { name: String },
    ObjectLibrary { path: String },
}

/// Link inputs accumulated while phases are processed.
#[derive(Debug, Default)]
pub(crate) struct LinkInputs {
    /// Objects per (variant, arch) on the requested platform.
    pub objects: BTreeMap<(String, String), Vec<String>>,
    /// Languages of everything compiled into the objects.
    pub languages: Vec<Language>,
    pub items: Vec<LinkItem>,
    /// Files the link step reads besides objects (libraries, dependency
    /// binaries).
    pub inputs: Vec<String>,
}

impl LinkInputs {
    pub fn add_object(&mut self, variant: &str, arch: &str, path: String, language: Language) {
        self.objects
            .entry((variant.to_string(), arch.to_string()))
            .or_default()
            .push(path);
        if !self.languages.contains(&language) {
            self.languages.push(language);
        }
    }

    pub fn objects(&self, variant: &str, arch: &str) -> &[String] {
        self.objects
            .get(&(variant.to_string(), arch.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has_language(&self, language: Language) -> bool {
        self.languages.contains(&language)
    }
}

/// Per-target production state.
pub(crate) struct TargetProducer<'c, 'a> {
    ctx: &'c BuildContext<'a>,
    target: &'c ConfiguredTarget<'a>,
    diagnostics: TargetDiagnostics,
    tasks: Vec<PlannedTask>,
    link: LinkInputs,
    swift_sources: Vec<SourceInput>,
    /// Object file stem to the source that claimed it.
    object_names: HashMap<String, String>,
    /// Virtual node of the previous script task, for chaining.
    last_script: Option<String>,
    /// String catalogs that may get generated Swift symbols.
    string_catalogs: Vec<String>,
    bundled_libraries: Vec<artifact_bundle::BundledLibrary>,
    /// Header and link traces checked against `DEPENDENCIES`.
    dependency_traces: Vec<String>,
}

impl<'c, 'a> TargetProducer<'c, 'a> {
    fn new(
        ctx: &'c BuildContext<'a>,
        target: &'c ConfiguredTarget<'a>,
        diagnostics: TargetDiagnostics,
    ) -> Self {
        TargetProducer {
            ctx,
            target,
            diagnostics,
            tasks: Vec::new(),
            link: LinkInputs::default(),
            swift_sources: Vec::new(),
            object_names: HashMap::new(),
            last_script: None,
            string_catalogs: Vec::new(),
            bundled_libraries: Vec::new(),
            dependency_traces: Vec::new(),
        }
    }

    fn run(&mut self) {
        let target = self.target;
        match target.target {
            Target::Standard(standard) => {
                artifact_bundle::load_bundles(self, &standard.build_phases);
                for (index, phase) in standard.build_phases.iter().enumerate() {
                    self.phase(index, phase, &standard.build_rules);
                }
                if !self.swift_sources.is_empty() {
                    resources::generate_string_symbols(self);
                    swift::produce(self);
                }
                link::produce(self, standard.product_type);
                product::produce(self, standard);
                product::validate_dependencies(self);
            }
            Target::Aggregate(aggregate) => {
                for (index, phase) in aggregate.build_phases.iter().enumerate() {
                    self.phase(index, phase, &[]);
                }
            }
            Target::External(external) => product::external(self, external),
            Target::PackageProduct(_) => {}
        }
        product::dependency_info(self);
    }

    fn phase(&mut self, index: usize, phase: &'a BuildPhase, rules: &'a [BuildRule]) {
        tracing::trace!("`{}`: {} phase", self.target.name(), phase.display_name());
        match phase {
            BuildPhase::Sources { .. } => sources::produce(self, phase, rules),
            BuildPhase::Frameworks { .. } => link::collect(self, phase),
            BuildPhase::Resources { .. } => resources::produce(self, phase),
            BuildPhase::Headers { .. } => headers::produce(self, phase),
            BuildPhase::CopyFiles {
                destination,
                subpath,
                ..
            } => copy_files::produce(self, phase, *destination, subpath),
            BuildPhase::ShellScript(script) => script::produce(self, index, script),
            BuildPhase::Rez { .. } => rez::produce_rez(self, phase),
            BuildPhase::AppleScript { .. } => rez::produce_applescript(self, phase),
        }
    }

    /// Architecture-neutral settings of this target.
    fn base(&self) -> &'c Scope {
        &self.target.base.scope
    }

    /// Settings for one (platform, arch, variant), reporting new problems.
    fn scope(&mut self, platform: &Platform, arch: &str, variant: &str) -> Arc<ResolvedSettings> {
        let target = self.target;
        let resolved = self
            .ctx
            .resolve(target.project, target.target, platform, arch, variant);
        self.diagnostics.settings_errors(&resolved.errors);
        resolved
    }

    fn emit(&mut self, mut task: PlannedTask) {
        task.target = self.target.name().to_string();
        if task.working_directory.is_empty() {
            task.working_directory = self.base().get("SRCROOT").to_string();
        }
        self.tasks.push(task);
    }

    /// Phase entries that apply on this platform, resolved and
    /// de-duplicated, in declared order.
    fn phase_files(&mut self, phase: &'a BuildPhase) -> Vec<(&'a BuildFile, ResolvedItem)> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for file in phase.files() {
            if !filters_admit(&file.platform_filters, self.target.platform) {
                tracing::trace!(
                    "skipping `{}` on {}",
                    file.item.display_name(),
                    self.target.platform
                );
                continue;
            }
            let Some(item) = self.resolve_item(&file.item, phase) else {
                continue;
            };
            if !seen.insert(item.path.clone()) {
                self.diagnostics.warning(format!(
                    "Skipping duplicate build file in {} build phase: {}",
                    phase.display_name(),
                    item.path
                ));
                continue;
            }
            out.push((file, item));
        }
        out
    }

    /// Resolve a buildable reference, reporting references that lead
    /// nowhere.
    fn resolve_item(&mut self, item: &BuildableRef, phase: &BuildPhase) -> Option<ResolvedItem> {
        let resolved = self.lookup_file(item);
        if resolved.is_none() {
            self.diagnostics.error(format!(
                "unable to find '{}' referenced by the {} build phase",
                item.display_name(),
                phase.display_name()
            ));
        }
        resolved
    }

    /// Explicit file, then group tree by name, then a product of another
    /// target, then named passthrough.
    fn lookup_file(&self, item: &BuildableRef) -> Option<ResolvedItem> {
        let project = self.target.project;
        match item {
            BuildableRef::File(guid) => project.file_by_guid(guid).map(|f| ResolvedItem {
                path: f.path.to_string_lossy().into_owned(),
                file_type: f.file_type,
                origin: Origin::File,
            }),
            BuildableRef::Auto(name) => match project.file_by_name(name) {
                Some(f) => Some(ResolvedItem {
                    path: f.path.to_string_lossy().into_owned(),
                    file_type: f.file_type,
                    origin: Origin::File,
                }),
                None => self.ctx.product_named(name).map(|p| ResolvedItem {
                    path: p.product_path.clone(),
                    file_type: FileType::from_path(Path::new(&p.full_product_name)),
                    origin: Origin::Product(p.target.clone()),
                }),
            },
            BuildableRef::TargetProduct(name) => self.ctx.product(name).map(|p| ResolvedItem {
                path: p.product_path.clone(),
                file_type: FileType::from_path(Path::new(&p.full_product_name)),
                origin: Origin::Product(p.target.clone()),
            }),
            BuildableRef::Named { name, file_type } => Some(ResolvedItem {
                path: name.clone(),
                file_type: FileType::from_identifier(file_type)
                    .unwrap_or_else(|| FileType::from_path(Path::new(name))),
                origin: Origin::Named,
            }),
        }
    }

    /// Warn about (and reject) compiled sources placed in a phase that
    /// cannot compile them.
    fn rejects_code(&mut self, item: &ResolvedItem, phase: &BuildPhase) -> bool {
        let Some(language) = item.file_type.language() else {
            return false;
        };
        self.diagnostics.warning(format!(
            "The {} file \"{}\" cannot be processed by a {} build phase",
            language.display_name(),
            item.path,
            phase.display_name()
        ));
        true
    }

    /// `OBJECT_FILE_DIR_<variant>/<arch>` of a scope.
    fn object_dir(scope: &Scope, variant: &str, arch: &str) -> String {
        let dir = scope
            .lookup(&format!("OBJECT_FILE_DIR_{}", variant))
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}-{}", scope.get("OBJECT_FILE_DIR"), variant));
        join_path(&dir, arch)
    }

    /// Object file name for a source, unique within the target.
    ///
    /// Sources sharing a stem (`a/x.c`, `b/x.c`) get a short hash of their
    /// path appended after the first.
    fn object_name(&mut self, source: &str) -> String {
        let stem = file_stem(source);
        match self.object_names.get(&stem).cloned() {
            None => {
                self.object_names.insert(stem.clone(), source.to_string());
                stem
            }
            Some(owner) if owner == source => stem,
            Some(_) => format!("{}-{}", stem, crate::util::hash::object_suffix(source)),
        }
    }

    /// Bitcode flag for `tool`, warning once per target when bitcode is
    /// enabled at all.
    fn bitcode_flag(&mut self, scope: &Scope, platform: &Platform, tool: Tool) -> Option<&'static str> {
        if !scope.bool("ENABLE_BITCODE") {
            return None;
        }
        self.diagnostics
            .push_once(Diagnostic::warning(BITCODE_DEPRECATED));
        if !platform.supports_bitcode {
            return None;
        }
        let marker = scope.get("BITCODE_GENERATION_MODE") == "marker";
        let flag = match (tool, marker) {
            (Tool::Swiftc, true) => "-embed-bitcode-marker",
            (Tool::Swiftc, false) => "-embed-bitcode",
            (_, true) => "-fembed-bitcode-marker",
            (_, false) => "-fembed-bitcode",
        };
        self.ctx.toolchain.supports_flag(tool, flag).then_some(flag)
    }

    /// Whether `DEPENDENCIES` declares what the target may use, so that
    /// compiles and links record traces of what it does use.
    fn verifies_dependencies(&self) -> bool {
        !self.base().list("DEPENDENCIES").is_empty()
    }

    /// Deployment target of `platform` in `scope`, if set.
    fn deployment_target<'s>(scope: &'s Scope, platform: &Platform) -> Option<&'s str> {
        platform
            .deployment_target_setting
            .as_deref()
            .map(|name| scope.get(name))
            .filter(|v| !v.is_empty())
    }
}

/// Join a directory and a relative path, tolerating empty components.
pub(crate) fn join_path(dir: &str, rest: &str) -> String {
    let dir = dir.trim_end_matches('/');
    let rest = rest.trim_start_matches('/');
    match (dir.is_empty(), rest.is_empty()) {
        (true, _) => rest.to_string(),
        (false, true) => dir.to_string(),
        (false, false) => format!("{}/{}", dir, rest),
    }
}

pub(crate) fn file_name(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
}

pub(crate) fn file_stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

/// Prefix every element of a list with a flag (`-I`, `-F`, ...).
pub(crate) fn prefixed(flag: &str, values: Vec<String>) -> impl Iterator<Item = String> + '_ {
    values.into_iter().map(move |v| format!("{}{}", flag, v))
}
