//! Swift module orchestration.
//!
//! Each (platform, variant, arch) gets a *compilation requirements* task,
//! which emits the module, interface files and generated header so
//! dependents can start early, and a *compilation* task that emits object
//! code. Module-only architectures stop after the requirements task.
//! Per-arch generated headers are merged per platform, and module files are
//! copied into the product when `SWIFT_INSTALL_MODULE` is set.

use std::collections::BTreeMap;

use semver::Version;

use super::{artifact_bundle, join_path, prefixed, SourceInput, TargetProducer};
use crate::builder::task::{virtual_node, write_aux_file, PlannedTask, Stage};
use crate::builder::toolchain::Tool;
use crate::core::file_type::Language;
use crate::core::platform::Platform;
use crate::core::target::ProductType;
use crate::settings::Scope;
use crate::util::diagnostic::{suggestions, Diagnostic};

/// Earliest compiler that can start compilation from the requirements
/// task's explicit module outputs.
const EXPLICIT_MODULES_MIN: Version = Version::new(5, 9, 0);

/// Artifacts of one requirements task.
struct ModuleArtifacts {
    arch: String,
    module: String,
    doc: String,
    abi: String,
    interface: Option<String>,
    header: String,
}

pub(super) fn produce(p: &mut TargetProducer<'_, '_>) {
    let target = p.target;
    let sources = std::mem::take(&mut p.swift_sources);
    let module_name = p.base().get("PRODUCT_MODULE_NAME").to_string();

    for (index, platform) in target.platforms().into_iter().enumerate() {
        let primary = index == 0;
        for (variant_index, variant) in target.variants.iter().enumerate() {
            let mut artifacts = Vec::new();
            for arch in target.all_archs() {
                let arch_sources: Vec<&SourceInput> =
                    sources.iter().filter(|s| s.builds_for(arch)).collect();
                if arch_sources.is_empty() {
                    continue;
                }
                let produced = produce_arch(
                    p,
                    platform,
                    primary,
                    variant,
                    arch,
                    &module_name,
                    &arch_sources,
                );
                artifacts.push(produced);
            }
            // module files and headers do not differ between variants
            if artifacts.is_empty() || variant_index > 0 {
                continue;
            }
            merge_headers(p, platform, primary, &artifacts);
            if p.base().bool("SWIFT_INSTALL_MODULE") {
                copy_module(p, platform, &module_name, &artifacts);
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn produce_arch(
    p: &mut TargetProducer<'_, '_>,
    platform: &Platform,
    primary: bool,
    variant: &str,
    arch: &str,
    module_name: &str,
    sources: &[&SourceInput],
) -> ModuleArtifacts {
    let target = p.target;
    let module_only = target.is_module_only(arch);
    let resolved = p.scope(platform, arch, variant);
    let scope = &resolved.scope;
    let object_dir = TargetProducer::object_dir(scope, variant, arch);

    let triple = if module_only {
        module_only_triple(p, scope, platform, primary, arch)
    } else {
        platform.target_triple(arch, TargetProducer::deployment_target(scope, platform))
    };

    let header_name = scope.get("SWIFT_OBJC_INTERFACE_HEADER_NAME").to_string();
    let artifacts = ModuleArtifacts {
        arch: arch.to_string(),
        module: join_path(&object_dir, &format!("{}.swiftmodule", module_name)),
        doc: join_path(&object_dir, &format!("{}.swiftdoc", module_name)),
        abi: join_path(&object_dir, &format!("{}.abi.json", module_name)),
        interface: scope
            .bool("BUILD_LIBRARY_FOR_DISTRIBUTION")
            .then(|| join_path(&object_dir, &format!("{}.swiftinterface", module_name))),
        header: join_path(&object_dir, &header_name),
    };

    let objects: Vec<(String, String)> = sources
        .iter()
        .map(|s| {
            let name = p.object_name(&s.path);
            (s.path.clone(), join_path(&object_dir, &format!("{}.o", name)))
        })
        .collect();

    let output_file_map = join_path(&object_dir, &format!("{}-OutputFileMap.json", module_name));
    let map: BTreeMap<&str, BTreeMap<&str, &str>> = objects
        .iter()
        .map(|(src, obj)| (src.as_str(), BTreeMap::from([("object", obj.as_str())])))
        .collect();
    let contents = match serde_json::to_string_pretty(&map) {
        Ok(json) => json,
        Err(e) => {
            p.diagnostics.error(format!("unable to write output file map: {}", e));
            return artifacts;
        }
    };
    p.emit(write_aux_file(&output_file_map, contents));

    let bitcode = if module_only {
        None
    } else {
        p.bitcode_flag(scope, platform, Tool::Swiftc)
    };

    let mut common: Vec<String> = vec![
        scope.get("SWIFT_EXEC").to_string(),
        "-module-name".into(),
        module_name.to_string(),
        "-target".into(),
        triple,
        scope.get("SWIFT_OPTIMIZATION_LEVEL").to_string(),
        "-swift-version".into(),
        scope.get("SWIFT_VERSION").to_string(),
    ];
    if scope.get("SWIFT_COMPILATION_MODE") == "wholemodule" {
        common.push("-whole-module-optimization".into());
    }
    common.extend(prefixed("-I", scope.list("HEADER_SEARCH_PATHS")));
    common.push(format!("-F{}", scope.get("BUILT_PRODUCTS_DIR")));
    common.extend(prefixed("-F", scope.list("FRAMEWORK_SEARCH_PATHS")));
    common.extend(artifact_bundle::swift_flags(p, platform, arch));
    common.extend(scope.list("OTHER_SWIFT_FLAGS"));
    for source in sources {
        common.extend(source.additional_args.iter().cloned());
    }
    common.push("-output-file-map".into());
    common.push(output_file_map.clone());
    common.extend(sources.iter().map(|s| s.path.clone()));

    let source_paths: Vec<String> = sources.iter().map(|s| s.path.clone()).collect();
    let requirements_node = virtual_node(format!(
        "swift-requirements-{}-{}-{}-{}",
        target.name(),
        platform.name,
        variant,
        arch
    ));

    let mut requirements = PlannedTask::new(
        [
            "SwiftDriver Compilation Requirements",
            module_name,
            variant,
            arch,
            platform.name.as_str(),
        ],
        Stage::Interface,
    )
    .args(common.iter().cloned())
    .args(["-emit-module", "-emit-module-path", artifacts.module.as_str()])
    .args(["-emit-objc-header", "-emit-objc-header-path", artifacts.header.as_str()]);
    if let Some(interface) = &artifacts.interface {
        requirements = requirements.args([
            "-enable-library-evolution",
            "-emit-module-interface-path",
            interface.as_str(),
        ]);
    }
    requirements = requirements
        .inputs(source_paths.iter().cloned())
        .input(output_file_map.as_str())
        .outputs([
            artifacts.module.clone(),
            artifacts.doc.clone(),
            artifacts.abi.clone(),
            artifacts.header.clone(),
        ])
        .outputs(artifacts.interface.iter().cloned())
        .output(requirements_node.as_str())
        .action("swift-driver")
        .describe(format!(
            "Emit Swift module {} ({} {} {})",
            module_name, platform.name, arch, variant
        ));
    p.emit(requirements);

    if module_only {
        tracing::debug!(
            "`{}`: {} is module-only, skipping compilation",
            target.name(),
            arch
        );
        return artifacts;
    }

    let mut compilation = PlannedTask::new(
        [
            "SwiftDriver Compilation",
            module_name,
            variant,
            arch,
            platform.name.as_str(),
        ],
        Stage::Compile,
    )
    .args(common.iter().cloned());
    if let Some(flag) = bitcode {
        compilation = compilation.arg(flag);
    }
    if explicit_modules(p, scope) {
        compilation = compilation
            .arg("-explicit-module-build")
            .input(requirements_node.as_str());
    }
    compilation = compilation
        .arg("-c")
        .inputs(source_paths)
        .input(output_file_map.as_str())
        .outputs(objects.iter().map(|(_, obj)| obj.clone()))
        .action("swift-driver")
        .describe(format!(
            "Compile Swift module {} ({} {} {})",
            module_name, platform.name, arch, variant
        ));
    p.emit(compilation);

    // objects of a zippered secondary platform are not linked
    if primary {
        for (_, object) in objects {
            p.link.add_object(variant, arch, object, Language::Swift);
        }
    }
    artifacts
}

/// Triple of a module-only arch, reporting a missing deployment target.
fn module_only_triple(
    p: &mut TargetProducer<'_, '_>,
    scope: &Scope,
    platform: &Platform,
    primary: bool,
    arch: &str,
) -> String {
    let Some(setting) = platform.deployment_target_setting.as_deref() else {
        return platform.module_triple(arch);
    };
    let name = format!("SWIFT_MODULE_ONLY_{}", setting);
    let value = scope.get(&name);
    if !value.is_empty() {
        return platform.target_triple(arch, Some(value));
    }
    if primary {
        p.diagnostics.push_once(
            Diagnostic::error(format!(
                "Using SWIFT_MODULE_ONLY_ARCHS but no module-only deployment target has been specified via {} for architecture '{}'.",
                name, arch
            ))
            .with_suggestion(suggestions::MODULE_ONLY_DEPLOYMENT_TARGET),
        );
    }
    platform.module_triple(arch)
}

/// Explicit module builds need the setting, toolchain support for the
/// flag, and a compiler that is recent enough (or of unknown version).
fn explicit_modules(p: &TargetProducer<'_, '_>, scope: &Scope) -> bool {
    if !scope.bool("SWIFT_ENABLE_EXPLICIT_MODULES") {
        return false;
    }
    let toolchain = p.ctx.toolchain;
    if !toolchain.supports_flag(Tool::Swiftc, "-explicit-module-build") {
        return false;
    }
    match p.ctx.tool_info.version(Tool::Swiftc, toolchain) {
        Some(version) => version >= EXPLICIT_MODULES_MIN,
        None => true,
    }
}

/// Merge the per-arch generated headers of one platform.
///
/// Inputs are sorted by architecture so the task is the same whatever
/// order `ARCHS` lists them in. A zippered secondary platform has no
/// product of its own, so its header stays in derived sources.
fn merge_headers(
    p: &mut TargetProducer<'_, '_>,
    platform: &Platform,
    primary: bool,
    artifacts: &[ModuleArtifacts],
) {
    let target = p.target;
    let resolved = p.scope(platform, crate::settings::resolver::UNDEFINED_ARCH, "normal");
    let scope = &resolved.scope;
    let header_name = scope.get("SWIFT_OBJC_INTERFACE_HEADER_NAME");

    let installs = primary
        && target.target.product_type() == Some(ProductType::Framework)
        && scope.bool("SWIFT_INSTALL_OBJC_HEADER");
    let destination = if installs {
        scope.evaluate(&format!(
            "$(TARGET_BUILD_DIR)/$(PUBLIC_HEADERS_FOLDER_PATH)/{}",
            header_name
        ))
    } else {
        join_path(scope.get("DERIVED_FILE_DIR"), header_name)
    };

    let mut sorted: Vec<&ModuleArtifacts> = artifacts.iter().collect();
    sorted.sort_by(|a, b| a.arch.cmp(&b.arch));

    let mut rule_info = vec!["SwiftMergeGeneratedHeaders".to_string(), destination.clone()];
    rule_info.extend(sorted.iter().map(|a| a.header.clone()));

    let mut task = PlannedTask::new(rule_info, Stage::Interface).arg("builtin-swiftHeaderTool");
    for a in &sorted {
        task = task.args(["-arch", a.arch.as_str(), a.header.as_str()]);
    }
    task = task
        .args(["-o", destination.as_str()])
        .inputs(sorted.iter().map(|a| a.header.clone()))
        .output(destination.as_str())
        .action("swift-header-tool")
        .describe(format!("Merge {} ({})", header_name, platform.name));
    p.emit(task);
}

/// Copy module artifacts into the product's module directory.
///
/// Zippered secondaries copy into the primary product; their files are
/// told apart by the platform's module triple.
fn copy_module(
    p: &mut TargetProducer<'_, '_>,
    platform: &Platform,
    module_name: &str,
    artifacts: &[ModuleArtifacts],
) {
    let target = p.target;
    let product_platform = target.platform;
    let resolved = p.scope(product_platform, crate::settings::resolver::UNDEFINED_ARCH, "normal");
    let scope = &resolved.scope;
    let root = if target.target.product_type() == Some(ProductType::Framework) {
        scope.evaluate("$(TARGET_BUILD_DIR)/$(MODULES_FOLDER_PATH)")
    } else {
        scope.get("BUILT_PRODUCTS_DIR").to_string()
    };
    let module_dir = join_path(&root, &format!("{}.swiftmodule", module_name));

    for a in artifacts {
        let triple = platform.module_triple(&a.arch);
        let mut pairs = vec![
            (a.module.clone(), format!("{}.swiftmodule", triple)),
            (a.doc.clone(), format!("{}.swiftdoc", triple)),
            (a.abi.clone(), format!("{}.abi.json", triple)),
        ];
        if let Some(interface) = &a.interface {
            pairs.push((interface.clone(), format!("{}.swiftinterface", triple)));
        }
        for (source, name) in pairs {
            let destination = join_path(&module_dir, &name);
            let task = PlannedTask::new(["Copy", destination.as_str(), source.as_str()], Stage::Interface)
                .args(["builtin-copy", "-exclude", ".DS_Store", source.as_str(), destination.as_str()])
                .input(source.as_str())
                .output(destination.as_str())
                .action("copy")
                .describe(format!("Copy {}", name));
            p.emit(task);
        }
    }
}
