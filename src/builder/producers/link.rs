//! Frameworks phase and the link step.
//!
//! The Frameworks phase emits nothing on its own: its entries become link
//! items, in declared order. The link step then emits the product binary
//! with `Ld`, `Libtool` or the object library assembler.

use std::collections::HashSet;

use super::{artifact_bundle, join_path, LinkItem, Origin, ResolvedItem, TargetProducer};
use crate::builder::task::{write_aux_file, PlannedTask, Stage};
use crate::builder::toolchain::Tool;
use crate::core::file_type::{FileType, Language};
use crate::core::phase::{BuildFile, BuildPhase};
use crate::core::target::ProductType;
use crate::settings::resolver::UNDEFINED_ARCH;
use crate::settings::Scope;

pub(super) fn collect<'a>(p: &mut TargetProducer<'_, 'a>, phase: &'a BuildPhase) {
    let mut visited = HashSet::new();
    for (_, item) in p.phase_files(phase) {
        add_item(p, phase, item, &mut visited);
    }
}

fn add_item(
    p: &mut TargetProducer<'_, '_>,
    phase: &BuildPhase,
    item: ResolvedItem,
    visited: &mut HashSet<String>,
) {
    let ctx = p.ctx;
    if let Origin::Product(target) = &item.origin {
        if let Some(product) = ctx.product(target) {
            if product.product_type.is_none() {
                // package products forward their own frameworks
                if visited.insert(target.clone()) {
                    forward(p, phase, &product.forwarded, visited);
                }
                return;
            }
            if let Some(binary) = &product.binary_path {
                p.link.inputs.push(binary.clone());
            }
        }
    }

    let link_item = match (item.file_type, &item.origin) {
        (FileType::Framework, Origin::Named) => LinkItem::Framework {
            name: super::file_stem(&item.path),
            path: None,
        },
        (FileType::Framework, _) => LinkItem::Framework {
            name: super::file_stem(&item.path),
            path: std::path::Path::new(&item.path)
                .parent()
                .map(|d| d.to_string_lossy().into_owned()),
        },
        (FileType::StaticArchive | FileType::DynamicLibrary, Origin::Named) => {
            LinkItem::SystemLibrary {
                name: library_name(&item.path),
            }
        }
        (FileType::StaticArchive | FileType::DynamicLibrary, _) => {
            if item.origin == Origin::File {
                p.link.inputs.push(item.path.clone());
            }
            LinkItem::Library { path: item.path }
        }
        (FileType::ObjectLibrary, _) => LinkItem::ObjectLibrary { path: item.path },
        // archives of the matching variant are linked per arch
        (FileType::ArtifactBundle, _) => return,
        (other, _) => {
            p.diagnostics.warning(format!(
                "'{}' of type '{}' is not a library or framework and will not be linked",
                item.path,
                other.identifier()
            ));
            return;
        }
    };
    p.link.items.push(link_item);
}

fn forward(
    p: &mut TargetProducer<'_, '_>,
    phase: &BuildPhase,
    files: &[BuildFile],
    visited: &mut HashSet<String>,
) {
    for file in files {
        if let Some(item) = p.resolve_item(&file.item, phase) {
            add_item(p, phase, item, visited);
        }
    }
}

/// `libz.dylib` -> `z`.
fn library_name(path: &str) -> String {
    let stem = super::file_stem(path);
    stem.strip_prefix("lib").map(str::to_string).unwrap_or(stem)
}

pub(super) fn produce(p: &mut TargetProducer<'_, '_>, product_type: ProductType) {
    match product_type {
        ProductType::ObjectLibrary => assemble_object_library(p),
        ProductType::StaticLibrary => libtool(p),
        linked if linked.is_linked() => link(p, linked),
        _ => {}
    }
}

/// Variant suffix of the product binary (`_profile`, none for normal).
fn variant_suffix(variant: &str) -> String {
    if variant == "normal" {
        String::new()
    } else {
        format!("_{}", variant)
    }
}

/// `AssembleObjectLibrary` per variant over every arch's objects.
fn assemble_object_library(p: &mut TargetProducer<'_, '_>) {
    let target = p.target;
    for variant in &target.variants {
        let resolved = p.scope(target.platform, UNDEFINED_ARCH, variant);
        let scope = &resolved.scope;
        let output = format!(
            "{}{}",
            scope.evaluate("$(TARGET_BUILD_DIR)/$(EXECUTABLE_PATH)"),
            variant_suffix(variant)
        );
        let objects: Vec<String> = target
            .archs
            .iter()
            .flat_map(|arch| p.link.objects(variant, arch).to_vec())
            .collect();
        let task = PlannedTask::new(["AssembleObjectLibrary", output.as_str(), variant.as_str()], Stage::Link)
            .args([
                "builtin-ObjectLibraryAssembler",
                "--linker-response-file-format",
                scope.get("OBJECT_LIBRARY_RESPONSE_FILE_FORMAT"),
            ])
            .args(objects.iter().cloned())
            .args(["--output", output.as_str()])
            .inputs(objects)
            .output(output.as_str())
            .action("object-library-assembler")
            .describe(format!("Assemble {}", super::file_name(&output)));
        p.emit(task);
    }
}

/// `Libtool` per variant, combining archs into one archive.
fn libtool(p: &mut TargetProducer<'_, '_>) {
    let target = p.target;
    for variant in &target.variants {
        let resolved = p.scope(target.platform, UNDEFINED_ARCH, variant);
        let scope = &resolved.scope;
        let output = format!(
            "{}{}",
            scope.evaluate("$(TARGET_BUILD_DIR)/$(EXECUTABLE_PATH)"),
            variant_suffix(variant)
        );
        let objects: Vec<String> = target
            .archs
            .iter()
            .flat_map(|arch| p.link.objects(variant, arch).to_vec())
            .collect();

        let mut rule_info = vec!["Libtool".to_string(), output.clone(), variant.clone()];
        rule_info.extend(target.archs.iter().cloned());
        let mut task = PlannedTask::new(rule_info, Stage::Link).arg(scope.get("LIBTOOL"));
        if p.ctx.toolchain.supports_flag(Tool::Libtool, "-static") {
            task = task.arg("-static");
        }
        if p.ctx.toolchain.supports_flag(Tool::Libtool, "-D") {
            task = task.arg("-D");
        }
        let task = task
            .args(scope.list("OTHER_LIBTOOLFLAGS"))
            .args(objects.iter().cloned())
            .args(["-o", output.as_str()])
            .inputs(objects)
            .output(output.as_str())
            .describe(format!("Create static library {}", super::file_name(&output)));
        p.emit(task);
    }
}

/// Front end used for linking.
fn link_driver(p: &TargetProducer<'_, '_>, scope: &Scope) -> Tool {
    let cxx = p.link.has_language(Language::Cxx) || p.link.has_language(Language::ObjectiveCxx);
    match scope.get("LINKER_DRIVER") {
        "swiftc" => Tool::Swiftc,
        "clang" if cxx => Tool::ClangXX,
        "clang" => Tool::Clang,
        _ if p.link.has_language(Language::Swift) => Tool::Swiftc,
        _ if cxx => Tool::ClangXX,
        _ => Tool::Clang,
    }
}

/// `Ld` per (variant, arch); `CreateUniversalBinary` when more than one
/// arch was linked.
fn link(p: &mut TargetProducer<'_, '_>, product_type: ProductType) {
    let target = p.target;
    let platform = target.platform;
    if target.archs.is_empty() {
        return;
    }
    let universal = target.archs.len() > 1;
    let traced = p.verifies_dependencies();

    for variant in &target.variants {
        let mut binaries: Vec<(String, String)> = Vec::new();
        let mut final_output = String::new();

        for arch in &target.archs {
            let resolved = p.scope(platform, arch, variant);
            let scope = &resolved.scope;
            let product_binary = format!(
                "{}{}",
                scope.evaluate("$(TARGET_BUILD_DIR)/$(EXECUTABLE_PATH)"),
                variant_suffix(variant)
            );
            let object_dir = TargetProducer::object_dir(scope, variant, arch);
            let output = if universal {
                join_path(&object_dir, &format!("Binary/{}", super::file_name(&product_binary)))
            } else {
                product_binary.clone()
            };
            final_output = product_binary;

            let objects = p.link.objects(variant, arch).to_vec();
            let file_list = join_path(
                &object_dir,
                &format!("{}.LinkFileList", scope.get("PRODUCT_NAME")),
            );
            p.emit(write_aux_file(&file_list, objects.iter().map(|o| format!("{}\n", o)).collect()));

            let driver = link_driver(p, scope);
            let triple = platform.target_triple(arch, TargetProducer::deployment_target(scope, platform));
            let bitcode = p.bitcode_flag(scope, platform, driver);

            let mut task = PlannedTask::new(["Ld", output.as_str(), variant.as_str(), arch.as_str()], Stage::Link)
                .arg(scope.get(driver.setting_name()))
                .args(["-target", triple.as_str()]);
            match product_type {
                ProductType::Framework | ProductType::DynamicLibrary => {
                    let install_name = scope.evaluate("@rpath/$(EXECUTABLE_PATH)");
                    task = task.args(["-dynamiclib", "-install_name", install_name.as_str()]);
                }
                ProductType::Bundle | ProductType::UnitTestBundle => task = task.arg("-bundle"),
                _ => {}
            }
            if let Some(flag) = bitcode {
                task = task.arg(flag);
            }
            if let Some(secondary) = target.secondary {
                let secondary_scope = p.scope(secondary, arch, variant);
                let variant_triple = secondary.target_triple(
                    arch,
                    TargetProducer::deployment_target(&secondary_scope.scope, secondary),
                );
                if p.ctx.toolchain.supports_flag(Tool::Clang, "-darwin-target-variant") {
                    task = task.args(["-darwin-target-variant".to_string(), variant_triple]);
                }
            }
            task = task
                .arg(format!("-L{}", scope.get("BUILT_PRODUCTS_DIR")))
                .args(super::prefixed("-L", scope.list("LIBRARY_SEARCH_PATHS")))
                .arg(format!("-F{}", scope.get("BUILT_PRODUCTS_DIR")))
                .args(super::prefixed("-F", scope.list("FRAMEWORK_SEARCH_PATHS")))
                .args(["-filelist", file_list.as_str()]);
            for item in &p.link.items {
                task = match item {
                    LinkItem::Framework { name, path } => {
                        let task = match path {
                            Some(dir) => task.arg(format!("-F{}", dir)),
                            None => task,
                        };
                        task.args(["-framework", name.as_str()])
                    }
                    LinkItem::Library { path } => task.arg(path.as_str()),
                    LinkItem::SystemLibrary { name } => task.arg(format!("-l{}", name)),
                    LinkItem::ObjectLibrary { path } => {
                        task.arg(format!("@{}", join_path(path, "args.resp")))
                    }
                };
            }
            let bundled = artifact_bundle::libraries(p, platform, arch);
            task = task.args(bundled.iter().cloned()).inputs(bundled);
            let trace = traced.then(|| {
                join_path(&object_dir, &format!("{}_trace.json", scope.get("PRODUCT_NAME")))
            });
            if let Some(trace) = &trace {
                task = task.args(["-Xlinker", "-trace_file", "-Xlinker", trace.as_str()]);
                p.dependency_traces.push(trace.clone());
            }
            task = task
                .args(scope.list("OTHER_LDFLAGS"))
                .args(["-o", output.as_str()])
                .input(file_list.as_str())
                .inputs(objects)
                .inputs(p.link.inputs.iter().cloned())
                .inputs(p.link.items.iter().filter_map(|i| match i {
                    LinkItem::ObjectLibrary { path } => Some(path.clone()),
                    _ => None,
                }))
                .output(output.as_str())
                .outputs(trace)
                .describe(format!("Link {} ({} {})", super::file_name(&output), arch, variant));
            p.emit(task);
            binaries.push((arch.clone(), output));
        }

        if universal {
            lipo(p, variant, &final_output, binaries);
        }
    }
}

/// Combine per-arch binaries; inputs sorted by arch name.
fn lipo(p: &mut TargetProducer<'_, '_>, variant: &str, output: &str, mut binaries: Vec<(String, String)>) {
    binaries.sort();
    let archs: Vec<&str> = binaries.iter().map(|(a, _)| a.as_str()).collect();
    let mut rule_info = vec!["CreateUniversalBinary".to_string(), output.to_string(), variant.to_string()];
    rule_info.push(archs.join(" "));

    let tool = p.base().get("LIPO").to_string();
    let task = PlannedTask::new(rule_info, Stage::Link)
        .args([tool.as_str(), "-create"])
        .args(binaries.iter().map(|(_, b)| b.clone()))
        .args(["-output", output])
        .inputs(binaries.iter().map(|(_, b)| b.clone()))
        .output(output)
        .describe(format!("Create universal binary {}", super::file_name(output)));
    p.emit(task);
}
