//! Copy Bundle Resources phase.
//!
//! Each resource gets a strategy from its file type: plain copy, a
//! validating copy for strings and property lists, or compile-then-copy
//! for string catalogs and interface files. Files inside an `.lproj`
//! directory keep it in the destination.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use super::{join_path, ResolvedItem, SourceInput, TargetProducer};
use crate::builder::task::{PlannedTask, Stage};
use crate::core::file_type::{FileType, Language};
use crate::core::phase::{BuildPhase, ResourceRule};
use crate::settings::Scope;
use crate::util::diagnostic::Diagnostic;

pub(super) fn produce<'a>(p: &mut TargetProducer<'_, 'a>, phase: &'a BuildPhase) {
    let files: Vec<_> = p
        .phase_files(phase)
        .into_iter()
        .filter(|(_, item)| !p.rejects_code(item, phase))
        .collect();
    check_string_tables(p, files.iter().map(|(_, item)| item));

    let base = p.base();
    let resources = base.evaluate("$(TARGET_BUILD_DIR)/$(UNLOCALIZED_RESOURCES_FOLDER_PATH)");
    for (file, item) in files {
        let dest_dir = match localization(&item.path) {
            Some(lproj) => join_path(&resources, lproj),
            None => resources.clone(),
        };
        if file.resource_rule == Some(ResourceRule::Copy) {
            copy_resource(p, &item, &dest_dir);
            continue;
        }
        match item.file_type {
            FileType::Strings | FileType::StringsDict => {
                copy_with(p, "CopyStringsFile", "builtin-copyStrings", &item.path, &dest_dir)
            }
            FileType::PropertyList => {
                copy_with(p, "CopyPlistFile", "builtin-copyPlist", &item.path, &dest_dir)
            }
            FileType::Png => copy_png(p, &item.path, &dest_dir),
            FileType::StringCatalog => {
                if localization(&item.path).is_none() {
                    p.string_catalogs.push(item.path.clone());
                }
                compile_xcstrings(p, base, &item.path, &resources)
            }
            FileType::Storyboard => compile_storyboard(p, base, &item.path, &dest_dir),
            FileType::Xib => compile_xib(p, base, &item.path, &dest_dir),
            _ => copy_resource(p, &item, &dest_dir),
        }
    }
}

/// The `xx.lproj` directory a resource lives in, if any.
fn localization(path: &str) -> Option<&str> {
    Path::new(path)
        .parent()
        .and_then(|d| d.file_name())
        .and_then(|n| n.to_str())
        .filter(|n| n.ends_with(".lproj"))
}

/// Table name of a strings resource (`Localizable` for
/// `en.lproj/Localizable.strings`).
fn table_name(path: &str) -> String {
    super::file_stem(path)
}

/// A string catalog owns its table: no second catalog and no
/// `.strings`/`.stringsdict` of the same name may exist in the target.
fn check_string_tables<'i>(p: &mut TargetProducer<'_, '_>, items: impl Iterator<Item = &'i ResolvedItem>) {
    let mut catalogs: BTreeMap<String, Vec<&str>> = BTreeMap::new();
    let mut tables: Vec<(String, &str)> = Vec::new();
    for item in items {
        match item.file_type {
            FileType::StringCatalog => catalogs
                .entry(table_name(&item.path))
                .or_default()
                .push(&item.path),
            FileType::Strings | FileType::StringsDict => {
                tables.push((table_name(&item.path), &item.path))
            }
            _ => {}
        }
    }

    for (name, paths) in &catalogs {
        if paths.len() > 1 {
            let mut diagnostic = Diagnostic::error(format!(
                "Cannot have multiple {}.xcstrings files in same target.",
                name
            ));
            for path in paths {
                diagnostic = diagnostic.with_context(*path);
            }
            p.diagnostics.push(diagnostic);
        }
    }
    let mut reported = HashSet::new();
    for (name, path) in tables {
        if catalogs.contains_key(&name) && reported.insert(path) {
            p.diagnostics.error(format!(
                "{} cannot co-exist with other .strings or .stringsdict tables with the same name.",
                path
            ));
        }
    }
}

fn copy_resource(p: &mut TargetProducer<'_, '_>, item: &ResolvedItem, dest_dir: &str) {
    let dest = join_path(dest_dir, super::file_name(&item.path));
    let task = PlannedTask::new(["CpResource", dest.as_str(), item.path.as_str()], Stage::Copy)
        .args([
            "builtin-copy",
            "-exclude",
            ".DS_Store",
            "-resolve-src-symlinks",
            item.path.as_str(),
            dest_dir,
        ])
        .input(item.path.as_str())
        .output(dest.as_str())
        .action("copy")
        .describe(format!("Copy {}", super::file_name(&item.path)));
    p.emit(task);
}

/// Copy through an in-process validating copier.
fn copy_with(p: &mut TargetProducer<'_, '_>, rule: &str, tool: &str, source: &str, dest_dir: &str) {
    let dest = join_path(dest_dir, super::file_name(source));
    let task = PlannedTask::new([rule, dest.as_str(), source], Stage::Copy)
        .args([tool, "--validate", "--outdir", dest_dir, "--", source])
        .input(source)
        .output(dest.as_str())
        .action(tool.trim_start_matches("builtin-"))
        .describe(format!("Copy {}", super::file_name(source)));
    p.emit(task);
}

fn copy_png(p: &mut TargetProducer<'_, '_>, source: &str, dest_dir: &str) {
    let dest = join_path(dest_dir, super::file_name(source));
    let task = PlannedTask::new(["CopyPNGFile", dest.as_str(), source], Stage::Copy)
        .args(["copypng", "-compress", source, dest.as_str()])
        .input(source)
        .output(dest.as_str())
        .describe(format!("Copy {}", super::file_name(source)));
    p.emit(task);
}

/// Generate Swift symbols for the keys of each compiled string catalog
/// and compile them with the target's Swift sources.
pub(super) fn generate_string_symbols(p: &mut TargetProducer<'_, '_>) {
    let base = p.base();
    if !base.bool("STRING_CATALOG_GENERATE_SYMBOLS") {
        return;
    }
    let out_dir = base.get("DERIVED_FILE_DIR").to_string();
    for catalog in std::mem::take(&mut p.string_catalogs) {
        let generated = join_path(
            &out_dir,
            &format!("GeneratedStringSymbols_{}.swift", table_name(&catalog)),
        );
        // feeds the Swift requirements, so it runs before compilation starts
        let task = PlannedTask::new(
            ["GenerateStringSymbols", generated.as_str(), catalog.as_str()],
            Stage::Prepare,
        )
        .args([
            base.get("XCSTRINGSTOOL"),
            "generate-symbols",
            "--language",
            "swift",
            "--output-directory",
            out_dir.as_str(),
            catalog.as_str(),
        ])
        .input(catalog.as_str())
        .output(generated.as_str())
        .describe(format!("Generate symbols for {}", super::file_name(&catalog)));
        p.emit(task);
        p.swift_sources.push(SourceInput {
            path: generated,
            language: Language::Swift,
            additional_args: Vec::new(),
            only_arch: None,
        });
    }
}

/// Compile a string catalog into `en.lproj/<table>.strings`, then copy the
/// table into the product.
fn compile_xcstrings(p: &mut TargetProducer<'_, '_>, scope: &Scope, source: &str, resources: &str) {
    let out_dir = scope.evaluate("$(TARGET_TEMP_DIR)/XCStrings");
    let table = format!("{}.strings", table_name(source));
    let compiled = join_path(&out_dir, &format!("en.lproj/{}", table));

    let task = PlannedTask::new(["CompileXCStrings", out_dir.as_str(), source], Stage::Compile)
        .args([
            scope.get("XCSTRINGSTOOL"),
            "compile",
            "--output-directory",
            out_dir.as_str(),
            source,
        ])
        .input(source)
        .output(compiled.as_str())
        .describe(format!("Compile {}", super::file_name(source)));
    p.emit(task);

    let dest_dir = join_path(resources, "en.lproj");
    copy_with(p, "CopyStringsFile", "builtin-copyStrings", &compiled, &dest_dir);
}

/// Compile a storyboard to an intermediate `.storyboardc`, then copy it.
fn compile_storyboard(p: &mut TargetProducer<'_, '_>, scope: &Scope, source: &str, dest_dir: &str) {
    let out_dir = join_path(
        scope.get("TARGET_TEMP_DIR"),
        localization(source).unwrap_or("Base.lproj"),
    );
    let compiled = join_path(&out_dir, &format!("{}.storyboardc", super::file_stem(source)));

    let task = PlannedTask::new(["CompileStoryboard", source], Stage::Compile)
        .args([
            scope.get("IBTOOL"),
            "--errors",
            "--warnings",
            "--compilation-directory",
            out_dir.as_str(),
            source,
        ])
        .input(source)
        .output(compiled.as_str())
        .describe(format!("Compile {}", super::file_name(source)));
    p.emit(task);

    let item = ResolvedItem {
        path: compiled,
        file_type: FileType::Folder,
        origin: super::Origin::File,
    };
    copy_resource(p, &item, dest_dir);
}

fn compile_xib(p: &mut TargetProducer<'_, '_>, scope: &Scope, source: &str, dest_dir: &str) {
    let dest = join_path(dest_dir, &format!("{}.nib", super::file_stem(source)));
    let task = PlannedTask::new(["CompileXIB", source], Stage::Copy)
        .args([
            scope.get("IBTOOL"),
            "--errors",
            "--warnings",
            "--compile",
            dest.as_str(),
            source,
        ])
        .input(source)
        .output(dest.as_str())
        .describe(format!("Compile {}", super::file_name(source)));
    p.emit(task);
}
