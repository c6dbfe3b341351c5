//! Sources phase: build rule matching and C-family compilation.
//!
//! Swift sources are only collected here; the module orchestrator in
//! [`super::swift`] compiles them as one batch per architecture.

use std::path::Path;

use glob::Pattern;

use super::{artifact_bundle, join_path, prefixed, LinkItem, ResolvedItem, SourceInput, TargetProducer};
use crate::builder::task::{PlannedTask, Stage};
use crate::builder::toolchain::Tool;
use crate::core::file_type::{FileType, Language};
use crate::core::phase::{BuildFile, BuildPhase, BuildRule, RuleAction, RuleInput};
use crate::settings::resolver::UNDEFINED_ARCH;
use crate::settings::Scope;

/// How a source is processed.
enum Action<'r> {
    CompileC(Language),
    Swift,
    Script(&'r BuildRule),
    Unhandled,
}

pub(super) fn produce<'a>(p: &mut TargetProducer<'_, 'a>, phase: &'a BuildPhase, rules: &'a [BuildRule]) {
    let base = p.base();
    let excluded = patterns(&base.list("EXCLUDED_SOURCE_FILE_NAMES"));
    let included = patterns(&base.list("INCLUDED_SOURCE_FILE_NAMES"));

    for (file, item) in p.phase_files(phase) {
        if is_excluded(&item.path, &excluded, &included) {
            tracing::debug!("`{}`: excluded source {}", p.target.name(), item.path);
            continue;
        }
        match item.file_type {
            FileType::Header => continue,
            FileType::ObjectFile => {
                add_object_input(p, &item);
                continue;
            }
            FileType::StaticArchive | FileType::DynamicLibrary => {
                p.link.items.push(LinkItem::Library { path: item.path });
                continue;
            }
            FileType::ObjectLibrary => {
                p.link.items.push(LinkItem::ObjectLibrary { path: item.path });
                continue;
            }
            _ => {}
        }
        let input = SourceInput {
            path: item.path.clone(),
            language: item.file_type.language().unwrap_or(Language::C),
            additional_args: file.additional_args.clone(),
            only_arch: None,
        };
        match select_action(rules, &item) {
            Action::CompileC(language) => compile_c(p, &SourceInput { language, ..input }),
            Action::Swift => p.swift_sources.push(input),
            Action::Script(rule) => run_rule_script(p, rule, file, &item),
            Action::Unhandled => no_rule(p, &item),
        }
    }
}

fn patterns(values: &[String]) -> Vec<Pattern> {
    values
        .iter()
        .filter_map(|v| match Pattern::new(v) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                tracing::warn!("ignoring invalid source file pattern `{}`: {}", v, e);
                None
            }
        })
        .collect()
}

/// Excluded when an exclusion pattern matches and no inclusion pattern
/// re-admits it. Patterns match the file name or the full path.
fn is_excluded(path: &str, excluded: &[Pattern], included: &[Pattern]) -> bool {
    let name = super::file_name(path);
    let matches = |p: &Pattern| p.matches(name) || p.matches(path);
    excluded.iter().any(matches) && !included.iter().any(matches)
}

fn rule_matches_type(input: &RuleInput, file_type: FileType) -> bool {
    match input {
        RuleInput::FileType(id) => {
            id == file_type.identifier() || FileType::from_identifier(id) == Some(file_type)
        }
        RuleInput::Pattern(_) => false,
    }
}

fn rule_matches_pattern(input: &RuleInput, path: &str) -> bool {
    match input {
        RuleInput::Pattern(glob) => Pattern::new(glob)
            .map(|p| p.matches(super::file_name(path)))
            .unwrap_or(false),
        RuleInput::FileType(_) => false,
    }
}

/// File-type rules first, then pattern rules, then the built-in default.
fn select_action<'r>(rules: &'r [BuildRule], item: &ResolvedItem) -> Action<'r> {
    let rule = rules
        .iter()
        .find(|r| rule_matches_type(&r.input, item.file_type))
        .or_else(|| rules.iter().find(|r| rule_matches_pattern(&r.input, &item.path)));

    let default_for = |file_type: FileType| match file_type.language() {
        Some(Language::Swift) => Action::Swift,
        Some(language) => Action::CompileC(language),
        None => Action::Unhandled,
    };

    match rule.map(|r| (r, &r.action)) {
        Some((rule, RuleAction::Script { .. })) => Action::Script(rule),
        Some((_, RuleAction::Compiler(name))) => match name.as_str() {
            "swiftc" | "swift" => Action::Swift,
            "clang" => Action::CompileC(item.file_type.language().unwrap_or(Language::C)),
            _ => default_for(item.file_type),
        },
        None => default_for(item.file_type),
    }
}

fn no_rule(p: &mut TargetProducer<'_, '_>, item: &ResolvedItem) {
    let target = p.target;
    let archs: Vec<&str> = if target.archs.is_empty() {
        vec![UNDEFINED_ARCH]
    } else {
        target.archs.iter().map(String::as_str).collect()
    };
    for arch in archs {
        p.diagnostics.warning(format!(
            "no rule to process file '{}' of type '{}' for architecture '{}'",
            item.path,
            item.file_type.identifier(),
            arch
        ));
    }
}

/// Prebuilt objects go straight to the linker, for every arch.
fn add_object_input(p: &mut TargetProducer<'_, '_>, item: &ResolvedItem) {
    let target = p.target;
    for variant in &target.variants {
        for arch in &target.archs {
            p.link.add_object(variant, arch, item.path.clone(), Language::C);
        }
    }
}

/// One CompileC task per (variant, arch) of a C-family source.
pub(super) fn compile_c(p: &mut TargetProducer<'_, '_>, source: &SourceInput) {
    let target = p.target;
    let platform = target.platform;
    let object_name = p.object_name(&source.path);
    let dialect = source.language.clang_dialect();
    let traced = p.verifies_dependencies();

    for variant in &target.variants {
        for arch in &target.archs {
            if !source.builds_for(arch) {
                continue;
            }
            let resolved = p.scope(platform, arch, variant);
            let scope = &resolved.scope;
            let object_dir = TargetProducer::object_dir(scope, variant, arch);
            let object = join_path(&object_dir, &format!("{}.o", object_name));
            let depfile = join_path(&object_dir, &format!("{}.d", object_name));

            let triple = platform.target_triple(arch, TargetProducer::deployment_target(scope, platform));
            let bitcode = p.bitcode_flag(scope, platform, Tool::Clang);

            let mut task = PlannedTask::new(
                ["CompileC", object.as_str(), source.path.as_str(), variant.as_str(), arch.as_str(), dialect],
                Stage::CompileC,
            )
            .arg(scope.get("CC"))
            .args(["-x", dialect, "-target", triple.as_str()])
            .arg(format!("-O{}", scope.get("GCC_OPTIMIZATION_LEVEL")));
            if let Some(flag) = bitcode {
                task = task.arg(flag);
            }
            task = task
                .args(prefixed("-D", scope.list("GCC_PREPROCESSOR_DEFINITIONS")))
                .arg(format!("-I{}", scope.get("DERIVED_FILE_DIR")))
                .args(prefixed("-I", scope.list("HEADER_SEARCH_PATHS")))
                .arg(format!("-F{}", scope.get("BUILT_PRODUCTS_DIR")))
                .args(prefixed("-F", scope.list("FRAMEWORK_SEARCH_PATHS")))
                .args(artifact_bundle::clang_flags(p, platform, arch))
                .args(language_flags(scope, source.language))
                .args(source.additional_args.iter().cloned());
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
            let trace = traced.then(|| format!("{}.trace.json", object));
            if let Some(trace) = &trace {
                task = task
                    .args(["-Xclang", "-header-include-file", "-Xclang", trace.as_str()])
                    .args(["-Xclang", "-header-include-filtering=only-direct-system"])
                    .args(["-Xclang", "-header-include-format=json"]);
                p.dependency_traces.push(trace.clone());
            }
            task = task
                .args(["-MMD", "-MT", "dependencies", "-MF", depfile.as_str()])
                .args(["-c", source.path.as_str(), "-o", object.as_str()])
                .input(source.path.as_str())
                .outputs([object.clone(), depfile])
                .outputs(trace)
                .describe(format!("Compile {} ({} {})", super::file_name(&source.path), arch, variant));

            p.emit(task);
            p.link.add_object(variant, arch, object, source.language);
        }
    }
}

fn language_flags(scope: &Scope, language: Language) -> Vec<String> {
    match language {
        Language::Cxx | Language::ObjectiveCxx => scope.list("OTHER_CPLUSPLUSFLAGS"),
        _ => scope.list("OTHER_CFLAGS"),
    }
}

/// Run a script build rule over one input file, feeding compilable
/// outputs back into compilation.
fn run_rule_script<'a>(
    p: &mut TargetProducer<'_, 'a>,
    rule: &BuildRule,
    file: &'a BuildFile,
    item: &ResolvedItem,
) {
    let RuleAction::Script {
        script,
        inputs,
        outputs,
    } = &rule.action
    else {
        return;
    };
    let target = p.target;
    let archs: Vec<Option<&str>> = if rule.run_once_per_arch && !target.archs.is_empty() {
        target.archs.iter().map(|a| Some(a.as_str())).collect()
    } else {
        vec![None]
    };
    let variant = target.variants.first().map(String::as_str).unwrap_or("normal");

    for arch in archs {
        let resolved = p.scope(target.platform, arch.unwrap_or(UNDEFINED_ARCH), variant);
        let path = Path::new(&item.path);
        let name = super::file_name(&item.path).to_string();
        let suffix = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let dir = path
            .parent()
            .map(|d| d.to_string_lossy().into_owned())
            .unwrap_or_default();
        let scope = resolved.scope.with_values([
            ("INPUT_FILE_PATH", item.path.clone()),
            ("INPUT_FILE_NAME", name),
            ("INPUT_FILE_BASE", super::file_stem(&item.path)),
            ("INPUT_FILE_SUFFIX", suffix),
            ("INPUT_FILE_DIR", dir),
        ]);

        let declared_inputs: Vec<String> = inputs.iter().map(|i| scope.evaluate(i)).collect();
        let declared_outputs: Vec<String> = outputs.iter().map(|o| scope.evaluate(o)).collect();

        let mut rule_info = vec!["RuleScriptExecution".to_string()];
        rule_info.extend(declared_outputs.iter().cloned());
        rule_info.push(item.path.clone());
        rule_info.push(variant.to_string());
        rule_info.push(arch.unwrap_or(UNDEFINED_ARCH).to_string());

        let mut env = scope.environment();
        env.insert("SCRIPT_OUTPUT_FILE_COUNT".into(), declared_outputs.len().to_string());
        for (i, output) in declared_outputs.iter().enumerate() {
            env.insert(format!("SCRIPT_OUTPUT_FILE_{}", i), output.clone());
        }

        let label = if rule.name.is_empty() { "build rule" } else { rule.name.as_str() };
        let task = PlannedTask::new(rule_info, Stage::Compile)
            .args(["/bin/sh", "-c", script.as_str()])
            .envs(env)
            .input(item.path.as_str())
            .inputs(declared_inputs)
            .outputs(declared_outputs.iter().cloned())
            .always_out_of_date(declared_outputs.is_empty())
            .describe(format!("Run {} on {}", label, super::file_name(&item.path)));
        p.emit(task);

        for output in declared_outputs {
            let Some(language) = FileType::from_path(Path::new(&output)).language() else {
                continue;
            };
            let generated = SourceInput {
                path: output,
                language,
                additional_args: file.additional_args.clone(),
                only_arch: arch.map(str::to_string),
            };
            if language == Language::Swift {
                p.swift_sources.push(generated);
            } else {
                compile_c(p, &generated);
            }
        }
    }
}
