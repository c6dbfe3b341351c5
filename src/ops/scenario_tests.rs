//! End-to-end construction scenarios over small fixture workspaces.

use crate::builder::task::PlannedTask;
use crate::core::phase::ShellScriptPhase;
use crate::core::platform::PlatformFilter;
use crate::core::target::ProductType;
use crate::core::workspace::Workspace;
use crate::ops::{construct_task_graph, ConstructOptions, Construction, ToolSetup};
use crate::test_support::{custom_task, ProjectBuilder, TargetBuilder};
use crate::util::diagnostic::Severity;

const BITCODE_WARNING: &str =
    "Building with bitcode is deprecated. Please update your project and/or target settings to disable bitcode.";

fn construct_on(ws: &Workspace, platform: &str) -> Construction {
    let opts = ConstructOptions {
        platform: platform.to_string(),
        ..Default::default()
    };
    construct_task_graph(ws, &ToolSetup::default(), &opts).unwrap()
}

fn construct(ws: &Workspace) -> Construction {
    construct_on(ws, "macosx")
}

fn has_arg(task: &PlannedTask, arg: &str) -> bool {
    task.command_line.iter().any(|a| a == arg)
}

fn messages(c: &Construction, severity: Severity) -> Vec<&str> {
    c.diagnostics
        .iter()
        .filter(|d| d.severity == severity)
        .map(|d| d.message.as_str())
        .collect()
}

#[test]
fn test_bitcode_disabled_adds_no_flags() {
    let ws = ProjectBuilder::new("P")
        .files(&["a.c"])
        .setting("ARCHS", "arm64")
        .setting("ENABLE_BITCODE", "NO")
        .target(TargetBuilder::standard("Tool", ProductType::Tool).sources(&["a.c"]))
        .into_workspace();
    let c = construct(&ws);

    let compiles: Vec<_> = c.graph.tasks_with_rule("CompileC").collect();
    let links: Vec<_> = c.graph.tasks_with_rule("Ld").collect();
    assert_eq!(compiles.len(), 1);
    assert_eq!(links.len(), 1);
    for task in compiles.into_iter().chain(links) {
        assert!(!has_arg(task, "-fembed-bitcode"));
        assert!(!has_arg(task, "-fembed-bitcode-marker"));
    }
    assert!(!messages(&c, Severity::Warning).contains(&BITCODE_WARNING));
}

#[test]
fn test_bitcode_marker_warns_once_per_target() {
    let ws = ProjectBuilder::new("P")
        .files(&["a.c", "b.c"])
        .setting("ARCHS", "arm64")
        .setting("ENABLE_BITCODE", "YES")
        .setting("BITCODE_GENERATION_MODE", "marker")
        .target(TargetBuilder::standard("Kit", ProductType::DynamicLibrary).sources(&["a.c", "b.c"]))
        .target(TargetBuilder::standard("Util", ProductType::DynamicLibrary).sources(&["a.c"]))
        .into_workspace();
    let c = construct_on(&ws, "iphoneos");

    for target in ["Kit", "Util"] {
        let warnings = c
            .diagnostics
            .iter()
            .filter(|d| d.message == BITCODE_WARNING && d.target.as_deref() == Some(target))
            .count();
        assert_eq!(warnings, 1, "bitcode warnings for {}", target);
    }

    let compiles: Vec<_> = c.graph.tasks_with_rule("CompileC").collect();
    let links: Vec<_> = c.graph.tasks_with_rule("Ld").collect();
    assert_eq!(compiles.len(), 3);
    assert_eq!(links.len(), 2);
    for task in compiles.into_iter().chain(links) {
        assert!(has_arg(task, "-fembed-bitcode-marker"), "{:?}", task.rule_info);
        assert!(!has_arg(task, "-fembed-bitcode"), "{:?}", task.rule_info);
    }
}

#[test]
fn test_bitcode_ignored_on_platform_without_support() {
    let ws = ProjectBuilder::new("P")
        .files(&["a.c"])
        .setting("ARCHS", "arm64")
        .setting("ENABLE_BITCODE", "YES")
        .target(TargetBuilder::standard("Tool", ProductType::Tool).sources(&["a.c"]))
        .into_workspace();
    let c = construct(&ws);

    let compile = c.graph.tasks_with_rule("CompileC").next().unwrap();
    assert!(!has_arg(compile, "-fembed-bitcode-marker"));
    assert_eq!(
        messages(&c, Severity::Warning)
            .iter()
            .filter(|m| **m == BITCODE_WARNING)
            .count(),
        1
    );
}

#[test]
fn test_link_driver_follows_languages() {
    let build = |excluded: &str| {
        ProjectBuilder::new("P")
            .files(&["a.c", "b.c", "s.swift"])
            .setting("ARCHS", "arm64")
            .target(
                TargetBuilder::standard("Kit", ProductType::DynamicLibrary)
                    .setting("EXCLUDED_SOURCE_FILE_NAMES", excluded)
                    .sources(&["a.c", "b.c", "s.swift"]),
            )
            .into_workspace()
    };

    let mixed = construct(&build(""));
    let ld = mixed.graph.tasks_with_rule("Ld").next().unwrap();
    assert!(ld.command_line[0].ends_with("swiftc"), "{:?}", ld.command_line);

    let c_only = construct(&build("*.swift"));
    let ld = c_only.graph.tasks_with_rule("Ld").next().unwrap();
    assert!(ld.command_line[0].ends_with("clang"), "{:?}", ld.command_line);
    assert_eq!(c_only.graph.tasks_with_rule("SwiftDriver Compilation").count(), 0);
}

#[test]
fn test_cxx_sources_link_with_clangxx() {
    let ws = ProjectBuilder::new("P")
        .files(&["a.c", "b.cpp"])
        .setting("ARCHS", "arm64")
        .target(TargetBuilder::standard("Tool", ProductType::Tool).sources(&["a.c", "b.cpp"]))
        .into_workspace();
    let c = construct(&ws);
    let ld = c.graph.tasks_with_rule("Ld").next().unwrap();
    assert!(ld.command_line[0].ends_with("clang++"), "{:?}", ld.command_line);
}

#[test]
fn test_swift_module_not_installed() {
    let ws = ProjectBuilder::new("P")
        .files(&["s.swift"])
        .setting("ARCHS", "arm64")
        .target(
            TargetBuilder::standard("Kit", ProductType::Framework)
                .setting("SWIFT_INSTALL_MODULE", "NO")
                .sources(&["s.swift"]),
        )
        .into_workspace();
    let c = construct(&ws);

    let requirements: Vec<_> = c
        .graph
        .tasks_with_rule("SwiftDriver Compilation Requirements")
        .collect();
    assert_eq!(requirements.len(), 1);
    assert!(requirements[0].outputs.iter().any(|o| o.ends_with(".swiftmodule")));
    assert!(c
        .graph
        .tasks_with_rule("Copy")
        .all(|t| t.outputs.iter().all(|o| !o.contains(".swiftmodule"))));
}

#[test]
fn test_swift_module_installed_into_framework() {
    let ws = ProjectBuilder::new("P")
        .files(&["s.swift"])
        .setting("ARCHS", "arm64")
        .target(TargetBuilder::standard("Kit", ProductType::Framework).sources(&["s.swift"]))
        .into_workspace();
    let c = construct(&ws);

    let installed: Vec<_> = c
        .graph
        .tasks_with_rule("Copy")
        .flat_map(|t| t.outputs.iter())
        .filter(|o| o.contains("/Kit.swiftmodule/"))
        .collect();
    assert!(installed.iter().any(|o| o.ends_with(".swiftmodule")));
    assert!(installed.iter().any(|o| o.ends_with(".swiftdoc")));
    assert!(installed.iter().all(|o| o.contains("Kit.framework")));
}

#[test]
fn test_build_variants_share_installed_module() {
    let ws = ProjectBuilder::new("P")
        .files(&["a.c", "s.swift"])
        .setting("ARCHS", "arm64")
        .setting("BUILD_VARIANTS", "normal profile")
        .target(TargetBuilder::standard("Kit", ProductType::Framework).sources(&["a.c", "s.swift"]))
        .into_workspace();
    let c = construct(&ws);

    assert!(c.graph.valid, "{:?}", messages(&c, Severity::Error));
    assert!(messages(&c, Severity::Error).is_empty());

    // objects and binaries are per variant
    let variants: Vec<&str> = c
        .graph
        .tasks_with_rule("SwiftDriver Compilation")
        .map(|t| t.rule_info[2].as_str())
        .collect();
    assert_eq!(variants, ["normal", "profile"]);
    assert_eq!(c.graph.tasks_with_rule("CompileC").count(), 2);
    let links: Vec<_> = c.graph.tasks_with_rule("Ld").collect();
    assert_eq!(links.len(), 2);
    assert_ne!(links[0].outputs, links[1].outputs);

    // the module is installed and the header merged once
    let installed: Vec<_> = c
        .graph
        .tasks_with_rule("Copy")
        .flat_map(|t| t.outputs.iter())
        .filter(|o| o.ends_with("/Kit.swiftmodule/arm64-apple-macos.swiftmodule"))
        .collect();
    assert_eq!(installed.len(), 1);
    assert_eq!(c.graph.tasks_with_rule("SwiftMergeGeneratedHeaders").count(), 1);
}

#[test]
fn test_zippered_framework_fans_out_per_platform() {
    let ws = ProjectBuilder::new("P")
        .files(&["a.c", "s.swift"])
        .setting("ARCHS", "arm64")
        .setting("MACOSX_DEPLOYMENT_TARGET", "13.0")
        .setting("IPHONEOS_DEPLOYMENT_TARGET", "16.0")
        .target(
            TargetBuilder::standard("Kit", ProductType::Framework)
                .setting("IS_ZIPPERED", "YES")
                .sources(&["a.c", "s.swift"]),
        )
        .into_workspace();
    let c = construct(&ws);

    assert!(c.graph.valid, "{:?}", messages(&c, Severity::Error));
    assert_eq!(c.graph.targets[0].zippered_platform.as_deref(), Some("maccatalyst"));

    let target_of = |task: &PlannedTask| {
        let at = task.command_line.iter().position(|a| a == "-target").unwrap();
        task.command_line[at + 1].clone()
    };

    // one requirements/compilation pair per platform, each with its own
    // deployment target
    for rule in ["SwiftDriver Compilation Requirements", "SwiftDriver Compilation"] {
        let tasks: Vec<_> = c.graph.tasks_with_rule(rule).collect();
        let platforms: Vec<&str> = tasks.iter().map(|t| t.rule_info[4].as_str()).collect();
        assert_eq!(platforms, ["macosx", "maccatalyst"], "{}", rule);
        let triples: Vec<String> = tasks.iter().map(|t| target_of(t)).collect();
        assert_eq!(triples, ["arm64-apple-macos13.0", "arm64-apple-ios16.0-macabi"], "{}", rule);
    }

    // C is compiled and linked once, for both ABIs
    let compiles: Vec<_> = c.graph.tasks_with_rule("CompileC").collect();
    let links: Vec<_> = c.graph.tasks_with_rule("Ld").collect();
    assert_eq!(compiles.len(), 1);
    assert_eq!(links.len(), 1);
    for task in compiles.iter().chain(links.iter()) {
        let at = task
            .command_line
            .iter()
            .position(|a| a == "-darwin-target-variant")
            .unwrap();
        assert_eq!(task.command_line[at + 1], "arm64-apple-ios16.0-macabi");
        assert_eq!(target_of(task), "arm64-apple-macos13.0");
    }

    // only the primary platform's objects reach the linker
    let file_list = c
        .graph
        .tasks_with_rule("WriteAuxiliaryFile")
        .find(|t| t.rule_info[1].ends_with(".LinkFileList"))
        .unwrap();
    let listed = file_list.aux_contents.as_deref().unwrap();
    assert_eq!(listed.lines().count(), 2);
    assert!(!listed.contains("-maccatalyst"));

    // nothing is published into a separate secondary product
    for task in c.graph.tasks_with_rule("Copy").chain(c.graph.tasks_with_rule("SwiftMergeGeneratedHeaders")) {
        assert!(
            task.outputs.iter().all(|o| !o.contains("/build/Debug-maccatalyst/")),
            "{:?}",
            task.rule_info
        );
    }
    let installed: Vec<_> = c
        .graph
        .tasks_with_rule("Copy")
        .flat_map(|t| t.outputs.iter())
        .filter(|o| o.ends_with(".swiftmodule") && o.contains("/Kit.framework/"))
        .collect();
    assert_eq!(installed.len(), 2);
    assert!(installed.iter().any(|o| o.ends_with("/arm64-apple-ios-macabi.swiftmodule")));
}

#[test]
fn test_object_library_assembly() {
    let ws = ProjectBuilder::new("P")
        .files(&["a.c", "b.c"])
        .target(
            TargetBuilder::standard("Objs", ProductType::ObjectLibrary)
                .setting("ARCHS", "arm64")
                .sources(&["a.c", "b.c"]),
        )
        .into_workspace();
    let c = construct(&ws);

    let assembled: Vec<_> = c.graph.tasks_with_rule("AssembleObjectLibrary").collect();
    assert_eq!(assembled.len(), 1);
    let task = assembled[0];
    assert_eq!(task.command_line[0], "builtin-ObjectLibraryAssembler");
    let output_flag = task.command_line.iter().position(|a| a == "--output").unwrap();
    let objects: Vec<_> = task
        .command_line
        .iter()
        .enumerate()
        .filter(|(_, a)| a.ends_with(".o"))
        .collect();
    assert_eq!(objects.len(), 2);
    assert!(objects.iter().all(|(i, _)| *i < output_flag));
    assert!(task.command_line[output_flag + 1].ends_with(".objlib"));
    assert_eq!(c.graph.tasks_with_rule("Ld").count(), 0);
    assert_eq!(c.graph.tasks_with_rule("Libtool").count(), 0);
}

#[test]
fn test_static_library_uses_libtool() {
    let ws = ProjectBuilder::new("P")
        .files(&["a.c"])
        .setting("ARCHS", "arm64 x86_64")
        .target(TargetBuilder::standard("Core", ProductType::StaticLibrary).sources(&["a.c"]))
        .into_workspace();
    let c = construct(&ws);

    let libtool: Vec<_> = c.graph.tasks_with_rule("Libtool").collect();
    assert_eq!(libtool.len(), 1);
    assert_eq!(
        libtool[0].rule_info[1..],
        [
            "/src/P/build/Debug/libCore.a".to_string(),
            "normal".to_string(),
            "arm64".to_string(),
            "x86_64".to_string()
        ]
    );
    assert!(has_arg(libtool[0], "-static"));
    assert_eq!(c.graph.tasks_with_rule("CompileC").count(), 2);
}

#[test]
fn test_construction_is_deterministic() {
    let build = || {
        ProjectBuilder::new("P")
            .files(&["a.c", "s.swift"])
            .setting("ARCHS", "arm64 x86_64")
            .target(TargetBuilder::standard("Core", ProductType::Framework).sources(&["a.c", "s.swift"]))
            .target(
                TargetBuilder::standard("App", ProductType::Application)
                    .depends_on_filtered(
                        "Core",
                        [
                            PlatformFilter::with_environment("tvos", "simulator"),
                            PlatformFilter::new("macos"),
                            PlatformFilter::new("ios"),
                        ],
                    )
                    .sources(&["a.c"]),
            )
            .into_workspace()
    };

    let first = construct(&build());
    let second = construct(&build());
    assert_eq!(first.graph.signature(), second.graph.signature());
    assert_eq!(first.diagnostics, second.diagnostics);

    let app = first.graph.targets.iter().find(|t| t.name == "App").unwrap();
    let filters: Vec<String> = app.dependencies[0]
        .platform_filters
        .iter()
        .map(|f| f.to_string())
        .collect();
    assert_eq!(filters, ["ios", "macos", "tvos-simulator"]);

    let info = first
        .graph
        .tasks_with_rule("WriteAuxiliaryFile")
        .find(|t| t.rule_info[1].ends_with("App-dependency-info.json"))
        .unwrap();
    let contents = info.aux_contents.as_deref().unwrap();
    let ios = contents.find("\"ios\"").unwrap();
    let macos = contents.find("\"macos\"").unwrap();
    let tvos = contents.find("\"tvos-simulator\"").unwrap();
    assert!(ios < macos && macos < tvos);
}

#[test]
fn test_merged_header_ignores_arch_order() {
    let merge_rule = |archs: &str| {
        let ws = ProjectBuilder::new("P")
            .files(&["s.swift"])
            .setting("ARCHS", archs)
            .target(TargetBuilder::standard("Kit", ProductType::Framework).sources(&["s.swift"]))
            .into_workspace();
        let c = construct(&ws);
        let merges: Vec<_> = c.graph.tasks_with_rule("SwiftMergeGeneratedHeaders").collect();
        assert_eq!(merges.len(), 1);
        (merges[0].rule_info.clone(), merges[0].command_line.clone())
    };
    assert_eq!(merge_rule("arm64 x86_64"), merge_rule("x86_64 arm64"));
}

#[test]
fn test_swift_in_resources_is_rejected() {
    let ws = ProjectBuilder::new("P")
        .files(&["a.c", "s.swift"])
        .setting("ARCHS", "arm64")
        .target(
            TargetBuilder::standard("App", ProductType::Application)
                .sources(&["a.c"])
                .resources(&["s.swift"]),
        )
        .into_workspace();
    let c = construct(&ws);

    assert!(messages(&c, Severity::Warning)
        .iter()
        .any(|m| m.contains("cannot be processed by a Copy Bundle Resources build phase")));
    assert_eq!(c.graph.tasks_with_rule("SwiftDriver Compilation").count(), 0);
    assert_eq!(c.graph.tasks_with_rule("CpResource").count(), 0);
}

#[test]
fn test_module_only_arch_without_deployment_target() {
    let ws = ProjectBuilder::new("P")
        .files(&["s.swift"])
        .setting("ARCHS", "arm64")
        .target(
            TargetBuilder::standard("Kit", ProductType::Framework)
                .setting("SWIFT_MODULE_ONLY_ARCHS", "x86_64")
                .sources(&["s.swift"]),
        )
        .into_workspace();
    let c = construct(&ws);

    let errors: Vec<_> = messages(&c, Severity::Error)
        .into_iter()
        .filter(|m| m.contains("SWIFT_MODULE_ONLY_MACOSX_DEPLOYMENT_TARGET"))
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("'x86_64'"));
    assert!(c.has_errors());

    let for_arch = |rule: &'static str, arch: &'static str| {
        c.graph
            .tasks_with_rule(rule)
            .filter(|t| t.rule_info.iter().any(|r| r == arch))
            .count()
    };
    assert_eq!(for_arch("SwiftDriver Compilation Requirements", "x86_64"), 1);
    assert_eq!(for_arch("SwiftDriver Compilation", "x86_64"), 0);
    assert_eq!(for_arch("Ld", "x86_64"), 0);
    assert_eq!(for_arch("SwiftDriver Compilation", "arm64"), 1);
    assert_eq!(for_arch("Ld", "arm64"), 1);
}

#[test]
fn test_module_only_arch_with_deployment_target() {
    let ws = ProjectBuilder::new("P")
        .files(&["s.swift"])
        .setting("ARCHS", "arm64")
        .target(
            TargetBuilder::standard("Kit", ProductType::Framework)
                .setting("SWIFT_MODULE_ONLY_ARCHS", "x86_64")
                .setting("SWIFT_MODULE_ONLY_MACOSX_DEPLOYMENT_TARGET", "10.15")
                .sources(&["s.swift"]),
        )
        .into_workspace();
    let c = construct(&ws);
    assert!(!c.has_errors(), "{:?}", c.diagnostics);

    let requirements = c
        .graph
        .tasks_with_rule("SwiftDriver Compilation Requirements")
        .find(|t| t.rule_info.iter().any(|r| r == "x86_64"))
        .unwrap();
    assert!(requirements
        .command_line
        .iter()
        .any(|a| a == "x86_64-apple-macos10.15"));
}

#[test]
fn test_duplicate_string_catalogs() {
    let ws = ProjectBuilder::new("P")
        .files(&["a.c", "en.lproj/Localizable.xcstrings", "Base.lproj/Localizable.xcstrings"])
        .setting("ARCHS", "arm64")
        .target(
            TargetBuilder::standard("App", ProductType::Application)
                .sources(&["a.c"])
                .resources(&["en.lproj/Localizable.xcstrings", "Base.lproj/Localizable.xcstrings"]),
        )
        .into_workspace();
    let c = construct(&ws);

    let error = c
        .diagnostics
        .iter()
        .find(|d| d.message == "Cannot have multiple Localizable.xcstrings files in same target.")
        .unwrap();
    assert_eq!(error.severity, Severity::Error);
    assert_eq!(error.target.as_deref(), Some("App"));
    assert_eq!(error.context.len(), 2);
}

#[test]
fn test_script_without_outputs_runs_every_build() {
    let ws = ProjectBuilder::new("P")
        .files(&["a.c"])
        .setting("ARCHS", "arm64")
        .target(
            TargetBuilder::standard("Tool", ProductType::Tool)
                .script(ShellScriptPhase::new("Lint", "echo lint"))
                .sources(&["a.c"]),
        )
        .into_workspace();
    let c = construct(&ws);

    let script = c.graph.tasks_with_rule("PhaseScriptExecution").next().unwrap();
    assert!(script.always_out_of_date);
    assert_eq!(script.environment["SCRIPT_OUTPUT_FILE_COUNT"], "0");
    assert!(messages(&c, Severity::Warning)
        .iter()
        .any(|m| m.starts_with("Run script build phase 'Lint' will be run during every build")));
}

#[test]
fn test_custom_task_and_dependency_gating() {
    let ws = ProjectBuilder::new("P")
        .files(&["a.c", "b.c"])
        .setting("ARCHS", "arm64")
        .target(TargetBuilder::standard("Core", ProductType::StaticLibrary).sources(&["a.c"]))
        .target(
            TargetBuilder::standard("Tool", ProductType::Tool)
                .depends_on("Core")
                .sources(&["b.c"])
                .link_target("Core")
                .custom_task(custom_task(
                    &["/bin/gen", "$(DERIVED_FILE_DIR)/gen.h"],
                    &["$(DERIVED_FILE_DIR)/gen.h"],
                    "Generate $(PRODUCT_NAME) header",
                )),
        )
        .into_workspace();
    let c = construct(&ws);
    assert!(!c.has_errors(), "{:?}", c.diagnostics);

    let custom = c.graph.tasks_with_rule("CustomTask").next().unwrap();
    assert_eq!(custom.rule_info[1], "Generate Tool header");
    assert!(custom.outputs[0].ends_with("/gen.h"));
    assert!(!custom.command_line[1].contains("$("));

    let archive = "/src/P/build/Debug/libCore.a";
    let libtool = c.graph.position(&["Libtool", archive, "normal", "arm64"]).unwrap();
    let ld = c
        .graph
        .tasks
        .iter()
        .position(|n| n.task.rule_name() == "Ld" && n.task.target == "Tool")
        .unwrap();
    assert!(c.graph.tasks[ld].task.inputs.iter().any(|i| i == archive));
    assert!(c.graph.depends_on(ld, libtool));
}

#[test]
fn test_conflicting_outputs_invalidate_graph() {
    let ws = ProjectBuilder::new("P")
        .files(&["a.c", "data.json"])
        .setting("ARCHS", "arm64")
        .target(
            TargetBuilder::standard("Tool", ProductType::Tool)
                .sources(&["a.c"])
                .custom_task(custom_task(&["/bin/one"], &["/tmp/out.txt"], "One"))
                .custom_task(custom_task(&["/bin/two"], &["/tmp/out.txt"], "Two")),
        )
        .into_workspace();
    let c = construct(&ws);

    assert!(!c.graph.valid);
    assert!(c.has_errors());
    assert!(messages(&c, Severity::Error).contains(&"Multiple commands produce '/tmp/out.txt'"));
    assert!(c.diagnostics.iter().any(|d| d.severity == Severity::Note));
}

#[test]
fn test_filtered_dependency_skipped_on_other_platform() {
    let ws = ProjectBuilder::new("P")
        .files(&["a.c", "b.c"])
        .setting("ARCHS", "arm64")
        .target(TargetBuilder::standard("IOSOnly", ProductType::StaticLibrary).sources(&["a.c"]))
        .target(
            TargetBuilder::standard("Tool", ProductType::Tool)
                .depends_on_filtered("IOSOnly", [PlatformFilter::new("ios")])
                .sources(&["b.c"]),
        )
        .into_workspace();
    let c = construct(&ws);

    let tool_entry = c.graph.position(&["Gate", "target-Tool-entry"]).unwrap();
    let ios_ready = c
        .graph
        .position(&["Gate", "target-IOSOnly-generated-headers-ready"])
        .unwrap();
    assert!(!c.graph.depends_on(tool_entry, ios_ready));
}

#[test]
fn test_linux_shared_library() {
    let ws = ProjectBuilder::new("P")
        .files(&["a.c"])
        .setting("ARCHS", "x86_64")
        .target(TargetBuilder::standard("Util", ProductType::DynamicLibrary).sources(&["a.c"]))
        .into_workspace();
    let c = construct_on(&ws, "linux");

    let ld = c.graph.tasks_with_rule("Ld").next().unwrap();
    assert!(ld.rule_info[1].ends_with(".so"), "{:?}", ld.rule_info);
    assert_eq!(c.graph.tasks_with_rule("CodeSign").count(), 0);
}

fn string_catalog_workspace(sources: &[&str], generate: Option<&str>) -> Workspace {
    let mut target = TargetBuilder::standard("Kit", ProductType::Framework)
        .sources(sources)
        .resources(&["Localizable.xcstrings"]);
    if let Some(value) = generate {
        target = target.setting("STRING_CATALOG_GENERATE_SYMBOLS", value);
    }
    ProjectBuilder::new("P")
        .files(&["a.c", "s.swift", "Localizable.xcstrings"])
        .setting("ARCHS", "arm64")
        .target(target)
        .into_workspace()
}

#[test]
fn test_string_catalog_symbols_feed_swift() {
    let ws = string_catalog_workspace(&["s.swift"], Some("YES"));
    let c = construct(&ws);
    assert!(c.graph.valid, "{:?}", messages(&c, Severity::Error));

    let generators: Vec<_> = c.graph.tasks_with_rule("GenerateStringSymbols").collect();
    assert_eq!(generators.len(), 1);
    let generator = generators[0];
    let generated = generator.rule_info[1].as_str();
    assert!(
        generated.ends_with("/Kit.build/DerivedSources/GeneratedStringSymbols_Localizable.swift"),
        "{}",
        generated
    );
    assert!(generator.rule_info[2].ends_with("/Localizable.xcstrings"));
    assert!(has_arg(generator, "generate-symbols"));
    assert_eq!(generator.outputs, [generated]);

    // the catalog is still compiled into the product
    assert_eq!(c.graph.tasks_with_rule("CompileXCStrings").count(), 1);

    let compilation = c.graph.tasks_with_rule("SwiftDriver Compilation").next().unwrap();
    assert!(has_arg(compilation, generated));
    let requirements = c
        .graph
        .position(&["SwiftDriver Compilation Requirements", "Kit", "normal", "arm64", "macosx"])
        .unwrap();
    let rule_info: Vec<&str> = generator.rule_info.iter().map(String::as_str).collect();
    let generate = c.graph.position(&rule_info).unwrap();
    assert!(c.graph.depends_on(requirements, generate));
}

#[test]
fn test_string_catalog_symbols_need_swift_sources() {
    let ws = string_catalog_workspace(&["a.c"], Some("YES"));
    let c = construct(&ws);

    assert_eq!(c.graph.tasks_with_rule("GenerateStringSymbols").count(), 0);
    assert_eq!(c.graph.tasks_with_rule("CompileXCStrings").count(), 1);
}

#[test]
fn test_string_catalog_symbols_off_by_default() {
    let ws = string_catalog_workspace(&["s.swift"], None);
    let c = construct(&ws);

    assert_eq!(c.graph.tasks_with_rule("GenerateStringSymbols").count(), 0);
    let compilation = c.graph.tasks_with_rule("SwiftDriver Compilation").next().unwrap();
    assert!(compilation.command_line.iter().all(|a| !a.contains("GeneratedStringSymbols")));
}

fn dependencies_workspace(declared: &str) -> Workspace {
    ProjectBuilder::new("P")
        .files(&["a.m"])
        .setting("ARCHS", "arm64")
        .target(
            TargetBuilder::standard("Kit", ProductType::Framework)
                .setting("DEPENDENCIES", declared)
                .sources(&["a.m"]),
        )
        .into_workspace()
}

#[test]
fn test_declared_dependencies_add_trace_flags() {
    let ws = dependencies_workspace("Foo Bar");
    let c = construct(&ws);
    assert!(c.graph.valid, "{:?}", messages(&c, Severity::Error));

    let compile = c.graph.tasks_with_rule("CompileC").next().unwrap();
    let header_trace = format!("{}.trace.json", compile.outputs[0]);
    assert!(header_trace.ends_with("/Objects-normal/arm64/a.o.trace.json"), "{}", header_trace);
    let args = &compile.command_line;
    let at = args.iter().position(|a| a == "-header-include-file").unwrap();
    assert_eq!(args[at - 1], "-Xclang");
    assert_eq!(args[at + 2], header_trace);
    assert!(has_arg(compile, "-header-include-filtering=only-direct-system"));
    assert!(has_arg(compile, "-header-include-format=json"));
    assert!(compile.outputs.contains(&header_trace));

    let link = c.graph.tasks_with_rule("Ld").next().unwrap();
    let args = &link.command_line;
    let at = args.iter().position(|a| a == "-trace_file").unwrap();
    let link_trace = &args[at + 2];
    assert!(link_trace.ends_with("/Objects-normal/arm64/Kit_trace.json"), "{}", link_trace);
    assert!(link.outputs.contains(link_trace));

    let validations: Vec<_> = c.graph.tasks_with_rule("ValidateDependencies").collect();
    assert_eq!(validations.len(), 1);
    let validate = validations[0];
    assert_eq!(validate.rule_info, ["ValidateDependencies", "Kit"]);
    assert_eq!(validate.inputs, [header_trace.clone(), link_trace.clone()]);
    let declared: Vec<&str> = validate
        .command_line
        .windows(2)
        .filter(|w| w[0] == "--dependency")
        .map(|w| w[1].as_str())
        .collect();
    assert_eq!(declared, ["Foo", "Bar"]);
}

#[test]
fn test_no_trace_flags_without_declared_dependencies() {
    let ws = dependencies_workspace("");
    let c = construct(&ws);

    let compile = c.graph.tasks_with_rule("CompileC").next().unwrap();
    assert!(!has_arg(compile, "-header-include-file"));
    assert_eq!(compile.outputs.len(), 2);
    let link = c.graph.tasks_with_rule("Ld").next().unwrap();
    assert!(!has_arg(link, "-trace_file"));
    assert_eq!(c.graph.tasks_with_rule("ValidateDependencies").count(), 0);
}

const BUNDLE_INFO: &str = r#"{
  "schemaVersion": "1.2",
  "artifacts": {
    "MyLibrary": {
      "type": "staticLibrary",
      "version": "1.0.0",
      "variants": [
        {
          "path": "macos-arm64/libMyLibrary.a",
          "supportedTriples": ["arm64-apple-macos"],
          "staticLibraryMetadata": {
            "headerPaths": ["macos-arm64/include"],
            "moduleMapPath": "macos-arm64/include/module.modulemap"
          }
        }
      ]
    }
  }
}"#;

fn bundle_workspace(root: &str, archs: &str) -> Workspace {
    ProjectBuilder::at("P", root)
        .files(&["s.swift", "c.c", "MyLibrary.artifactbundle"])
        .setting("ARCHS", archs)
        .target(
            TargetBuilder::standard("Framework", ProductType::Framework)
                .sources(&["s.swift", "c.c"])
                .frameworks(&["MyLibrary.artifactbundle"]),
        )
        .into_workspace()
}

fn write_bundle(root: &std::path::Path) {
    let bundle = root.join("MyLibrary.artifactbundle");
    std::fs::create_dir_all(&bundle).unwrap();
    std::fs::write(bundle.join("info.json"), BUNDLE_INFO).unwrap();
}

#[test]
fn test_artifact_bundle_headers_and_archive() {
    let tmp = tempfile::tempdir().unwrap();
    write_bundle(tmp.path());
    let root = tmp.path().to_str().unwrap();
    let ws = bundle_workspace(root, "arm64");
    let c = construct(&ws);
    assert!(messages(&c, Severity::Error).is_empty(), "{:?}", messages(&c, Severity::Error));

    let bundle = format!("{}/MyLibrary.artifactbundle/macos-arm64", root);
    let module_map = format!("-fmodule-map-file={}/include/module.modulemap", bundle);
    let include = format!("-I{}/include", bundle);

    let compile = c.graph.tasks_with_rule("CompileC").next().unwrap();
    assert!(has_arg(compile, &module_map));
    assert!(has_arg(compile, &include));

    let swift = c.graph.tasks_with_rule("SwiftDriver Compilation").next().unwrap();
    let args = &swift.command_line;
    let at = args.iter().position(|a| *a == module_map).unwrap();
    assert_eq!(args[at - 1], "-Xcc");
    let at = args.iter().position(|a| *a == include).unwrap();
    assert_eq!(args[at - 1], "-Xcc");

    let archive = format!("{}/libMyLibrary.a", bundle);
    let link = c.graph.tasks_with_rule("Ld").next().unwrap();
    assert!(has_arg(link, &archive));
    assert!(link.inputs.contains(&archive));
    assert!(!messages(&c, Severity::Warning)
        .iter()
        .any(|m| m.contains("will not be linked")));
}

#[test]
fn test_artifact_bundle_without_variant_for_arch() {
    let tmp = tempfile::tempdir().unwrap();
    write_bundle(tmp.path());
    let ws = bundle_workspace(tmp.path().to_str().unwrap(), "x86_64");
    let c = construct(&ws);

    assert!(messages(&c, Severity::Error).contains(
        &"artifact bundle 'MyLibrary.artifactbundle' has no variant of 'MyLibrary' for 'x86_64-apple-macos'"
    ));
    let link = c.graph.tasks_with_rule("Ld").next().unwrap();
    assert!(link.command_line.iter().all(|a| !a.ends_with("libMyLibrary.a")));
}

#[test]
fn test_artifact_bundle_without_manifest() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(tmp.path().join("MyLibrary.artifactbundle")).unwrap();
    let ws = bundle_workspace(tmp.path().to_str().unwrap(), "arm64");
    let c = construct(&ws);

    assert!(messages(&c, Severity::Error)
        .iter()
        .any(|m| m.starts_with("failed to read artifact bundle manifest")));
}
