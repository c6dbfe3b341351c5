//! Product-level tasks: bundle symlinks, signing, validation, custom and
//! external tasks, and the per-target dependency info file.

use serde::Serialize;

use super::{join_path, TargetProducer};
use crate::builder::task::{is_virtual, virtual_node, write_aux_file, PlannedTask, Stage};
use crate::core::platform::canonical_filters;
use crate::core::target::{CustomTask, ExternalTarget, ProductType, StandardTarget};

pub(super) fn produce(p: &mut TargetProducer<'_, '_>, standard: &StandardTarget) {
    let target = p.target;
    let product_type = standard.product_type;

    if product_type == ProductType::Framework && !target.platform.shallow_bundles {
        symlinks(p);
    }

    let base = p.base();
    let product_path = base.evaluate("$(TARGET_BUILD_DIR)/$(FULL_PRODUCT_NAME)");
    let binary = base.evaluate("$(TARGET_BUILD_DIR)/$(EXECUTABLE_PATH)");
    let has_binary = !target.archs.is_empty() && product_type != ProductType::ObjectLibrary;

    let mut signed = None;
    if target.platform.requires_signing
        && base.bool("CODE_SIGNING_ALLOWED")
        && product_type.is_signable()
        && has_binary
    {
        let node = virtual_node(format!("CodeSign {}", product_path));
        // nested code is signed before its container
        let nested: Vec<String> = p
            .tasks
            .iter()
            .filter(|t| t.rule_name() == "CodeSign")
            .flat_map(|t| t.outputs.iter().filter(|o| is_virtual(o)).cloned())
            .collect();
        let task = PlannedTask::new(["CodeSign", product_path.as_str()], Stage::Sign)
            .args([
                base.get("CODESIGN"),
                "--force",
                "--sign",
                base.get("CODE_SIGN_IDENTITY"),
                "--timestamp=none",
                product_path.as_str(),
            ])
            .input(binary.as_str())
            .inputs(nested)
            .output(node.as_str())
            .describe(format!("Sign {}", base.get("FULL_PRODUCT_NAME")));
        p.emit(task);
        signed = Some(node);
    }

    if product_type == ProductType::Application && base.bool("VALIDATE_PRODUCT") && has_binary {
        let task = PlannedTask::new(["Validate", product_path.as_str()], Stage::Validate)
            .args(["builtin-validationUtility", product_path.as_str()])
            .input(signed.unwrap_or_else(|| binary.clone()))
            .output(virtual_node(format!("Validate {}", product_path)))
            .action("validate-product")
            .describe(format!("Validate {}", base.get("FULL_PRODUCT_NAME")));
        p.emit(task);
    }

    for custom in &standard.custom_tasks {
        custom_task(p, custom);
    }
}

/// Check the traces the compiles and links recorded against the declared
/// `DEPENDENCIES`.
pub(super) fn validate_dependencies(p: &mut TargetProducer<'_, '_>) {
    if p.dependency_traces.is_empty() {
        return;
    }
    let target = p.target.name().to_string();
    let traces = std::mem::take(&mut p.dependency_traces);
    let declared = p.base().list("DEPENDENCIES");
    let task = PlannedTask::new(["ValidateDependencies", target.as_str()], Stage::Validate)
        .arg("builtin-validate-dependencies")
        .args(declared.into_iter().flat_map(|d| ["--dependency".to_string(), d]))
        .args(traces.iter().cloned())
        .inputs(traces)
        .output(virtual_node(format!("ValidateDependencies {}", target)))
        .action("validate-dependencies")
        .describe(format!("Validate dependencies of {}", target));
    p.emit(task);
}

/// `Versions/Current`, the executable and `Resources` links of a deep
/// framework bundle.
fn symlinks(p: &mut TargetProducer<'_, '_>) {
    let base = p.base();
    let wrapper = base.evaluate("$(TARGET_BUILD_DIR)/$(WRAPPER_NAME)");
    let executable = base.get("EXECUTABLE_NAME");
    let links = [
        (join_path(&wrapper, "Versions/Current"), base.get("FRAMEWORK_VERSION").to_string()),
        (
            join_path(&wrapper, executable),
            format!("Versions/Current/{}", executable),
        ),
        (join_path(&wrapper, "Resources"), "Versions/Current/Resources".to_string()),
    ];
    for (link, destination) in links {
        let task = PlannedTask::new(["SymLink", link.as_str(), destination.as_str()], Stage::Copy)
            .args(["/bin/ln", "-sfh", destination.as_str(), link.as_str()])
            .output(link.as_str())
            .describe(format!("Link {}", super::file_name(&link)));
        p.emit(task);
    }
}

fn custom_task(p: &mut TargetProducer<'_, '_>, custom: &CustomTask) {
    let base = p.base();
    let command: Vec<String> = custom.command_line.iter().map(|a| base.evaluate(a)).collect();
    let outputs: Vec<String> = custom.outputs.iter().map(|o| base.evaluate(o)).collect();
    let description = base.evaluate(&custom.execution_description);

    let mut rule_info = vec!["CustomTask".to_string(), description.clone()];
    rule_info.extend(outputs.iter().cloned());

    let mut task = PlannedTask::new(rule_info, Stage::Compile)
        .args(command)
        .envs(
            custom
                .environment
                .iter()
                .map(|(k, v)| (k.clone(), base.evaluate(v))),
        )
        .inputs(custom.inputs.iter().map(|i| base.evaluate(i)))
        .always_out_of_date(outputs.is_empty())
        .outputs(outputs)
        .describe(description);
    if let Some(dir) = &custom.working_directory {
        task = task.cwd(base.evaluate(dir));
    }
    p.emit(task);
}

/// One always-out-of-date invocation of the external build tool.
pub(super) fn external(p: &mut TargetProducer<'_, '_>, ext: &ExternalTarget) {
    let base = p.base();
    let tool = base.evaluate(&ext.tool_path);
    let cwd = ext
        .working_directory
        .as_deref()
        .map(|d| base.evaluate(d))
        .unwrap_or_else(|| base.get("SRCROOT").to_string());

    let mut task = PlannedTask::new(["ExternalBuildToolExecution", ext.name.as_str()], Stage::Compile)
        .arg(tool.as_str())
        .args(base.evaluate_list(&ext.arguments))
        .cwd(cwd)
        .output(virtual_node(format!("external-{}", ext.name)))
        .always_out_of_date(true)
        .describe(format!("External build tool execution for {}", ext.name));
    if ext.pass_build_settings_in_environment {
        task = task.envs(base.environment());
    }
    p.emit(task);
}

#[derive(Serialize)]
struct DependencyInfo<'a> {
    target: &'a str,
    platform: &'a str,
    dependencies: Vec<DependencyEntry<'a>>,
}

#[derive(Serialize)]
struct DependencyEntry<'a> {
    name: &'a str,
    platform_filters: Vec<String>,
}

/// Dependencies of the target with canonical platform filters.
pub(super) fn dependency_info(p: &mut TargetProducer<'_, '_>) {
    let target = p.target;
    let info = DependencyInfo {
        target: target.name(),
        platform: &target.platform.name,
        dependencies: target
            .target
            .dependencies()
            .iter()
            .map(|d| DependencyEntry {
                name: &d.name,
                platform_filters: canonical_filters(&d.platform_filters)
                    .iter()
                    .map(|f| f.to_string())
                    .collect(),
            })
            .collect(),
    };
    let contents = match serde_json::to_string_pretty(&info) {
        Ok(json) => json,
        Err(e) => {
            p.diagnostics
                .error(format!("unable to serialize dependency info: {}", e));
            return;
        }
    };
    let path = p
        .base()
        .evaluate(&format!("$(TARGET_TEMP_DIR)/{}-dependency-info.json", target.name()));
    p.emit(write_aux_file(&path, contents));
}
