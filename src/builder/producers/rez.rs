//! Carbon resources and AppleScript phases.

use super::{join_path, TargetProducer};
use crate::builder::task::{PlannedTask, Stage};
use crate::core::file_type::FileType;
use crate::core::phase::BuildPhase;

/// `Rez` per `.r` source, then `ResMergerCollector` over every compiled
/// and prebuilt `.rsrc`, then `ResMergerProduct` into the product.
pub(super) fn produce_rez<'a>(p: &mut TargetProducer<'_, 'a>, phase: &'a BuildPhase) {
    let target = p.target;
    let base = p.base();
    let objects = base.evaluate("$(TARGET_TEMP_DIR)/ResourceManagerResources/Objects");
    let mut collected = Vec::new();

    for (_, item) in p.phase_files(phase) {
        match item.file_type {
            FileType::RezSource => {
                let output = join_path(&objects, &format!("{}.rsrc", super::file_stem(&item.path)));
                let mut task = PlannedTask::new(["Rez", output.as_str(), item.path.as_str()], Stage::Compile)
                    .args([base.get("REZ"), "-o", output.as_str(), "-useDF"]);
                for arch in &target.archs {
                    task = task.args(["-arch", arch.as_str()]);
                }
                task = task
                    .arg(item.path.as_str())
                    .input(item.path.as_str())
                    .output(output.as_str())
                    .describe(format!("Rez {}", super::file_name(&item.path)));
                p.emit(task);
                collected.push(output);
            }
            FileType::RezResource => collected.push(item.path),
            other => p.diagnostics.warning(format!(
                "'{}' of type '{}' cannot be processed by a {} build phase",
                item.path,
                other.identifier(),
                phase.display_name()
            )),
        }
    }
    if collected.is_empty() {
        return;
    }

    let product_name = base.get("PRODUCT_NAME");
    let collector = base.evaluate(&format!(
        "$(TARGET_TEMP_DIR)/ResourceManagerResources/{}.rsrc",
        product_name
    ));
    let task = PlannedTask::new(["ResMergerCollector", collector.as_str()], Stage::Compile)
        .args([base.get("RESMERGER"), "-dstIs", "DF"])
        .args(collected.iter().cloned())
        .args(["-o", collector.as_str()])
        .inputs(collected)
        .output(collector.as_str())
        .describe(format!("Collect Carbon resources of {}", target.name()));
    p.emit(task);

    let resources = base.evaluate("$(TARGET_BUILD_DIR)/$(UNLOCALIZED_RESOURCES_FOLDER_PATH)");
    let product = join_path(&resources, &format!("{}.rsrc", product_name));
    let task = PlannedTask::new(["ResMergerProduct", product.as_str(), collector.as_str()], Stage::Copy)
        .args([base.get("RESMERGER"), collector.as_str(), "-dstIs", "DF", "-o", product.as_str()])
        .input(collector.as_str())
        .output(product.as_str())
        .describe(format!("Merge Carbon resources into {}", product_name));
    p.emit(task);
}

/// `OsaCompile` per `.applescript` into compiled scripts in the product.
pub(super) fn produce_applescript<'a>(p: &mut TargetProducer<'_, 'a>, phase: &'a BuildPhase) {
    let base = p.base();
    let scripts = base.evaluate("$(TARGET_BUILD_DIR)/$(UNLOCALIZED_RESOURCES_FOLDER_PATH)/Scripts");
    for (_, item) in p.phase_files(phase) {
        if item.file_type != FileType::AppleScript {
            p.diagnostics.warning(format!(
                "'{}' of type '{}' cannot be processed by a {} build phase",
                item.path,
                item.file_type.identifier(),
                phase.display_name()
            ));
            continue;
        }
        let output = join_path(&scripts, &format!("{}.scpt", super::file_stem(&item.path)));
        let task = PlannedTask::new(["OsaCompile", output.as_str(), item.path.as_str()], Stage::Compile)
            .args([
                base.get("OSACOMPILE"),
                "-l",
                "AppleScript",
                "-d",
                "-o",
                output.as_str(),
                item.path.as_str(),
            ])
            .input(item.path.as_str())
            .output(output.as_str())
            .describe(format!("Compile {}", super::file_name(&item.path)));
        p.emit(task);
    }
}
