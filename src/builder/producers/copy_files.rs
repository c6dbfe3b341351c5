//! Copy Files phase.

use super::{join_path, Origin, TargetProducer};
use crate::builder::task::{gate_node, virtual_node, Gate, PlannedTask, Stage};
use crate::core::file_type::FileType;
use crate::core::phase::{BuildPhase, CopyDestination};

pub(super) fn produce<'a>(
    p: &mut TargetProducer<'_, 'a>,
    phase: &'a BuildPhase,
    destination: CopyDestination,
    subpath: &str,
) {
    let target = p.target;
    let base = p.base();
    let root = base.evaluate(destination.root_expression());
    let dest_dir = join_path(&root, &base.evaluate(subpath));
    let strip_bitcode = base.bool("STRIP_BITCODE_FROM_COPIED_FILES");
    let signing = target.platform.requires_signing && base.bool("CODE_SIGNING_ALLOWED");

    for (file, item) in p.phase_files(phase) {
        let name = super::file_name(&item.path).to_string();
        let dest = join_path(&dest_dir, &name);

        let mut task = PlannedTask::new(["Copy", dest.as_str(), item.path.as_str()], Stage::Copy)
            .args(["builtin-copy", "-exclude", ".DS_Store"]);
        if file.remove_headers_on_copy && item.file_type == FileType::Framework {
            task = task.args(["-exclude", "Headers", "-exclude", "PrivateHeaders", "-exclude", "Modules"]);
        }
        if strip_bitcode && item.file_type.is_code() {
            task = task.args(["-strip-bitcode", "-bitcode-strip-tool", base.get("BITCODE_STRIP")]);
        }
        task = task
            .args(["-resolve-src-symlinks", item.path.as_str(), dest_dir.as_str()])
            .input(item.path.as_str());
        if let Origin::Product(dependency) = &item.origin {
            // the whole product must exist, not just its first output
            task = task.input(gate_node(dependency, Gate::Exit));
        }
        task = task
            .output(dest.as_str())
            .action("copy")
            .describe(format!("Copy {}", name));
        p.emit(task);

        if file.code_sign_on_copy && signing && item.file_type.is_code() {
            let signed = virtual_node(format!("CodeSign {}", dest));
            let task = PlannedTask::new(["CodeSign", dest.as_str()], Stage::Sign)
                .args([
                    base.get("CODESIGN"),
                    "--force",
                    "--sign",
                    base.get("CODE_SIGN_IDENTITY"),
                    "--timestamp=none",
                    dest.as_str(),
                ])
                .input(dest.as_str())
                .output(signed)
                .describe(format!("Sign {}", name));
            p.emit(task);
        }
    }
}
