//! Headers phase: public and private headers are copied into the
//! product; project headers stay where they are.

use super::{join_path, TargetProducer};
use crate::builder::task::{PlannedTask, Stage};
use crate::core::file_type::FileType;
use crate::core::phase::{BuildPhase, HeaderVisibility};

pub(super) fn produce<'a>(p: &mut TargetProducer<'_, 'a>, phase: &'a BuildPhase) {
    let base = p.base();
    for (file, item) in p.phase_files(phase) {
        if p.rejects_code(&item, phase) {
            continue;
        }
        let folder = match file.header_visibility {
            Some(HeaderVisibility::Public) => "PUBLIC_HEADERS_FOLDER_PATH",
            Some(HeaderVisibility::Private) => "PRIVATE_HEADERS_FOLDER_PATH",
            Some(HeaderVisibility::Project) | None => continue,
        };
        if item.file_type != FileType::Header {
            tracing::debug!("`{}`: copying non-header {} as a header", p.target.name(), item.path);
        }
        let dest_dir = join_path(base.get("TARGET_BUILD_DIR"), base.get(folder));
        let dest = join_path(&dest_dir, super::file_name(&item.path));
        let task = PlannedTask::new(["CpHeader", dest.as_str(), item.path.as_str()], Stage::Headers)
            .args([
                "builtin-copy",
                "-exclude",
                ".DS_Store",
                "-resolve-src-symlinks",
                item.path.as_str(),
                dest_dir.as_str(),
            ])
            .input(item.path.as_str())
            .output(dest.as_str())
            .action("copy")
            .describe(format!("Copy {}", super::file_name(&item.path)));
        p.emit(task);
    }
}
