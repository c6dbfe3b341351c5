//! Fixture builders for unit tests.
//!
//! Project models are assembled through small builders and finished with
//! [`ProjectBuilder::into_workspace`], which hands out GUIDs from an
//! explicit [`GuidArena`]. Two fixtures built the same way are identical.
//!
//! ```rust,ignore
//! let ws = ProjectBuilder::new("P")
//!     .files(&["a.c", "b.c"])
//!     .target(TargetBuilder::standard("Tool", ProductType::Tool).sources(&["a.c", "b.c"]))
//!     .into_workspace();
//! ```

use std::collections::BTreeMap;

use crate::core::ids::{Guid, GuidArena};
use crate::core::phase::{
    BuildFile, BuildPhase, BuildRule, CopyDestination, HeaderVisibility, ShellScriptPhase,
};
use crate::core::platform::PlatformFilter;
use crate::core::target::{
    AggregateTarget, CustomTask, ExternalTarget, PackageProductTarget, ProductType,
    StandardTarget, Target, TargetDependency,
};
use crate::core::workspace::{BuildConfiguration, FileReference, GroupItem, Project, Workspace};

const CONFIGURATIONS: [&str; 2] = ["Debug", "Release"];

fn configurations() -> Vec<BuildConfiguration> {
    CONFIGURATIONS.iter().map(|c| BuildConfiguration::new(*c)).collect()
}

/// Builds a single-project workspace rooted at `/src`.
#[derive(Debug, Clone)]
pub struct ProjectBuilder {
    project: Project,
}

impl ProjectBuilder {
    /// A project at `/src/<name>` with Debug and Release configurations.
    pub fn new(name: &str) -> Self {
        Self::at(name, &format!("/src/{}", name))
    }

    /// A project rooted at `dir`, for fixtures that read files on disk.
    pub fn at(name: &str, dir: &str) -> Self {
        let mut project = Project::new(name, dir);
        project.build_configurations = configurations();
        ProjectBuilder { project }
    }

    /// Add file references to the root group, paths relative to the
    /// project directory.
    pub fn files(mut self, paths: &[&str]) -> Self {
        for path in paths {
            self.project.group_tree.children.push(GroupItem::File(FileReference {
                guid: Guid::default(),
                path: path.to_string(),
                file_type: None,
            }));
        }
        self
    }

    /// Add a file reference with an explicit type identifier.
    pub fn typed_file(mut self, path: &str, file_type: &str) -> Self {
        self.project.group_tree.children.push(GroupItem::File(FileReference {
            guid: Guid::default(),
            path: path.to_string(),
            file_type: Some(file_type.to_string()),
        }));
        self
    }

    /// Set a project-level setting in every configuration.
    pub fn setting(mut self, key: &str, value: &str) -> Self {
        for config in &mut self.project.build_configurations {
            config.build_settings.insert(key.to_string(), value.to_string());
        }
        self
    }

    pub fn target(mut self, target: TargetBuilder) -> Self {
        self.project.targets.push(target.build());
        self
    }

    pub fn into_workspace(self) -> Workspace {
        let mut ws = Workspace::new(self.project.name.clone(), "/src");
        ws.projects.push(self.project);
        ws.assign_guids(&mut GuidArena::new("T"));
        ws
    }
}

/// Builds one target.
#[derive(Debug, Clone)]
pub struct TargetBuilder {
    target: Target,
}

impl TargetBuilder {
    pub fn standard(name: &str, product_type: ProductType) -> Self {
        TargetBuilder {
            target: Target::Standard(StandardTarget {
                guid: Guid::default(),
                name: name.to_string(),
                product_type,
                build_phases: Vec::new(),
                build_rules: Vec::new(),
                dependencies: Vec::new(),
                build_configurations: configurations(),
                custom_tasks: Vec::new(),
            }),
        }
    }

    pub fn aggregate(name: &str) -> Self {
        TargetBuilder {
            target: Target::Aggregate(AggregateTarget {
                guid: Guid::default(),
                name: name.to_string(),
                build_phases: Vec::new(),
                dependencies: Vec::new(),
                build_configurations: configurations(),
            }),
        }
    }

    pub fn external(name: &str, tool_path: &str) -> Self {
        TargetBuilder {
            target: Target::External(ExternalTarget {
                guid: Guid::default(),
                name: name.to_string(),
                tool_path: tool_path.to_string(),
                arguments: "$(ACTION)".to_string(),
                working_directory: None,
                pass_build_settings_in_environment: true,
                dependencies: Vec::new(),
                build_configurations: configurations(),
            }),
        }
    }

    /// A package product forwarding `frameworks` (by name) to whoever
    /// links it.
    pub fn package_product(name: &str, frameworks: &[&str]) -> Self {
        TargetBuilder {
            target: Target::PackageProduct(PackageProductTarget {
                guid: Guid::default(),
                name: name.to_string(),
                frameworks: frameworks.iter().map(|f| BuildFile::auto(*f)).collect(),
                dependencies: Vec::new(),
                build_configurations: configurations(),
            }),
        }
    }

    pub fn depends_on(self, name: &str) -> Self {
        self.dependency(TargetDependency::new(name))
    }

    pub fn depends_on_filtered(
        self,
        name: &str,
        filters: impl IntoIterator<Item = PlatformFilter>,
    ) -> Self {
        let mut dependency = TargetDependency::new(name);
        dependency.platform_filters.extend(filters);
        self.dependency(dependency)
    }

    fn dependency(mut self, dependency: TargetDependency) -> Self {
        match &mut self.target {
            Target::Standard(t) => t.dependencies.push(dependency),
            Target::Aggregate(t) => t.dependencies.push(dependency),
            Target::External(t) => t.dependencies.push(dependency),
            Target::PackageProduct(t) => t.dependencies.push(dependency),
        }
        self
    }

    /// Set a target-level setting in every configuration.
    pub fn setting(mut self, key: &str, value: &str) -> Self {
        let configs = match &mut self.target {
            Target::Standard(t) => &mut t.build_configurations,
            Target::Aggregate(t) => &mut t.build_configurations,
            Target::External(t) => &mut t.build_configurations,
            Target::PackageProduct(t) => &mut t.build_configurations,
        };
        for config in configs {
            config.build_settings.insert(key.to_string(), value.to_string());
        }
        self
    }

    /// Append a build phase as is.
    pub fn phase(mut self, phase: BuildPhase) -> Self {
        match &mut self.target {
            Target::Standard(t) => t.build_phases.push(phase),
            Target::Aggregate(t) => t.build_phases.push(phase),
            other => panic!("`{}` targets have no build phases", other.kind_name()),
        }
        self
    }

    pub fn sources(self, names: &[&str]) -> Self {
        self.phase(BuildPhase::Sources { files: auto(names) })
    }

    pub fn frameworks(self, names: &[&str]) -> Self {
        self.phase(BuildPhase::Frameworks { files: auto(names) })
    }

    /// A Frameworks phase entry naming another target's product.
    pub fn link_target(self, target: &str) -> Self {
        self.phase(BuildPhase::Frameworks {
            files: vec![BuildFile::target_product(target)],
        })
    }

    pub fn resources(self, names: &[&str]) -> Self {
        self.phase(BuildPhase::Resources { files: auto(names) })
    }

    pub fn headers(self, headers: &[(&str, HeaderVisibility)]) -> Self {
        let files = headers
            .iter()
            .map(|(name, visibility)| {
                let mut file = BuildFile::auto(*name);
                file.header_visibility = Some(*visibility);
                file
            })
            .collect();
        self.phase(BuildPhase::Headers { files })
    }

    pub fn copy_files(self, destination: CopyDestination, subpath: &str, files: Vec<BuildFile>) -> Self {
        self.phase(BuildPhase::CopyFiles {
            files,
            destination,
            subpath: subpath.to_string(),
        })
    }

    pub fn script(self, script: ShellScriptPhase) -> Self {
        self.phase(BuildPhase::ShellScript(script))
    }

    pub fn rule(mut self, rule: BuildRule) -> Self {
        match &mut self.target {
            Target::Standard(t) => t.build_rules.push(rule),
            other => panic!("`{}` targets have no build rules", other.kind_name()),
        }
        self
    }

    pub fn custom_task(mut self, task: CustomTask) -> Self {
        match &mut self.target {
            Target::Standard(t) => t.custom_tasks.push(task),
            other => panic!("`{}` targets have no custom tasks", other.kind_name()),
        }
        self
    }

    pub fn build(self) -> Target {
        self.target
    }
}

fn auto(names: &[&str]) -> Vec<BuildFile> {
    names.iter().map(|n| BuildFile::auto(*n)).collect()
}

/// A custom task with the given command, outputs and description.
pub fn custom_task(command: &[&str], outputs: &[&str], description: &str) -> CustomTask {
    CustomTask {
        command_line: command.iter().map(|s| s.to_string()).collect(),
        environment: BTreeMap::new(),
        working_directory: None,
        inputs: Vec::new(),
        outputs: outputs.iter().map(|s| s.to_string()).collect(),
        execution_description: description.to_string(),
    }
}
