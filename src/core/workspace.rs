//! Workspaces, projects and the source group tree.
//!
//! A [`Workspace`] is loaded once per request and is read-only for the
//! whole task construction pass. Everything that requires I/O (reading the
//! JSON description, reading base `.xcconfig` files) happens in
//! [`Workspace::load`], so the pass itself is a pure function of the model.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use miette::Diagnostic as MietteDiagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::file_type::FileType;
use crate::core::ids::{Guid, GuidArena};
use crate::core::target::Target;
use crate::settings::table::SettingsTable;
use crate::settings::xcconfig;

/// Errors raised while loading or validating a project model.
#[derive(Debug, Error, MietteDiagnostic)]
pub enum ModelError {
    #[error("failed to read workspace description `{}`", path.display())]
    #[diagnostic(code(rigging::model::load))]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid workspace description `{}`: {message}", path.display())]
    #[diagnostic(
        code(rigging::model::load),
        help("the workspace description must be a JSON object with `name` and `projects`")
    )]
    Parse { path: PathBuf, message: String },

    #[error("duplicate target name `{name}` in workspace")]
    #[diagnostic(
        code(rigging::model::duplicate_target),
        help("target names must be unique across all projects of a workspace")
    )]
    DuplicateTarget { name: String },

    #[error("failed to read base configuration `{}`", path.display())]
    #[diagnostic(code(rigging::model::load))]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}:{line}: {message}", path.display())]
    #[diagnostic(code(rigging::model::xcconfig))]
    ConfigSyntax {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("`#include` nesting too deep at `{}`", path.display())]
    #[diagnostic(code(rigging::model::xcconfig))]
    IncludeDepth { path: PathBuf },
}

/// A named set of build settings, optionally based on an `.xcconfig` file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildConfiguration {
    pub name: String,
    /// Raw settings; keys may carry conditions (`OTHER_CFLAGS[arch=arm64]`).
    #[serde(default)]
    pub build_settings: BTreeMap<String, String>,
    /// Base configuration file, relative to the project directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_configuration: Option<PathBuf>,
}

impl BuildConfiguration {
    pub fn new(name: impl Into<String>) -> Self {
        BuildConfiguration {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.build_settings.insert(key.into(), value.into());
        self
    }
}

/// A file in the group tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReference {
    #[serde(default)]
    pub guid: Guid,
    pub path: String,
    /// Explicit type identifier, overriding the extension.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
}

/// A group of files, optionally contributing a path component.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Group {
    #[serde(default)]
    pub guid: Guid,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default)]
    pub children: Vec<GroupItem>,
}

/// Child of a group.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GroupItem {
    Group(Group),
    File(FileReference),
}

/// A file reference with its absolute path and effective type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    pub guid: Guid,
    pub path: PathBuf,
    pub file_type: FileType,
}

impl Group {
    fn find<F>(&self, base: &Path, pred: &F) -> Option<ResolvedFile>
    where
        F: Fn(&FileReference) -> bool,
    {
        let base = match &self.path {
            Some(p) => base.join(p),
            None => base.to_path_buf(),
        };
        for child in &self.children {
            match child {
                GroupItem::File(file) if pred(file) => {
                    let path = base.join(&file.path);
                    let file_type = file
                        .file_type
                        .as_deref()
                        .and_then(FileType::from_identifier)
                        .unwrap_or_else(|| FileType::from_path(&path));
                    return Some(ResolvedFile {
                        guid: file.guid.clone(),
                        path,
                        file_type,
                    });
                }
                GroupItem::File(_) => {}
                GroupItem::Group(group) => {
                    if let Some(found) = group.find(&base, pred) {
                        return Some(found);
                    }
                }
            }
        }
        None
    }

    fn fill_guids(&mut self, arena: &mut GuidArena) {
        arena.fill(&mut self.guid);
        for child in &mut self.children {
            match child {
                GroupItem::Group(group) => group.fill_guids(arena),
                GroupItem::File(file) => arena.fill(&mut file.guid),
            }
        }
    }
}

fn default_configuration_name() -> String {
    "Debug".to_string()
}

/// A project: targets, group tree and build configurations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub guid: Guid,
    pub name: String,
    /// Project directory (`SRCROOT`); relative paths are taken from the
    /// workspace root.
    #[serde(default)]
    pub path: PathBuf,
    #[serde(default)]
    pub group_tree: Group,
    #[serde(default)]
    pub build_configurations: Vec<BuildConfiguration>,
    #[serde(default = "default_configuration_name")]
    pub default_configuration: String,
    #[serde(default)]
    pub targets: Vec<Target>,
}

impl Project {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Project {
            guid: Guid::default(),
            name: name.into(),
            path: path.into(),
            group_tree: Group::default(),
            build_configurations: Vec::new(),
            default_configuration: default_configuration_name(),
            targets: Vec::new(),
        }
    }

    /// Find a file reference by GUID.
    pub fn file_by_guid(&self, guid: &Guid) -> Option<ResolvedFile> {
        self.group_tree.find(&self.path, &|f: &FileReference| &f.guid == guid)
    }

    /// Find a file reference by name (depth-first, first match).
    ///
    /// `name` matches either the reference's path or its last component.
    pub fn file_by_name(&self, name: &str) -> Option<ResolvedFile> {
        self.group_tree.find(&self.path, &|f: &FileReference| {
            f.path == name || Path::new(&f.path).file_name().is_some_and(|n| n == name)
        })
    }

    pub fn configuration(&self, name: &str) -> Option<&BuildConfiguration> {
        self.build_configurations.iter().find(|c| c.name == name)
    }

    pub fn target(&self, name: &str) -> Option<&Target> {
        self.targets.iter().find(|t| t.name() == name)
    }
}

/// The root of a project model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub name: String,
    #[serde(default)]
    pub root: PathBuf,
    #[serde(default)]
    pub projects: Vec<Project>,
    /// Parsed base configuration files, keyed by absolute path.
    #[serde(skip)]
    pub config_files: BTreeMap<PathBuf, SettingsTable>,
}

impl Workspace {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Workspace {
            name: name.into(),
            root: root.into(),
            projects: Vec::new(),
            config_files: BTreeMap::new(),
        }
    }

    /// Load a workspace from its JSON description.
    ///
    /// Relative project paths are resolved against the description's
    /// directory, missing GUIDs are allocated, and base configuration
    /// files that exist are read and parsed.
    pub fn load(path: &Path) -> Result<Workspace> {
        let contents = std::fs::read_to_string(path).map_err(|source| ModelError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let root = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
            .to_path_buf();

        let mut ws = Workspace::from_json(&contents, path, &root)?;
        ws.load_config_files()
            .with_context(|| format!("failed to load base configurations for `{}`", ws.name))?;

        tracing::debug!(
            "loaded workspace `{}`: {} project(s), {} target(s), {} config file(s)",
            ws.name,
            ws.projects.len(),
            ws.targets().count(),
            ws.config_files.len()
        );
        Ok(ws)
    }

    /// Parse a JSON description without touching the filesystem.
    pub fn from_json(contents: &str, origin: &Path, root: &Path) -> Result<Workspace, ModelError> {
        let mut ws: Workspace =
            serde_json::from_str(contents).map_err(|e| ModelError::Parse {
                path: origin.to_path_buf(),
                message: e.to_string(),
            })?;

        ws.root = if ws.root.as_os_str().is_empty() {
            root.to_path_buf()
        } else {
            root.join(&ws.root)
        };
        for project in &mut ws.projects {
            if project.path.is_relative() {
                project.path = ws.root.join(&project.path);
            }
        }

        ws.assign_guids(&mut GuidArena::new("W"));
        ws.validate()?;
        Ok(ws)
    }

    /// Fill in every missing GUID from `arena`.
    pub fn assign_guids(&mut self, arena: &mut GuidArena) {
        for project in &mut self.projects {
            arena.fill(&mut project.guid);
            project.group_tree.fill_guids(arena);
            for target in &mut project.targets {
                arena.fill(target.guid_mut());
                for phase in target.build_phases_mut() {
                    if let Some(files) = phase.files_mut() {
                        for file in files {
                            arena.fill(&mut file.guid);
                        }
                    }
                }
            }
        }
    }

    /// Structural checks that make the model unusable when violated.
    pub fn validate(&self) -> Result<(), ModelError> {
        let mut seen = HashSet::new();
        for target in self.targets() {
            if !seen.insert(target.name()) {
                return Err(ModelError::DuplicateTarget {
                    name: target.name().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Read every base configuration file referenced by the model.
    ///
    /// Files that do not exist are left out; the settings resolver reports
    /// them against the target that uses them.
    pub fn load_config_files(&mut self) -> Result<(), ModelError> {
        let mut paths = Vec::new();
        for project in &self.projects {
            let target_configs = project
                .targets
                .iter()
                .flat_map(|t| t.build_configurations().iter());
            for config in project.build_configurations.iter().chain(target_configs) {
                if let Some(base) = &config.base_configuration {
                    paths.push(project.path.join(base));
                }
            }
        }

        for path in paths {
            if self.config_files.contains_key(&path) || !path.exists() {
                continue;
            }
            let table = xcconfig::load_file(&path)?;
            self.config_files.insert(path, table);
        }
        Ok(())
    }

    /// All targets in declaration order across projects.
    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.projects.iter().flat_map(|p| p.targets.iter())
    }

    /// All targets paired with their owning project.
    pub fn targets_with_projects(&self) -> impl Iterator<Item = (&Project, &Target)> {
        self.projects
            .iter()
            .flat_map(|p| p.targets.iter().map(move |t| (p, t)))
    }

    /// Find a target and its project by name.
    pub fn find_target(&self, name: &str) -> Option<(&Project, &Target)> {
        self.targets_with_projects().find(|(_, t)| t.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"{
        "name": "Sample",
        "projects": [{
            "name": "P",
            "path": "P",
            "group_tree": {
                "name": "Root",
                "children": [
                    {"type": "file", "path": "main.c"},
                    {"type": "group", "name": "Sub", "path": "sub", "children": [
                        {"type": "file", "path": "util.c"},
                        {"type": "file", "path": "data.bin", "file_type": "text"}
                    ]}
                ]
            },
            "build_configurations": [{"name": "Debug", "base_configuration": "base.xcconfig"}],
            "targets": [
                {"kind": "standard", "name": "Tool", "product_type": "tool",
                 "build_phases": [{"type": "sources", "files": [{"item": {"auto": "main.c"}}]}]}
            ]
        }]
    }"#;

    #[test]
    fn test_from_json_resolves_paths_and_guids() {
        let ws = Workspace::from_json(SAMPLE, Path::new("ws.json"), Path::new("/root")).unwrap();
        let project = &ws.projects[0];
        assert_eq!(project.path, PathBuf::from("/root/P"));
        assert!(!project.guid.is_empty());

        let util = project.file_by_name("util.c").unwrap();
        assert_eq!(util.path, PathBuf::from("/root/P/sub/util.c"));
        assert_eq!(util.file_type, FileType::from_path(Path::new("util.c")));

        let data = project.file_by_name("data.bin").unwrap();
        assert_eq!(data.file_type, FileType::Text);

        let by_guid = project.file_by_guid(&util.guid).unwrap();
        assert_eq!(by_guid, util);
    }

    #[test]
    fn test_guid_assignment_is_deterministic() {
        let a = Workspace::from_json(SAMPLE, Path::new("ws.json"), Path::new("/r")).unwrap();
        let b = Workspace::from_json(SAMPLE, Path::new("ws.json"), Path::new("/r")).unwrap();
        let guids = |ws: &Workspace| ws.targets().map(|t| t.guid().clone()).collect::<Vec<_>>();
        assert_eq!(guids(&a), guids(&b));
    }

    #[test]
    fn test_duplicate_target_names_rejected() {
        let json = r#"{"name": "W", "projects": [
            {"name": "A", "targets": [{"kind": "aggregate", "name": "T"}]},
            {"name": "B", "targets": [{"kind": "aggregate", "name": "T"}]}
        ]}"#;
        let err = Workspace::from_json(json, Path::new("ws.json"), Path::new("/")).unwrap_err();
        assert!(matches!(err, ModelError::DuplicateTarget { ref name } if name == "T"));
    }

    #[test]
    fn test_load_reads_existing_config_files() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("P")).unwrap();
        std::fs::write(tmp.path().join("P/base.xcconfig"), "OTHER_CFLAGS = -DBASE\n").unwrap();
        let ws_path = tmp.path().join("ws.json");
        std::fs::write(&ws_path, SAMPLE).unwrap();

        let ws = Workspace::load(&ws_path).unwrap();
        let table = ws.config_files.get(&tmp.path().join("P/base.xcconfig")).unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_load_reports_missing_file() {
        let tmp = TempDir::new().unwrap();
        let err = Workspace::load(&tmp.path().join("nope.json")).unwrap_err();
        assert!(err.to_string().contains("failed to read workspace description"));
    }
}
