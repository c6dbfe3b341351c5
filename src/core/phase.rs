//! Build phases, build files and build rules.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::core::ids::Guid;
use crate::core::platform::{serialize_filter_set, PlatformFilter};

/// Reference from a build file to the item it builds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildableRef {
    /// Resolved by name: group tree first, then dependency products.
    Auto(String),
    /// Explicit file reference by GUID.
    File(Guid),
    /// Product of another target, by target name.
    TargetProduct(String),
    /// Named passthrough with an explicit type (e.g. an SDK library).
    Named { name: String, file_type: String },
}

impl BuildableRef {
    /// Short human-readable form used in diagnostics.
    pub fn display_name(&self) -> &str {
        match self {
            BuildableRef::Auto(name) => name,
            BuildableRef::File(guid) => guid.as_str(),
            BuildableRef::TargetProduct(name) => name,
            BuildableRef::Named { name, .. } => name,
        }
    }
}

/// Header visibility in a Headers phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderVisibility {
    Public,
    Private,
    Project,
}

/// How a resource is handled by the Resources phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceRule {
    /// Pick a strategy from the file type (the default).
    Process,
    /// Always copy verbatim.
    Copy,
}

/// One entry of a build phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildFile {
    #[serde(default)]
    pub guid: Guid,
    pub item: BuildableRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_visibility: Option<HeaderVisibility>,
    #[serde(default)]
    pub code_sign_on_copy: bool,
    #[serde(default)]
    pub remove_headers_on_copy: bool,
    #[serde(default, serialize_with = "serialize_filter_set")]
    pub platform_filters: HashSet<PlatformFilter>,
    #[serde(default)]
    pub additional_args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_rule: Option<ResourceRule>,
}

impl BuildFile {
    /// A build file resolved by name.
    pub fn auto(name: impl Into<String>) -> Self {
        BuildFile::new(BuildableRef::Auto(name.into()))
    }

    /// A build file pointing at another target's product.
    pub fn target_product(target: impl Into<String>) -> Self {
        BuildFile::new(BuildableRef::TargetProduct(target.into()))
    }

    pub fn new(item: BuildableRef) -> Self {
        BuildFile {
            guid: Guid::default(),
            item,
            header_visibility: None,
            code_sign_on_copy: false,
            remove_headers_on_copy: false,
            platform_filters: HashSet::new(),
            additional_args: Vec::new(),
            resource_rule: None,
        }
    }
}

/// Where a Copy Files phase puts its items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CopyDestination {
    AbsolutePath,
    Products,
    Wrapper,
    Executables,
    Resources,
    Frameworks,
    SharedSupport,
    PlugIns,
}

impl CopyDestination {
    /// Settings expression of the destination root.
    pub fn root_expression(&self) -> &'static str {
        match self {
            CopyDestination::AbsolutePath => "",
            CopyDestination::Products => "$(BUILT_PRODUCTS_DIR)",
            CopyDestination::Wrapper => "$(TARGET_BUILD_DIR)/$(WRAPPER_NAME)",
            CopyDestination::Executables => "$(TARGET_BUILD_DIR)/$(EXECUTABLE_FOLDER_PATH)",
            CopyDestination::Resources => {
                "$(TARGET_BUILD_DIR)/$(UNLOCALIZED_RESOURCES_FOLDER_PATH)"
            }
            CopyDestination::Frameworks => "$(TARGET_BUILD_DIR)/$(FRAMEWORKS_FOLDER_PATH)",
            CopyDestination::SharedSupport => {
                "$(TARGET_BUILD_DIR)/$(SHARED_SUPPORT_FOLDER_PATH)"
            }
            CopyDestination::PlugIns => "$(TARGET_BUILD_DIR)/$(PLUGINS_FOLDER_PATH)",
        }
    }
}

/// A Run Script phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellScriptPhase {
    #[serde(default = "default_script_name")]
    pub name: String,
    pub script: String,
    #[serde(default = "default_shell")]
    pub shell: String,
    #[serde(default)]
    pub input_paths: Vec<String>,
    #[serde(default)]
    pub output_paths: Vec<String>,
    #[serde(default)]
    pub input_file_list_paths: Vec<String>,
    #[serde(default)]
    pub output_file_list_paths: Vec<String>,
    /// Explicitly run on every build.
    #[serde(default)]
    pub always_out_of_date: bool,
    #[serde(default)]
    pub run_only_when_installing: bool,
    /// Export resolved build settings into the script environment.
    #[serde(default = "default_true")]
    pub export_build_settings: bool,
}

fn default_script_name() -> String {
    "Run Script".to_string()
}

fn default_shell() -> String {
    "/bin/sh".to_string()
}

fn default_true() -> bool {
    true
}

impl ShellScriptPhase {
    pub fn new(name: impl Into<String>, script: impl Into<String>) -> Self {
        ShellScriptPhase {
            name: name.into(),
            script: script.into(),
            shell: default_shell(),
            input_paths: Vec::new(),
            output_paths: Vec::new(),
            input_file_list_paths: Vec::new(),
            output_file_list_paths: Vec::new(),
            always_out_of_date: false,
            run_only_when_installing: false,
            export_build_settings: true,
        }
    }

    /// Whether the phase declares no outputs at all.
    pub fn has_no_outputs(&self) -> bool {
        self.output_paths.is_empty() && self.output_file_list_paths.is_empty()
    }
}

/// A build phase of a target.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BuildPhase {
    Sources {
        #[serde(default)]
        files: Vec<BuildFile>,
    },
    Frameworks {
        #[serde(default)]
        files: Vec<BuildFile>,
    },
    Resources {
        #[serde(default)]
        files: Vec<BuildFile>,
    },
    Headers {
        #[serde(default)]
        files: Vec<BuildFile>,
    },
    CopyFiles {
        #[serde(default)]
        files: Vec<BuildFile>,
        destination: CopyDestination,
        #[serde(default)]
        subpath: String,
    },
    ShellScript(ShellScriptPhase),
    Rez {
        #[serde(default)]
        files: Vec<BuildFile>,
    },
    AppleScript {
        #[serde(default)]
        files: Vec<BuildFile>,
    },
}

impl BuildPhase {
    /// The phase's build files in declaration order.
    pub fn files(&self) -> &[BuildFile] {
        match self {
            BuildPhase::Sources { files }
            | BuildPhase::Frameworks { files }
            | BuildPhase::Resources { files }
            | BuildPhase::Headers { files }
            | BuildPhase::CopyFiles { files, .. }
            | BuildPhase::Rez { files }
            | BuildPhase::AppleScript { files } => files,
            BuildPhase::ShellScript(_) => &[],
        }
    }

    pub(crate) fn files_mut(&mut self) -> Option<&mut Vec<BuildFile>> {
        match self {
            BuildPhase::Sources { files }
            | BuildPhase::Frameworks { files }
            | BuildPhase::Resources { files }
            | BuildPhase::Headers { files }
            | BuildPhase::CopyFiles { files, .. }
            | BuildPhase::Rez { files }
            | BuildPhase::AppleScript { files } => Some(files),
            BuildPhase::ShellScript(_) => None,
        }
    }

    /// Phase name as shown in diagnostics.
    pub fn display_name(&self) -> &str {
        match self {
            BuildPhase::Sources { .. } => "Compile Sources",
            BuildPhase::Frameworks { .. } => "Link Binary With Libraries",
            BuildPhase::Resources { .. } => "Copy Bundle Resources",
            BuildPhase::Headers { .. } => "Headers",
            BuildPhase::CopyFiles { .. } => "Copy Files",
            BuildPhase::ShellScript(script) => &script.name,
            BuildPhase::Rez { .. } => "Build Carbon Resources",
            BuildPhase::AppleScript { .. } => "Compile AppleScript Files",
        }
    }

    pub fn is_sources(&self) -> bool {
        matches!(self, BuildPhase::Sources { .. })
    }
}

/// Input side of a build rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleInput {
    /// File type identifier (`sourcecode.c.c`, `c`, ...)
    FileType(String),
    /// Glob matched against the file name.
    Pattern(String),
}

/// Action side of a build rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    /// Hand the file to a named compiler (`clang`, `swiftc`).
    Compiler(String),
    /// Run a script with declared inputs and outputs.
    Script {
        script: String,
        #[serde(default)]
        inputs: Vec<String>,
        #[serde(default)]
        outputs: Vec<String>,
    },
}

/// A target build rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildRule {
    #[serde(default)]
    pub name: String,
    pub input: RuleInput,
    pub action: RuleAction,
    #[serde(default)]
    pub run_once_per_arch: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_deserialize() {
        let json = r#"{
            "type": "copy-files",
            "destination": "frameworks",
            "subpath": "Extra",
            "files": [{"item": {"target_product": "Core"}, "code_sign_on_copy": true}]
        }"#;
        let phase: BuildPhase = serde_json::from_str(json).unwrap();
        match &phase {
            BuildPhase::CopyFiles {
                files,
                destination,
                subpath,
            } => {
                assert_eq!(*destination, CopyDestination::Frameworks);
                assert_eq!(subpath, "Extra");
                assert!(files[0].code_sign_on_copy);
                assert_eq!(files[0].item, BuildableRef::TargetProduct("Core".into()));
            }
            other => panic!("unexpected phase {:?}", other),
        }
    }

    #[test]
    fn test_script_phase_defaults() {
        let json = r#"{"type": "shell-script", "script": "echo hi"}"#;
        let phase: BuildPhase = serde_json::from_str(json).unwrap();
        let BuildPhase::ShellScript(script) = phase else {
            panic!("expected script phase");
        };
        assert_eq!(script.name, "Run Script");
        assert_eq!(script.shell, "/bin/sh");
        assert!(script.export_build_settings);
        assert!(script.has_no_outputs());
    }

    #[test]
    fn test_filters_serialize_sorted() {
        let mut file = BuildFile::auto("a.c");
        for name in ["tvos", "ios", "macos"] {
            file.platform_filters.insert(PlatformFilter::new(name));
        }
        let json = serde_json::to_string(&file).unwrap();
        let ios = json.find("\"ios\"").unwrap();
        let macos = json.find("\"macos\"").unwrap();
        let tvos = json.find("\"tvos\"").unwrap();
        assert!(ios < macos && macos < tvos);
    }
}
