//! Toolchain registry and tool descriptions.
//!
//! A toolchain is a directory of tools plus a per-tool table of supported
//! flags. Producers ask the toolchain for paths and flag support; they
//! never search `PATH` themselves.
//!
//! Tool versions are answered by a [`ToolInfoCache`], which memoizes one
//! query per (tool, toolchain) pair for the whole pass.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

mod probe;

pub use probe::{ProcessProbe, StaticProbe, ToolInfoCache, ToolProbe};

/// A tool invoked by planned tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tool {
    Clang,
    ClangXX,
    Swiftc,
    Libtool,
    Lipo,
    Codesign,
    BitcodeStrip,
    Ibtool,
    XcstringsTool,
    Rez,
    ResMerger,
    Osacompile,
}

impl Tool {
    pub const ALL: [Tool; 12] = [
        Tool::Clang,
        Tool::ClangXX,
        Tool::Swiftc,
        Tool::Libtool,
        Tool::Lipo,
        Tool::Codesign,
        Tool::BitcodeStrip,
        Tool::Ibtool,
        Tool::XcstringsTool,
        Tool::Rez,
        Tool::ResMerger,
        Tool::Osacompile,
    ];

    /// Executable name inside the toolchain.
    pub fn executable(&self) -> &'static str {
        match self {
            Tool::Clang => "clang",
            Tool::ClangXX => "clang++",
            Tool::Swiftc => "swiftc",
            Tool::Libtool => "libtool",
            Tool::Lipo => "lipo",
            Tool::Codesign => "codesign",
            Tool::BitcodeStrip => "bitcode_strip",
            Tool::Ibtool => "ibtool",
            Tool::XcstringsTool => "xcstringstool",
            Tool::Rez => "Rez",
            Tool::ResMerger => "ResMerger",
            Tool::Osacompile => "osacompile",
        }
    }

    /// Build setting that overrides the tool path.
    pub fn setting_name(&self) -> &'static str {
        match self {
            Tool::Clang => "CC",
            Tool::ClangXX => "CXX",
            Tool::Swiftc => "SWIFT_EXEC",
            Tool::Libtool => "LIBTOOL",
            Tool::Lipo => "LIPO",
            Tool::Codesign => "CODESIGN",
            Tool::BitcodeStrip => "BITCODE_STRIP",
            Tool::Ibtool => "IBTOOL",
            Tool::XcstringsTool => "XCSTRINGSTOOL",
            Tool::Rez => "REZ",
            Tool::ResMerger => "RESMERGER",
            Tool::Osacompile => "OSACOMPILE",
        }
    }

    fn default_flags(&self) -> &'static [&'static str] {
        match self {
            Tool::Clang | Tool::ClangXX => &[
                "-fembed-bitcode",
                "-fembed-bitcode-marker",
                "-fmodules",
                "-darwin-target-variant",
                "-MMD",
            ],
            Tool::Swiftc => &[
                "-embed-bitcode",
                "-embed-bitcode-marker",
                "-emit-objc-header",
                "-explicit-module-build",
                "-darwin-target-variant",
            ],
            Tool::Libtool => &["-static", "-D"],
            Tool::BitcodeStrip => &["-r", "-m"],
            _ => &[],
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.executable())
    }
}

/// A set of tools with a common location.
#[derive(Debug, Clone)]
pub struct Toolchain {
    pub identifier: String,
    pub bin_dir: PathBuf,
    paths: BTreeMap<Tool, PathBuf>,
    flags: BTreeMap<Tool, BTreeSet<String>>,
}

impl Toolchain {
    /// A toolchain whose tools all live in `bin_dir`.
    pub fn new(identifier: impl Into<String>, bin_dir: impl Into<PathBuf>) -> Self {
        let bin_dir = bin_dir.into();
        let paths = Tool::ALL
            .iter()
            .map(|tool| (*tool, bin_dir.join(tool.executable())))
            .collect();
        let flags = Tool::ALL
            .iter()
            .map(|tool| {
                let set = tool.default_flags().iter().map(|f| f.to_string()).collect();
                (*tool, set)
            })
            .collect();
        Toolchain {
            identifier: identifier.into(),
            bin_dir,
            paths,
            flags,
        }
    }

    /// Replace the path of one tool.
    pub fn with_tool_path(mut self, tool: Tool, path: impl Into<PathBuf>) -> Self {
        self.paths.insert(tool, path.into());
        self
    }

    /// Remove a flag from a tool's supported set.
    pub fn without_flag(mut self, tool: Tool, flag: &str) -> Self {
        if let Some(set) = self.flags.get_mut(&tool) {
            set.remove(flag);
        }
        self
    }

    pub fn tool_path(&self, tool: Tool) -> PathBuf {
        self.paths
            .get(&tool)
            .cloned()
            .unwrap_or_else(|| self.bin_dir.join(tool.executable()))
    }

    /// Whether `tool` in this toolchain accepts `flag`.
    pub fn supports_flag(&self, tool: Tool, flag: &str) -> bool {
        self.flags.get(&tool).is_some_and(|set| set.contains(flag))
    }
}

/// Read-only registry of toolchains, looked up by identifier.
#[derive(Debug, Clone)]
pub struct ToolchainRegistry {
    toolchains: Vec<Toolchain>,
}

impl ToolchainRegistry {
    /// The default toolchain rooted at a developer directory.
    pub fn with_developer_dir(developer_dir: &Path) -> Self {
        let bin_dir = developer_dir.join("usr").join("bin");
        ToolchainRegistry {
            toolchains: vec![Toolchain::new("default", bin_dir)],
        }
    }

    pub fn from_toolchains(toolchains: Vec<Toolchain>) -> Self {
        ToolchainRegistry { toolchains }
    }

    pub fn lookup(&self, identifier: &str) -> Option<&Toolchain> {
        self.toolchains.iter().find(|t| t.identifier == identifier)
    }

    /// The first registered toolchain.
    pub fn default_toolchain(&self) -> Option<&Toolchain> {
        self.toolchains.first()
    }
}

impl Default for ToolchainRegistry {
    fn default() -> Self {
        ToolchainRegistry::with_developer_dir(Path::new("/Applications/Xcode.app/Contents/Developer"))
    }
}
