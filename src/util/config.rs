//! Configuration file support for rigging.
//!
//! Two configuration file locations are read:
//! - Global: `<config dir>/rigging/config.toml` - User-wide defaults
//! - Project: `.rigging/config.toml` next to the workspace file
//!
//! Project config takes precedence over global config, and command-line
//! flags take precedence over both.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::builder::toolchain::{ProcessProbe, StaticProbe, Tool, ToolProbe};

/// rigging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Build settings
    pub build: BuildConfig,

    /// Toolchain selection and tool versions
    pub toolchain: ToolchainConfig,

    /// Build-setting overrides applied at command-line precedence
    pub overrides: BTreeMap<String, String>,
}

/// Build-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Default configuration name (e.g. Debug)
    pub configuration: Option<String>,

    /// Default platform identifier (e.g. macosx)
    pub platform: Option<String>,

    /// Architecture override list
    pub archs: Option<Vec<String>>,

    /// Produce targets in parallel
    pub parallel: bool,

    /// Thread count for parallel production (None = rayon default)
    pub jobs: Option<usize>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        BuildConfig {
            configuration: None,
            platform: None,
            archs: None,
            parallel: true,
            jobs: None,
        }
    }
}

/// Toolchain configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    /// Toolchain identifier
    pub identifier: Option<String>,

    /// Developer directory the toolchain lives under
    pub developer_dir: Option<PathBuf>,

    /// Swift compiler version, answered without running the tool
    pub swift_version: Option<String>,

    /// Clang version, answered without running the tool
    pub clang_version: Option<String>,

    /// Run `<tool> --version` instead of using the static versions
    #[serde(default)]
    pub probe: bool,
}

impl ToolchainConfig {
    /// The tool probe this configuration asks for.
    pub fn tool_probe(&self) -> Result<Box<dyn ToolProbe>> {
        if self.probe {
            return Ok(Box::new(ProcessProbe));
        }
        let mut probe = StaticProbe::new();
        if let Some(v) = &self.swift_version {
            probe = probe.with_version(Tool::Swiftc, parse_tool_version(v)?);
        }
        if let Some(v) = &self.clang_version {
            let version = parse_tool_version(v)?;
            probe = probe
                .with_version(Tool::Clang, version.clone())
                .with_version(Tool::ClangXX, version);
        }
        Ok(Box::new(probe))
    }
}

/// Accepts `5.9` as well as `5.9.2`.
fn parse_tool_version(value: &str) -> Result<Version> {
    let padded = match value.matches('.').count() {
        0 => format!("{}.0.0", value),
        1 => format!("{}.0", value),
        _ => value.to_string(),
    };
    Version::parse(&padded).with_context(|| format!("invalid tool version `{}`", value))
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        // Build settings
        if other.build.configuration.is_some() {
            self.build.configuration = other.build.configuration;
        }
        if other.build.platform.is_some() {
            self.build.platform = other.build.platform;
        }
        if other.build.archs.is_some() {
            self.build.archs = other.build.archs;
        }
        if !other.build.parallel {
            self.build.parallel = false;
        }
        if other.build.jobs.is_some() {
            self.build.jobs = other.build.jobs;
        }

        // Toolchain settings
        if other.toolchain.identifier.is_some() {
            self.toolchain.identifier = other.toolchain.identifier;
        }
        if other.toolchain.developer_dir.is_some() {
            self.toolchain.developer_dir = other.toolchain.developer_dir;
        }
        if other.toolchain.swift_version.is_some() {
            self.toolchain.swift_version = other.toolchain.swift_version;
        }
        if other.toolchain.clang_version.is_some() {
            self.toolchain.clang_version = other.toolchain.clang_version;
        }
        if other.toolchain.probe {
            self.toolchain.probe = true;
        }

        // Overrides merge key by key
        self.overrides.extend(other.overrides);
    }
}

/// Get the global rigging config path (`<config dir>/rigging/config.toml`).
pub fn global_config_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.config_dir().join("rigging").join("config.toml"))
}

/// Get the project config path (`.rigging/config.toml`).
pub fn project_config_path(workspace_dir: &Path) -> PathBuf {
    workspace_dir.join(".rigging").join("config.toml")
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.rigging/config.toml)
/// 2. Global config
/// 3. Defaults
pub fn load_config(global_path: Option<&Path>, project_path: &Path) -> Config {
    let mut config = Config::default();

    // Load global config first
    if let Some(global_path) = global_path.filter(|p| p.exists()) {
        let global = Config::load_or_default(global_path);
        config.merge(global);
    }

    // Project config overrides global
    if project_path.exists() {
        let project = Config::load_or_default(project_path);
        config.merge(project);
    }

    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(config.build.configuration.is_none());
        assert!(config.build.parallel);
        assert!(config.overrides.is_empty());
        assert!(!config.toolchain.probe);
    }

    #[test]
    fn test_config_load() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("config.toml");

        std::fs::write(
            &config_path,
            r#"
[build]
configuration = "Release"
platform = "iphoneos"
archs = ["arm64"]
jobs = 4

[toolchain]
swift_version = "5.10"

[overrides]
ENABLE_BITCODE = "NO"
"#,
        )
        .unwrap();

        let config = Config::load(&config_path).unwrap();
        assert_eq!(config.build.configuration, Some("Release".to_string()));
        assert_eq!(config.build.platform, Some("iphoneos".to_string()));
        assert_eq!(config.build.archs, Some(vec!["arm64".to_string()]));
        assert_eq!(config.build.jobs, Some(4));
        assert!(config.build.parallel);
        assert_eq!(config.toolchain.swift_version, Some("5.10".to_string()));
        assert_eq!(config.overrides.get("ENABLE_BITCODE").map(String::as_str), Some("NO"));
    }

    #[test]
    fn test_config_merge() {
        let mut base = Config::default();
        base.build.platform = Some("macosx".to_string());
        base.build.jobs = Some(4);
        base.overrides.insert("A".into(), "1".into());
        base.overrides.insert("B".into(), "1".into());

        let mut override_cfg = Config::default();
        override_cfg.build.platform = Some("linux".to_string());
        override_cfg.build.parallel = false;
        override_cfg.overrides.insert("B".into(), "2".into());

        base.merge(override_cfg);

        assert_eq!(base.build.platform, Some("linux".to_string()));
        assert_eq!(base.build.jobs, Some(4)); // Not overridden
        assert!(!base.build.parallel);
        assert_eq!(base.overrides["A"], "1");
        assert_eq!(base.overrides["B"], "2");
    }

    #[test]
    fn test_load_config_precedence() {
        let tmp = TempDir::new().unwrap();
        let global_path = tmp.path().join("global.toml");
        let project_path = tmp.path().join("project.toml");

        std::fs::write(
            &global_path,
            r#"
[build]
configuration = "Release"
platform = "macosx"
"#,
        )
        .unwrap();
        std::fs::write(
            &project_path,
            r#"
[build]
platform = "linux"
"#,
        )
        .unwrap();

        let config = load_config(Some(&global_path), &project_path);
        assert_eq!(config.build.configuration, Some("Release".to_string()));
        assert_eq!(config.build.platform, Some("linux".to_string()));
    }

    #[test]
    fn test_invalid_config_falls_back_to_default() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[build\nplatform = ").unwrap();
        assert!(Config::load(&path).is_err());
        assert!(Config::load_or_default(&path).build.platform.is_none());
    }

    #[test]
    fn test_tool_versions() {
        assert_eq!(parse_tool_version("5.9").unwrap(), Version::new(5, 9, 0));
        assert_eq!(parse_tool_version("16").unwrap(), Version::new(16, 0, 0));
        assert_eq!(parse_tool_version("5.10.1").unwrap(), Version::new(5, 10, 1));
        assert!(parse_tool_version("five").is_err());

        let config = ToolchainConfig {
            swift_version: Some("5.8".into()),
            ..Default::default()
        };
        assert!(config.tool_probe().is_ok());
    }

    #[test]
    fn test_project_config_path() {
        assert_eq!(
            project_config_path(Path::new("/w")),
            PathBuf::from("/w/.rigging/config.toml")
        );
    }
}
