//! Build settings.
//!
//! Settings are resolved by layering tables of assignments (built-in
//! defaults, SDK, platform, project, base configuration files, target,
//! overrides) and expanding macro references, producing an immutable
//! [`Scope`] per (target, configuration, platform, arch, variant).

pub mod defaults;
pub mod macros;
pub mod resolver;
pub mod scope;
pub mod table;
pub mod xcconfig;

use std::path::PathBuf;

use semver::Version;
use thiserror::Error;

pub use resolver::{ResolvedSettings, SettingsRequest, SettingsResolver};
pub use scope::Scope;
pub use table::SettingsTable;

/// Problems found while resolving settings.
///
/// These never abort construction; they are reported as diagnostics
/// against the target being resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("unterminated macro reference in '{expression}'")]
    MalformedMacro { expression: String },

    #[error("recursive reference to build setting '{name}'")]
    RecursiveReference { name: String },

    #[error("unknown operator ':{operator}' applied to '{name}'")]
    UnknownOperator { name: String, operator: String },

    #[error("invalid condition in build setting key '{key}'")]
    InvalidCondition { key: String },

    #[error("unable to find base configuration file '{}'", path.display())]
    MissingBaseConfiguration { path: PathBuf },

    #[error("unable to parse {name} value '{value}' as a version")]
    InvalidVersion { name: String, value: String },
}

/// Parse a dotted version (`13`, `13.1`, `13.1.2`) as a semantic version.
pub fn parse_version(value: &str) -> Option<Version> {
    let mut parts = value.trim().split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = match parts.next() {
        Some(p) => p.parse().ok()?,
        None => 0,
    };
    let patch = match parts.next() {
        Some(p) => p.parse().ok()?,
        None => 0,
    };
    if parts.next().is_some() {
        return None;
    }
    Some(Version::new(major, minor, patch))
}

/// Interpret a setting value as a boolean.
pub fn is_truthy(value: &str) -> bool {
    matches!(value.trim(), "YES" | "yes" | "Yes" | "true" | "TRUE" | "1")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("13"), Some(Version::new(13, 0, 0)));
        assert_eq!(parse_version("13.1"), Some(Version::new(13, 1, 0)));
        assert_eq!(parse_version(" 16.0.2 "), Some(Version::new(16, 0, 2)));
        assert_eq!(parse_version("thirteen"), None);
        assert_eq!(parse_version("1.2.3.4"), None);
        assert_eq!(parse_version(""), None);
    }

    #[test]
    fn test_truthy() {
        assert!(is_truthy("YES"));
        assert!(!is_truthy("NO"));
        assert!(!is_truthy(""));
    }
}
