//! Platform and SDK registry.
//!
//! The registry is a read-only, declarative table. Everything the task
//! construction pass needs to know about a platform (valid architectures,
//! deployment target setting, triple components, bundle layout, zippered
//! secondary platform) lives here, so producers never special-case
//! platform names.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A platform condition attached to a dependency or build file.
///
/// Model entities store these in unordered sets; anything that serializes
/// them must go through [`canonical_filters`] first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlatformFilter {
    /// Platform family (`macos`, `ios`, `tvos`, `watchos`, `xros`, `linux`, ...)
    pub platform: String,
    /// Optional environment (`simulator`, `macabi`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
}

impl PlatformFilter {
    /// Create a filter for a platform family without an environment.
    pub fn new(platform: impl Into<String>) -> Self {
        PlatformFilter {
            platform: platform.into(),
            environment: None,
        }
    }

    /// Create a filter with an environment qualifier.
    pub fn with_environment(platform: impl Into<String>, environment: impl Into<String>) -> Self {
        PlatformFilter {
            platform: platform.into(),
            environment: Some(environment.into()),
        }
    }

    /// Check whether this filter selects the given platform.
    pub fn matches(&self, platform: &Platform) -> bool {
        self.platform == platform.filter_name
            && self.environment.as_deref() == platform.environment.as_deref()
    }
}

impl fmt::Display for PlatformFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.environment {
            Some(env) => write!(f, "{}-{}", self.platform, env),
            None => write!(f, "{}", self.platform),
        }
    }
}

/// Sort an unordered filter collection into its canonical order.
pub fn canonical_filters<'a>(
    filters: impl IntoIterator<Item = &'a PlatformFilter>,
) -> Vec<PlatformFilter> {
    let mut out: Vec<PlatformFilter> = filters.into_iter().cloned().collect();
    out.sort();
    out.dedup();
    out
}

/// Serde helper writing a filter set in canonical order.
pub(crate) fn serialize_filter_set<S>(
    filters: &HashSet<PlatformFilter>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    canonical_filters(filters).serialize(serializer)
}

/// Check whether an unordered filter set admits `platform`.
///
/// An empty set admits every platform.
pub fn filters_admit<'a>(
    filters: impl IntoIterator<Item = &'a PlatformFilter>,
    platform: &Platform,
) -> bool {
    let mut any = false;
    for filter in filters {
        if filter.matches(platform) {
            return true;
        }
        any = true;
    }
    !any
}

/// A platform description.
#[derive(Debug, Clone, Serialize)]
pub struct Platform {
    /// Identifier used on the command line and in `PLATFORM_NAME`
    pub name: String,
    /// Family name used by platform filters
    pub filter_name: String,
    /// Canonical SDK name (matched by `[sdk=...]` conditions)
    pub sdk_canonical_name: String,
    /// Suffix appended to per-configuration directories
    pub effective_platform_name: String,
    /// Architectures this platform can build
    pub valid_archs: Vec<String>,
    /// Default `ARCHS`
    pub standard_archs: Vec<String>,
    /// Name of the deployment target setting, if the platform has one
    pub deployment_target_setting: Option<String>,
    /// Default deployment target
    pub default_deployment_target: Option<String>,
    /// LLVM triple vendor
    pub triple_vendor: String,
    /// LLVM triple OS
    pub triple_os: String,
    /// LLVM triple environment
    pub environment: Option<String>,
    /// Bundles are flat (no `Contents/` or `Versions/`)
    pub shallow_bundles: bool,
    /// Products must be code signed
    pub requires_signing: bool,
    /// Bitcode embedding is meaningful
    pub supports_bitcode: bool,
    /// Extension of dynamic libraries
    pub dylib_extension: String,
    /// Zippered secondary platform, if any
    pub zippered_secondary: Option<String>,
    /// Only reachable as a zippered secondary platform
    pub secondary_only: bool,
    /// Settings contributed by the SDK
    pub sdk_defaults: Vec<(String, String)>,
    /// Settings contributed by the platform
    pub platform_defaults: Vec<(String, String)>,
}

impl Platform {
    /// LLVM target triple for an architecture and deployment target.
    pub fn target_triple(&self, arch: &str, deployment_target: Option<&str>) -> String {
        let mut triple = format!("{}-{}-{}", arch, self.triple_vendor, self.triple_os);
        if let Some(version) = deployment_target {
            triple.push_str(version);
        }
        if let Some(env) = &self.environment {
            triple.push('-');
            triple.push_str(env);
        }
        triple
    }

    /// Triple without a version, used to name per-arch module files.
    pub fn module_triple(&self, arch: &str) -> String {
        self.target_triple(arch, None)
    }

    /// Whether `arch` is valid for this platform.
    pub fn is_valid_arch(&self, arch: &str) -> bool {
        self.valid_archs.iter().any(|a| a == arch)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Read-only registry of known platforms.
#[derive(Debug, Clone)]
pub struct PlatformRegistry {
    platforms: Vec<Platform>,
}

struct PlatformRow {
    name: &'static str,
    filter_name: &'static str,
    sdk: &'static str,
    effective: &'static str,
    valid: &'static [&'static str],
    standard: &'static [&'static str],
    deployment: Option<(&'static str, &'static str)>,
    vendor: &'static str,
    os: &'static str,
    environment: Option<&'static str>,
    shallow: bool,
    signing: bool,
    bitcode: bool,
    dylib: &'static str,
    zippered: Option<&'static str>,
    secondary_only: bool,
}

const BUILTIN_PLATFORMS: &[PlatformRow] = &[
    PlatformRow {
        name: "macosx",
        filter_name: "macos",
        sdk: "macosx14.0",
        effective: "",
        valid: &["arm64", "arm64e", "x86_64"],
        standard: &["arm64", "x86_64"],
        deployment: Some(("MACOSX_DEPLOYMENT_TARGET", "13.0")),
        vendor: "apple",
        os: "macos",
        environment: None,
        shallow: false,
        signing: true,
        bitcode: false,
        dylib: "dylib",
        zippered: Some("maccatalyst"),
        secondary_only: false,
    },
    PlatformRow {
        name: "maccatalyst",
        filter_name: "maccatalyst",
        sdk: "macosx14.0",
        effective: "-maccatalyst",
        valid: &["arm64", "arm64e", "x86_64"],
        standard: &["arm64", "x86_64"],
        deployment: Some(("IPHONEOS_DEPLOYMENT_TARGET", "16.0")),
        vendor: "apple",
        os: "ios",
        environment: Some("macabi"),
        shallow: false,
        signing: true,
        bitcode: false,
        dylib: "dylib",
        zippered: None,
        secondary_only: true,
    },
    PlatformRow {
        name: "iphoneos",
        filter_name: "ios",
        sdk: "iphoneos17.0",
        effective: "-iphoneos",
        valid: &["arm64", "arm64e"],
        standard: &["arm64"],
        deployment: Some(("IPHONEOS_DEPLOYMENT_TARGET", "16.0")),
        vendor: "apple",
        os: "ios",
        environment: None,
        shallow: true,
        signing: true,
        bitcode: true,
        dylib: "dylib",
        zippered: None,
        secondary_only: false,
    },
    PlatformRow {
        name: "iphonesimulator",
        filter_name: "ios",
        sdk: "iphonesimulator17.0",
        effective: "-iphonesimulator",
        valid: &["arm64", "x86_64"],
        standard: &["arm64", "x86_64"],
        deployment: Some(("IPHONEOS_DEPLOYMENT_TARGET", "16.0")),
        vendor: "apple",
        os: "ios",
        environment: Some("simulator"),
        shallow: true,
        signing: true,
        bitcode: false,
        dylib: "dylib",
        zippered: None,
        secondary_only: false,
    },
    PlatformRow {
        name: "appletvos",
        filter_name: "tvos",
        sdk: "appletvos17.0",
        effective: "-appletvos",
        valid: &["arm64", "arm64e"],
        standard: &["arm64"],
        deployment: Some(("TVOS_DEPLOYMENT_TARGET", "16.0")),
        vendor: "apple",
        os: "tvos",
        environment: None,
        shallow: true,
        signing: true,
        bitcode: true,
        dylib: "dylib",
        zippered: None,
        secondary_only: false,
    },
    PlatformRow {
        name: "watchos",
        filter_name: "watchos",
        sdk: "watchos10.0",
        effective: "-watchos",
        valid: &["arm64", "arm64_32", "armv7k"],
        standard: &["arm64_32", "armv7k"],
        deployment: Some(("WATCHOS_DEPLOYMENT_TARGET", "9.0")),
        vendor: "apple",
        os: "watchos",
        environment: None,
        shallow: true,
        signing: true,
        bitcode: true,
        dylib: "dylib",
        zippered: None,
        secondary_only: false,
    },
    PlatformRow {
        name: "xros",
        filter_name: "visionos",
        sdk: "xros1.0",
        effective: "-xros",
        valid: &["arm64"],
        standard: &["arm64"],
        deployment: Some(("XROS_DEPLOYMENT_TARGET", "1.0")),
        vendor: "apple",
        os: "xros",
        environment: None,
        shallow: true,
        signing: true,
        bitcode: false,
        dylib: "dylib",
        zippered: None,
        secondary_only: false,
    },
    PlatformRow {
        name: "linux",
        filter_name: "linux",
        sdk: "linux",
        effective: "",
        valid: &["x86_64", "aarch64"],
        standard: &["x86_64"],
        deployment: None,
        vendor: "unknown",
        os: "linux",
        environment: Some("gnu"),
        shallow: true,
        signing: false,
        bitcode: false,
        dylib: "so",
        zippered: None,
        secondary_only: false,
    },
];

impl PlatformRow {
    fn to_platform(&self) -> Platform {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        let sdk_version = self
            .sdk
            .trim_start_matches(|c: char| c.is_ascii_alphabetic())
            .to_string();

        let mut sdk_defaults = vec![("SDK_NAME".to_string(), self.sdk.to_string())];
        if !sdk_version.is_empty() {
            sdk_defaults.push(("SDK_VERSION".to_string(), sdk_version));
        }

        let strip = if self.bitcode { "YES" } else { "NO" };
        let mut platform_defaults = vec![
            (
                "STRIP_BITCODE_FROM_COPIED_FILES".to_string(),
                strip.to_string(),
            ),
            (
                "CODE_SIGNING_REQUIRED".to_string(),
                if self.signing { "YES" } else { "NO" }.to_string(),
            ),
        ];
        if let Some((name, value)) = self.deployment {
            platform_defaults.push((name.to_string(), value.to_string()));
        }

        Platform {
            name: self.name.to_string(),
            filter_name: self.filter_name.to_string(),
            sdk_canonical_name: self.sdk.to_string(),
            effective_platform_name: self.effective.to_string(),
            valid_archs: strings(self.valid),
            standard_archs: strings(self.standard),
            deployment_target_setting: self.deployment.map(|(n, _)| n.to_string()),
            default_deployment_target: self.deployment.map(|(_, v)| v.to_string()),
            triple_vendor: self.vendor.to_string(),
            triple_os: self.os.to_string(),
            environment: self.environment.map(|s| s.to_string()),
            shallow_bundles: self.shallow,
            requires_signing: self.signing,
            supports_bitcode: self.bitcode,
            dylib_extension: self.dylib.to_string(),
            zippered_secondary: self.zippered.map(|s| s.to_string()),
            secondary_only: self.secondary_only,
            sdk_defaults,
            platform_defaults,
        }
    }
}

impl PlatformRegistry {
    /// The built-in platform table.
    pub fn builtin() -> Self {
        PlatformRegistry {
            platforms: BUILTIN_PLATFORMS.iter().map(|row| row.to_platform()).collect(),
        }
    }

    /// Create a registry from an explicit list.
    pub fn from_platforms(platforms: Vec<Platform>) -> Self {
        PlatformRegistry { platforms }
    }

    /// Look a platform up by name.
    pub fn lookup(&self, name: &str) -> Option<&Platform> {
        self.platforms.iter().find(|p| p.name == name)
    }

    /// The zippered secondary platform of `platform`, if it has one.
    pub fn zippered_secondary(&self, platform: &Platform) -> Option<&Platform> {
        platform
            .zippered_secondary
            .as_deref()
            .and_then(|name| self.lookup(name))
    }

    /// All platforms that can be requested directly.
    pub fn requestable(&self) -> impl Iterator<Item = &Platform> {
        self.platforms.iter().filter(|p| !p.secondary_only)
    }
}

impl Default for PlatformRegistry {
    fn default() -> Self {
        PlatformRegistry::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_target_triple() {
        let registry = PlatformRegistry::builtin();
        let macos = registry.lookup("macosx").unwrap();
        let sim = registry.lookup("iphonesimulator").unwrap();
        let linux = registry.lookup("linux").unwrap();

        assert_eq!(macos.target_triple("arm64", Some("13.0")), "arm64-apple-macos13.0");
        assert_eq!(
            sim.target_triple("x86_64", Some("16.0")),
            "x86_64-apple-ios16.0-simulator"
        );
        assert_eq!(macos.module_triple("x86_64"), "x86_64-apple-macos");
        assert_eq!(linux.target_triple("x86_64", None), "x86_64-unknown-linux-gnu");
    }

    #[test]
    fn test_zippered_secondary() {
        let registry = PlatformRegistry::builtin();
        let macos = registry.lookup("macosx").unwrap();
        let catalyst = registry.zippered_secondary(macos).unwrap();
        assert_eq!(catalyst.name, "maccatalyst");
        assert_eq!(catalyst.environment.as_deref(), Some("macabi"));
        assert!(registry.requestable().all(|p| p.name != "maccatalyst"));
    }

    #[test]
    fn test_canonical_filters_are_sorted() {
        let set: HashSet<PlatformFilter> = ["watchos", "ios", "tvos", "macos", "visionos"]
            .into_iter()
            .map(PlatformFilter::new)
            .collect();

        let canonical = canonical_filters(&set);
        let names: Vec<_> = canonical.iter().map(|f| f.platform.as_str()).collect();
        assert_eq!(names, vec!["ios", "macos", "tvos", "visionos", "watchos"]);
    }

    #[test]
    fn test_filters_admit() {
        let registry = PlatformRegistry::builtin();
        let ios = registry.lookup("iphoneos").unwrap();
        let sim = registry.lookup("iphonesimulator").unwrap();

        let none: Vec<PlatformFilter> = Vec::new();
        assert!(filters_admit(&none, ios));

        let device_only = vec![PlatformFilter::new("ios")];
        assert!(filters_admit(&device_only, ios));
        assert!(!filters_admit(&device_only, sim));

        let sim_only = vec![PlatformFilter::with_environment("ios", "simulator")];
        assert!(filters_admit(&sim_only, sim));
    }
}
