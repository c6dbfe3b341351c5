//! Tool version queries and their per-pass cache.

use std::collections::{BTreeMap, HashMap};
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{LazyLock, Mutex};

use regex::Regex;
use semver::Version;

use super::{Tool, Toolchain};

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)version\s+(\d+)\.(\d+)(?:\.(\d+))?").expect("version pattern is valid")
});

/// Answers "which version of this tool is in this toolchain".
pub trait ToolProbe: Send + Sync {
    fn version(&self, tool: Tool, toolchain: &Toolchain) -> Option<Version>;
}

/// Versions supplied up front (from configuration or tests).
#[derive(Debug, Clone, Default)]
pub struct StaticProbe {
    versions: BTreeMap<Tool, Version>,
}

impl StaticProbe {
    pub fn new() -> Self {
        StaticProbe::default()
    }

    pub fn with_version(mut self, tool: Tool, version: Version) -> Self {
        self.versions.insert(tool, version);
        self
    }
}

impl ToolProbe for StaticProbe {
    fn version(&self, tool: Tool, _toolchain: &Toolchain) -> Option<Version> {
        self.versions.get(&tool).cloned()
    }
}

/// Runs `<tool> --version`, locating the tool with `which` when the
/// toolchain path does not exist.
#[derive(Debug, Clone, Default)]
pub struct ProcessProbe;

impl ToolProbe for ProcessProbe {
    fn version(&self, tool: Tool, toolchain: &Toolchain) -> Option<Version> {
        let path = toolchain.tool_path(tool);
        let program = if path.exists() {
            path
        } else {
            which::which(tool.executable()).ok()?
        };

        let output = Command::new(&program).arg("--version").output().ok()?;
        let text = String::from_utf8_lossy(&output.stdout);
        let version = parse_version_output(&text);
        tracing::debug!("probed {} at {}: {:?}", tool, program.display(), version);
        version
    }
}

/// Extract the first `version X.Y[.Z]` from tool output.
pub fn parse_version_output(text: &str) -> Option<Version> {
    let caps = VERSION_RE.captures(text)?;
    let major = caps[1].parse().ok()?;
    let minor = caps[2].parse().ok()?;
    let patch = caps.get(3).and_then(|m| m.as_str().parse().ok()).unwrap_or(0);
    Some(Version::new(major, minor, patch))
}

/// Memoizes probe answers per (tool, toolchain identifier).
pub struct ToolInfoCache {
    probe: Box<dyn ToolProbe>,
    cache: Mutex<HashMap<(Tool, String), Option<Version>>>,
    queries: AtomicUsize,
}

impl ToolInfoCache {
    pub fn new(probe: Box<dyn ToolProbe>) -> Self {
        ToolInfoCache {
            probe,
            cache: Mutex::new(HashMap::new()),
            queries: AtomicUsize::new(0),
        }
    }

    /// Version of `tool`, asking the probe at most once per toolchain.
    pub fn version(&self, tool: Tool, toolchain: &Toolchain) -> Option<Version> {
        let key = (tool, toolchain.identifier.clone());
        let mut cache = self.cache.lock().expect("tool info cache poisoned");
        if let Some(answer) = cache.get(&key) {
            return answer.clone();
        }
        self.queries.fetch_add(1, Ordering::Relaxed);
        let answer = self.probe.version(tool, toolchain);
        cache.insert(key, answer.clone());
        answer
    }

    /// Number of times the underlying probe was consulted.
    pub fn probe_count(&self) -> usize {
        self.queries.load(Ordering::Relaxed)
    }
}

impl Default for ToolInfoCache {
    fn default() -> Self {
        ToolInfoCache::new(Box::new(StaticProbe::new()))
    }
}

impl std::fmt::Debug for ToolInfoCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolInfoCache")
            .field("queries", &self.probe_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct CountingProbe(Arc<AtomicUsize>);

    impl ToolProbe for CountingProbe {
        fn version(&self, _tool: Tool, _toolchain: &Toolchain) -> Option<Version> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Some(Version::new(5, 9, 0))
        }
    }

    #[test]
    fn test_parse_version_output() {
        let swift = "swift-driver version: 1.90.11.1 Apple Swift version 5.10 (swiftlang-5.10.0.13)";
        assert_eq!(parse_version_output(swift), Some(Version::new(5, 10, 0)));

        let clang = "Apple clang version 15.0.0 (clang-1500.3.9.4)";
        assert_eq!(parse_version_output(clang), Some(Version::new(15, 0, 0)));

        assert_eq!(parse_version_output("no numbers here"), None);
    }

    #[test]
    fn test_cache_queries_once_per_toolchain() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = ToolInfoCache::new(Box::new(CountingProbe(calls.clone())));
        let a = Toolchain::new("a", "/a");
        let b = Toolchain::new("b", "/b");

        for _ in 0..3 {
            assert_eq!(cache.version(Tool::Swiftc, &a), Some(Version::new(5, 9, 0)));
        }
        cache.version(Tool::Swiftc, &b);
        cache.version(Tool::Clang, &a);

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(cache.probe_count(), 3);
    }

    #[test]
    fn test_static_probe() {
        let probe = StaticProbe::new().with_version(Tool::Clang, Version::new(16, 0, 0));
        let tc = Toolchain::new("t", "/t");
        assert_eq!(probe.version(Tool::Clang, &tc), Some(Version::new(16, 0, 0)));
        assert_eq!(probe.version(Tool::Swiftc, &tc), None);
    }
}
