//! Static libraries vendored as artifact bundles.
//!
//! A bundle in the Frameworks phase is read once, before any phase runs,
//! because its headers and module map reach compile commands of the
//! Sources phase as well as the link step.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use super::{join_path, TargetProducer};
use crate::core::file_type::FileType;
use crate::core::phase::BuildPhase;
use crate::core::platform::{filters_admit, Platform};

const MANIFEST: &str = "info.json";

/// `info.json` at the root of a bundle.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Manifest {
    schema_version: String,
    artifacts: BTreeMap<String, Artifact>,
}

#[derive(Debug, Deserialize)]
struct Artifact {
    #[serde(rename = "type")]
    kind: String,
    variants: Vec<Variant>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Variant {
    path: String,
    #[serde(default)]
    supported_triples: Vec<String>,
    #[serde(default)]
    static_library_metadata: Option<StaticLibraryMetadata>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StaticLibraryMetadata {
    #[serde(default)]
    header_paths: Vec<String>,
    module_map_path: Option<String>,
}

fn load(bundle: &Path) -> Result<Manifest> {
    let path = bundle.join(MANIFEST);
    let contents = fs::read_to_string(&path)
        .with_context(|| format!("failed to read artifact bundle manifest: {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse artifact bundle manifest: {}", path.display()))
}

/// One static library of a bundle, with its per-triple variants.
#[derive(Debug, Clone)]
pub(crate) struct BundledLibrary {
    bundle: String,
    name: String,
    variants: Vec<BundleVariant>,
}

#[derive(Debug, Clone)]
struct BundleVariant {
    triples: Vec<String>,
    library: String,
    header_paths: Vec<String>,
    module_map: Option<String>,
}

/// What one (platform, arch) takes from a bundled library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BundleSlice {
    pub library: String,
    pub header_paths: Vec<String>,
    pub module_map: Option<String>,
}

impl BundledLibrary {
    fn from_manifest(bundle: &str, manifest: Manifest) -> Vec<BundledLibrary> {
        tracing::trace!("artifact bundle {} (schema {})", bundle, manifest.schema_version);
        manifest
            .artifacts
            .into_iter()
            .filter(|(_, artifact)| artifact.kind == "staticLibrary")
            .map(|(name, artifact)| BundledLibrary {
                bundle: bundle.to_string(),
                name,
                variants: artifact
                    .variants
                    .into_iter()
                    .map(|v| {
                        let metadata = v.static_library_metadata.unwrap_or_default();
                        BundleVariant {
                            triples: v.supported_triples,
                            library: join_path(bundle, &v.path),
                            header_paths: metadata
                                .header_paths
                                .iter()
                                .map(|h| join_path(bundle, h))
                                .collect(),
                            module_map: metadata.module_map_path.map(|m| join_path(bundle, &m)),
                        }
                    })
                    .collect(),
            })
            .collect()
    }

    /// The variant built for `platform`/`arch`, matched on the
    /// unversioned triple.
    pub fn slice(&self, platform: &Platform, arch: &str) -> Option<BundleSlice> {
        let triple = platform.module_triple(arch);
        self.variants
            .iter()
            .find(|v| v.triples.iter().any(|t| *t == triple))
            .map(|v| BundleSlice {
                library: v.library.clone(),
                header_paths: v.header_paths.clone(),
                module_map: v.module_map.clone(),
            })
    }
}

/// Load every bundle of the Frameworks phases, reporting unreadable
/// manifests and archs no variant covers.
pub(super) fn load_bundles<'a>(p: &mut TargetProducer<'_, 'a>, phases: &'a [BuildPhase]) {
    let target = p.target;
    for phase in phases {
        if !matches!(phase, BuildPhase::Frameworks { .. }) {
            continue;
        }
        for file in phase.files() {
            if !filters_admit(&file.platform_filters, target.platform) {
                continue;
            }
            let Some(resolved) = p.lookup_file(&file.item) else {
                continue;
            };
            if resolved.file_type != FileType::ArtifactBundle {
                continue;
            }
            let bundle = resolved.path;
            let libraries = match load(Path::new(&bundle)) {
                Ok(manifest) => BundledLibrary::from_manifest(&bundle, manifest),
                Err(e) => {
                    p.diagnostics.error(format!("{:#}", e));
                    continue;
                }
            };
            for library in libraries {
                for arch in &target.archs {
                    if library.slice(target.platform, arch).is_none() {
                        p.diagnostics.error(format!(
                            "artifact bundle '{}' has no variant of '{}' for '{}'",
                            super::file_name(&library.bundle),
                            library.name,
                            target.platform.module_triple(arch)
                        ));
                    }
                }
                p.bundled_libraries.push(library);
            }
        }
    }
}

/// Flags a C-family compile of `platform`/`arch` needs for the bundled
/// headers.
pub(super) fn clang_flags(p: &TargetProducer<'_, '_>, platform: &Platform, arch: &str) -> Vec<String> {
    let mut flags = Vec::new();
    for slice in p.bundled_libraries.iter().filter_map(|l| l.slice(platform, arch)) {
        if let Some(module_map) = slice.module_map {
            flags.push(format!("-fmodule-map-file={}", module_map));
        }
        flags.extend(slice.header_paths.iter().map(|h| format!("-I{}", h)));
    }
    flags
}

/// Swift passes the same flags through to its Clang importer.
pub(super) fn swift_flags(p: &TargetProducer<'_, '_>, platform: &Platform, arch: &str) -> Vec<String> {
    clang_flags(p, platform, arch)
        .into_iter()
        .flat_map(|flag| ["-Xcc".to_string(), flag])
        .collect()
}

/// Archives linked into the `platform`/`arch` binary.
pub(super) fn libraries(p: &TargetProducer<'_, '_>, platform: &Platform, arch: &str) -> Vec<String> {
    p.bundled_libraries
        .iter()
        .filter_map(|l| l.slice(platform, arch))
        .map(|s| s.library)
        .collect()
}
