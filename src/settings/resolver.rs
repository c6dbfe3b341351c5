//! Layered settings resolution.
//!
//! Precedence, lowest to highest:
//!
//! 1. built-in defaults
//! 2. SDK defaults
//! 3. platform defaults
//! 4. project build configuration
//! 5. project base configuration file
//! 6. target build configuration
//! 7. target base configuration file
//! 8. command-line overrides
//!
//! Within a level, unconditional assignments apply first and conditional
//! ones after them, least specific first. `$(inherited)` refers to the
//! definition immediately below the one being evaluated. All other
//! references are late-bound against the final table.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::builder::toolchain::Toolchain;
use crate::core::platform::Platform;
use crate::core::target::Target;
use crate::core::workspace::{BuildConfiguration, Project, Workspace};
use crate::settings::defaults::{builtin_table, DefaultsContext};
use crate::settings::macros::{self, MacroLookup, MacroRef, MAX_DEPTH};
use crate::settings::parse_version;
use crate::settings::scope::{Scope, ScopeKey};
use crate::settings::table::{ConditionContext, SettingsTable};
use crate::settings::SettingsError;

/// Architecture used for scopes that are not specific to one arch.
pub const UNDEFINED_ARCH: &str = "undefined_arch";

/// Parameters of one resolution.
#[derive(Debug, Clone, Copy)]
pub struct SettingsRequest<'a> {
    pub project: &'a Project,
    pub target: &'a Target,
    pub configuration: &'a str,
    pub platform: &'a Platform,
    pub arch: &'a str,
    pub variant: &'a str,
}

/// A scope plus the problems found while producing it.
#[derive(Debug, Clone)]
pub struct ResolvedSettings {
    pub scope: Scope,
    pub errors: Vec<SettingsError>,
}

/// Resolves scopes, memoizing by parameters.
///
/// The workspace, toolchain and overrides are fixed for the lifetime of
/// the resolver, so identical requests always yield identical scopes.
pub struct SettingsResolver<'a> {
    workspace: &'a Workspace,
    toolchain: &'a Toolchain,
    overrides: SettingsTable,
    memo: Mutex<HashMap<ScopeKey, Arc<ResolvedSettings>>>,
    hits: AtomicUsize,
}

impl<'a> SettingsResolver<'a> {
    pub fn new(workspace: &'a Workspace, toolchain: &'a Toolchain, overrides: SettingsTable) -> Self {
        SettingsResolver {
            workspace,
            toolchain,
            overrides,
            memo: Mutex::new(HashMap::new()),
            hits: AtomicUsize::new(0),
        }
    }

    /// The configuration actually used for a request: the requested name
    /// when the target or project defines it, else the project default.
    pub fn effective_configuration(project: &Project, target: &Target, requested: &str) -> String {
        if target.configuration(requested).is_some() || project.configuration(requested).is_some() {
            requested.to_string()
        } else {
            tracing::debug!(
                "configuration `{}` not defined for `{}`; using `{}`",
                requested,
                target.name(),
                project.default_configuration
            );
            project.default_configuration.clone()
        }
    }

    /// Resolve a scope.
    pub fn resolve(&self, request: &SettingsRequest<'_>) -> Arc<ResolvedSettings> {
        let configuration =
            Self::effective_configuration(request.project, request.target, request.configuration);
        let key = ScopeKey {
            target: request.target.guid().to_string(),
            configuration,
            platform: request.platform.name.clone(),
            arch: request.arch.to_string(),
            variant: request.variant.to_string(),
        };

        if let Some(hit) = self.memo.lock().expect("settings memo poisoned").get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::trace!("settings memo hit: {} {} {}", request.target.name(), key.arch, key.variant);
            return hit.clone();
        }

        let resolved = Arc::new(self.compute(request, key.clone()));
        let mut memo = self.memo.lock().expect("settings memo poisoned");
        memo.entry(key).or_insert(resolved).clone()
    }

    /// Number of requests answered from the memo.
    pub fn memo_hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    fn compute(&self, request: &SettingsRequest<'_>, key: ScopeKey) -> ResolvedSettings {
        let project = request.project;
        let target = request.target;
        let platform = request.platform;
        let mut errors = Vec::new();

        let defaults = builtin_table(&DefaultsContext {
            project_name: &project.name,
            project_dir: &project.path,
            target_name: target.name(),
            product_type: target.product_type(),
            platform,
            configuration: &key.configuration,
            arch: request.arch,
            variant: request.variant,
            toolchain: self.toolchain,
        });

        let mut sdk = SettingsTable::new();
        for (k, v) in &platform.sdk_defaults {
            sdk.set(k.as_str(), v.as_str());
        }
        let mut platform_table = SettingsTable::new();
        for (k, v) in &platform.platform_defaults {
            platform_table.set(k.as_str(), v.as_str());
        }

        let mut levels = vec![defaults, sdk, platform_table];
        let project_config = project.configuration(&key.configuration);
        let target_config = target.configuration(&key.configuration);
        for config in [project_config, target_config] {
            let (table, base) = self.configuration_tables(project, config, &mut errors);
            levels.push(table);
            levels.push(base);
        }
        levels.push(self.overrides.clone());

        let ctx = ConditionContext {
            arch: request.arch,
            sdk: &platform.sdk_canonical_name,
            config: &key.configuration,
            variant: request.variant,
        };
        let mut stacks: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for level in &levels {
            for assignment in level.applicable(&ctx) {
                stacks
                    .entry(assignment.name.clone())
                    .or_default()
                    .push(assignment.value.clone());
            }
        }

        let mut lookup = LayeredLookup::new(&stacks);
        let mut values = BTreeMap::new();
        for name in stacks.keys() {
            let value = lookup.eval(name, None, 0, &mut errors);
            values.insert(name.clone(), value);
        }

        if let Some(setting) = &platform.deployment_target_setting {
            if let Some(value) = values.get(setting) {
                if !value.is_empty() && parse_version(value).is_none() {
                    errors.push(SettingsError::InvalidVersion {
                        name: setting.clone(),
                        value: value.clone(),
                    });
                }
            }
        }

        dedup(&mut errors);
        tracing::debug!(
            "resolved {} settings for `{}` ({}, {}, {}, {})",
            values.len(),
            target.name(),
            key.configuration,
            key.platform,
            key.arch,
            key.variant
        );
        ResolvedSettings {
            scope: Scope::new(key, values),
            errors,
        }
    }

    /// The (configuration, base file) tables of one configuration.
    fn configuration_tables(
        &self,
        project: &Project,
        config: Option<&BuildConfiguration>,
        errors: &mut Vec<SettingsError>,
    ) -> (SettingsTable, SettingsTable) {
        let Some(config) = config else {
            return (SettingsTable::new(), SettingsTable::new());
        };

        let (table, parse_errors) = SettingsTable::from_map(&config.build_settings);
        errors.extend(parse_errors);

        let base = match &config.base_configuration {
            None => SettingsTable::new(),
            Some(relative) => {
                let path = project.path.join(relative);
                match self.workspace.config_files.get(&path) {
                    Some(table) => table.clone(),
                    None => {
                        errors.push(SettingsError::MissingBaseConfiguration { path });
                        SettingsTable::new()
                    }
                }
            }
        };
        (table, base)
    }
}

fn dedup(errors: &mut Vec<SettingsError>) {
    let mut seen: Vec<SettingsError> = Vec::with_capacity(errors.len());
    errors.retain(|e| {
        if seen.contains(e) {
            false
        } else {
            seen.push(e.clone());
            true
        }
    });
}

/// Evaluates settings over per-name definition stacks.
struct LayeredLookup<'s> {
    stacks: &'s BTreeMap<String, Vec<String>>,
    memo: HashMap<String, String>,
    frames: Vec<(String, usize)>,
}

impl<'s> LayeredLookup<'s> {
    fn new(stacks: &'s BTreeMap<String, Vec<String>>) -> Self {
        LayeredLookup {
            stacks,
            memo: HashMap::new(),
            frames: Vec::new(),
        }
    }

    /// Value of `name` using its definition at `index` (top when `None`).
    fn eval(
        &mut self,
        name: &str,
        index: Option<usize>,
        depth: usize,
        errors: &mut Vec<SettingsError>,
    ) -> String {
        if depth > MAX_DEPTH {
            errors.push(SettingsError::RecursiveReference {
                name: name.to_string(),
            });
            return String::new();
        }
        let Some(stack) = self.stacks.get(name) else {
            return String::new();
        };
        let top = stack.len() - 1;
        let index = index.unwrap_or(top);
        if index == top {
            if let Some(value) = self.memo.get(name) {
                return value.clone();
            }
        }

        let raw = &stack[index];
        self.frames.push((name.to_string(), index));
        let value = macros::expand(raw, depth + 1, self, errors);
        self.frames.pop();

        if index == top {
            self.memo.insert(name.to_string(), value.clone());
        }
        value
    }
}

impl MacroLookup for LayeredLookup<'_> {
    fn lookup(
        &mut self,
        reference: MacroRef<'_>,
        depth: usize,
        errors: &mut Vec<SettingsError>,
    ) -> String {
        match reference {
            MacroRef::Inherited => match self.frames.last().cloned() {
                Some((name, index)) if index > 0 => self.eval(&name, Some(index - 1), depth, errors),
                _ => String::new(),
            },
            MacroRef::Named(name) => self.eval(name, None, depth, errors),
        }
    }
}
