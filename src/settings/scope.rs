//! Resolved settings snapshots.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::settings::macros::{self, FnLookup};
use crate::settings::{is_truthy, SettingsError};

/// Parameters a scope was resolved for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeKey {
    pub target: String,
    pub configuration: String,
    pub platform: String,
    pub arch: String,
    pub variant: String,
}

/// An immutable, fully expanded settings snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    key: ScopeKey,
    values: BTreeMap<String, String>,
}

/// Split a list-valued setting using shell word rules.
pub fn split_list(value: &str) -> Vec<String> {
    shlex::split(value).unwrap_or_else(|| value.split_whitespace().map(String::from).collect())
}

impl Scope {
    pub fn new(key: ScopeKey, values: BTreeMap<String, String>) -> Self {
        Scope { key, values }
    }

    pub fn key(&self) -> &ScopeKey {
        &self.key
    }

    /// Value of a setting, or `""` when undefined.
    pub fn get(&self, name: &str) -> &str {
        self.values.get(name).map(String::as_str).unwrap_or("")
    }

    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Boolean setting (`YES`/`NO`).
    pub fn bool(&self, name: &str) -> bool {
        is_truthy(self.get(name))
    }

    /// List-valued setting, order preserved.
    pub fn list(&self, name: &str) -> Vec<String> {
        split_list(self.get(name))
    }

    pub fn path(&self, name: &str) -> PathBuf {
        PathBuf::from(self.get(name))
    }

    /// Expand an expression against this scope, reporting problems.
    pub fn evaluate_checked(&self, expr: &str) -> (String, Vec<SettingsError>) {
        let mut errors = Vec::new();
        let mut lookup = FnLookup(|name: &str| self.values.get(name).cloned());
        let value = macros::expand(expr, 0, &mut lookup, &mut errors);
        (value, errors)
    }

    /// Expand an expression against this scope.
    pub fn evaluate(&self, expr: &str) -> String {
        self.evaluate_checked(expr).0
    }

    /// Expand an expression and split it into a list.
    pub fn evaluate_list(&self, expr: &str) -> Vec<String> {
        split_list(&self.evaluate(expr))
    }

    /// Derived scope with some values replaced (e.g. `CURRENT_ARCH`).
    ///
    /// Only the named values change; dependent values already expanded
    /// in this scope are not re-expanded.
    pub fn with_values<'a>(&self, pairs: impl IntoIterator<Item = (&'a str, String)>) -> Scope {
        let mut values = self.values.clone();
        for (name, value) in pairs {
            values.insert(name.to_string(), value);
        }
        Scope {
            key: self.key.clone(),
            values,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Settings suitable for export into a process environment.
    pub fn environment(&self) -> BTreeMap<String, String> {
        self.values
            .iter()
            .filter(|(k, _)| !k.is_empty() && k.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
