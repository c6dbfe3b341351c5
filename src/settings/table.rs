//! Ordered tables of (possibly conditional) setting assignments.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::settings::SettingsError;

static KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*((?:\[[^\]]*\])*)\s*$")
        .expect("setting key pattern is valid")
});

static CONDITION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\s*([A-Za-z_]+)\s*=\s*([^\]]*?)\s*\]").expect("condition pattern is valid")
});

/// Parameter a condition tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConditionKind {
    Arch,
    Sdk,
    Config,
    Variant,
}

impl ConditionKind {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "arch" => Some(ConditionKind::Arch),
            "sdk" => Some(ConditionKind::Sdk),
            "config" => Some(ConditionKind::Config),
            "variant" => Some(ConditionKind::Variant),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            ConditionKind::Arch => "arch",
            ConditionKind::Sdk => "sdk",
            ConditionKind::Config => "config",
            ConditionKind::Variant => "variant",
        }
    }
}

/// Values conditions are evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct ConditionContext<'a> {
    pub arch: &'a str,
    pub sdk: &'a str,
    pub config: &'a str,
    pub variant: &'a str,
}

/// A `[kind=pattern]` qualifier. Patterns may use `*` wildcards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub kind: ConditionKind,
    pub pattern: String,
}

impl Condition {
    pub fn matches(&self, ctx: &ConditionContext<'_>) -> bool {
        let value = match self.kind {
            ConditionKind::Arch => ctx.arch,
            ConditionKind::Sdk => ctx.sdk,
            ConditionKind::Config => ctx.config,
            ConditionKind::Variant => ctx.variant,
        };
        if self.pattern == "*" {
            return true;
        }
        match glob::Pattern::new(&self.pattern) {
            Ok(pattern) => pattern.matches(value),
            Err(_) => self.pattern == value,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}={}]", self.kind.as_str(), self.pattern)
    }
}

/// One `NAME[cond...] = value` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub name: String,
    pub conditions: Vec<Condition>,
    pub value: String,
}

impl Assignment {
    pub fn is_conditional(&self) -> bool {
        !self.conditions.is_empty()
    }

    pub fn applies(&self, ctx: &ConditionContext<'_>) -> bool {
        self.conditions.iter().all(|c| c.matches(ctx))
    }
}

/// Split `NAME[arch=x][sdk=y]` into its name and conditions.
pub fn parse_key(key: &str) -> Result<(String, Vec<Condition>), SettingsError> {
    let invalid = || SettingsError::InvalidCondition {
        key: key.to_string(),
    };

    let caps = KEY_RE.captures(key).ok_or_else(invalid)?;
    let name = caps[1].to_string();
    let mut conditions = Vec::new();
    if let Some(rest) = caps.get(2) {
        for cond in CONDITION_RE.captures_iter(rest.as_str()) {
            let kind = ConditionKind::parse(&cond[1]).ok_or_else(invalid)?;
            conditions.push(Condition {
                kind,
                pattern: cond[2].to_string(),
            });
        }
        let bracket_count = rest.as_str().matches('[').count();
        if bracket_count != conditions.len() {
            return Err(invalid());
        }
    }
    Ok((name, conditions))
}

/// An ordered list of assignments at one precedence level.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsTable {
    assignments: Vec<Assignment>,
}

impl SettingsTable {
    pub fn new() -> Self {
        SettingsTable::default()
    }

    /// Parse a raw key/value map. Keys with broken conditions are
    /// returned as errors and left out of the table.
    pub fn from_map(map: &BTreeMap<String, String>) -> (SettingsTable, Vec<SettingsError>) {
        let mut table = SettingsTable::new();
        let mut errors = Vec::new();
        for (key, value) in map {
            if let Err(e) = table.insert(key, value) {
                errors.push(e);
            }
        }
        (table, errors)
    }

    /// Append an assignment from a raw key.
    pub fn insert(&mut self, key: &str, value: impl Into<String>) -> Result<(), SettingsError> {
        let (name, conditions) = parse_key(key)?;
        self.assignments.push(Assignment {
            name,
            conditions,
            value: value.into(),
        });
        Ok(())
    }

    /// Append an unconditional assignment.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.assignments.push(Assignment {
            name: name.into(),
            conditions: Vec::new(),
            value: value.into(),
        });
    }

    /// Append all assignments of `other` after ours.
    pub fn extend(&mut self, other: &SettingsTable) {
        self.assignments.extend(other.assignments.iter().cloned());
    }

    pub fn iter(&self) -> impl Iterator<Item = &Assignment> {
        self.assignments.iter()
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// Assignments that apply in `ctx`, in application order.
    ///
    /// Unconditional assignments come first in declaration order, then the
    /// matching conditional ones from least to most specific, so the most
    /// specific qualifier wins.
    pub fn applicable(&self, ctx: &ConditionContext<'_>) -> Vec<&Assignment> {
        let mut out: Vec<&Assignment> = self
            .assignments
            .iter()
            .filter(|a| !a.is_conditional())
            .collect();
        let mut conditional: Vec<&Assignment> = self
            .assignments
            .iter()
            .filter(|a| a.is_conditional() && a.applies(ctx))
            .collect();
        // stable: equal specificity keeps declaration order
        conditional.sort_by_key(|a| a.conditions.len());
        out.extend(conditional);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>(arch: &'a str) -> ConditionContext<'a> {
        ConditionContext {
            arch,
            sdk: "macosx14.0",
            config: "Debug",
            variant: "normal",
        }
    }

    #[test]
    fn test_parse_key_with_conditions() {
        let (name, conds) = parse_key("OTHER_CFLAGS[arch=x86_64][sdk=macosx*]").unwrap();
        assert_eq!(name, "OTHER_CFLAGS");
        assert_eq!(conds.len(), 2);
        assert_eq!(conds[0].kind, ConditionKind::Arch);
        assert_eq!(conds[1].pattern, "macosx*");
    }

    #[test]
    fn test_parse_key_rejects_unknown_condition() {
        assert!(parse_key("FOO[color=red]").is_err());
        assert!(parse_key("FOO[arch=x").is_err());
        assert!(parse_key("1FOO").is_err());
    }

    #[test]
    fn test_condition_wildcards() {
        let (_, conds) = parse_key("X[sdk=macosx*]").unwrap();
        assert!(conds[0].matches(&ctx("arm64")));
        let (_, conds) = parse_key("X[sdk=iphone*]").unwrap();
        assert!(!conds[0].matches(&ctx("arm64")));
    }

    #[test]
    fn test_applicable_orders_by_specificity() {
        let mut table = SettingsTable::new();
        table.insert("A[arch=arm64][config=Debug]", "most").unwrap();
        table.insert("A[arch=arm64]", "some").unwrap();
        table.insert("A", "plain").unwrap();
        table.insert("A[arch=x86_64]", "other").unwrap();

        let values: Vec<_> = table
            .applicable(&ctx("arm64"))
            .into_iter()
            .map(|a| a.value.as_str())
            .collect();
        assert_eq!(values, vec!["plain", "some", "most"]);
    }
}
