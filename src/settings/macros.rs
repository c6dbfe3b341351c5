//! Macro expansion for build setting values.
//!
//! Supported forms: `$(NAME)`, `${NAME}`, `$(inherited)`, nested names
//! (`$(FOO_$(ARCH))`) and a few operators (`$(NAME:lower)`). Undefined
//! names expand to the empty string. Lookup is delegated to a
//! [`MacroLookup`] so the same expander serves layered resolution and
//! evaluation against a finished scope.

use crate::settings::SettingsError;

/// Maximum nesting of references before expansion gives up.
pub const MAX_DEPTH: usize = 32;

/// A reference found inside an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacroRef<'a> {
    /// `$(inherited)`: the next-lower definition of the setting being
    /// evaluated.
    Inherited,
    Named(&'a str),
}

/// Source of values for references.
pub trait MacroLookup {
    fn lookup(
        &mut self,
        reference: MacroRef<'_>,
        depth: usize,
        errors: &mut Vec<SettingsError>,
    ) -> String;
}

/// Expand every reference in `expr`.
pub fn expand(
    expr: &str,
    depth: usize,
    lookup: &mut dyn MacroLookup,
    errors: &mut Vec<SettingsError>,
) -> String {
    if !expr.contains('$') {
        return expr.to_string();
    }

    let mut out = String::with_capacity(expr.len());
    let mut rest = expr;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let close = match after.chars().next() {
            Some('(') => ')',
            Some('{') => '}',
            _ => {
                out.push('$');
                rest = after;
                continue;
            }
        };

        let Some(end) = matching_close(after, close) else {
            errors.push(SettingsError::MalformedMacro {
                expression: expr.to_string(),
            });
            out.push_str(&rest[pos..]);
            return out;
        };

        let inner = &after[1..end];
        let inner = expand(inner, depth, lookup, errors);
        out.push_str(&resolve_reference(&inner, depth, lookup, errors));
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

/// Index (into `s`) of the delimiter closing the one at `s[0]`.
fn matching_close(s: &str, close: char) -> Option<usize> {
    let open = s.chars().next()?;
    let mut level = 0usize;
    for (i, c) in s.char_indices() {
        if c == open {
            level += 1;
        } else if c == close {
            level -= 1;
            if level == 0 {
                return Some(i);
            }
        }
    }
    None
}

fn resolve_reference(
    body: &str,
    depth: usize,
    lookup: &mut dyn MacroLookup,
    errors: &mut Vec<SettingsError>,
) -> String {
    let mut parts = body.split(':');
    let name = parts.next().unwrap_or_default().trim();

    let mut value = if name == "inherited" {
        lookup.lookup(MacroRef::Inherited, depth, errors)
    } else {
        lookup.lookup(MacroRef::Named(name), depth, errors)
    };

    for op in parts {
        value = match apply_operator(op, &value) {
            Some(v) => v,
            None => {
                errors.push(SettingsError::UnknownOperator {
                    name: name.to_string(),
                    operator: op.to_string(),
                });
                value
            }
        };
    }
    value
}

fn apply_operator(op: &str, value: &str) -> Option<String> {
    let path = std::path::Path::new(value);
    let v = match op {
        "lower" => value.to_lowercase(),
        "upper" => value.to_uppercase(),
        "identifier" | "c99extidentifier" | "rfc1034identifier" => c99_identifier(value),
        "base" => path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
        "file" => path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
        "dir" => path
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default(),
        "suffix" => path
            .extension()
            .map(|s| format!(".{}", s.to_string_lossy()))
            .unwrap_or_default(),
        "quote" => shlex::try_quote(value).ok()?.into_owned(),
        _ => return None,
    };
    Some(v)
}

/// Turn arbitrary text into a valid C identifier.
pub fn c99_identifier(value: &str) -> String {
    let mut out: String = value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if out.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Lookup over a plain key/value function, with no `$(inherited)`.
pub struct FnLookup<F>(pub F);

impl<F> MacroLookup for FnLookup<F>
where
    F: FnMut(&str) -> Option<String>,
{
    fn lookup(
        &mut self,
        reference: MacroRef<'_>,
        _depth: usize,
        _errors: &mut Vec<SettingsError>,
    ) -> String {
        match reference {
            MacroRef::Inherited => String::new(),
            MacroRef::Named(name) => (self.0)(name).unwrap_or_default(),
        }
    }
}
