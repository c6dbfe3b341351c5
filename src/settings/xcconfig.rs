//! Base configuration (`.xcconfig`) files.
//!
//! Format, one entry per line:
//!
//! ```text
//! // comment
//! #include "Shared.xcconfig"
//! #include? "Optional.xcconfig"
//! OTHER_CFLAGS = $(inherited) -DFOO
//! OTHER_CFLAGS[arch=arm64] = $(inherited) -DARM
//! ```
//!
//! Included files are spliced in place, so later lines override them.

use std::path::{Path, PathBuf};

use crate::core::workspace::ModelError;
use crate::settings::table::SettingsTable;

const MAX_INCLUDE_DEPTH: usize = 16;

/// A parsed line.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Include { path: String, optional: bool },
    Assign { key: String, value: String },
}

/// Read and parse a configuration file and everything it includes.
pub fn load_file(path: &Path) -> Result<SettingsTable, ModelError> {
    let mut table = SettingsTable::new();
    load_into(path, 0, &mut table)?;
    Ok(table)
}

fn load_into(path: &Path, depth: usize, table: &mut SettingsTable) -> Result<(), ModelError> {
    if depth > MAX_INCLUDE_DEPTH {
        return Err(ModelError::IncludeDepth {
            path: path.to_path_buf(),
        });
    }

    let contents = std::fs::read_to_string(path).map_err(|source| ModelError::ConfigFile {
        path: path.to_path_buf(),
        source,
    })?;
    let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

    for (number, line) in parse(&contents, path)? {
        match line {
            Line::Include { path: inc, optional } => {
                let inc_path: PathBuf = dir.join(inc);
                if optional && !inc_path.exists() {
                    continue;
                }
                load_into(&inc_path, depth + 1, table)?;
            }
            Line::Assign { key, value } => {
                table
                    .insert(&key, value)
                    .map_err(|e| ModelError::ConfigSyntax {
                        path: path.to_path_buf(),
                        line: number,
                        message: e.to_string(),
                    })?;
            }
        }
    }
    Ok(())
}

/// Parse configuration text into numbered lines, without following includes.
fn parse(contents: &str, origin: &Path) -> Result<Vec<(usize, Line)>, ModelError> {
    let mut lines = Vec::new();
    for (index, raw) in contents.lines().enumerate() {
        let line = strip_comment(raw).trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix("#include") {
            let (optional, rest) = match rest.strip_prefix('?') {
                Some(r) => (true, r),
                None => (false, rest),
            };
            let target = rest.trim().trim_matches('"');
            if target.is_empty() {
                return Err(syntax(origin, index, "`#include` without a path"));
            }
            lines.push((
                index + 1,
                Line::Include {
                    path: target.to_string(),
                    optional,
                },
            ));
            continue;
        }

        let Some((key, value)) = split_assignment(line) else {
            return Err(syntax(origin, index, "expected `NAME = value`"));
        };
        let value = value.trim().trim_end_matches(';').trim_end();
        lines.push((
            index + 1,
            Line::Assign {
                key: key.trim().to_string(),
                value: value.to_string(),
            },
        ));
    }
    Ok(lines)
}

/// Split at the first `=` outside a `[cond=value]` qualifier.
fn split_assignment(line: &str) -> Option<(&str, &str)> {
    let mut depth = 0usize;
    for (at, c) in line.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '=' if depth == 0 => return Some((&line[..at], &line[at + 1..])),
            _ => {}
        }
    }
    None
}

/// Drop a trailing `//` comment that is not part of a URL-like value.
fn strip_comment(line: &str) -> &str {
    let mut search = 0;
    while let Some(pos) = line[search..].find("//") {
        let at = search + pos;
        if at == 0 || !line[..at].ends_with(':') {
            return &line[..at];
        }
        search = at + 2;
    }
    line
}

fn syntax(origin: &Path, index: usize, message: &str) -> ModelError {
    ModelError::ConfigSyntax {
        path: origin.to_path_buf(),
        line: index + 1,
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_lines() {
        let text = "// header\nA = 1;\nB[arch=arm64] = $(inherited) x // trailing\n\n";
        let lines: Vec<Line> = parse(text, Path::new("t.xcconfig"))
            .unwrap()
            .into_iter()
            .map(|(_, l)| l)
            .collect();
        assert_eq!(
            lines,
            vec![
                Line::Assign {
                    key: "A".into(),
                    value: "1".into()
                },
                Line::Assign {
                    key: "B[arch=arm64]".into(),
                    value: "$(inherited) x".into()
                },
            ]
        );
    }

    #[test]
    fn test_load_file_keeps_conditional_keys() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cond.xcconfig");
        std::fs::write(
            &path,
            "OTHER_CFLAGS = -DBASE\nOTHER_CFLAGS[arch=arm64][sdk=macosx*] = $(inherited) -DARM\n",
        )
        .unwrap();

        let table = load_file(&path).unwrap();
        let assignments: Vec<_> = table.iter().collect();
        assert_eq!(assignments.len(), 2);
        assert_eq!(assignments[1].name, "OTHER_CFLAGS");
        assert_eq!(assignments[1].value, "$(inherited) -DARM");
        assert!(assignments[1].is_conditional());
    }

    #[test]
    fn test_value_may_contain_equals() {
        let lines = parse("GCC_PREPROCESSOR_DEFINITIONS = A=1 B=2", Path::new("t")).unwrap();
        assert_eq!(
            lines[0].1,
            Line::Assign {
                key: "GCC_PREPROCESSOR_DEFINITIONS".into(),
                value: "A=1 B=2".into()
            }
        );
    }

    #[test]
    fn test_url_values_keep_slashes() {
        let lines = parse("URL = https://example.com/x", Path::new("t")).unwrap();
        assert_eq!(
            lines[0].1,
            Line::Assign {
                key: "URL".into(),
                value: "https://example.com/x".into()
            }
        );
    }

    #[test]
    fn test_missing_equals_is_error() {
        let err = parse("JUSTANAME\n", Path::new("bad.xcconfig")).unwrap_err();
        assert!(err.to_string().contains("bad.xcconfig:1"));
    }

    #[test]
    fn test_load_file_follows_includes() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("shared.xcconfig"), "A = shared\nB = shared\n").unwrap();
        std::fs::write(
            tmp.path().join("main.xcconfig"),
            "#include \"shared.xcconfig\"\n#include? \"absent.xcconfig\"\nB = main\n",
        )
        .unwrap();

        let table = load_file(&tmp.path().join("main.xcconfig")).unwrap();
        let pairs: Vec<_> = table
            .iter()
            .map(|a| (a.name.as_str(), a.value.as_str()))
            .collect();
        assert_eq!(pairs, vec![("A", "shared"), ("B", "shared"), ("B", "main")]);
    }

    #[test]
    fn test_self_include_stops() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("loop.xcconfig"), "#include \"loop.xcconfig\"\n").unwrap();
        let err = load_file(&tmp.path().join("loop.xcconfig")).unwrap_err();
        assert!(matches!(err, ModelError::IncludeDepth { .. }));
    }
}
