//! Diagnostics reported by a task construction pass.
//!
//! Recoverable problems never abort the pass. They are collected as
//! [`Diagnostic`] values, each attributed to the target and project it was
//! found in, and handed back next to the task graph.

use std::fmt;

use serde::Serialize;

/// Common suggestion messages for consistent reporting.
pub mod suggestions {
    /// Suggestion when a target name is not found.
    pub const TARGET_NOT_FOUND: &str = "run `rigging order <workspace>` to list the targets";

    /// Suggestion for module-only architectures.
    pub const MODULE_ONLY_DEPLOYMENT_TARGET: &str =
        "set the module-only deployment target or remove the architecture from SWIFT_MODULE_ONLY_ARCHS";

    /// Suggestion for scripts that always run.
    pub const SCRIPT_OUTPUTS: &str =
        "declare the files the script writes as output paths, or enable `always_out_of_date`";

    /// Suggestion when the graph is invalid.
    pub const INVALID_GRAPH: &str = "run `rigging plan --verbose` for the full construction log";
}

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Note => write!(f, "note"),
        }
    }
}

/// A diagnostic message with optional suggestions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Primary message
    pub message: String,
    /// Severity level
    pub severity: Severity,
    /// Target the problem was found in
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Project owning that target
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    /// Additional context lines
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,
    /// Suggested fixes
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl Diagnostic {
    fn new(severity: Severity, message: impl Into<String>) -> Self {
        Diagnostic {
            message: message.into(),
            severity,
            target: None,
            project: None,
            context: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    /// Create a new error diagnostic.
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic::new(Severity::Error, message)
    }

    /// Create a new warning diagnostic.
    pub fn warning(message: impl Into<String>) -> Self {
        Diagnostic::new(Severity::Warning, message)
    }

    /// Create a new note.
    pub fn note(message: impl Into<String>) -> Self {
        Diagnostic::new(Severity::Note, message)
    }

    /// Attribute the diagnostic to a target.
    pub fn in_target(mut self, target: impl Into<String>, project: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self.project = Some(project.into());
        self
    }

    /// Add context to the diagnostic.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context.push(context.into());
        self
    }

    /// Add a suggestion for fixing the issue.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Format the diagnostic for terminal output.
    pub fn format(&self, color: bool) -> String {
        let mut output = String::new();

        let severity_str = if color {
            match self.severity {
                Severity::Error => "\x1b[1;31merror\x1b[0m",
                Severity::Warning => "\x1b[1;33mwarning\x1b[0m",
                Severity::Note => "\x1b[1;36mnote\x1b[0m",
            }
        } else {
            match self.severity {
                Severity::Error => "error",
                Severity::Warning => "warning",
                Severity::Note => "note",
            }
        };

        output.push_str(&format!("{}: {}\n", severity_str, self));

        for ctx in &self.context {
            output.push_str(&format!("  -> {}\n", ctx));
        }

        if !self.suggestions.is_empty() {
            let help_prefix = if color {
                "\x1b[1;32mhelp\x1b[0m"
            } else {
                "help"
            };
            for suggestion in &self.suggestions {
                output.push_str(&format!("  {}: {}\n", help_prefix, suggestion));
            }
        }

        output
    }
}

/// The message with its target attribution, without severity.
impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        match (&self.target, &self.project) {
            (Some(target), Some(project)) => {
                write!(f, " (in target '{}' from project '{}')", target, project)
            }
            (Some(target), None) => write!(f, " (in target '{}')", target),
            _ => Ok(()),
        }
    }
}

/// Print a diagnostic to stderr.
pub fn emit(diagnostic: &Diagnostic, color: bool) {
    eprint!("{}", diagnostic.format(color));
}
