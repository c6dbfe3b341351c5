//! Diagnostics collection.
//!
//! Targets are produced in parallel, so diagnostics arrive in completion
//! order. Every entry carries a `(scope, sequence)` key and the collector
//! sorts by that key, which makes the final list identical to a sequential
//! pass.

use std::sync::Mutex;

use crate::settings::SettingsError;
use crate::util::diagnostic::Diagnostic;

/// Scope key for workspace-level diagnostics reported before production.
pub const ORDERING_SCOPE: usize = 0;

/// Scope key for diagnostics reported by the assembler.
pub const ASSEMBLY_SCOPE: usize = usize::MAX;

/// Scope key of the target at `ordinal` in build order.
pub fn target_scope(ordinal: usize) -> usize {
    ordinal + 1
}

/// Append-only, order-preserving diagnostics sink shared by producers.
#[derive(Debug, Default)]
pub struct DiagnosticsCollector {
    entries: Mutex<Vec<(usize, usize, Diagnostic)>>,
}

impl DiagnosticsCollector {
    pub fn new() -> Self {
        DiagnosticsCollector::default()
    }

    /// Append a batch under `scope`, keeping its internal order.
    pub fn append(&self, scope: usize, diagnostics: Vec<Diagnostic>) {
        if diagnostics.is_empty() {
            return;
        }
        let mut entries = self.entries.lock().expect("diagnostics collector poisoned");
        entries.extend(
            diagnostics
                .into_iter()
                .enumerate()
                .map(|(seq, d)| (scope, seq, d)),
        );
    }

    /// All diagnostics in canonical order.
    pub fn into_sorted(self) -> Vec<Diagnostic> {
        let mut entries = self
            .entries
            .into_inner()
            .expect("diagnostics collector poisoned");
        entries.sort_by_key(|(scope, seq, _)| (*scope, *seq));
        entries.into_iter().map(|(_, _, d)| d).collect()
    }
}

/// Diagnostics of one target, attributed to it as they are recorded.
#[derive(Debug, Clone)]
pub struct TargetDiagnostics {
    target: String,
    project: String,
    entries: Vec<Diagnostic>,
}

impl TargetDiagnostics {
    pub fn new(target: impl Into<String>, project: impl Into<String>) -> Self {
        TargetDiagnostics {
            target: target.into(),
            project: project.into(),
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        let diagnostic = diagnostic.in_target(self.target.clone(), self.project.clone());
        self.entries.push(diagnostic);
    }

    /// Record a diagnostic unless an identical one was already recorded.
    pub fn push_once(&mut self, diagnostic: Diagnostic) {
        let diagnostic = diagnostic.in_target(self.target.clone(), self.project.clone());
        if !self.entries.contains(&diagnostic) {
            self.entries.push(diagnostic);
        }
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(Diagnostic::error(message));
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.push(Diagnostic::warning(message));
    }

    /// Report settings problems, each at most once per target.
    pub fn settings_errors(&mut self, errors: &[SettingsError]) {
        for error in errors {
            self.push_once(Diagnostic::error(error.to_string()));
        }
    }

    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(Diagnostic::is_error)
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.entries
    }
}
