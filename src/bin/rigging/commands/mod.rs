//! Command implementations

pub mod completions;
pub mod order;
pub mod plan;
pub mod settings;

use anyhow::Result;

use crate::cli::RequestArgs;
use rigging::ops::load_workspace;
use rigging::util::diagnostic::{emit, Diagnostic};
use rigging::{ConstructOptions, ToolSetup, Workspace};

/// Workspace, tools and options for a request. Command-line values win
/// over configuration files.
pub(crate) fn prepare(
    request: &RequestArgs,
    archs: &[String],
) -> Result<(Workspace, ToolSetup, ConstructOptions)> {
    let (ws, config) = load_workspace(&request.workspace)?;
    let tools = ToolSetup::from_config(&config.toolchain)?;

    let mut opts = ConstructOptions::from_config(&config);
    if let Some(configuration) = &request.configuration {
        opts.configuration = configuration.clone();
    }
    if let Some(platform) = &request.platform {
        opts.platform = platform.clone();
    }
    if !archs.is_empty() {
        opts.archs = archs.to_vec();
    }
    opts.overrides.extend(request.defines.iter().cloned());

    tracing::debug!(
        "request: configuration `{}`, platform `{}`, {} override(s)",
        opts.configuration,
        opts.platform,
        opts.overrides.len()
    );
    Ok((ws, tools, opts))
}

/// Print diagnostics to stderr; returns the number of errors.
pub(crate) fn report(diagnostics: &[Diagnostic], color: bool) -> usize {
    for diagnostic in diagnostics {
        emit(diagnostic, color);
    }
    diagnostics.iter().filter(|d| d.is_error()).count()
}
