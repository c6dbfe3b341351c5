//! `rigging settings` command

use anyhow::{bail, Result};

use crate::cli::SettingsArgs;
use rigging::ops::resolve_target_settings;

pub fn execute(args: SettingsArgs, color: bool) -> Result<()> {
    let (ws, tools, opts) = super::prepare(&args.request, &[])?;
    let (scope, diagnostics) =
        resolve_target_settings(&ws, &tools, &opts, &args.target, args.arch.as_deref())?;
    let errors = super::report(&diagnostics, color);

    println!(
        "# Build settings for `{}` ({} {}{})",
        args.target,
        opts.configuration,
        opts.platform,
        args.arch
            .as_deref()
            .map(|a| format!(" {}", a))
            .unwrap_or_default()
    );
    for (name, value) in scope.iter() {
        if let Some(filter) = &args.filter {
            if !name.contains(filter.as_str()) {
                continue;
            }
        }
        println!("    {} = {}", name, value);
    }

    if errors > 0 {
        bail!("settings of `{}` have {} error(s)", args.target, errors);
    }
    Ok(())
}
