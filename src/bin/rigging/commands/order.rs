//! `rigging order` command

use anyhow::{bail, Result};

use crate::cli::OrderArgs;
use rigging::ops::order_targets;

pub fn execute(args: OrderArgs, color: bool) -> Result<()> {
    let (ws, tools, opts) = super::prepare(&args.request, &args.archs)?;
    let (names, diagnostics) = order_targets(&ws, &tools, &opts)?;
    let errors = super::report(&diagnostics, color);

    for (position, name) in names.iter().enumerate() {
        println!("{:>3}. {}", position + 1, name);
    }

    if errors > 0 {
        bail!("target ordering for `{}` reported {} error(s)", ws.name, errors);
    }
    Ok(())
}
