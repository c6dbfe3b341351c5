//! `rigging plan` command

use std::fmt::Write as _;

use anyhow::{bail, Context, Result};

use crate::cli::{OutputFormat, PlanArgs};
use rigging::builder::TaskGraph;
use rigging::construct_task_graph;

pub fn execute(args: PlanArgs, color: bool) -> Result<()> {
    let (ws, tools, mut opts) = super::prepare(&args.request, &args.archs)?;
    if let Some(jobs) = args.jobs {
        opts.jobs = Some(jobs);
    }
    if args.no_parallel {
        opts.parallel = false;
    }

    let construction = construct_task_graph(&ws, &tools, &opts)?;
    super::report(&construction.diagnostics, color);

    let rendered = match args.format {
        OutputFormat::Json => {
            let mut json = construction
                .graph
                .to_json()
                .context("failed to serialize the task graph")?;
            json.push('\n');
            json
        }
        OutputFormat::Text => render(&construction.graph, args.gates),
    };

    // The graph is written even when construction reported errors
    match &args.output {
        Some(path) => {
            std::fs::write(path, &rendered)
                .with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!("wrote {} task(s) to {}", construction.graph.len(), path.display());
        }
        None => print!("{}", rendered),
    }

    if construction.has_errors() {
        bail!(
            "task construction for `{}` failed with {} error(s) and {} warning(s)",
            ws.name,
            construction.error_count(),
            construction.warning_count()
        );
    }
    Ok(())
}

/// Human-readable listing: tasks grouped by target, in graph order.
fn render(graph: &TaskGraph, gates: bool) -> String {
    let mut out = String::new();
    for target in &graph.targets {
        let _ = writeln!(
            out,
            "{} ({}, {}, {})",
            target.name,
            target.kind,
            target.platform,
            if target.archs.is_empty() {
                "no archs".to_string()
            } else {
                target.archs.join(" ")
            }
        );
        for (index, node) in graph.tasks.iter().enumerate() {
            let task = &node.task;
            if task.target != target.name || (task.is_gate() && !gates) {
                continue;
            }
            let _ = write!(out, "  [{}] {}", index, task.rule_info.join(" "));
            if !node.antecedents.is_empty() {
                let after: Vec<String> = node.antecedents.iter().map(|a| a.to_string()).collect();
                let _ = write!(out, "  (after {})", after.join(", "));
            }
            out.push('\n');
        }
    }
    let _ = writeln!(
        out,
        "{} task(s), {} edge(s){}",
        graph.len(),
        graph.edge_count(),
        if graph.valid { "" } else { ", INVALID" }
    );
    let _ = writeln!(out, "signature {}", graph.signature());
    out
}
