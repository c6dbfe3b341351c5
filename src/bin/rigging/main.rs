//! rigging CLI - task graph construction for Xcode-style workspaces

use std::io::IsTerminal;

use anyhow::Result;
use clap::Parser;
use miette::Diagnostic as MietteDiagnostic;
use tracing_subscriber::EnvFilter;

use rigging::core::ModelError;
use rigging::ConstructionError;

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        print_help(&e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    // Parse CLI
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("rigging=debug")
    } else {
        EnvFilter::new("rigging=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let color = !cli.no_color && std::io::stderr().is_terminal();

    // Execute command
    match cli.command {
        Commands::Plan(args) => commands::plan::execute(args, color),
        Commands::Order(args) => commands::order::execute(args, color),
        Commands::Settings(args) => commands::settings::execute(args, color),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}

/// Print the code and help line of a known fatal error.
fn print_help(e: &anyhow::Error) {
    let diagnostic = e.chain().find_map(|cause| {
        cause
            .downcast_ref::<ConstructionError>()
            .map(|d| d as &dyn MietteDiagnostic)
            .or_else(|| cause.downcast_ref::<ModelError>().map(|d| d as &dyn MietteDiagnostic))
    });
    let Some(diagnostic) = diagnostic else {
        return;
    };
    if let Some(help) = diagnostic.help() {
        eprintln!("help: {}", help);
    }
    if let Some(code) = diagnostic.code() {
        eprintln!("  [{}]", code);
    }
}
