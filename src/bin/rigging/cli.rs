//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

/// rigging - Construct the task graph of an Xcode-style workspace
#[derive(Parser)]
#[command(name = "rigging")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Construct the task graph of a workspace
    Plan(PlanArgs),

    /// Print the target build order
    Order(OrderArgs),

    /// Show the resolved build settings of a target
    Settings(SettingsArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Build request shared by every workspace command.
#[derive(Args)]
pub struct RequestArgs {
    /// Workspace description (JSON)
    pub workspace: PathBuf,

    /// Configuration to build (defaults to config, then Debug)
    #[arg(short, long, env = "RIGGING_CONFIGURATION")]
    pub configuration: Option<String>,

    /// Platform to build for (defaults to config, then macosx)
    #[arg(short, long, env = "RIGGING_PLATFORM")]
    pub platform: Option<String>,

    /// Override a build setting (repeatable)
    #[arg(short = 'D', value_name = "KEY=VALUE", value_parser = parse_define)]
    pub defines: Vec<(String, String)>,
}

#[derive(Args)]
pub struct PlanArgs {
    #[command(flatten)]
    pub request: RequestArgs,

    /// Architecture to build (repeatable)
    #[arg(long = "arch", value_name = "ARCH")]
    pub archs: Vec<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Write the graph to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Number of threads for target production
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Produce targets one at a time
    #[arg(long)]
    pub no_parallel: bool,

    /// Include gate tasks in text output
    #[arg(long)]
    pub gates: bool,
}

#[derive(Args)]
pub struct OrderArgs {
    #[command(flatten)]
    pub request: RequestArgs,

    /// Architecture to build (repeatable)
    #[arg(long = "arch", value_name = "ARCH")]
    pub archs: Vec<String>,
}

#[derive(Args)]
pub struct SettingsArgs {
    #[command(flatten)]
    pub request: RequestArgs,

    /// Target to resolve
    #[arg(short, long)]
    pub target: String,

    /// Resolve for one architecture (architecture-neutral by default)
    #[arg(long)]
    pub arch: Option<String>,

    /// Only show settings whose name contains this text
    #[arg(long)]
    pub filter: Option<String>,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

fn parse_define(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((key, v)) if !key.trim().is_empty() => Ok((key.trim().to_string(), v.to_string())),
        _ => Err(format!("expected KEY=VALUE, got `{}`", value)),
    }
}
