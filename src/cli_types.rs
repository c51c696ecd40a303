use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::finder::ViewMode;

#[derive(Parser, Debug)]
#[command(name = "opfinder")]
#[command(about = "Browse and fuzzy-search an operation registry")]
#[command(version)]
pub struct Cli {
    /// Registry JSON file to load
    #[arg(short, long, env = "OPFINDER_REGISTRY")]
    pub registry: PathBuf,

    /// Configuration file layered over the user configuration
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// View to use instead of the configured default
    #[arg(short, long)]
    pub mode: Option<ViewMode>,

    /// Number of top score buckets to keep
    #[arg(short, long)]
    pub keep: Option<usize>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    pub log_json: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the unfiltered hierarchy
    Tree(TreeArgs),
    /// Filter the active view with one or more queries
    Search(SearchArgs),
    /// Show registry and index statistics
    Stats,
    /// Print the effective configuration as TOML
    Config,
}

#[derive(Args, Debug, Clone, Default)]
pub struct TreeArgs {
    /// Stop descending below this depth
    #[arg(short, long)]
    pub depth: Option<usize>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct SearchArgs {
    /// Queries, applied in order; later ones supersede earlier ones
    #[arg(required = true)]
    pub queries: Vec<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}
