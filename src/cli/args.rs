//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Strata - container image layer analysis
///
/// Analyzes container images layer by layer and serves cached results
/// over HTTP.
#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "STRATA_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve image analyses over HTTP
    Serve(ServeArgs),

    /// Analyze a single image and print the result
    Analyze(AnalyzeArgs),

    /// Show or edit configuration
    Config(ConfigArgs),
}

/// Arguments for the serve command
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Address to listen on (overrides server.listen)
    #[arg(short, long)]
    pub listen: Option<String>,

    /// Development mode: no client cache hints
    #[arg(long, env = "STRATA_DEV")]
    pub dev: bool,

    /// Container engine CLI (overrides analyzer.engine)
    #[arg(long)]
    pub engine: Option<String>,
}

/// Arguments for the analyze command
#[derive(Parser, Debug)]
pub struct AnalyzeArgs {
    /// Image reference, e.g. docker.io/library/redis:7
    pub image: String,

    /// Print the file tree of this layer instead of the summary
    #[arg(short, long)]
    pub layer: Option<usize>,

    /// Print JSON instead of a human-readable report
    #[arg(long)]
    pub json: bool,

    /// Container engine CLI (overrides analyzer.engine)
    #[arg(long)]
    pub engine: Option<String>,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Config subcommand
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., cache.ttl_secs)
        key: String,
        /// Value to set
        value: String,
    },
}
