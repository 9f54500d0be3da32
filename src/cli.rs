// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "caravel")]
#[command(about = "GitOps deployment orchestrator for compose stacks")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the configuration file (default: caravel.yml in the
    /// current directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the orchestrator: poll repositories and deploy on change
    Serve,

    /// Deploy one repository now and wait for the result
    Deploy {
        /// Repository name from the configuration
        repo: String,
    },

    /// Show configured repositories and their deployed commits
    Status,

    /// List past deployments, newest first
    History {
        /// Only show deployments of this repository
        #[arg(short, long)]
        repo: Option<String>,

        /// Maximum number of records to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Tail a container's output
    Logs {
        /// Container name or id
        container: String,

        /// Number of trailing lines
        #[arg(short, long, default_value_t = 100)]
        tail: u64,
    },
}
