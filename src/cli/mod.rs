pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "standfast")]
#[command(about = "Incremental dog-show data scraper with remote sync", long_about = None)]
pub struct Cli {
    /// Config file (default: ~/.config/standfast/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run targets once (all of them when none are named)
    Run {
        /// Target names
        targets: Vec<String>,
    },
    /// Serve the HTTP trigger API
    Serve {
        /// Address to bind (host:port), overrides the config file
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// List configured targets
    Targets,
    /// Show stored fingerprints and artifact locations per target
    Status,
}
