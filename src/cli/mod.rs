//! Command-line interface
//!
//! clap command structures plus the `run`, `order`, `status` and `reset`
//! command implementations.

pub mod commands;
pub mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::style;

use commands::{order::OrderArgs, reset::ResetArgs, run::RunArgs, status::StatusArgs};

#[derive(Parser, Debug)]
#[command(name = "rpg-forge")]
#[command(about = "rpg-forge - graph-guided TDD code generation", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file (defaults to .rpg-forge/config.yaml layering)
    #[arg(short, long, global = true, env = "RPG_FORGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the configured log level
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate code for every scheduled node of a plan graph
    Run(RunArgs),

    /// Print the deterministic generation order
    Order(OrderArgs),

    /// Show the generation report for a checkpoint
    Status(StatusArgs),

    /// Reset a node and everything downstream of it
    Reset(ResetArgs),
}

/// Print `err` (with its cause chain) and exit non-zero.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let chain: Vec<String> = err.chain().skip(1).map(ToString::to_string).collect();
        let payload = serde_json::json!({
            "error": err.to_string(),
            "causes": chain,
        });
        eprintln!("{}", serde_json::to_string_pretty(&payload).unwrap_or_default());
    } else {
        eprintln!("{} {err}", style("error:").red().bold());
        for cause in err.chain().skip(1) {
            eprintln!("  {} {cause}", style("caused by:").dim());
        }
    }
    std::process::exit(1);
}
