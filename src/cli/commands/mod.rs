//! CLI command implementations

pub mod order;
pub mod reset;
pub mod run;
pub mod status;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use crate::domain::models::{Config, Graph};
use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::fs;

/// Plan graph and checkpoint location shared by every command.
#[derive(Args, Debug, Clone)]
pub struct GraphArgs {
    /// Plan graph JSON document
    #[arg(short, long)]
    pub graph: PathBuf,

    /// Checkpoint file (defaults to generation.checkpoint_path)
    #[arg(long)]
    pub checkpoint: Option<PathBuf>,
}

impl GraphArgs {
    pub fn load_graph(&self) -> Result<Graph> {
        fs::load_graph(&self.graph)
            .with_context(|| format!("Failed to load plan graph from {}", self.graph.display()))
    }

    pub fn checkpoint_path(&self, config: &Config) -> PathBuf {
        self.checkpoint
            .clone()
            .unwrap_or_else(|| config.generation.checkpoint_path.clone())
    }
}

/// Load configuration from `path` or the default layering.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

/// Print `value` as pretty JSON on stdout.
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{rendered}");
    Ok(())
}
