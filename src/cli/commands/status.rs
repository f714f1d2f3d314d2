//! `rpg-forge status`: report progress recorded in a checkpoint.

use anyhow::{Context, Result};
use clap::Args;
use console::style;

use super::{print_json, GraphArgs};
use crate::cli::output::TableFormatter;
use crate::domain::models::Config;
use crate::services::{CheckpointManager, Scheduler};

#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub graph: GraphArgs,

    /// Include non-leaf nodes
    #[arg(long)]
    pub all_nodes: bool,
}

pub fn execute(args: StatusArgs, config: &Config, json: bool) -> Result<()> {
    let graph = args.graph.load_graph()?;
    let checkpoints = CheckpointManager::new(
        args.graph.checkpoint_path(config),
        config.generation.max_retries,
    );
    let state = checkpoints
        .load_checkpoint(&graph)
        .context("Failed to load checkpoint")?;

    let scheduler = Scheduler::new(&graph).with_leaf_only(!args.all_nodes);
    let report = scheduler.generate_report(&state);

    if json {
        return print_json(&report);
    }

    println!("{}", TableFormatter::new().format_report(&report));
    println!(
        "{} {:.1}%",
        style("Pass rate:").bold(),
        report.pass_rate * 100.0
    );
    let remaining = checkpoints.get_nodes_to_process(&scheduler, &state)?;
    if !remaining.is_empty() {
        println!("{} node(s) left to process; resume with `run --resume`", remaining.len());
    }
    Ok(())
}
