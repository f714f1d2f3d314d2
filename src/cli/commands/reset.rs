//! `rpg-forge reset`: reset a node and its descendants in a checkpoint.

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use serde_json::json;

use super::{print_json, GraphArgs};
use crate::domain::models::{Config, NodeId};
use crate::services::{CheckpointManager, Scheduler};

#[derive(Args, Debug)]
pub struct ResetArgs {
    #[command(flatten)]
    pub graph: GraphArgs,

    /// Node to reset
    #[arg(short, long)]
    pub node: String,
}

pub fn execute(args: ResetArgs, config: &Config, json: bool) -> Result<()> {
    let graph = args.graph.load_graph()?;
    let checkpoints = CheckpointManager::new(
        args.graph.checkpoint_path(config),
        config.generation.max_retries,
    );
    let mut state = checkpoints
        .load_or_fresh(&graph, checkpoints.has_checkpoint())
        .context("Failed to load checkpoint")?;

    let scheduler = Scheduler::new(&graph).with_leaf_only(config.generation.leaf_only);
    let node_id = NodeId::from(args.node);
    let reset = checkpoints
        .resume_from_node(&scheduler, &mut state, &node_id)
        .with_context(|| format!("Cannot reset {node_id}"))?;
    checkpoints.save_checkpoint(&state)?;

    if json {
        return print_json(&json!({
            "node_id": node_id,
            "reset": reset,
            "checkpoint_path": checkpoints.checkpoint_path(),
        }));
    }

    println!(
        "{} {} node(s) from {}",
        style("Reset").green().bold(),
        reset.len(),
        node_id
    );
    for id in &reset {
        println!("  {id}");
    }
    Ok(())
}
