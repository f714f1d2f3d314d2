//! `rpg-forge order`: print the deterministic generation order.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use super::print_json;
use crate::cli::output::TableFormatter;
use crate::domain::models::Graph;
use crate::infrastructure::fs;
use crate::services::Scheduler;

#[derive(Args, Debug)]
pub struct OrderArgs {
    /// Plan graph JSON document
    #[arg(short, long)]
    pub graph: std::path::PathBuf,

    /// Include non-leaf nodes
    #[arg(long)]
    pub all_nodes: bool,
}

#[derive(Debug, Serialize)]
pub struct OrderEntry {
    pub node_id: String,
    pub name: String,
    pub layer: usize,
}

/// Scheduled order with each node's dependency layer.
pub fn order_entries(graph: &Graph, all_nodes: bool) -> Result<Vec<OrderEntry>> {
    let scheduler = Scheduler::new(graph).with_leaf_only(!all_nodes);
    let layers = scheduler.compute_layers()?;
    let order = scheduler.scheduled_order()?;
    Ok(order
        .into_iter()
        .map(|id| OrderEntry {
            name: scheduler.name_of(&id).unwrap_or_default().to_string(),
            layer: layers.get(&id).copied().unwrap_or_default(),
            node_id: id.to_string(),
        })
        .collect())
}

pub fn execute(args: OrderArgs, json: bool) -> Result<()> {
    let graph = fs::load_graph(&args.graph)
        .with_context(|| format!("Failed to load plan graph from {}", args.graph.display()))?;
    let entries = order_entries(&graph, args.all_nodes).context("Failed to compute order")?;

    if json {
        return print_json(&entries);
    }
    let rows: Vec<(String, String, usize)> = entries
        .into_iter()
        .map(|e| (e.node_id, e.name, e.layer))
        .collect();
    println!("{}", TableFormatter::new().format_order(&rows));
    Ok(())
}
