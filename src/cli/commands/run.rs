//! `rpg-forge run`: generate code for a plan graph.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{print_json, GraphArgs};
use crate::adapters::llm::AnthropicGateway;
use crate::adapters::mock::{MockCodeGenerator, MockDiagnoser, MockSandbox};
use crate::adapters::sandbox::ProcessSandbox;
use crate::cli::output::{GenerationProgress, TableFormatter};
use crate::domain::models::{Config, FailureClassification, NodeId};
use crate::domain::ports::LlmGateway;
use crate::infrastructure::fs;
use crate::services::{
    CheckpointManager, GenerationOrchestrator, LlmCodeGenerator, MajorityVoteDiagnoser,
    OrchestratorConfig, OrchestratorResult, TddLoop,
};

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub graph: GraphArgs,

    /// Resume from the existing checkpoint
    #[arg(long)]
    pub resume: bool,

    /// Reset this node and its descendants before running
    #[arg(long)]
    pub start_from: Option<String>,

    /// Stop at the first node that exhausts its retries
    #[arg(long)]
    pub fail_fast: bool,

    /// Retry budget per node
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Schedule every node, not only generation leaves
    #[arg(long)]
    pub all_nodes: bool,

    /// Use canned collaborators instead of the LLM and test runner
    #[arg(long)]
    pub dry_run: bool,

    /// Save the graph with generated code here
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Wire the TDD loop from configuration.
fn build_tdd_loop(config: &Config, dry_run: bool) -> Result<TddLoop> {
    if dry_run {
        let generator = Arc::new(MockCodeGenerator::new());
        return Ok(TddLoop::new(
            generator.clone(),
            generator,
            Arc::new(MockSandbox::passing()),
            Arc::new(MockDiagnoser::new(FailureClassification::ImplementationBug)),
        ));
    }

    let gateway: Arc<dyn LlmGateway> = Arc::new(
        AnthropicGateway::new(config.llm.clone()).context("Failed to create LLM gateway")?,
    );
    let generator = Arc::new(LlmCodeGenerator::new(gateway.clone()));
    Ok(TddLoop::new(
        generator.clone(),
        generator,
        Arc::new(ProcessSandbox::new(config.sandbox.clone())),
        Arc::new(MajorityVoteDiagnoser::new(gateway, config.diagnosis.clone())),
    ))
}

fn print_summary(result: &OrchestratorResult) {
    let formatter = TableFormatter::new();
    println!("{}", formatter.format_outcomes(&result.node_outcomes));
    println!("{}", formatter.format_report(&result.report));

    let headline = format!(
        "{}/{} nodes passed ({:.1}%)",
        result.passed_nodes,
        result.total_nodes,
        result.pass_rate * 100.0
    );
    if result.failed_nodes == 0 && result.skipped_nodes == 0 {
        println!("{}", style(headline).green().bold());
    } else {
        println!("{}", style(headline).yellow().bold());
    }
    if result.interrupted {
        println!("{}", style("Run interrupted; resume with --resume").yellow());
    }
    if result.aborted {
        println!("{}", style("Run aborted by --fail-fast").red());
    }
    println!("Checkpoint: {}", result.checkpoint_path.display());
}

pub async fn execute(args: RunArgs, mut config: Config, json: bool) -> Result<()> {
    let graph = args.graph.load_graph()?;

    if let Some(max_retries) = args.max_retries {
        config.generation.max_retries = max_retries;
    }
    if args.fail_fast {
        config.generation.fail_fast = true;
    }
    if args.all_nodes {
        config.generation.leaf_only = false;
    }
    config.generation.checkpoint_path = args.graph.checkpoint_path(&config);

    let checkpoints = CheckpointManager::new(
        config.generation.checkpoint_path.clone(),
        config.generation.max_retries,
    );
    let state = checkpoints
        .load_or_fresh(&graph, args.resume)
        .context("Failed to prepare generation state")?;
    let tdd = build_tdd_loop(&config, args.dry_run)?;

    let mut orchestrator_config = OrchestratorConfig::from(&config.generation);
    orchestrator_config.start_from = args.start_from.map(NodeId::from);

    let (tx, rx) = mpsc::unbounded_channel();
    let cancellation = CancellationToken::new();
    let mut orchestrator =
        GenerationOrchestrator::new(graph, state, tdd, checkpoints, orchestrator_config)
            .with_events(tx)
            .with_cancellation(cancellation.clone());

    let signal_token = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing current node");
            signal_token.cancel();
        }
    });

    let progress = if json {
        GenerationProgress::hidden()
    } else {
        GenerationProgress::new()
    };
    let renderer = tokio::spawn(progress.consume(rx));

    let outcome = orchestrator.run().await;
    let (graph, _state) = orchestrator.into_parts();
    let _ = renderer.await;
    let result = outcome.context("Generation run failed")?;

    if let Some(output) = &args.output {
        fs::save_graph(output, &graph)
            .with_context(|| format!("Failed to write graph to {}", output.display()))?;
        info!(path = %output.display(), "generated graph saved");
    }

    if json {
        print_json(&result)?;
    } else {
        print_summary(&result);
    }
    Ok(())
}
