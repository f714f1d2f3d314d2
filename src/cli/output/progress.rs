//! Progress bar utilities using indicatif for terminal output
//!
//! The generation progress bar is driven by orchestrator events received on
//! an unbounded channel, so rendering never blocks the run.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::sync::mpsc;

use crate::domain::models::NodeStatus;
use crate::services::OrchestratorEvent;

/// Style templates for different progress bar types
const PROGRESS_TEMPLATE: &str =
    "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg} (ETA: {eta})";

/// Progress bar characters for visual effect
const PROGRESS_CHARS: &str = "█▓▒░ ";

/// Create a standard progress bar with ETA calculation
///
/// # Example
/// ```
/// use rpg_forge::cli::output::progress::create_progress_bar;
///
/// let pb = create_progress_bar(10);
/// pb.inc(1);
/// pb.finish_and_clear();
/// ```
pub fn create_progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template(PROGRESS_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars(PROGRESS_CHARS);
    pb.set_style(style);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Extension trait for ProgressBar to add common utility methods
pub trait ProgressBarExt {
    /// Finish with a success message (green checkmark)
    fn finish_success(&self, message: impl Into<String>);

    /// Finish with a warning message (yellow !)
    fn finish_warning(&self, message: impl Into<String>);
}

impl ProgressBarExt for ProgressBar {
    fn finish_success(&self, message: impl Into<String>) {
        self.finish_with_message(format!("✓ {}", message.into()));
    }

    fn finish_warning(&self, message: impl Into<String>) {
        self.finish_with_message(format!("! {}", message.into()));
    }
}

/// Renders orchestrator events onto a progress bar.
pub struct GenerationProgress {
    bar: ProgressBar,
}

impl GenerationProgress {
    /// Visible bar on stderr.
    pub fn new() -> Self {
        Self {
            bar: create_progress_bar(0),
        }
    }

    /// Bar that draws nothing; used with `--json` and in tests.
    pub fn hidden() -> Self {
        let bar = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::hidden());
        Self { bar }
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    pub fn length(&self) -> Option<u64> {
        self.bar.length()
    }

    /// Apply one event.
    pub fn handle(&self, event: &OrchestratorEvent) {
        match event {
            OrchestratorEvent::Started { total } => {
                self.bar.set_length(*total as u64);
                self.bar.set_position(0);
            }
            OrchestratorEvent::NodeStarted { name, .. } => {
                self.bar.set_message(name.clone());
            }
            OrchestratorEvent::NodeFinished { node_id, status } => {
                self.bar.inc(1);
                if *status == NodeStatus::Failed {
                    self.bar.println(format!("✗ {node_id} failed"));
                }
            }
            OrchestratorEvent::NodesSkipped { ids } => {
                self.bar.println(format!("⊘ skipped {} downstream node(s)", ids.len()));
            }
            OrchestratorEvent::CheckpointSaved { .. } => {}
            OrchestratorEvent::Completed { result } => {
                let message = format!(
                    "{} passed, {} failed, {} skipped",
                    result.passed_nodes, result.failed_nodes, result.skipped_nodes
                );
                if result.failed_nodes == 0 && !result.interrupted && !result.aborted {
                    self.bar.finish_success(message);
                } else {
                    self.bar.finish_warning(message);
                }
            }
        }
    }

    /// Drain events until the sender side is dropped.
    pub async fn consume(self, mut events: mpsc::UnboundedReceiver<OrchestratorEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(&event);
        }
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

impl Default for GenerationProgress {
    fn default() -> Self {
        Self::new()
    }
}
