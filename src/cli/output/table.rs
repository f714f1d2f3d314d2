//! Table output formatting for CLI commands
//!
//! Formats generation outcomes, component reports and the traversal order
//! using comfy-table. Honors `NO_COLOR` and dumb terminals.

use std::env;

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};

use crate::domain::models::NodeStatus;
use crate::services::{GenerationReport, NodeOutcome};

/// Table formatter for CLI output
pub struct TableFormatter {
    /// Whether to use colors in output
    use_colors: bool,
    /// Maximum width for tables (None = auto)
    max_width: Option<u16>,
}

impl TableFormatter {
    /// Create a new table formatter
    pub fn new() -> Self {
        Self {
            use_colors: supports_color(),
            max_width: None,
        }
    }

    /// Create a new table formatter with custom settings
    pub fn with_config(use_colors: bool, max_width: Option<u16>) -> Self {
        Self {
            use_colors,
            max_width,
        }
    }

    /// One row per scheduled node, in generation order.
    pub fn format_outcomes(&self, outcomes: &[NodeOutcome]) -> String {
        let mut table = self.create_base_table();
        table.set_header(bold_header(&["#", "Node", "Name", "Status", "Retries", "Reason"]));

        for (position, outcome) in outcomes.iter().enumerate() {
            table.add_row(vec![
                Cell::new(position + 1),
                Cell::new(outcome.node_id.as_str()),
                Cell::new(truncate_text(&outcome.name, 30)),
                self.status_cell(outcome.status),
                Cell::new(outcome.retry_count),
                Cell::new(truncate_text(outcome.failure_reason.as_deref().unwrap_or("-"), 50)),
            ]);
        }

        table.to_string()
    }

    /// Totals followed by one row per component.
    pub fn format_report(&self, report: &GenerationReport) -> String {
        let mut table = self.create_base_table();
        table.set_header(bold_header(&[
            "Component", "Total", "Passed", "Failed", "Skipped", "Pending",
        ]));

        for component in &report.components {
            let summary = &component.summary;
            table.add_row(vec![
                Cell::new(truncate_text(&component.root_name, 30)),
                Cell::new(summary.total),
                self.count_cell(summary.passed, NodeStatus::Passed),
                self.count_cell(summary.failed, NodeStatus::Failed),
                self.count_cell(summary.skipped, NodeStatus::Skipped),
                Cell::new(summary.pending + summary.in_progress),
            ]);
        }

        table.add_row(vec![
            Cell::new("TOTAL").add_attribute(Attribute::Bold),
            Cell::new(report.total_nodes).add_attribute(Attribute::Bold),
            self.count_cell(report.passed_nodes, NodeStatus::Passed),
            self.count_cell(report.failed_nodes, NodeStatus::Failed),
            self.count_cell(report.skipped_nodes, NodeStatus::Skipped),
            Cell::new(report.pending_nodes + report.in_progress_nodes),
        ]);

        table.to_string()
    }

    /// Generation order with layer and status.
    pub fn format_order(&self, rows: &[(String, String, usize)]) -> String {
        let mut table = self.create_base_table();
        table.set_header(bold_header(&["#", "Node", "Name", "Layer"]));
        for (position, (id, name, layer)) in rows.iter().enumerate() {
            table.add_row(vec![
                Cell::new(position + 1),
                Cell::new(id),
                Cell::new(truncate_text(name, 40)),
                Cell::new(layer),
            ]);
        }
        table.to_string()
    }

    fn status_cell(&self, status: NodeStatus) -> Cell {
        if self.use_colors {
            Cell::new(status.to_string()).fg(status_color(status))
        } else {
            Cell::new(format!("{} {}", status_icon(status), status))
        }
    }

    fn count_cell(&self, count: usize, status: NodeStatus) -> Cell {
        if self.use_colors && count > 0 {
            Cell::new(count).fg(status_color(status))
        } else {
            Cell::new(count)
        }
    }

    /// Create a base table with common settings
    fn create_base_table(&self) -> Table {
        let mut table = Table::new();

        table
            .load_preset(presets::UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);

        if let Some(width) = self.max_width {
            table.set_width(width);
        }

        table
    }
}

impl Default for TableFormatter {
    fn default() -> Self {
        Self::new()
    }
}

fn bold_header(names: &[&str]) -> Vec<Cell> {
    names
        .iter()
        .map(|name| Cell::new(name).add_attribute(Attribute::Bold))
        .collect()
}

/// Check if color output is supported
fn supports_color() -> bool {
    if env::var("NO_COLOR").is_ok() {
        return false;
    }

    if let Ok(term) = env::var("TERM") {
        if term == "dumb" {
            return false;
        }
    }

    true
}

/// Map node status to color
fn status_color(status: NodeStatus) -> Color {
    match status {
        NodeStatus::Passed => Color::Green,
        NodeStatus::InProgress => Color::Cyan,
        NodeStatus::Failed => Color::Red,
        NodeStatus::Skipped => Color::DarkGrey,
        NodeStatus::Pending => Color::White,
    }
}

/// Map node status to icon
fn status_icon(status: NodeStatus) -> &'static str {
    match status {
        NodeStatus::Passed => "✓",
        NodeStatus::InProgress => "⟳",
        NodeStatus::Failed => "✗",
        NodeStatus::Skipped => "⊘",
        NodeStatus::Pending => "○",
    }
}

/// Truncate text to a maximum length, appending "..." if truncated.
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        text.to_string()
    } else {
        let kept: String = text.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{NodeId, StatusSummary};
    use crate::services::ComponentReport;

    fn outcome(id: &str, status: NodeStatus, reason: Option<&str>) -> NodeOutcome {
        NodeOutcome {
            node_id: NodeId::from(id),
            name: format!("fn_{id}"),
            status,
            retry_count: 1,
            failure_reason: reason.map(str::to_string),
            processed: true,
        }
    }

    #[test]
    fn test_format_outcomes_without_colors() {
        let formatter = TableFormatter::with_config(false, None);
        let output = formatter.format_outcomes(&[
            outcome("f1", NodeStatus::Passed, None),
            outcome("f2", NodeStatus::Failed, Some("exhausted 3 retries")),
        ]);
        assert!(output.contains("✓ passed"));
        assert!(output.contains("✗ failed"));
        assert!(output.contains("exhausted 3 retries"));
    }

    #[test]
    fn test_format_report_has_total_row() {
        let mut summary = StatusSummary::default();
        summary.record(NodeStatus::Passed);
        summary.record(NodeStatus::Skipped);
        let report = GenerationReport {
            total_nodes: 2,
            passed_nodes: 1,
            failed_nodes: 0,
            skipped_nodes: 1,
            pending_nodes: 0,
            in_progress_nodes: 0,
            pass_rate: 0.5,
            components: vec![ComponentReport {
                root_id: NodeId::from("m"),
                root_name: "parser".to_string(),
                summary,
            }],
        };
        let output = TableFormatter::with_config(false, None).format_report(&report);
        assert!(output.contains("parser"));
        assert!(output.contains("TOTAL"));
    }

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("short", 10), "short");
        assert_eq!(truncate_text("a very long name", 8), "a ver...");
    }
}
