//! CLI output formatting module
//!
//! Progress rendering and table formatters for terminal display.

pub mod progress;
pub mod table;

pub use progress::{create_progress_bar, GenerationProgress, ProgressBarExt};
pub use table::TableFormatter;
