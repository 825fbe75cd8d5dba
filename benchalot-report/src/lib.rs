#![warn(missing_docs)]
//! Benchalot Report - Result Persistence and Table Rendering
//!
//! Output backends for the post-processed result table:
//! - Result CSV writer/reader (lossless round-trip of every sample)
//! - Markdown and HTML stat-table renderers
//! - Output-format registry; plot formats are recognized but rendered by
//!   external backends
//!
//! Graphical plot rendering lives out of tree: the output driver hands plot
//! blocks the same partitioned sub-table it hands table renderers, and a
//! plotting backend consumes that contract.

mod csv_io;
mod html;
mod markdown;

pub use csv_io::{read_results, read_results_file, write_results, write_results_file};
pub use html::render_html;
pub use markdown::render_markdown;

use thiserror::Error;

/// Errors from rendering or persisting results
#[derive(Debug, Error)]
pub enum RenderError {
    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// CSV (de)serialization failure
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    /// A loaded result file does not match the expected schema.
    #[error("bad result file: {0}")]
    Schema(String),
}

/// Output format of one result block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Raw sample CSV (always unfiltered)
    Csv,
    /// Markdown stat table
    Md,
    /// HTML stat table
    Html,
    /// Scatter plot (external backend)
    Scatter,
    /// Bar chart (external backend)
    Bar,
    /// Box plot (external backend)
    Box,
    /// Violin plot (external backend)
    Violin,
}

impl OutputFormat {
    /// The format name as written in configuration files.
    pub fn name(self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Md => "md",
            OutputFormat::Html => "html",
            OutputFormat::Scatter => "scatter",
            OutputFormat::Bar => "bar",
            OutputFormat::Box => "box",
            OutputFormat::Violin => "violin",
        }
    }

    /// Whether this format is a plot handled by an external backend.
    pub fn is_plot(self) -> bool {
        matches!(
            self,
            OutputFormat::Scatter | OutputFormat::Bar | OutputFormat::Box | OutputFormat::Violin
        )
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "md" | "markdown" => Ok(OutputFormat::Md),
            "html" => Ok(OutputFormat::Html),
            "scatter" => Ok(OutputFormat::Scatter),
            "bar" => Ok(OutputFormat::Bar),
            "box" => Ok(OutputFormat::Box),
            "violin" => Ok(OutputFormat::Violin),
            other => Err(format!("unknown output format: {}", other)),
        }
    }
}

/// Render a float for table display: fixed precision with trailing zeros
/// trimmed, so `1.5000` prints as `1.5` and `4.0000` as `4`.
pub(crate) fn format_number(value: f64) -> String {
    let formatted = format!("{:.4}", value);
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() || trimmed == "-" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}
