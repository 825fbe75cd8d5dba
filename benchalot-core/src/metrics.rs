//! Built-in Metrics and Custom-Metric Parsing
//!
//! A measured stage accumulates one [`StageMeasurement`] across its command
//! list: times are summed, peak RSS is maximized, output strings are kept per
//! command. Custom metrics report through their stdout, either as a single
//! numeric token or as a two-line CSV whose header names the stages.

use crate::command::CommandOutcome;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Built-in metrics collectable from a measured command
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Wall-clock duration in seconds
    Time,
    /// Child user CPU time in seconds
    Utime,
    /// Child system CPU time in seconds
    Stime,
    /// Peak resident set size in mebibytes
    Rss,
    /// Captured standard output (string-valued)
    Stdout,
    /// Captured standard error (string-valued)
    Stderr,
}

impl Metric {
    /// All built-in metrics, in canonical order.
    pub const ALL: [Metric; 6] = [
        Metric::Time,
        Metric::Utime,
        Metric::Stime,
        Metric::Rss,
        Metric::Stdout,
        Metric::Stderr,
    ];

    /// The metric's name as used in configuration and result columns.
    pub fn name(self) -> &'static str {
        match self {
            Metric::Time => "time",
            Metric::Utime => "utime",
            Metric::Stime => "stime",
            Metric::Rss => "rss",
            Metric::Stdout => "stdout",
            Metric::Stderr => "stderr",
        }
    }

    /// Whether the metric produces a numeric value (as opposed to a string).
    pub fn is_numeric(self) -> bool {
        !matches!(self, Metric::Stdout | Metric::Stderr)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors from parsing a custom metric's stdout
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetricParseError {
    /// A value could not be parsed as a number.
    #[error("converting '{0}' to a number failed")]
    NotNumeric(String),
    /// The output was neither one token nor a two-line CSV.
    #[error("expected a numeric token or a two-line CSV, got {0} lines")]
    WrongShape(usize),
    /// CSV header and value rows disagree in field count.
    #[error("CSV header has {header} fields but the value row has {values}")]
    FieldCount {
        /// Number of header fields
        header: usize,
        /// Number of value fields
        values: usize,
    },
}

/// Parsed custom-metric output
#[derive(Debug, Clone, PartialEq)]
pub enum CustomMetricValues {
    /// Single numeric token; the row's stage is the metric's own name
    Single(f64),
    /// Two-line CSV; one row per header stage
    Stages(Vec<(String, f64)>),
}

/// Parse a custom metric's captured stdout.
///
/// One line: a single numeric token. Two lines: a CSV header of stage names
/// followed by the same number of numeric fields. Anything else is a parse
/// error, which callers treat as a sample failure rather than a fatal error.
pub fn parse_custom_metric(output: &str) -> Result<CustomMetricValues, MetricParseError> {
    let lines: Vec<&str> = output.lines().collect();
    match lines.len() {
        1 => {
            let token = lines[0].trim();
            let value = token
                .parse::<f64>()
                .map_err(|_| MetricParseError::NotNumeric(token.to_string()))?;
            Ok(CustomMetricValues::Single(value))
        }
        2 => {
            let header: Vec<&str> = lines[0].split(',').map(str::trim).collect();
            let fields: Vec<&str> = lines[1].split(',').map(str::trim).collect();
            if header.len() != fields.len() {
                return Err(MetricParseError::FieldCount {
                    header: header.len(),
                    values: fields.len(),
                });
            }
            let mut stages = Vec::with_capacity(header.len());
            for (stage, field) in header.iter().zip(&fields) {
                let value = field
                    .parse::<f64>()
                    .map_err(|_| MetricParseError::NotNumeric(field.to_string()))?;
                stages.push((stage.to_string(), value));
            }
            Ok(CustomMetricValues::Stages(stages))
        }
        n => Err(MetricParseError::WrongShape(n)),
    }
}

/// Accumulated measurements for one measured stage.
///
/// The stage's command list is a single measured unit: times are summed and
/// peak RSS is maximized across its commands. Output strings are kept per
/// command because they cannot meaningfully aggregate.
#[derive(Debug, Clone, Default)]
pub struct StageMeasurement {
    /// Summed wall-clock seconds
    pub wall_seconds: f64,
    /// Summed user CPU seconds
    pub user_seconds: f64,
    /// Summed system CPU seconds
    pub system_seconds: f64,
    /// Maximum peak RSS across commands, mebibytes
    pub max_rss_mib: f64,
    /// Captured stdout per command, trailing newline stripped
    pub stdout: Vec<String>,
    /// Captured stderr per command, trailing newline stripped
    pub stderr: Vec<String>,
}

impl StageMeasurement {
    /// Start an empty accumulation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one command's outcome into the stage.
    pub fn record(&mut self, outcome: &CommandOutcome) {
        self.wall_seconds += outcome.wall_seconds;
        self.user_seconds += outcome.user_seconds;
        self.system_seconds += outcome.system_seconds;
        self.max_rss_mib = self.max_rss_mib.max(outcome.max_rss_mib);
        self.stdout.push(strip_trailing_newline(&outcome.stdout));
        self.stderr.push(strip_trailing_newline(&outcome.stderr));
    }

    /// The stage's value for a numeric metric; `None` for string metrics.
    pub fn numeric_value(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Time => Some(self.wall_seconds),
            Metric::Utime => Some(self.user_seconds),
            Metric::Stime => Some(self.system_seconds),
            Metric::Rss => Some(self.max_rss_mib),
            Metric::Stdout | Metric::Stderr => None,
        }
    }
}

fn strip_trailing_newline(s: &str) -> String {
    let s = s.strip_suffix('\n').unwrap_or(s);
    let s = s.strip_suffix('\r').unwrap_or(s);
    s.to_string()
}
