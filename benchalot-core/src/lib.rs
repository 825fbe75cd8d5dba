#![warn(missing_docs)]
//! Benchalot Core - Command Execution Runtime
//!
//! This crate provides the execution environment for benchmark commands:
//! - `{{variable}}` template expansion over matrix bindings
//! - Shell command execution with piped output capture
//! - Per-child resource accounting via `wait4(2)` (wall/user/system time, peak RSS)
//! - Custom-metric output parsing (numeric token or two-line CSV)

mod command;
mod metrics;
mod template;

pub use command::{run_command, CommandError, CommandOutcome};
pub use metrics::{
    parse_custom_metric, CustomMetricValues, Metric, MetricParseError, StageMeasurement,
};
pub use template::{expand, find_placeholders, BindingValue, Bindings, Scalar, TemplateError};
