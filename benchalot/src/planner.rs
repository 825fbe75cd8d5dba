//! Benchmark Planner
//!
//! Expands the validated configuration into a totally-ordered list of
//! benchmark cells. The matrix is the Cartesian product of each variable's
//! value list in declaration order with the last variable varying fastest;
//! `exclude` entries drop points by partial match, `include` entries are
//! appended verbatim afterwards. Every command, path and environment value is
//! template-expanded once, here; bindings are immutable from then on.

use crate::config::{BenchmarkSection, Config};
use anyhow::{Context, Result};
use benchalot_core::{expand, BindingValue, Bindings, Scalar};
use std::path::PathBuf;

/// Where a cell's command output log goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveTarget {
    /// Stream to the engine's standard output
    Stdout,
    /// Stream to the engine's standard error
    Stderr,
    /// Append to a per-cell file
    File(PathBuf),
}

/// One fully-resolved benchmark cell
#[derive(Debug, Clone)]
pub struct BenchmarkCell {
    /// Plan-order index, 0-based
    pub index: usize,
    /// This cell's matrix point; empty when no matrix is declared
    pub bindings: Bindings,
    /// Commands run once, before any sample
    pub setup: Vec<String>,
    /// Commands run before each sample's measured section
    pub prepare: Vec<String>,
    /// Measured stages as (stage name, commands); implicit sections keep
    /// their single command list under [`BenchmarkCell::implicit`]
    pub benchmark: Vec<(String, Vec<String>)>,
    /// Whether the benchmark section was a plain command list
    pub implicit: bool,
    /// Commands run after each sample's measured section
    pub conclude: Vec<String>,
    /// Commands run once, after all samples
    pub cleanup: Vec<String>,
    /// Custom metrics as (name, command)
    pub custom_metrics: Vec<(String, String)>,
    /// Working directory for every command of this cell
    pub cwd: Option<PathBuf>,
    /// Environment delta for every command of this cell
    pub env: Vec<(String, String)>,
    /// Output log target
    pub save_output: Option<SaveTarget>,
}

impl BenchmarkCell {
    /// Short `var=value` summary of the cell's bindings for progress output.
    pub fn binding_summary(&self) -> String {
        if self.bindings.is_empty() {
            return "-".to_string();
        }
        self.bindings
            .flatten()
            .iter()
            .map(|(column, value)| format!("{}={}", column, value))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// The expanded execution plan
#[derive(Debug, Clone)]
pub struct Plan {
    /// Cells in execution order
    pub cells: Vec<BenchmarkCell>,
    /// The reserved `datetime` binding shared by every cell
    pub datetime: String,
}

/// Expand the configuration into an execution plan.
///
/// `datetime` is the plan's start timestamp in filename-safe form; it is
/// bound for template expansion but is not part of any matrix point.
pub fn build_plan(config: &Config, datetime: &str) -> Result<Plan> {
    let points = matrix_points(config);
    let mut cells = Vec::with_capacity(points.len());
    for bindings in points {
        let index = cells.len();
        cells.push(build_cell(config, bindings, index, datetime)?);
    }
    Ok(Plan {
        cells,
        datetime: datetime.to_string(),
    })
}

/// All matrix points after exclude filtering, with include entries appended.
fn matrix_points(config: &Config) -> Vec<Bindings> {
    if config.matrix.is_empty() && config.include.is_empty() {
        return vec![Bindings::new()];
    }

    let mut points = Vec::new();
    if !config.matrix.is_empty() {
        let total: usize = config.matrix.iter().map(|v| v.values.len()).product();
        for mut remainder in 0..total {
            // Build the point from the fastest-varying (last) variable upward
            let mut reversed: Vec<(String, BindingValue)> = Vec::new();
            for variable in config.matrix.iter().rev() {
                let k = variable.values.len();
                reversed.push((variable.name.clone(), variable.values[remainder % k].clone()));
                remainder /= k;
            }
            let point: Bindings = reversed.into_iter().rev().collect();
            if !is_excluded(&point, config) {
                points.push(point);
            }
        }
    }

    for entry in &config.include {
        // Declaration order of the matrix, not the entry, fixes column order
        let point: Bindings = config
            .matrix
            .iter()
            .filter_map(|variable| {
                entry
                    .iter()
                    .find(|(name, _)| *name == variable.name)
                    .cloned()
            })
            .collect();
        points.push(point);
    }

    points
}

fn is_excluded(point: &Bindings, config: &Config) -> bool {
    config.exclude.iter().any(|entry| {
        entry
            .iter()
            .all(|(name, value)| point.get(name) == Some(value))
    })
}

fn build_cell(
    config: &Config,
    bindings: Bindings,
    index: usize,
    datetime: &str,
) -> Result<BenchmarkCell> {
    // The reserved binding is visible to templates only
    let mut scope = bindings.clone();
    scope.insert(
        "datetime",
        BindingValue::Scalar(Scalar::Str(datetime.to_string())),
    );

    let expand_all = |commands: &[String], section: &str| -> Result<Vec<String>> {
        commands
            .iter()
            .map(|command| {
                expand(command, &scope)
                    .with_context(|| format!("{}: cannot expand '{}'", section, command))
            })
            .collect()
    };

    let (benchmark, implicit) = match &config.benchmark {
        BenchmarkSection::Implicit(commands) => {
            let expanded = expand_all(commands, "benchmark")?;
            if expanded.is_empty() {
                // Custom metrics only; nothing to measure
                (Vec::new(), true)
            } else {
                (vec![(String::new(), expanded)], true)
            }
        }
        BenchmarkSection::Stages(stages) => {
            let mut out = Vec::with_capacity(stages.len());
            for (stage, commands) in stages {
                out.push((
                    stage.clone(),
                    expand_all(commands, &format!("benchmark.{}", stage))?,
                ));
            }
            (out, false)
        }
    };

    let custom_metrics = config
        .custom_metrics
        .iter()
        .map(|(name, command)| {
            expand(command, &scope)
                .map(|expanded| (name.clone(), expanded))
                .with_context(|| format!("custom-metrics.{}: cannot expand command", name))
        })
        .collect::<Result<Vec<_>>>()?;

    let cwd = config
        .cwd
        .as_deref()
        .map(|dir| expand(dir, &scope).context("cwd: cannot expand"))
        .transpose()?
        .map(PathBuf::from);

    let env = config
        .env
        .iter()
        .map(|(key, value)| {
            expand(value, &scope)
                .map(|expanded| (key.clone(), expanded))
                .with_context(|| format!("env.{}: cannot expand", key))
        })
        .collect::<Result<Vec<_>>>()?;

    let save_output = match config.save_output.as_deref() {
        None => None,
        Some("STDOUT") => Some(SaveTarget::Stdout),
        Some("STDERR") => Some(SaveTarget::Stderr),
        Some(template) => Some(SaveTarget::File(PathBuf::from(
            expand(template, &scope).context("save-output: cannot expand")?,
        ))),
    };

    Ok(BenchmarkCell {
        index,
        bindings,
        setup: expand_all(&config.setup, "setup")?,
        prepare: expand_all(&config.prepare, "prepare")?,
        benchmark,
        implicit,
        conclude: expand_all(&config.conclude, "conclude")?,
        cleanup: expand_all(&config.cleanup, "cleanup")?,
        custom_metrics,
        cwd,
        env,
        save_output,
    })
}

/// Render the plan as one line per cell: index, bindings and the benchmark
/// commands. Used by `--plan`; sample count does not appear here.
pub fn format_plan(plan: &Plan) -> String {
    let mut out = String::new();
    for cell in &plan.cells {
        let stages = cell
            .benchmark
            .iter()
            .map(|(stage, commands)| {
                let joined = commands.join(" && ");
                if cell.implicit {
                    joined
                } else {
                    format!("{}: {}", stage, joined)
                }
            })
            .collect::<Vec<_>>()
            .join(" | ");
        out.push_str(&format!("{} | {} | {}\n", cell.index, cell.binding_summary(), stages));
    }
    out
}
