//! Output Driver
//!
//! Consumes the post-processed table and renders every result block.
//! Filename templates referencing matrix variables partition the table, one
//! file per partition; existing targets are renamed aside unless the block
//! opts into overwriting. Table and plot blocks receive the filtered table,
//! CSV blocks always receive every raw sample so nothing is lost between
//! runs.

use crate::config::{Config, ResultBlock, TableOptions};
use crate::planner::Plan;
use anyhow::{anyhow, Context, Result};
use benchalot_core::{expand, find_placeholders, BindingValue, Bindings, Scalar};
use benchalot_report::{render_html, render_markdown, write_results_file};
use benchalot_stats::{build_stat_table, ResultTable, StatTable};
use std::path::{Path, PathBuf};

/// Post-processor switches taken from the CLI
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputFlags {
    /// Keep samples whose `failed` flag is set
    pub include_failed: bool,
    /// Keep samples flagged as outliers
    pub include_outliers: bool,
}

/// Render every configured result block and print the final summary table.
pub fn write_outputs(
    config: &Config,
    table: &ResultTable,
    flags: OutputFlags,
    datetime: &str,
) -> Result<()> {
    let filtered = apply_filters(table, flags);
    let mut summary: Option<StatTable> = None;

    for (name, block) in &config.results {
        // The raw CSV export keeps every sample regardless of filters
        let source = match block {
            ResultBlock::Csv { .. } => table,
            _ => &filtered,
        };

        let variables: Vec<String> = find_placeholders(block.filename())
            .into_iter()
            .filter(|var| var != "datetime")
            .collect();

        for (key, partition) in source.partition_by(&variables) {
            let filename = partition_filename(block.filename(), &key, datetime)
                .with_context(|| format!("results.{}: cannot expand filename", name))?;
            let path = PathBuf::from(&filename);

            if block.format().is_plot() {
                // Graphical rendering lives in an external backend; the
                // driver's contract ends at partitioning and naming
                tracing::warn!(
                    "results.{}: no built-in backend renders '{}' plots; skipping '{}'",
                    name,
                    block.format().name(),
                    path.display()
                );
                continue;
            }
            prepare_target(&path, block)?;

            match block {
                ResultBlock::Csv { .. } => {
                    write_results_file(&partition, &path)
                        .with_context(|| format!("results.{}: cannot write CSV", name))?;
                }
                ResultBlock::Md { table: options, .. } => {
                    let stat_table = shape_table(config, &partition, options)?;
                    std::fs::write(&path, render_markdown(&stat_table))
                        .with_context(|| format!("results.{}: cannot write table", name))?;
                    summary = Some(stat_table);
                }
                ResultBlock::Html { table: options, .. } => {
                    let stat_table = shape_table(config, &partition, options)?;
                    std::fs::write(&path, render_html(&stat_table))
                        .with_context(|| format!("results.{}: cannot write table", name))?;
                    summary = Some(stat_table);
                }
                _ => unreachable!("plot formats handled above"),
            }
            tracing::info!("wrote {}", path.display());
        }
    }

    // Final stdout summary: the last rendered table, or a default stat table
    let summary = match summary {
        Some(table) => table,
        None => shape_table(config, &filtered, &TableOptions::default())?,
    };
    println!("{}", render_markdown(&summary));
    Ok(())
}

fn apply_filters(table: &ResultTable, flags: OutputFlags) -> ResultTable {
    let mut filtered = table.clone();
    if !flags.include_failed {
        filtered = filtered.without_failures();
    }
    if !flags.include_outliers {
        filtered = filtered.without_outliers();
    }
    filtered
}

/// Build the wide stat table for a table block against one partition.
fn shape_table(
    config: &Config,
    partition: &ResultTable,
    options: &TableOptions,
) -> Result<StatTable> {
    let requested: Vec<String> = match &options.columns {
        Some(columns) => columns.clone(),
        None => config
            .variable_names()
            .into_iter()
            .map(str::to_string)
            .collect(),
    };
    let key_columns = resolve_columns(&requested, partition)?;
    build_stat_table(
        partition,
        &key_columns,
        &options.pivot,
        &options.stats,
        options.metrics.as_deref(),
    )
    .map_err(|err| anyhow!("cannot build stat table: {}", err))
}

/// Map requested column names to the flattened columns actually present:
/// a compound variable name selects all of its `var.field` columns.
fn resolve_columns(requested: &[String], table: &ResultTable) -> Result<Vec<String>> {
    let mut out = Vec::new();
    for name in requested {
        if table.binding_columns().contains(name)
            || matches!(name.as_str(), "stage" | "metric" | "sample" | "failed")
        {
            out.push(name.clone());
            continue;
        }
        let prefix = format!("{}.", name);
        let fields: Vec<String> = table
            .binding_columns()
            .iter()
            .filter(|col| col.starts_with(&prefix))
            .cloned()
            .collect();
        if fields.is_empty() {
            // Column absent from this run's table (e.g. loaded results with
            // fewer variables); skip rather than fail the whole output
            tracing::warn!("column '{}' not present in results; skipping", name);
            continue;
        }
        out.extend(fields);
    }
    Ok(out)
}

/// Expand one partition's filename template.
fn partition_filename(
    template: &str,
    key: &[(String, String)],
    datetime: &str,
) -> Result<String> {
    let mut bindings = bindings_from_flattened(key);
    bindings.insert(
        "datetime",
        BindingValue::Scalar(Scalar::Str(datetime.to_string())),
    );
    Ok(expand(template, &bindings)?)
}

/// Rebuild compound bindings from flattened `(column, value)` pairs so
/// filename templates can address `{{var}}` and `{{var.field}}` alike.
fn bindings_from_flattened(pairs: &[(String, String)]) -> Bindings {
    let mut bindings = Bindings::new();
    for (column, value) in pairs {
        match column.split_once('.') {
            None => bindings.insert(
                column.clone(),
                BindingValue::Scalar(Scalar::Str(value.clone())),
            ),
            Some((variable, field)) => {
                let mut fields = match bindings.get(variable) {
                    Some(BindingValue::Compound(existing)) => existing.clone(),
                    _ => Vec::new(),
                };
                fields.push((field.to_string(), Scalar::Str(value.clone())));
                bindings.insert(variable.to_string(), BindingValue::Compound(fields));
            }
        }
    }
    bindings
}

/// Move an existing target aside with a numeric suffix, unless the block
/// overwrites. Parent directories are created for fresh targets.
fn prepare_target(path: &Path, block: &ResultBlock) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("cannot create '{}'", parent.display()))?;
        }
    }
    let overwrite = matches!(block, ResultBlock::Csv { overwrite: true, .. });
    if overwrite || !path.exists() {
        return Ok(());
    }
    for counter in 1.. {
        let backup = PathBuf::from(format!("{}.{}", path.display(), counter));
        if !backup.exists() {
            std::fs::rename(path, &backup)
                .with_context(|| format!("cannot rename '{}' aside", path.display()))?;
            tracing::info!(
                "renamed existing '{}' to '{}'",
                path.display(),
                backup.display()
            );
            break;
        }
    }
    Ok(())
}

/// Print the expanded plan, one line per cell, without running anything.
pub fn print_plan(plan: &Plan) {
    print!("{}", crate::planner::format_plan(plan));
}
