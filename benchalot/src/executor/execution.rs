//! Lifecycle Execution
//!
//! Per cell: `setup` once, then `samples` repetitions of
//! `prepare → benchmark stages → conclude → custom metrics`, then `cleanup`
//! once. A non-zero exit marks the current sample as failed but execution
//! continues through the remaining commands and states, so `conclude` and
//! `cleanup` always run. `setup` failure fails every sample of the cell;
//! `cleanup` failure is reported but does not cancel subsequent cells.
//!
//! An interrupt (SIGINT) is honored between commands: the current command
//! finishes, the current cell's `cleanup` runs, completed samples stay in the
//! table, a cut-short sample is dropped, and the engine stops.

use crate::config::Config;
use crate::planner::{BenchmarkCell, Plan, SaveTarget};
use anyhow::{bail, Result};
use benchalot_core::{
    parse_custom_metric, run_command, CommandOutcome, CustomMetricValues, Metric, StageMeasurement,
};
use benchalot_stats::{ResultTable, SampleRow};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Mark the engine as interrupted; called from the SIGINT handler.
///
/// The flag is checked between commands, never mid-command, so the current
/// child always runs to completion.
pub fn request_interrupt() {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Result of executing a plan
#[derive(Debug)]
pub struct ExecutionOutcome {
    /// The materialized result table
    pub table: ResultTable,
    /// Number of samples with at least one failed command
    pub failed_samples: usize,
    /// Whether execution stopped on an interrupt
    pub interrupted: bool,
    /// Log files written via `save-output`
    pub log_files: Vec<PathBuf>,
}

/// Outcome of one non-measured command list
struct SectionStatus {
    /// Every command exited zero
    success: bool,
    /// An interrupt cut the list short
    aborted: bool,
}

/// Executes benchmark cells and collects sample rows
pub struct Executor<'a> {
    config: &'a Config,
    interrupt: &'a AtomicBool,
    opened_logs: HashSet<PathBuf>,
    log_files: Vec<PathBuf>,
}

enum LogSink {
    Null,
    Stdout,
    Stderr,
    File(std::fs::File),
}

impl LogSink {
    /// Append one command's combined output under a delimiter line naming
    /// the cell and stage.
    fn record(&mut self, cell: usize, stage: &str, command: &str, outcome: &CommandOutcome) {
        if matches!(self, LogSink::Null) {
            return;
        }
        let mut text = format!("### cell {} [{}]: {}\n", cell, stage, command);
        for stream in [&outcome.stdout, &outcome.stderr] {
            text.push_str(stream);
            if !stream.is_empty() && !stream.ends_with('\n') {
                text.push('\n');
            }
        }
        let result = match self {
            LogSink::Null => Ok(()),
            LogSink::Stdout => std::io::stdout().write_all(text.as_bytes()),
            LogSink::Stderr => std::io::stderr().write_all(text.as_bytes()),
            LogSink::File(file) => file.write_all(text.as_bytes()),
        };
        if let Err(err) = result {
            tracing::warn!("cannot write output log: {}", err);
        }
    }
}

impl<'a> Executor<'a> {
    /// Create an executor for one configuration, observing the process-wide
    /// interrupt flag.
    pub fn new(config: &'a Config) -> Self {
        Executor {
            config,
            interrupt: &INTERRUPTED,
            opened_logs: HashSet::new(),
            log_files: Vec::new(),
        }
    }

    /// Observe a caller-provided interrupt flag instead of the global one.
    pub fn with_interrupt(mut self, flag: &'a AtomicBool) -> Self {
        self.interrupt = flag;
        self
    }

    fn interrupted(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }

    /// Execute every cell of the plan sequentially.
    ///
    /// Only catastrophic conditions (missing working directory, a shell that
    /// cannot be spawned) return an error; command failures become data.
    pub fn execute(mut self, plan: &Plan) -> Result<ExecutionOutcome> {
        let samples = self.config.samples as usize;
        let bar = ProgressBar::new((plan.cells.len() * samples) as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );

        let mut table = ResultTable::new();
        let mut failed_samples = 0;

        for cell in &plan.cells {
            if self.interrupted() {
                break;
            }
            if let Some(dir) = &cell.cwd {
                if !dir.is_dir() {
                    bail!("cwd: directory '{}' not found", dir.display());
                }
            }
            tracing::info!(
                cell = cell.index,
                bindings = %cell.binding_summary(),
                "running cell"
            );
            let mut sink = self.open_sink(cell);
            let flat_bindings = cell.bindings.flatten();

            // Setup failure taints every sample of the cell
            let cell_failed = !self
                .run_section(cell, &mut sink, "setup", &cell.setup, &bar)?
                .success;

            for sample in 0..samples {
                if self.interrupted() {
                    break;
                }
                let mut sample_failed = cell_failed;
                let mut sample_aborted = false;

                let prepare = self.run_section(cell, &mut sink, "prepare", &cell.prepare, &bar)?;
                sample_failed |= !prepare.success;
                sample_aborted |= prepare.aborted;

                let mut measurements: Vec<(String, StageMeasurement)> = Vec::new();
                if !sample_aborted {
                    'stages: for (stage, commands) in &cell.benchmark {
                        let label: &str = if cell.implicit { "benchmark" } else { stage };
                        let mut measurement = StageMeasurement::new();
                        for command in commands {
                            if self.interrupted() {
                                sample_aborted = true;
                                break 'stages;
                            }
                            bar.set_message(command.clone());
                            let outcome = run_command(command, cell.cwd.as_deref(), &cell.env)?;
                            sink.record(cell.index, label, command, &outcome);
                            sample_failed |= !outcome.success();
                            measurement.record(&outcome);
                        }
                        measurements.push((stage.clone(), measurement));
                    }
                }

                if !sample_aborted {
                    let conclude =
                        self.run_section(cell, &mut sink, "conclude", &cell.conclude, &bar)?;
                    sample_failed |= !conclude.success;
                    sample_aborted |= conclude.aborted;
                }

                let mut custom_rows: Vec<(String, String, Option<f64>)> = Vec::new();
                if !sample_aborted {
                    for (name, command) in &cell.custom_metrics {
                        if self.interrupted() {
                            sample_aborted = true;
                            break;
                        }
                        bar.set_message(command.clone());
                        let outcome = run_command(command, cell.cwd.as_deref(), &cell.env)?;
                        sink.record(cell.index, name, command, &outcome);
                        sample_failed |= !outcome.success();
                        match parse_custom_metric(&outcome.stdout) {
                            Ok(CustomMetricValues::Single(value)) => {
                                custom_rows.push((name.clone(), name.clone(), Some(value)));
                            }
                            Ok(CustomMetricValues::Stages(stages)) => {
                                for (stage, value) in stages {
                                    custom_rows.push((name.clone(), stage, Some(value)));
                                }
                            }
                            Err(err) => {
                                tracing::error!(metric = %name, "custom metric failed: {}", err);
                                sample_failed = true;
                                custom_rows.push((name.clone(), name.clone(), None));
                            }
                        }
                    }
                }

                if sample_aborted {
                    // A cut-short sample would violate the row-count contract
                    break;
                }

                self.emit_sample_rows(
                    &mut table,
                    cell,
                    &flat_bindings,
                    sample,
                    &measurements,
                    &custom_rows,
                    sample_failed,
                );
                if sample_failed {
                    failed_samples += 1;
                }
                bar.inc(1);
            }

            // Cleanup always runs, interrupt or not
            let cleanup = self.run_section(cell, &mut sink, "cleanup", &cell.cleanup, &bar)?;
            if !cleanup.success {
                tracing::error!(cell = cell.index, "cleanup failed; continuing");
            }
        }

        let was_interrupted = self.interrupted();
        bar.finish_with_message(if was_interrupted {
            "Interrupted"
        } else {
            "Complete"
        });

        Ok(ExecutionOutcome {
            table,
            failed_samples,
            interrupted: was_interrupted,
            log_files: self.log_files,
        })
    }

    /// Run a non-measured command list. Cleanup ignores the interrupt flag so
    /// it always runs to completion.
    fn run_section(
        &mut self,
        cell: &BenchmarkCell,
        sink: &mut LogSink,
        section: &str,
        commands: &[String],
        bar: &ProgressBar,
    ) -> Result<SectionStatus> {
        let interruptible = section != "cleanup";
        let mut status = SectionStatus {
            success: true,
            aborted: false,
        };
        for command in commands {
            if interruptible && self.interrupted() {
                status.aborted = true;
                break;
            }
            bar.set_message(command.clone());
            let outcome = run_command(command, cell.cwd.as_deref(), &cell.env)?;
            sink.record(cell.index, section, command, &outcome);
            status.success &= outcome.success();
        }
        Ok(status)
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_sample_rows(
        &self,
        table: &mut ResultTable,
        cell: &BenchmarkCell,
        bindings: &[(String, String)],
        sample: usize,
        measurements: &[(String, StageMeasurement)],
        custom_rows: &[(String, String, Option<f64>)],
        failed: bool,
    ) {
        let row = |stage: String, metric: String| SampleRow {
            cell: cell.index,
            bindings: bindings.to_vec(),
            sample,
            stage,
            metric,
            value: None,
            stdout: None,
            stderr: None,
            failed,
        };

        for (stage, measurement) in measurements {
            for metric in &self.config.metrics {
                if !metric.is_numeric() {
                    continue;
                }
                let stage_name = if cell.implicit {
                    metric.name().to_string()
                } else {
                    stage.clone()
                };
                let mut sample_row = row(stage_name, metric.name().to_string());
                sample_row.value = measurement.numeric_value(*metric);
                table.append(sample_row);
            }
            // String metrics: one row per benchmark command, keyed by the
            // command's ordinal so rows stay unique
            for metric in &self.config.metrics {
                match metric {
                    Metric::Stdout => {
                        for (index, text) in measurement.stdout.iter().enumerate() {
                            let mut sample_row =
                                row(index.to_string(), Metric::Stdout.name().to_string());
                            sample_row.stdout = Some(text.clone());
                            table.append(sample_row);
                        }
                    }
                    Metric::Stderr => {
                        for (index, text) in measurement.stderr.iter().enumerate() {
                            let mut sample_row =
                                row(index.to_string(), Metric::Stderr.name().to_string());
                            sample_row.stderr = Some(text.clone());
                            table.append(sample_row);
                        }
                    }
                    _ => {}
                }
            }
        }

        for (metric, stage, value) in custom_rows {
            let mut sample_row = row(stage.clone(), metric.clone());
            sample_row.value = *value;
            table.append(sample_row);
        }
    }

    fn open_sink(&mut self, cell: &BenchmarkCell) -> LogSink {
        match &cell.save_output {
            None => LogSink::Null,
            Some(SaveTarget::Stdout) => LogSink::Stdout,
            Some(SaveTarget::Stderr) => LogSink::Stderr,
            Some(SaveTarget::File(path)) => {
                // First open truncates; later cells with the same templated
                // target append
                let first = self.opened_logs.insert(path.clone());
                let file = if first {
                    std::fs::File::create(path)
                } else {
                    std::fs::OpenOptions::new().append(true).open(path)
                };
                match file {
                    Ok(file) => {
                        if first {
                            self.log_files.push(path.clone());
                        }
                        LogSink::File(file)
                    }
                    Err(err) => {
                        tracing::warn!(
                            "cannot open output log '{}': {}; output will not be saved",
                            path.display(),
                            err
                        );
                        LogSink::Null
                    }
                }
            }
        }
    }
}
