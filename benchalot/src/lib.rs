#![warn(missing_docs)]
//! Benchalot - Declarative Benchmark Automation
//!
//! A YAML configuration enumerates variable combinations, lifecycle shell
//! commands and metrics to collect; the engine expands every combination
//! into a benchmark cell, runs each cell the configured number of times,
//! records per-sample measurements in a long-format table, post-processes it
//! (failure and outlier filtering) and renders tabular outputs.
//!
//! Pipeline: validate → plan → (per cell: run lifecycle → collect metrics →
//! append rows) → post-process → render. `--results-from-csv` skips planning
//! and execution and resumes at post-processing.

pub mod config;
pub mod executor;
pub mod output;
pub mod planner;
pub mod split;
pub mod system;

use anyhow::{bail, Context, Result};
use clap::Parser;
use config::Config;
use executor::Executor;
use output::OutputFlags;
use std::path::PathBuf;
use system::SystemGuard;

/// Benchalot CLI arguments
#[derive(Parser, Debug)]
#[command(name = "benchalot")]
#[command(version, about = "Benchalot - automates repeatable software benchmarks")]
pub struct Cli {
    /// Path to the YAML configuration file
    pub config: PathBuf,

    /// Print the expanded plan (one line per cell) and exit without running
    /// any command
    #[arg(short, long)]
    pub plan: bool,

    /// Skip planning and execution; load sample rows from a result CSV and
    /// resume at post-processing
    #[arg(short = 'r', long, value_name = "PATH")]
    pub results_from_csv: Option<PathBuf>,

    /// Concatenate sample rows from a result CSV before post-processing;
    /// may be given multiple times
    #[arg(long, value_name = "PATH")]
    pub include: Vec<PathBuf>,

    /// Write one partial configuration per value of VAR to 'out/' and exit
    #[arg(long, value_name = "VAR")]
    pub split: Option<String>,

    /// Do not filter out failed samples
    #[arg(long)]
    pub include_failed: bool,

    /// Do not filter out outliers
    #[arg(long)]
    pub include_outliers: bool,

    /// Print basic progress information
    #[arg(short, long)]
    pub verbose: bool,

    /// Print debug information
    #[arg(short, long)]
    pub debug: bool,
}

/// Parse arguments and run the engine. Entry point for the binary.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    run_with_cli(cli)
}

/// Run the engine with pre-parsed arguments.
pub fn run_with_cli(cli: Cli) -> Result<()> {
    init_logging(&cli);

    let config = Config::load(&cli.config)?;

    if let Some(variable) = &cli.split {
        return split::split_config(&cli.config, variable);
    }

    for path in &cli.include {
        if !path.is_file() {
            bail!("--include: file '{}' not found", path.display());
        }
    }

    let datetime = chrono::Local::now()
        .format("%Y-%m-%d--%H-%M-%S")
        .to_string();

    if cli.plan {
        let plan = planner::build_plan(&config, &datetime)?;
        output::print_plan(&plan);
        return Ok(());
    }

    let mut table = match &cli.results_from_csv {
        Some(path) => benchalot_report::read_results_file(path)
            .with_context(|| format!("cannot load results from '{}'", path.display()))?,
        None => {
            let plan = planner::build_plan(&config, &datetime)?;
            install_interrupt_handler();

            // Applied once before the first cell, restored after the last on
            // every exit path
            let guard = if config.system.modifies_system() {
                Some(SystemGuard::apply(&config.system)?)
            } else {
                None
            };
            let outcome = Executor::new(&config).execute(&plan)?;
            drop(guard);

            let table = outcome.table;
            if outcome.interrupted {
                // Flush what we have, then report the abort
                write_all_outputs(&config, &table, &cli, &datetime)?;
                report_failures(outcome.failed_samples, &outcome.log_files);
                bail!("interrupted; partial results were written");
            }
            report_failures(outcome.failed_samples, &outcome.log_files);
            table
        }
    };

    for path in &cli.include {
        let old = benchalot_report::read_results_file(path)
            .with_context(|| format!("cannot load results from '{}'", path.display()))?;
        table.concat(old);
    }

    write_all_outputs(&config, &table, &cli, &datetime)?;
    Ok(())
}

fn write_all_outputs(
    config: &Config,
    table: &benchalot_stats::ResultTable,
    cli: &Cli,
    datetime: &str,
) -> Result<()> {
    let flags = OutputFlags {
        include_failed: cli.include_failed,
        include_outliers: cli.include_outliers,
    };
    output::write_outputs(config, table, flags, datetime)
}

fn report_failures(failed_samples: usize, log_files: &[PathBuf]) {
    if failed_samples == 0 {
        return;
    }
    if log_files.is_empty() {
        eprintln!(
            "{} sample(s) failed; set 'save-output' to keep command output",
            failed_samples
        );
    } else {
        let logs: Vec<String> = log_files
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        eprintln!(
            "{} sample(s) failed; command output saved to: {}",
            failed_samples,
            logs.join(", ")
        );
    }
}

fn init_logging(cli: &Cli) {
    let filter = if cli.debug {
        "benchalot=debug,benchalot_core=debug"
    } else if cli.verbose {
        "benchalot=info,benchalot_core=info"
    } else {
        "benchalot=warn,benchalot_core=warn"
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

extern "C" fn handle_sigint(_: libc::c_int) {
    // Only an atomic store; async-signal-safe
    executor::request_interrupt();
}

fn install_interrupt_handler() {
    let handler = handle_sigint as extern "C" fn(libc::c_int);
    // SAFETY: the handler does nothing but set an atomic flag
    unsafe {
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
    }
}
