//! Configuration Loading and Validation
//!
//! The YAML surface is deserialized into a permissive raw schema, then
//! validated into the closed [`Config`] model the rest of the engine works
//! with: an ordered matrix, a normalized benchmark section (implicit command
//! list or explicit stage map), an enum set of metrics and format-tagged
//! result blocks. Validation errors name the offending key path.

use anyhow::{anyhow, bail, Context, Result};
use benchalot_core::{find_placeholders, BindingValue, Metric, Scalar};
use benchalot_report::OutputFormat;
use benchalot_stats::Stat;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::path::Path;

/// Column names that matrix variables must not shadow.
pub const RESERVED_COLUMNS: [&str; 8] = [
    "sample", "stage", "metric", "value", "stdout", "stderr", "failed", "datetime",
];

/// Raw configuration file schema, prior to validation
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    matrix: Mapping,
    #[serde(default)]
    exclude: Vec<Mapping>,
    #[serde(default)]
    include: Vec<Mapping>,
    #[serde(default = "default_samples")]
    samples: u32,
    #[serde(default)]
    setup: CommandList,
    #[serde(default)]
    prepare: CommandList,
    #[serde(default)]
    benchmark: Option<RawBenchmark>,
    #[serde(default)]
    conclude: CommandList,
    #[serde(default)]
    cleanup: CommandList,
    #[serde(default, rename = "custom-metrics")]
    custom_metrics: Vec<Mapping>,
    #[serde(default)]
    metrics: Option<Vec<Metric>>,
    #[serde(default)]
    cwd: Option<String>,
    #[serde(default)]
    env: Mapping,
    #[serde(default, rename = "save-output")]
    save_output: Option<String>,
    #[serde(default)]
    system: SystemSection,
    #[serde(default)]
    results: Mapping,
}

fn default_samples() -> u32 {
    1
}

/// A command section: a single (possibly multi-line) string or a list.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(untagged)]
enum CommandList {
    #[default]
    #[serde(skip)]
    Empty,
    One(String),
    Many(Vec<String>),
}

impl CommandList {
    fn into_commands(self) -> Vec<String> {
        match self {
            CommandList::Empty => Vec::new(),
            CommandList::One(cmd) => vec![cmd],
            CommandList::Many(cmds) => cmds,
        }
    }
}

/// Raw `benchmark` section: a command list or a stage → commands mapping.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawBenchmark {
    Commands(CommandList),
    Stages(Mapping),
}

/// `system` section: variance-reducing, system-modifying options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct SystemSection {
    /// CPU ids to shield with `cset`
    #[serde(default)]
    pub isolate_cpus: Vec<u32>,
    /// Disable address space layout randomization
    #[serde(default)]
    pub disable_aslr: bool,
    /// Disable simultaneous multi-threading
    #[serde(default)]
    pub disable_smt: bool,
    /// Disable core boosting
    #[serde(default)]
    pub disable_core_boost: bool,
    /// Switch the CPU frequency governor to `performance`
    #[serde(default)]
    pub governor_performance: bool,
}

impl SystemSection {
    /// Whether applying this section changes any system state.
    pub fn modifies_system(&self) -> bool {
        !self.isolate_cpus.is_empty()
            || self.disable_aslr
            || self.disable_smt
            || self.disable_core_boost
            || self.governor_performance
    }
}

/// Options shared by the `md` and `html` table blocks
#[derive(Debug, Clone, Deserialize)]
pub struct TableOptions {
    /// Variables shown as key columns; defaults to every matrix variable
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    /// Statistics per result column
    #[serde(default = "default_stats")]
    pub stats: Vec<Stat>,
    /// Template deriving result-column names from stage and metric
    #[serde(default = "default_pivot")]
    pub pivot: String,
    /// Restrict the table to these metrics
    #[serde(default)]
    pub metrics: Option<Vec<String>>,
}

fn default_stats() -> Vec<Stat> {
    vec![Stat::Min, Stat::Median, Stat::Max]
}

fn default_pivot() -> String {
    "{{stage}} {{metric}}".to_string()
}

impl Default for TableOptions {
    fn default() -> Self {
        TableOptions {
            columns: None,
            stats: default_stats(),
            pivot: default_pivot(),
            metrics: None,
        }
    }
}

/// Options shared by the plot blocks; rendering is delegated to an external
/// backend, the engine only validates, partitions and names.
#[derive(Debug, Clone, Deserialize)]
pub struct PlotOptions {
    /// Variable used as the x axis
    #[serde(default, rename = "x-axis")]
    pub x_axis: Option<String>,
    /// Metric used as the y axis
    #[serde(default, rename = "y-axis")]
    pub y_axis: Option<String>,
    /// Variable used as the color channel
    #[serde(default)]
    pub color: Option<String>,
    /// Variable used to facet the plot
    #[serde(default)]
    pub facet: Option<String>,
    /// Image width in inches
    #[serde(default = "default_plot_width")]
    pub width: u32,
    /// Image height in inches
    #[serde(default = "default_plot_height")]
    pub height: u32,
    /// Image resolution
    #[serde(default = "default_plot_dpi")]
    pub dpi: u32,
}

fn default_plot_width() -> u32 {
    10
}
fn default_plot_height() -> u32 {
    9
}
fn default_plot_dpi() -> u32 {
    100
}

/// One result block, tagged by its `format`
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum ResultBlock {
    /// Raw sample CSV; always receives the unfiltered table
    Csv {
        /// Target filename, template-expanded
        filename: String,
        /// Overwrite an existing file instead of renaming it aside
        #[serde(default)]
        overwrite: bool,
    },
    /// Markdown stat table
    Md {
        /// Target filename, template-expanded
        filename: String,
        /// Table shaping options
        #[serde(flatten)]
        table: TableOptions,
    },
    /// HTML stat table
    Html {
        /// Target filename, template-expanded
        filename: String,
        /// Table shaping options
        #[serde(flatten)]
        table: TableOptions,
    },
    /// Scatter plot (external backend)
    Scatter {
        /// Target filename, template-expanded
        filename: String,
        /// Plot shaping options
        #[serde(flatten)]
        plot: PlotOptions,
    },
    /// Bar chart (external backend)
    Bar {
        /// Target filename, template-expanded
        filename: String,
        /// Plot shaping options
        #[serde(flatten)]
        plot: PlotOptions,
        /// Statistic determining bar height
        #[serde(default = "default_bar_stat")]
        stat: Stat,
    },
    /// Box plot (external backend)
    Box {
        /// Target filename, template-expanded
        filename: String,
        /// Plot shaping options
        #[serde(flatten)]
        plot: PlotOptions,
    },
    /// Violin plot (external backend)
    Violin {
        /// Target filename, template-expanded
        filename: String,
        /// Plot shaping options
        #[serde(flatten)]
        plot: PlotOptions,
    },
}

fn default_bar_stat() -> Stat {
    Stat::Median
}

impl ResultBlock {
    /// The block's filename template.
    pub fn filename(&self) -> &str {
        match self {
            ResultBlock::Csv { filename, .. }
            | ResultBlock::Md { filename, .. }
            | ResultBlock::Html { filename, .. }
            | ResultBlock::Scatter { filename, .. }
            | ResultBlock::Bar { filename, .. }
            | ResultBlock::Box { filename, .. }
            | ResultBlock::Violin { filename, .. } => filename,
        }
    }

    /// The block's output format.
    pub fn format(&self) -> OutputFormat {
        match self {
            ResultBlock::Csv { .. } => OutputFormat::Csv,
            ResultBlock::Md { .. } => OutputFormat::Md,
            ResultBlock::Html { .. } => OutputFormat::Html,
            ResultBlock::Scatter { .. } => OutputFormat::Scatter,
            ResultBlock::Bar { .. } => OutputFormat::Bar,
            ResultBlock::Box { .. } => OutputFormat::Box,
            ResultBlock::Violin { .. } => OutputFormat::Violin,
        }
    }

    /// Plot options, when the block is a plot.
    pub fn plot_options(&self) -> Option<&PlotOptions> {
        match self {
            ResultBlock::Scatter { plot, .. }
            | ResultBlock::Bar { plot, .. }
            | ResultBlock::Box { plot, .. }
            | ResultBlock::Violin { plot, .. } => Some(plot),
            _ => None,
        }
    }
}

/// The `benchmark` section, normalized
#[derive(Debug, Clone, PartialEq)]
pub enum BenchmarkSection {
    /// Plain command list; the whole list is one measured unit whose rows
    /// carry the metric's own name as their stage
    Implicit(Vec<String>),
    /// Explicit stage → command list mapping, declaration order preserved
    Stages(Vec<(String, Vec<String>)>),
}

impl BenchmarkSection {
    /// Whether the section declares no commands at all.
    pub fn is_empty(&self) -> bool {
        match self {
            BenchmarkSection::Implicit(cmds) => cmds.is_empty(),
            BenchmarkSection::Stages(stages) => stages.iter().all(|(_, c)| c.is_empty()),
        }
    }
}

/// One matrix variable with its value list
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixVariable {
    /// Variable name
    pub name: String,
    /// Declared values, scalars or homogeneous records
    pub values: Vec<BindingValue>,
}

/// Validated configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Matrix variables in declaration order
    pub matrix: Vec<MatrixVariable>,
    /// Partial bindings dropped from the matrix product
    pub exclude: Vec<Vec<(String, BindingValue)>>,
    /// Complete bindings appended after the filtered product
    pub include: Vec<Vec<(String, BindingValue)>>,
    /// Repetitions of the measured section per cell
    pub samples: u32,
    /// Commands run once per cell, before any sample
    pub setup: Vec<String>,
    /// Commands run before each sample's measured section
    pub prepare: Vec<String>,
    /// The measured section
    pub benchmark: BenchmarkSection,
    /// Commands run after each sample's measured section
    pub conclude: Vec<String>,
    /// Commands run once per cell, after all samples
    pub cleanup: Vec<String>,
    /// Custom metrics as (name, command) pairs
    pub custom_metrics: Vec<(String, String)>,
    /// Active built-in metrics, canonical order, duplicates removed
    pub metrics: Vec<Metric>,
    /// Working directory template for all commands
    pub cwd: Option<String>,
    /// Environment delta, template-expanded per cell
    pub env: Vec<(String, String)>,
    /// Output log target template, or the literals `STDOUT`/`STDERR`
    pub save_output: Option<String>,
    /// System variance controls
    pub system: SystemSection,
    /// Result blocks in declaration order
    pub results: Vec<(String, ResultBlock)>,
}

impl Config {
    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read configuration file '{}'", path.display()))?;
        Config::parse(&text)
    }

    /// Parse and validate configuration text.
    pub fn parse(text: &str) -> Result<Config> {
        let raw: RawConfig =
            serde_yaml::from_str(text).context("configuration does not match the schema")?;
        validate(raw)
    }

    /// Names of all matrix variables, in declaration order.
    pub fn variable_names(&self) -> Vec<&str> {
        self.matrix.iter().map(|v| v.name.as_str()).collect()
    }
}

fn validate(raw: RawConfig) -> Result<Config> {
    if raw.samples == 0 {
        bail!("samples: must be a positive integer");
    }

    let matrix = validate_matrix(&raw.matrix)?;
    let exclude = validate_bindings_list(&raw.exclude, &matrix, "exclude", false)?;
    let include = validate_bindings_list(&raw.include, &matrix, "include", true)?;

    let benchmark = normalize_benchmark(raw.benchmark)?;
    let custom_metrics = validate_custom_metrics(&raw.custom_metrics)?;
    if benchmark.is_empty() && custom_metrics.is_empty() {
        bail!("at least one of 'benchmark' or 'custom-metrics' must be present");
    }

    let metrics = validate_metrics(raw.metrics)?;
    if matches!(benchmark, BenchmarkSection::Stages(_))
        && metrics
            .iter()
            .any(|m| matches!(m, Metric::Stdout | Metric::Stderr))
    {
        bail!(
            "metrics: 'stdout'/'stderr' cannot be combined with explicit benchmark stages; \
             they capture a single string per command, not per stage"
        );
    }
    for (name, _) in &custom_metrics {
        if metrics.iter().any(|m| m.name() == name) {
            bail!("custom-metrics.{}: shadows a built-in metric", name);
        }
    }

    let env = validate_env(&raw.env)?;
    let results = validate_results(&raw.results, &matrix, &metrics, &custom_metrics)?;

    if let Some(cwd) = raw.cwd.as_deref() {
        // Only statically checkable when the path is not templated
        if find_placeholders(cwd).is_empty() && !Path::new(cwd).is_dir() {
            bail!("cwd: directory '{}' not found", cwd);
        }
    }
    if let Some(save_output) = raw.save_output.as_deref() {
        if save_output != "STDOUT" && save_output != "STDERR" {
            check_template_vars(save_output, &matrix, "save-output")?;
        }
    }

    Ok(Config {
        matrix,
        exclude,
        include,
        samples: raw.samples,
        setup: raw.setup.into_commands(),
        prepare: raw.prepare.into_commands(),
        benchmark,
        conclude: raw.conclude.into_commands(),
        cleanup: raw.cleanup.into_commands(),
        custom_metrics,
        metrics,
        cwd: raw.cwd,
        env,
        save_output: raw.save_output,
        system: raw.system,
        results,
    })
}

fn key_string(key: &Value, path: &str) -> Result<String> {
    match key {
        Value::String(s) => Ok(s.clone()),
        other => bail!("{}: key {:?} is not a string", path, other),
    }
}

fn scalar_from_yaml(value: &Value, path: &str) -> Result<Scalar> {
    match value {
        Value::String(s) => Ok(Scalar::Str(s.clone())),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Scalar::Int(i))
            } else {
                Ok(Scalar::Float(n.as_f64().ok_or_else(|| {
                    anyhow!("{}: number out of range", path)
                })?))
            }
        }
        Value::Bool(b) => Ok(Scalar::Bool(*b)),
        _ => bail!("{}: expected a scalar value", path),
    }
}

fn binding_from_yaml(value: &Value, path: &str) -> Result<BindingValue> {
    match value {
        Value::Mapping(fields) => {
            let mut record = Vec::with_capacity(fields.len());
            for (key, field_value) in fields {
                let field = key_string(key, path)?;
                let scalar = scalar_from_yaml(field_value, &format!("{}.{}", path, field))?;
                record.push((field, scalar));
            }
            if record.is_empty() {
                bail!("{}: record must have at least one field", path);
            }
            Ok(BindingValue::Compound(record))
        }
        other => Ok(BindingValue::Scalar(scalar_from_yaml(other, path)?)),
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn validate_matrix(matrix: &Mapping) -> Result<Vec<MatrixVariable>> {
    let mut variables = Vec::with_capacity(matrix.len());
    for (key, value) in matrix {
        let name = key_string(key, "matrix")?;
        let path = format!("matrix.{}", name);
        if RESERVED_COLUMNS.contains(&name.as_str()) {
            bail!("{}: '{}' is a reserved column name", path, name);
        }
        if !is_identifier(&name) {
            bail!("{}: variable name is not a valid identifier", path);
        }
        let Value::Sequence(items) = value else {
            bail!("{}: must be a list of values", path);
        };
        if items.is_empty() {
            bail!("{}: value list must not be empty", path);
        }
        let mut values = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            values.push(binding_from_yaml(item, &format!("{}[{}]", path, index))?);
        }
        check_homogeneous(&mut values, &path)?;
        variables.push(MatrixVariable { name, values });
    }
    Ok(variables)
}

/// All values of one variable must be scalars, or records sharing one field
/// set; records are reordered to the first record's field order.
fn check_homogeneous(values: &mut [BindingValue], path: &str) -> Result<()> {
    let first_fields: Option<Vec<String>> = match &values[0] {
        BindingValue::Scalar(_) => None,
        BindingValue::Compound(fields) => {
            Some(fields.iter().map(|(name, _)| name.clone()).collect())
        }
    };
    for (index, value) in values.iter_mut().enumerate() {
        match (&first_fields, value) {
            (None, BindingValue::Scalar(_)) => {}
            (Some(expected), BindingValue::Compound(fields)) => {
                let mut reordered = Vec::with_capacity(expected.len());
                for field in expected {
                    let found = fields
                        .iter()
                        .find(|(name, _)| name == field)
                        .cloned()
                        .ok_or_else(|| {
                            anyhow!("{}[{}]: missing field '{}'", path, index, field)
                        })?;
                    reordered.push(found);
                }
                if reordered.len() != fields.len() {
                    bail!("{}[{}]: records must share the same field names", path, index);
                }
                *fields = reordered;
            }
            _ => bail!(
                "{}[{}]: values must be all scalars or all records with the same fields",
                path,
                index
            ),
        }
    }
    Ok(())
}

fn validate_bindings_list(
    entries: &[Mapping],
    matrix: &[MatrixVariable],
    section: &str,
    complete: bool,
) -> Result<Vec<Vec<(String, BindingValue)>>> {
    let mut out = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let path = format!("{}[{}]", section, index);
        let mut bindings = Vec::with_capacity(entry.len());
        for (key, value) in entry {
            let name = key_string(key, &path)?;
            let Some(variable) = matrix.iter().find(|v| v.name == name) else {
                bail!("{}.{}: variable not declared in 'matrix'", path, name);
            };
            let entry_path = format!("{}.{}", path, name);
            let value = binding_from_yaml(value, &entry_path)?;
            let value = normalize_against(&variable.values[0], value, &entry_path)?;
            bindings.push((name.clone(), value));
        }
        if bindings.is_empty() {
            bail!("{}: entry must bind at least one variable", path);
        }
        if complete {
            for variable in matrix {
                if !bindings.iter().any(|(name, _)| *name == variable.name) {
                    bail!("{}: missing a value for variable '{}'", path, variable.name);
                }
            }
        }
        out.push(bindings);
    }
    Ok(out)
}

/// Reshape an `exclude`/`include` value to the declared variable's shape so
/// that equality against matrix points compares field-for-field.
fn normalize_against(
    declared: &BindingValue,
    value: BindingValue,
    path: &str,
) -> Result<BindingValue> {
    match (declared, value) {
        (BindingValue::Scalar(_), scalar @ BindingValue::Scalar(_)) => Ok(scalar),
        (BindingValue::Compound(declared_fields), BindingValue::Compound(fields)) => {
            let mut reordered = Vec::with_capacity(declared_fields.len());
            for (field, _) in declared_fields {
                let found = fields
                    .iter()
                    .find(|(name, _)| name == field)
                    .cloned()
                    .ok_or_else(|| anyhow!("{}: missing field '{}'", path, field))?;
                reordered.push(found);
            }
            if reordered.len() != fields.len() {
                bail!("{}: fields do not match the variable's records", path);
            }
            Ok(BindingValue::Compound(reordered))
        }
        (BindingValue::Scalar(_), BindingValue::Compound(_)) => {
            bail!("{}: variable is scalar but a record was given", path)
        }
        (BindingValue::Compound(_), BindingValue::Scalar(_)) => {
            bail!("{}: variable is a record but a scalar was given", path)
        }
    }
}

fn normalize_benchmark(raw: Option<RawBenchmark>) -> Result<BenchmarkSection> {
    match raw {
        None => Ok(BenchmarkSection::Implicit(Vec::new())),
        Some(RawBenchmark::Commands(list)) => Ok(BenchmarkSection::Implicit(list.into_commands())),
        Some(RawBenchmark::Stages(stages)) => {
            let mut out = Vec::with_capacity(stages.len());
            for (key, value) in &stages {
                let stage = key_string(key, "benchmark")?;
                if !is_identifier(&stage) {
                    bail!("benchmark.{}: stage name is not a valid identifier", stage);
                }
                let commands: CommandList = serde_yaml::from_value(value.clone())
                    .map_err(|_| anyhow!("benchmark.{}: must be a command or list", stage))?;
                out.push((stage, commands.into_commands()));
            }
            if out.is_empty() {
                bail!("benchmark: stage mapping must not be empty");
            }
            Ok(BenchmarkSection::Stages(out))
        }
    }
}

fn validate_custom_metrics(entries: &[Mapping]) -> Result<Vec<(String, String)>> {
    let mut out = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let path = format!("custom-metrics[{}]", index);
        if entry.len() != 1 {
            bail!("{}: expected a single 'name: command' mapping", path);
        }
        let (key, value) = entry.iter().next().expect("len checked");
        let name = key_string(key, &path)?;
        let Value::String(command) = value else {
            bail!("{}.{}: command must be a string", path, name);
        };
        if out.iter().any(|(existing, _)| *existing == name) {
            bail!("{}.{}: duplicate metric name", path, name);
        }
        out.push((name, command.clone()));
    }
    Ok(out)
}

fn validate_metrics(metrics: Option<Vec<Metric>>) -> Result<Vec<Metric>> {
    match metrics {
        None => Ok(vec![Metric::Time]),
        Some(list) => {
            if list.is_empty() {
                bail!("metrics: list must not be empty");
            }
            let mut out = Vec::new();
            for metric in list {
                if !out.contains(&metric) {
                    out.push(metric);
                }
            }
            Ok(out)
        }
    }
}

fn validate_env(env: &Mapping) -> Result<Vec<(String, String)>> {
    let mut out = Vec::with_capacity(env.len());
    for (key, value) in env {
        let name = key_string(key, "env")?;
        let scalar = scalar_from_yaml(value, &format!("env.{}", name))?;
        out.push((name, scalar.to_string()));
    }
    Ok(out)
}

fn check_template_vars(template: &str, matrix: &[MatrixVariable], path: &str) -> Result<()> {
    for var in find_placeholders(template) {
        if var != "datetime" && !matrix.iter().any(|v| v.name == var) {
            bail!("{}: template references undeclared variable '{}'", path, var);
        }
    }
    Ok(())
}

fn check_column(column: &str, matrix: &[MatrixVariable], path: &str) -> Result<()> {
    let constant = matches!(column, "stage" | "metric" | "sample" | "failed");
    if !constant && !matrix.iter().any(|v| v.name == column) {
        bail!("{}: column '{}' not found", path, column);
    }
    Ok(())
}

fn validate_results(
    results: &Mapping,
    matrix: &[MatrixVariable],
    metrics: &[Metric],
    custom_metrics: &[(String, String)],
) -> Result<Vec<(String, ResultBlock)>> {
    let metric_names: Vec<String> = metrics
        .iter()
        .map(|m| m.name().to_string())
        .chain(custom_metrics.iter().map(|(n, _)| n.clone()))
        .collect();

    let mut out = Vec::with_capacity(results.len());
    for (key, value) in results {
        let name = key_string(key, "results")?;
        let path = format!("results.{}", name);
        let block: ResultBlock = serde_yaml::from_value(value.clone())
            .map_err(|err| anyhow!("{}: {}", path, err))?;

        check_template_vars(block.filename(), matrix, &format!("{}.filename", path))?;

        match &block {
            ResultBlock::Md { table, .. } | ResultBlock::Html { table, .. } => {
                if let Some(columns) = &table.columns {
                    for column in columns {
                        check_column(column, matrix, &format!("{}.columns", path))?;
                    }
                }
                if table.stats.is_empty() {
                    bail!("{}.stats: list must not be empty", path);
                }
                for var in find_placeholders(&table.pivot) {
                    if var != "stage" && var != "metric" {
                        bail!(
                            "{}.pivot: only 'stage' and 'metric' may be referenced, got '{}'",
                            path,
                            var
                        );
                    }
                }
                if let Some(wanted) = &table.metrics {
                    for metric in wanted {
                        if !metric_names.contains(metric) {
                            bail!("{}.metrics: metric '{}' not found", path, metric);
                        }
                    }
                }
            }
            ResultBlock::Bar { plot, .. }
            | ResultBlock::Scatter { plot, .. }
            | ResultBlock::Box { plot, .. }
            | ResultBlock::Violin { plot, .. } => {
                for (option, value) in [
                    ("x-axis", &plot.x_axis),
                    ("color", &plot.color),
                    ("facet", &plot.facet),
                ] {
                    if let Some(column) = value {
                        check_column(column, matrix, &format!("{}.{}", path, option))?;
                    }
                }
                if let Some(metric) = &plot.y_axis {
                    if !metric_names.contains(metric) {
                        bail!("{}.y-axis: metric '{}' not found", path, metric);
                    }
                }
            }
            ResultBlock::Csv { .. } => {}
        }

        out.push((name, block));
    }

    // A raw CSV export is always produced so results survive any run
    if !out
        .iter()
        .any(|(_, block)| matches!(block, ResultBlock::Csv { .. }))
    {
        out.push((
            "default-csv".to_string(),
            ResultBlock::Csv {
                filename: "result.csv".to_string(),
                overwrite: false,
            },
        ));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = "benchmark:\n  - echo test\n";

    #[test]
    fn test_minimal_config() {
        let config = Config::parse(MINIMAL).unwrap();
        assert_eq!(config.samples, 1);
        assert_eq!(config.metrics, vec![Metric::Time]);
        assert_eq!(
            config.benchmark,
            BenchmarkSection::Implicit(vec!["echo test".to_string()])
        );
        // Default CSV block is injected
        assert_eq!(config.results.len(), 1);
        assert_eq!(config.results[0].1.format(), OutputFormat::Csv);
    }

    #[test]
    fn test_multiline_benchmark_scalar() {
        let config = Config::parse("benchmark: |\n  echo line1\n  echo line2\n").unwrap();
        assert_eq!(
            config.benchmark,
            BenchmarkSection::Implicit(vec!["echo line1\necho line2\n".to_string()])
        );
    }

    #[test]
    fn test_explicit_stages_keep_order() {
        let text = "benchmark:\n  build:\n    - make\n  run:\n    - ./app\n";
        let config = Config::parse(text).unwrap();
        match config.benchmark {
            BenchmarkSection::Stages(stages) => {
                assert_eq!(stages[0].0, "build");
                assert_eq!(stages[1].0, "run");
            }
            other => panic!("expected stages, got {:?}", other),
        }
    }

    #[test]
    fn test_matrix_order_and_records() {
        let text = "\
matrix:
  var: [A, B]
  build:
    - cc: gcc
      opt: -O2
    - cc: clang
      opt: -O3
benchmark:
  - echo {{var}} {{build.cc}}
";
        let config = Config::parse(text).unwrap();
        assert_eq!(config.variable_names(), vec!["var", "build"]);
        match &config.matrix[1].values[0] {
            BindingValue::Compound(fields) => assert_eq!(fields[0].0, "cc"),
            other => panic!("expected record, got {:?}", other),
        }
    }

    #[test]
    fn test_heterogeneous_records_rejected() {
        let text = "\
matrix:
  build:
    - cc: gcc
    - opt: -O3
benchmark: [echo x]
";
        let err = Config::parse(text).unwrap_err().to_string();
        assert!(err.contains("matrix.build"), "got: {}", err);
    }

    #[test]
    fn test_reserved_variable_name_rejected() {
        let err = Config::parse("matrix:\n  stage: [a]\nbenchmark: [echo x]\n")
            .unwrap_err()
            .to_string();
        assert!(err.contains("reserved"), "got: {}", err);
    }

    #[test]
    fn test_requires_benchmark_or_custom_metrics() {
        assert!(Config::parse("samples: 3\n").is_err());
        assert!(Config::parse("custom-metrics:\n  - size: stat -c%s out.bin\n").is_ok());
    }

    #[test]
    fn test_zero_samples_rejected() {
        let err = Config::parse("benchmark: [echo x]\nsamples: 0\n")
            .unwrap_err()
            .to_string();
        assert!(err.contains("samples"), "got: {}", err);
    }

    #[test]
    fn test_metrics_default_and_dedup() {
        let config = Config::parse("benchmark: [echo x]\nmetrics: [time, rss, time]\n").unwrap();
        assert_eq!(config.metrics, vec![Metric::Time, Metric::Rss]);
        let err = Config::parse("benchmark: [echo x]\nmetrics: []\n")
            .unwrap_err()
            .to_string();
        assert!(err.contains("metrics"), "got: {}", err);
    }

    #[test]
    fn test_unknown_metric_rejected() {
        assert!(Config::parse("benchmark: [echo x]\nmetrics: [watts]\n").is_err());
    }

    #[test]
    fn test_stdout_with_stages_rejected() {
        let text = "benchmark:\n  build: [make]\nmetrics: [stdout]\n";
        let err = Config::parse(text).unwrap_err().to_string();
        assert!(err.contains("stdout"), "got: {}", err);
    }

    #[test]
    fn test_exclude_references_declared_variables() {
        let text = "\
matrix:
  var: [A, B]
exclude:
  - other: A
benchmark: [echo x]
";
        let err = Config::parse(text).unwrap_err().to_string();
        assert!(err.contains("exclude[0].other"), "got: {}", err);
    }

    #[test]
    fn test_exclude_record_fields_follow_declaration_order() {
        let text = "\
matrix:
  build:
    - cc: gcc
      opt: -O2
    - cc: clang
      opt: -O3
exclude:
  - build:
      opt: -O2
      cc: gcc
benchmark: [echo x]
";
        let config = Config::parse(text).unwrap();
        // Reordered to the matrix's field order so point matching compares
        assert_eq!(config.exclude[0][0].1, config.matrix[0].values[0]);
    }

    #[test]
    fn test_include_must_be_complete() {
        let text = "\
matrix:
  var: [A, B]
  n: [1, 2]
include:
  - var: C
benchmark: [echo x]
";
        let err = Config::parse(text).unwrap_err().to_string();
        assert!(err.contains("include[0]"), "got: {}", err);
        assert!(err.contains("'n'"), "got: {}", err);
    }

    #[test]
    fn test_result_blocks() {
        let text = "\
matrix:
  var: [A]
benchmark: [echo x]
results:
  table:
    format: md
    filename: table-{{var}}.md
    stats: [mean, relative]
  raw:
    format: csv
    filename: out.csv
    overwrite: true
";
        let config = Config::parse(text).unwrap();
        assert_eq!(config.results.len(), 2);
        assert_eq!(config.results[0].1.format(), OutputFormat::Md);
        match &config.results[1].1 {
            ResultBlock::Csv { overwrite, .. } => assert!(overwrite),
            other => panic!("expected csv block, got {:?}", other),
        }
    }

    #[test]
    fn test_result_block_bad_filename_variable() {
        let text = "\
benchmark: [echo x]
results:
  raw:
    format: csv
    filename: out-{{nope}}.csv
";
        let err = Config::parse(text).unwrap_err().to_string();
        assert!(err.contains("results.raw.filename"), "got: {}", err);
    }

    #[test]
    fn test_result_block_unknown_format() {
        let text = "benchmark: [echo x]\nresults:\n  p:\n    format: pdf\n    filename: x.pdf\n";
        assert!(Config::parse(text).is_err());
    }

    #[test]
    fn test_table_metrics_must_exist() {
        let text = "\
benchmark: [echo x]
results:
  t:
    format: md
    filename: t.md
    metrics: [rss]
";
        let err = Config::parse(text).unwrap_err().to_string();
        assert!(err.contains("results.t.metrics"), "got: {}", err);
    }

    #[test]
    fn test_plot_block_options() {
        let text = "\
matrix:
  var: [A]
benchmark: [echo x]
metrics: [time, rss]
results:
  chart:
    format: bar
    filename: chart.png
    x-axis: var
    y-axis: rss
";
        let config = Config::parse(text).unwrap();
        let (_, block) = &config.results[0];
        assert_eq!(block.format(), OutputFormat::Bar);
        assert_eq!(block.plot_options().unwrap().width, 10);
    }

    #[test]
    fn test_env_numbers_become_strings() {
        let config = Config::parse("benchmark: [echo x]\nenv:\n  N: 4\n  S: text\n").unwrap();
        assert_eq!(
            config.env,
            vec![
                ("N".to_string(), "4".to_string()),
                ("S".to_string(), "text".to_string())
            ]
        );
    }

    #[test]
    fn test_custom_metric_shadowing_builtin_rejected() {
        let text = "benchmark: [echo x]\ncustom-metrics:\n  - time: echo 1\n";
        assert!(Config::parse(text).is_err());
    }

    #[test]
    fn test_system_section() {
        let text = "\
benchmark: [echo x]
system:
  isolate-cpus: [2, 3]
  disable-aslr: true
";
        let config = Config::parse(text).unwrap();
        assert!(config.system.modifies_system());
        assert_eq!(config.system.isolate_cpus, vec![2, 3]);
        assert!(!SystemSection::default().modifies_system());
    }

    #[test]
    fn test_unknown_top_level_key_rejected() {
        assert!(Config::parse("benchmark: [echo x]\nbogus: 1\n").is_err());
    }
}
