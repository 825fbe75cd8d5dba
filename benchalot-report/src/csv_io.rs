//! Result CSV Round-Trip
//!
//! One row per sample per stage per metric. Columns: the flattened matrix
//! binding columns, then `sample`, `stage`, `metric`, `value`, `stdout`,
//! `stderr`, `failed`. Writing and re-loading a table must reproduce
//! identical post-processor output, so the writer always receives the raw,
//! unfiltered table and numbers are emitted in shortest round-trip form.

use crate::RenderError;
use benchalot_stats::{ResultTable, SampleRow};
use std::io::{Read, Write};
use std::path::Path;

/// Constant columns following the binding columns, in schema order.
const CONSTANT_COLUMNS: [&str; 7] = [
    "sample", "stage", "metric", "value", "stdout", "stderr", "failed",
];

/// Write the table as a result CSV.
pub fn write_results(table: &ResultTable, writer: impl Write) -> Result<(), RenderError> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    let mut header: Vec<&str> = table.binding_columns().iter().map(String::as_str).collect();
    header.extend(CONSTANT_COLUMNS);
    csv_writer.write_record(&header)?;

    for row in table.rows() {
        let mut record: Vec<String> = table
            .binding_columns()
            .iter()
            .map(|col| row.binding(col).unwrap_or_default().to_string())
            .collect();
        record.push(row.sample.to_string());
        record.push(row.stage.clone());
        record.push(row.metric.clone());
        record.push(row.value.map(|v| v.to_string()).unwrap_or_default());
        record.push(row.stdout.clone().unwrap_or_default());
        record.push(row.stderr.clone().unwrap_or_default());
        record.push(row.failed.to_string());
        csv_writer.write_record(&record)?;
    }

    csv_writer.flush()?;
    Ok(())
}

/// Write the table as a result CSV file.
pub fn write_results_file(table: &ResultTable, path: impl AsRef<Path>) -> Result<(), RenderError> {
    let file = std::fs::File::create(path.as_ref())?;
    write_results(table, file)
}

/// Load a result table from CSV.
///
/// Binding columns are everything before the `sample` column. Cells are
/// reassigned by distinct binding tuple in first-appearance order; the
/// post-processor only groups by bindings, so renumbering preserves its
/// output.
pub fn read_results(reader: impl Read) -> Result<ResultTable, RenderError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(false)
        .from_reader(reader);

    let header: Vec<String> = csv_reader
        .headers()?
        .iter()
        .map(|s| s.to_string())
        .collect();
    let sample_idx = header
        .iter()
        .position(|c| c == "sample")
        .ok_or_else(|| RenderError::Schema("missing 'sample' column".to_string()))?;
    let expected: Vec<&str> = header[sample_idx..].iter().map(String::as_str).collect();
    if expected != CONSTANT_COLUMNS {
        return Err(RenderError::Schema(format!(
            "expected trailing columns {:?}, found {:?}",
            CONSTANT_COLUMNS, expected
        )));
    }
    let binding_columns: Vec<String> = header[..sample_idx].to_vec();

    let mut table = ResultTable::new();
    let mut cells: Vec<Vec<(String, String)>> = Vec::new();
    for (line, record) in csv_reader.records().enumerate() {
        let record = record?;
        if record.len() != header.len() {
            return Err(RenderError::Schema(format!(
                "row {} has {} fields, expected {}",
                line + 2,
                record.len(),
                header.len()
            )));
        }
        let bindings: Vec<(String, String)> = binding_columns
            .iter()
            .enumerate()
            .map(|(i, col)| (col.clone(), record[i].to_string()))
            .collect();
        let cell = match cells.iter().position(|b| *b == bindings) {
            Some(index) => index,
            None => {
                cells.push(bindings.clone());
                cells.len() - 1
            }
        };

        let field = |offset: usize| &record[sample_idx + offset];
        let sample: usize = field(0).parse().map_err(|_| {
            RenderError::Schema(format!("bad sample index '{}' on row {}", field(0), line + 2))
        })?;
        let value = if field(3).is_empty() {
            None
        } else {
            Some(field(3).parse::<f64>().map_err(|_| {
                RenderError::Schema(format!("bad value '{}' on row {}", field(3), line + 2))
            })?)
        };
        let failed = match field(6) {
            "true" => true,
            "false" => false,
            other => {
                return Err(RenderError::Schema(format!(
                    "bad failed flag '{}' on row {}",
                    other,
                    line + 2
                )))
            }
        };

        table.append(SampleRow {
            cell,
            bindings,
            sample,
            stage: field(1).to_string(),
            metric: field(2).to_string(),
            value,
            stdout: non_empty(field(4)),
            stderr: non_empty(field(5)),
            failed,
        });
    }

    Ok(table)
}

/// Load a result table from a CSV file.
pub fn read_results_file(path: impl AsRef<Path>) -> Result<ResultTable, RenderError> {
    let file = std::fs::File::open(path.as_ref())?;
    read_results(file)
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}
