//! Long-Format Result Table
//!
//! The unit of storage is one [`SampleRow`] per (cell, sample, stage, metric).
//! Matrix bindings are flattened to string-valued columns (`var` or
//! `var.field`); numeric measurements go to `value`, captured streams to the
//! dedicated `stdout`/`stderr` columns. The table is append-only; filters
//! produce new tables, grouping produces borrowed views.

use thiserror::Error;

/// Errors from table operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    /// A requested column is neither a binding column nor a constant column.
    #[error("column '{0}' not found in results")]
    UnknownColumn(String),
}

/// One measurement appended to the result table.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRow {
    /// Plan-order index of the owning benchmark cell
    pub cell: usize,
    /// Flattened matrix bindings as (column, value) pairs
    pub bindings: Vec<(String, String)>,
    /// Zero-based repetition index within the cell
    pub sample: usize,
    /// Stage name
    pub stage: String,
    /// Metric name (built-in or custom)
    pub metric: String,
    /// Numeric measurement; `None` for string metrics
    pub value: Option<f64>,
    /// Captured stdout for the `stdout` metric
    pub stdout: Option<String>,
    /// Captured stderr for the `stderr` metric
    pub stderr: Option<String>,
    /// Whether any command of this sample exited non-zero
    pub failed: bool,
}

impl SampleRow {
    /// Look up a flattened binding column on this row.
    pub fn binding(&self, column: &str) -> Option<&str> {
        self.bindings
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v.as_str())
    }
}

/// Append-only long-format table of sample rows.
#[derive(Debug, Clone, Default)]
pub struct ResultTable {
    binding_columns: Vec<String>,
    rows: Vec<SampleRow>,
}

impl ResultTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one row, registering any new binding columns in first-seen order.
    pub fn append(&mut self, row: SampleRow) {
        for (column, _) in &row.bindings {
            if !self.binding_columns.contains(column) {
                self.binding_columns.push(column.clone());
            }
        }
        self.rows.push(row);
    }

    /// Concatenate another table, renumbering its cells past this table's.
    ///
    /// Keeps cells from different runs distinct when old results are included
    /// alongside fresh ones.
    pub fn concat(&mut self, other: ResultTable) {
        let offset = self.rows.iter().map(|r| r.cell + 1).max().unwrap_or(0);
        for mut row in other.rows {
            row.cell += offset;
            self.append(row);
        }
    }

    /// All rows in append order.
    pub fn rows(&self) -> &[SampleRow] {
        &self.rows
    }

    /// Flattened binding columns in first-seen order.
    pub fn binding_columns(&self) -> &[String] {
        &self.binding_columns
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// New table containing the rows matching `predicate`.
    pub fn filter(&self, predicate: impl Fn(&SampleRow) -> bool) -> ResultTable {
        let mut out = ResultTable::new();
        // Keep the full column set even if a filter empties a column's rows
        out.binding_columns = self.binding_columns.clone();
        for row in &self.rows {
            if predicate(row) {
                out.rows.push(row.clone());
            }
        }
        out
    }

    /// Rows with the `failed` flag cleared.
    pub fn without_failures(&self) -> ResultTable {
        self.filter(|row| !row.failed)
    }

    /// Rows surviving modified Z-score outlier detection.
    ///
    /// Outliers are flagged per (bindings, stage, metric) group; string-metric
    /// rows are never outliers.
    pub fn without_outliers(&self) -> ResultTable {
        let flags = crate::outliers::flag_outliers(self);
        let mut out = ResultTable::new();
        out.binding_columns = self.binding_columns.clone();
        for (row, flagged) in self.rows.iter().zip(flags) {
            if !flagged {
                out.rows.push(row.clone());
            }
        }
        out
    }

    /// Group rows by the values of `columns`, in first-appearance order.
    ///
    /// Fails if a named column does not exist on any row.
    pub fn group_by<'a>(
        &'a self,
        columns: &[String],
    ) -> Result<Vec<(Vec<String>, Vec<&'a SampleRow>)>, TableError> {
        for column in columns {
            let known = self.binding_columns.contains(column)
                || matches!(column.as_str(), "stage" | "metric" | "sample" | "failed");
            if !known {
                return Err(TableError::UnknownColumn(column.clone()));
            }
        }
        let mut groups: Vec<(Vec<String>, Vec<&SampleRow>)> = Vec::new();
        for row in &self.rows {
            let key: Vec<String> = columns.iter().map(|c| row_key_value(row, c)).collect();
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, rows)) => rows.push(row),
                None => groups.push((key, vec![row])),
            }
        }
        Ok(groups)
    }

    /// Partition the table by the values of the given matrix variables.
    ///
    /// A compound variable partitions by all of its `var.field` columns.
    /// Returns `(flattened key bindings, sub-table)` pairs in first-appearance
    /// order; with no variables, the whole table is one partition.
    pub fn partition_by(&self, variables: &[String]) -> Vec<(Vec<(String, String)>, ResultTable)> {
        let columns: Vec<String> = self
            .binding_columns
            .iter()
            .filter(|col| {
                variables.iter().any(|var| {
                    *col == var || col.starts_with(&format!("{}.", var))
                })
            })
            .cloned()
            .collect();
        if columns.is_empty() {
            return vec![(Vec::new(), self.clone())];
        }
        let mut partitions: Vec<(Vec<(String, String)>, ResultTable)> = Vec::new();
        for row in &self.rows {
            let key: Vec<(String, String)> = columns
                .iter()
                .map(|c| (c.clone(), row.binding(c).unwrap_or_default().to_string()))
                .collect();
            match partitions.iter_mut().find(|(k, _)| *k == key) {
                Some((_, table)) => table.append(row.clone()),
                None => {
                    let mut table = ResultTable::new();
                    table.binding_columns = self.binding_columns.clone();
                    table.rows.push(row.clone());
                    partitions.push((key, table));
                }
            }
        }
        partitions
    }
}

fn row_key_value(row: &SampleRow, column: &str) -> String {
    match column {
        "stage" => row.stage.clone(),
        "metric" => row.metric.clone(),
        "sample" => row.sample.to_string(),
        "failed" => row.failed.to_string(),
        other => row.binding(other).unwrap_or_default().to_string(),
    }
}
