//! Pivoted Stat Tables
//!
//! Turns the long-format table into the wide form rendered by table outputs:
//! distinct (stage, metric) pairs become result columns named by a template
//! such as `"{{stage}} {{metric}}"`, rows are keyed by the requested grouping
//! columns, and each result column is expanded once per requested statistic
//! (`min time`, `median time`, ...). Output ordering is deterministic: groups
//! and pivot columns appear in first-appearance order of the underlying rows.

use crate::aggregate::{compute_stat, mean, Stat};
use crate::table::{ResultTable, TableError};
use benchalot_core::{expand, BindingValue, Bindings, Scalar};

/// One row of a pivoted stat table.
#[derive(Debug, Clone, PartialEq)]
pub struct StatRow {
    /// Values of the key columns
    pub key: Vec<String>,
    /// One entry per value column; `None` when the group had no data
    pub values: Vec<Option<f64>>,
}

/// Wide-format table of aggregated results.
#[derive(Debug, Clone, PartialEq)]
pub struct StatTable {
    /// Grouping columns, as requested
    pub key_columns: Vec<String>,
    /// Result columns, `"{stat} {pivot}"` per pivot column and statistic
    pub value_columns: Vec<String>,
    /// Data rows in group first-appearance order
    pub rows: Vec<StatRow>,
}

impl StatTable {
    /// All column headers, key columns first.
    pub fn headers(&self) -> Vec<&str> {
        self.key_columns
            .iter()
            .chain(self.value_columns.iter())
            .map(String::as_str)
            .collect()
    }
}

/// Build a pivoted stat table from numeric rows.
///
/// `key_columns` name flattened binding columns to group by; `pivot_template`
/// derives result-column names from each row's stage and metric; `metrics`
/// optionally restricts which metrics contribute. String-metric rows carry no
/// numeric value and are skipped.
pub fn build_stat_table(
    table: &ResultTable,
    key_columns: &[String],
    pivot_template: &str,
    stats: &[Stat],
    metrics: Option<&[String]>,
) -> Result<StatTable, TableError> {
    let numeric = table.filter(|row| {
        row.value.is_some()
            && metrics
                .map(|wanted| wanted.iter().any(|m| *m == row.metric))
                .unwrap_or(true)
    });

    // Pivot columns in first-appearance order
    let mut pivots: Vec<(String, String, String)> = Vec::new();
    for row in numeric.rows() {
        if !pivots
            .iter()
            .any(|(s, m, _)| *s == row.stage && *m == row.metric)
        {
            let name = pivot_name(pivot_template, &row.stage, &row.metric)?;
            pivots.push((row.stage.clone(), row.metric.clone(), name));
        }
    }

    let groups = numeric.group_by(key_columns)?;

    // Per (group, pivot) value collections
    let mut cells: Vec<Vec<Vec<f64>>> = groups
        .iter()
        .map(|_| pivots.iter().map(|_| Vec::new()).collect())
        .collect();
    for (group_idx, (_, rows)) in groups.iter().enumerate() {
        for row in rows {
            let pivot_idx = pivots
                .iter()
                .position(|(s, m, _)| *s == row.stage && *m == row.metric)
                .expect("pivot registered above");
            cells[group_idx][pivot_idx].push(row.value.expect("numeric rows only"));
        }
    }

    // `relative` needs the smallest group mean per pivot column
    let min_means: Vec<Option<f64>> = (0..pivots.len())
        .map(|pivot_idx| {
            cells
                .iter()
                .filter_map(|group| mean(&group[pivot_idx]))
                .min_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        })
        .collect();

    let mut value_columns = Vec::with_capacity(pivots.len() * stats.len());
    for (_, _, name) in &pivots {
        for stat in stats {
            value_columns.push(format!("{} {}", stat, name));
        }
    }

    let rows = groups
        .iter()
        .enumerate()
        .map(|(group_idx, (key, _))| {
            let mut values = Vec::with_capacity(value_columns.len());
            for (pivot_idx, _) in pivots.iter().enumerate() {
                let group_values = &cells[group_idx][pivot_idx];
                for stat in stats {
                    let value = match stat {
                        Stat::Relative => match (mean(group_values), min_means[pivot_idx]) {
                            (Some(m), Some(best)) if best != 0.0 => Some(m / best),
                            _ => None,
                        },
                        other => compute_stat(*other, group_values),
                    };
                    values.push(value);
                }
            }
            StatRow {
                key: key.clone(),
                values,
            }
        })
        .collect();

    Ok(StatTable {
        key_columns: key_columns.to_vec(),
        value_columns,
        rows,
    })
}

fn pivot_name(template: &str, stage: &str, metric: &str) -> Result<String, TableError> {
    let mut bindings = Bindings::new();
    bindings.insert("stage", BindingValue::Scalar(Scalar::Str(stage.to_string())));
    bindings.insert(
        "metric",
        BindingValue::Scalar(Scalar::Str(metric.to_string())),
    );
    expand(template, &bindings)
        .map(|name| name.trim().to_string())
        .map_err(|err| TableError::UnknownColumn(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::SampleRow;

    fn push(table: &mut ResultTable, var: &str, sample: usize, stage: &str, value: f64) {
        table.append(SampleRow {
            cell: 0,
            bindings: vec![("var".to_string(), var.to_string())],
            sample,
            stage: stage.to_string(),
            metric: "time".to_string(),
            value: Some(value),
            stdout: None,
            stderr: None,
            failed: false,
        });
    }

    fn sample_table() -> ResultTable {
        let mut table = ResultTable::new();
        push(&mut table, "A", 0, "build", 2.0);
        push(&mut table, "A", 1, "build", 4.0);
        push(&mut table, "A", 0, "run", 1.0);
        push(&mut table, "A", 1, "run", 3.0);
        push(&mut table, "B", 0, "build", 6.0);
        push(&mut table, "B", 1, "build", 8.0);
        push(&mut table, "B", 0, "run", 5.0);
        push(&mut table, "B", 1, "run", 7.0);
        table
    }

    #[test]
    fn test_pivot_columns_from_template() {
        let table = sample_table();
        let stat_table = build_stat_table(
            &table,
            &["var".to_string()],
            "{{stage}} {{metric}}",
            &[Stat::Min, Stat::Max],
            None,
        )
        .unwrap();

        assert_eq!(
            stat_table.value_columns,
            vec![
                "min build time",
                "max build time",
                "min run time",
                "max run time"
            ]
        );
        assert_eq!(stat_table.rows.len(), 2);
        assert_eq!(stat_table.rows[0].key, vec!["A".to_string()]);
        assert_eq!(
            stat_table.rows[0].values,
            vec![Some(2.0), Some(4.0), Some(1.0), Some(3.0)]
        );
        assert_eq!(
            stat_table.rows[1].values,
            vec![Some(6.0), Some(8.0), Some(5.0), Some(7.0)]
        );
    }

    #[test]
    fn test_relative_stat_against_best_group() {
        let table = sample_table();
        let stat_table = build_stat_table(
            &table,
            &["var".to_string()],
            "{{stage}}",
            &[Stat::Relative],
            None,
        )
        .unwrap();

        // Build means: A=3, B=7 → relative 1.0 and 7/3
        assert_eq!(stat_table.rows[0].values[0], Some(1.0));
        assert!((stat_table.rows[1].values[0].unwrap() - 7.0 / 3.0).abs() < 1e-12);
        // Run means: A=2, B=6 → relative 1.0 and 3.0
        assert_eq!(stat_table.rows[0].values[1], Some(1.0));
        assert!((stat_table.rows[1].values[1].unwrap() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_metric_filter_drops_other_metrics() {
        let mut table = sample_table();
        table.append(SampleRow {
            cell: 0,
            bindings: vec![("var".to_string(), "A".to_string())],
            sample: 0,
            stage: "memory".to_string(),
            metric: "rss".to_string(),
            value: Some(128.0),
            stdout: None,
            stderr: None,
            failed: false,
        });

        let stat_table = build_stat_table(
            &table,
            &["var".to_string()],
            "{{metric}}",
            &[Stat::Mean],
            Some(&["rss".to_string()]),
        )
        .unwrap();

        assert_eq!(stat_table.value_columns, vec!["mean rss"]);
        assert_eq!(stat_table.rows.len(), 1);
        assert_eq!(stat_table.rows[0].values, vec![Some(128.0)]);
    }

    #[test]
    fn test_unknown_key_column_is_rejected() {
        let table = sample_table();
        assert!(build_stat_table(
            &table,
            &["missing".to_string()],
            "{{stage}}",
            &[Stat::Mean],
            None
        )
        .is_err());
    }
}
