//! Outlier Detection
//!
//! Uses the modified Z-score: `Z = 0.6745 * (x - median) / MAD`, where MAD is
//! the median absolute deviation from the median. Values with `|Z| > 3.5` are
//! outliers; a zero MAD means the spread is degenerate and nothing is flagged.
//!
//! Detection runs per (matrix bindings, stage, metric) group so that cells
//! are only ever compared against their own repetitions.

use crate::table::{ResultTable, SampleRow};
use crate::{MAD_SCALE, OUTLIER_THRESHOLD};

/// Result of outlier analysis over one value group
#[derive(Debug, Clone)]
pub struct OutlierAnalysis {
    /// Original samples (all data preserved)
    pub all_samples: Vec<f64>,
    /// Indices of outlier samples
    pub outlier_indices: Vec<usize>,
    /// Median of the samples
    pub median: f64,
    /// Median absolute deviation from the median
    pub mad: f64,
}

impl OutlierAnalysis {
    /// Number of flagged outliers.
    pub fn outlier_count(&self) -> usize {
        self.outlier_indices.len()
    }
}

/// Compute the modified Z-score of every value.
///
/// With a zero MAD, all scores are zero so nothing crosses the threshold.
pub fn modified_z_scores(values: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let med = median_of(values);
    let deviations: Vec<f64> = values.iter().map(|v| (v - med).abs()).collect();
    let mad = median_of(&deviations);
    if mad == 0.0 {
        return vec![0.0; values.len()];
    }
    values
        .iter()
        .map(|v| MAD_SCALE * (v - med) / mad)
        .collect()
}

/// Detect outliers in one group of values.
pub fn detect_outliers(values: &[f64]) -> OutlierAnalysis {
    if values.is_empty() {
        return OutlierAnalysis {
            all_samples: Vec::new(),
            outlier_indices: Vec::new(),
            median: 0.0,
            mad: 0.0,
        };
    }
    let med = median_of(values);
    let deviations: Vec<f64> = values.iter().map(|v| (v - med).abs()).collect();
    let mad = median_of(&deviations);

    let mut outlier_indices = Vec::new();
    if mad != 0.0 {
        for (i, value) in values.iter().enumerate() {
            let z = MAD_SCALE * (value - med) / mad;
            if z.abs() > OUTLIER_THRESHOLD {
                outlier_indices.push(i);
            }
        }
    }

    OutlierAnalysis {
        all_samples: values.to_vec(),
        outlier_indices,
        median: med,
        mad,
    }
}

/// Flag every row of the table whose numeric value is an outlier within its
/// (bindings, stage, metric) group.
///
/// The returned vector parallels `table.rows()`. Rows without a numeric value
/// are never flagged.
pub fn flag_outliers(table: &ResultTable) -> Vec<bool> {
    let mut flags = vec![false; table.len()];
    let mut groups: Vec<(GroupKey<'_>, Vec<usize>)> = Vec::new();

    for (index, row) in table.rows().iter().enumerate() {
        if row.value.is_none() {
            continue;
        }
        let key = GroupKey::of(row);
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(index),
            None => groups.push((key, vec![index])),
        }
    }

    for (_, members) in groups {
        let values: Vec<f64> = members
            .iter()
            .map(|&i| table.rows()[i].value.expect("group members are numeric"))
            .collect();
        let analysis = detect_outliers(&values);
        for &offset in &analysis.outlier_indices {
            flags[members[offset]] = true;
        }
    }

    flags
}

#[derive(PartialEq)]
struct GroupKey<'a> {
    bindings: &'a [(String, String)],
    stage: &'a str,
    metric: &'a str,
}

impl<'a> GroupKey<'a> {
    fn of(row: &'a SampleRow) -> Self {
        GroupKey {
            bindings: &row.bindings,
            stage: &row.stage,
            metric: &row.metric,
        }
    }
}

fn median_of(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::SampleRow;

    #[test]
    fn test_no_outliers_in_tight_group() {
        let values = vec![1.0, 1.1, 0.9, 1.05, 0.95];
        let analysis = detect_outliers(&values);
        assert!(analysis.outlier_indices.is_empty());
    }

    #[test]
    fn test_detects_extreme_value() {
        let values = vec![1.0, 1.1, 0.9, 1.05, 0.95, 100.0];
        let analysis = detect_outliers(&values);
        assert_eq!(analysis.outlier_indices, vec![5]);
    }

    #[test]
    fn test_zero_mad_flags_nothing() {
        // Majority identical values force MAD to zero even with a deviant
        let values = vec![5.0, 5.0, 5.0, 5.0, 42.0];
        let analysis = detect_outliers(&values);
        assert_eq!(analysis.mad, 0.0);
        assert!(analysis.outlier_indices.is_empty());
    }

    #[test]
    fn test_invariant_under_offset_and_scale() {
        let values = vec![1.0, 1.2, 0.8, 1.1, 0.9, 10.0];
        let base: Vec<usize> = detect_outliers(&values).outlier_indices;

        let shifted: Vec<f64> = values.iter().map(|v| v * 3.0 + 7.0).collect();
        assert_eq!(detect_outliers(&shifted).outlier_indices, base);

        let negated: Vec<f64> = values.iter().map(|v| -v).collect();
        assert_eq!(detect_outliers(&negated).outlier_indices, base);
    }

    #[test]
    fn test_empty_values() {
        let analysis = detect_outliers(&[]);
        assert!(analysis.all_samples.is_empty());
        assert!(analysis.outlier_indices.is_empty());
    }

    fn numbered_row(var: &str, sample: usize, value: f64) -> SampleRow {
        SampleRow {
            cell: 0,
            bindings: vec![("var".to_string(), var.to_string())],
            sample,
            stage: "time".to_string(),
            metric: "time".to_string(),
            value: Some(value),
            stdout: None,
            stderr: None,
            failed: false,
        }
    }

    #[test]
    fn test_flagging_is_per_group() {
        let mut table = ResultTable::new();
        // Group A: tight cluster plus a wild value
        for (i, v) in [1.0, 1.05, 0.95, 1.1, 0.9, 50.0].iter().enumerate() {
            table.append(numbered_row("A", i, *v));
        }
        // Group B: 50.0 is perfectly normal here
        for (i, v) in [49.0, 50.0, 51.0, 50.5, 49.5].iter().enumerate() {
            table.append(numbered_row("B", i, *v));
        }

        let flags = flag_outliers(&table);
        assert!(flags[5], "50.0 is an outlier among group A");
        assert!(
            flags[6..].iter().all(|f| !f),
            "group B values are unflagged"
        );

        let filtered = table.without_outliers();
        assert_eq!(filtered.len(), table.len() - 1);
    }

    #[test]
    fn test_string_rows_never_flagged() {
        let mut table = ResultTable::new();
        let mut row = numbered_row("A", 0, 0.0);
        row.value = None;
        row.metric = "stdout".to_string();
        row.stdout = Some("text".to_string());
        table.append(row);

        assert_eq!(flag_outliers(&table), vec![false]);
    }
}
