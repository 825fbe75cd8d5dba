//! Aggregation Statistics
//!
//! Reductions applied per group when building stat tables. `relative` is a
//! cross-group statistic (a group's mean divided by the smallest mean among
//! its peers) and is resolved by the pivot builder, not here.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A reduction over one group's values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stat {
    /// Smallest value
    Min,
    /// Largest value
    Max,
    /// Arithmetic mean
    Mean,
    /// Median
    Median,
    /// Sample standard deviation (N−1 denominator)
    Std,
    /// Group mean relative to the minimum mean across peer groups
    Relative,
}

impl Stat {
    /// The stat's name as used in configuration and column headers.
    pub fn name(self) -> &'static str {
        match self {
            Stat::Min => "min",
            Stat::Max => "max",
            Stat::Mean => "mean",
            Stat::Median => "median",
            Stat::Std => "std",
            Stat::Relative => "relative",
        }
    }
}

impl fmt::Display for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Arithmetic mean; `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Median by sorting; `None` for an empty slice.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

/// Sample standard deviation with N−1 denominator; zero below two values.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    if values.len() < 2 {
        return Some(0.0);
    }
    let m = mean(values).expect("non-empty");
    let variance =
        values.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(variance.sqrt())
}

/// Compute a per-group statistic over `values`.
///
/// Returns `None` for an empty group and for [`Stat::Relative`], which needs
/// every peer group to resolve.
pub fn compute_stat(stat: Stat, values: &[f64]) -> Option<f64> {
    match stat {
        Stat::Min => values
            .iter()
            .cloned()
            .min_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal)),
        Stat::Max => values
            .iter()
            .cloned()
            .max_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal)),
        Stat::Mean => mean(values),
        Stat::Median => median(values),
        Stat::Std => sample_std(values),
        Stat::Relative => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_stats() {
        let values = [4.0, 1.0, 3.0, 2.0];
        assert_eq!(compute_stat(Stat::Min, &values), Some(1.0));
        assert_eq!(compute_stat(Stat::Max, &values), Some(4.0));
        assert_eq!(compute_stat(Stat::Mean, &values), Some(2.5));
        assert_eq!(compute_stat(Stat::Median, &values), Some(2.5));
    }

    #[test]
    fn test_median_odd_count() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
    }

    #[test]
    fn test_sample_std_uses_n_minus_one() {
        // Variance of [2, 4, 4, 4, 5, 5, 7, 9] with N−1 is 32/7
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let std = sample_std(&values).unwrap();
        assert!((std - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_single_value_std_is_zero() {
        assert_eq!(sample_std(&[5.0]), Some(0.0));
    }

    #[test]
    fn test_empty_values() {
        for stat in [Stat::Min, Stat::Max, Stat::Mean, Stat::Median, Stat::Std] {
            assert_eq!(compute_stat(stat, &[]), None);
        }
    }

    #[test]
    fn test_stat_names_round_trip() {
        for stat in [
            Stat::Min,
            Stat::Max,
            Stat::Mean,
            Stat::Median,
            Stat::Std,
            Stat::Relative,
        ] {
            let parsed: Stat =
                serde_yaml::from_str(stat.name()).expect("stat name deserializes");
            assert_eq!(parsed, stat);
        }
    }
}
