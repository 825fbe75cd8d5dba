#![warn(missing_docs)]
//! Benchalot Statistical Engine
//!
//! Post-processing over the benchmark result table:
//! - Append-only long-format table of sample rows
//! - Failure filtering and modified Z-score outlier detection
//! - Grouped aggregation (min, max, mean, median, sample std, relative)
//! - Pivoting of (stage, metric) pairs into templated result columns

mod aggregate;
mod outliers;
mod pivot;
mod table;

pub use aggregate::{compute_stat, mean, median, sample_std, Stat};
pub use outliers::{detect_outliers, flag_outliers, modified_z_scores, OutlierAnalysis};
pub use pivot::{build_stat_table, StatRow, StatTable};
pub use table::{ResultTable, SampleRow, TableError};

/// Modified Z-score magnitude above which a value is an outlier.
pub const OUTLIER_THRESHOLD: f64 = 3.5;

/// Consistency constant relating the MAD to the standard deviation of a
/// normal distribution.
pub const MAD_SCALE: f64 = 0.6745;
