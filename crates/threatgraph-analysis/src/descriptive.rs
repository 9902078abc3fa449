//! Descriptive statistics for the metric columns

use crate::columns::MetricColumn;
use serde::Serialize;
use statrs::statistics::{Data, OrderStatistics, Statistics};
use threatgraph_store::ThreatGroupMetrics;

/// Number of equal-width histogram bins
pub const HISTOGRAM_BINS: usize = 20;

/// Quantile of sorted data, interpolating linearly between the two
/// nearest ranks at position `(n - 1) * q`
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let position = (sorted.len() - 1) as f64 * q.clamp(0.0, 1.0);
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

pub fn sorted(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted
}

/// Q1 and Q3 of unsorted data
pub fn quartiles(values: &[f64]) -> Option<(f64, f64)> {
    let sorted = sorted(values);
    Some((quantile(&sorted, 0.25)?, quantile(&sorted, 0.75)?))
}

/// Excess (Fisher) kurtosis with the biased moment estimator. `None` for
/// constant data.
pub fn excess_kurtosis(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let m2 = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    let m4 = values.iter().map(|x| (x - mean).powi(4)).sum::<f64>() / n;

    if m2 <= f64::EPSILON * mean.abs().max(1.0) {
        return None;
    }
    Some(m4 / (m2 * m2) - 3.0)
}

/// Maximum-likelihood normal fit
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NormalFit {
    pub mean: f64,
    /// Population standard deviation
    pub std_dev: f64,
}

impl NormalFit {
    pub fn fit(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        Some(Self {
            mean: values.mean(),
            std_dev: values.population_std_dev(),
        })
    }
}

/// Density-normalized histogram
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    /// `bins + 1` bin edges
    pub edges: Vec<f64>,
    /// Density per bin; integrates to 1 over the edges
    pub density: Vec<f64>,
}

impl Histogram {
    /// Equal-width bins over the data range. A degenerate range is widened
    /// by half a unit on each side.
    pub fn density(values: &[f64], bins: usize) -> Option<Self> {
        if values.is_empty() || bins == 0 {
            return None;
        }
        let (mut low, mut high) = values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
        if low == high {
            low -= 0.5;
            high += 0.5;
        }

        let width = (high - low) / bins as f64;
        let mut counts = vec![0usize; bins];
        for value in values {
            let bin = (((value - low) / width) as usize).min(bins - 1);
            counts[bin] += 1;
        }

        let total = values.len() as f64;
        Some(Self {
            edges: (0..=bins).map(|i| low + width * i as f64).collect(),
            density: counts.iter().map(|c| *c as f64 / (total * width)).collect(),
        })
    }
}

/// Statistics of one column with at least two values
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnStatistics {
    pub median: f64,
    pub iqr: f64,
    /// `None` when the column is constant
    pub kurtosis: Option<f64>,
    pub normal_fit: NormalFit,
}

/// Summary of one column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSummary {
    pub column: MetricColumn,
    pub count: usize,
    /// `None` means not enough data
    pub statistics: Option<ColumnStatistics>,
    pub histogram: Option<Histogram>,
}

impl ColumnSummary {
    pub fn compute(column: MetricColumn, values: &[f64]) -> Self {
        let statistics = if values.len() > 1 {
            let sorted = sorted(values);
            let median = Data::new(sorted.clone()).median();
            let iqr = quantile(&sorted, 0.75).unwrap_or(0.0) - quantile(&sorted, 0.25).unwrap_or(0.0);
            NormalFit::fit(values).map(|normal_fit| ColumnStatistics {
                median,
                iqr,
                kurtosis: excess_kurtosis(values),
                normal_fit,
            })
        } else {
            None
        };

        Self {
            column,
            count: values.len(),
            statistics,
            histogram: Histogram::density(values, HISTOGRAM_BINS),
        }
    }
}

/// Summaries of every described column, missing values dropped
pub fn describe(rows: &[ThreatGroupMetrics]) -> Vec<ColumnSummary> {
    MetricColumn::DESCRIBED
        .iter()
        .map(|column| ColumnSummary::compute(*column, &column.values(rows)))
        .collect()
}
