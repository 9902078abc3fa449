//! IQR outlier rule over metric columns

use crate::columns::MetricColumn;
use crate::descriptive::quartiles;
use serde::Serialize;
use std::collections::BTreeSet;
use threatgraph_store::ThreatGroupMetrics;

/// Fence bounds of one column
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IqrBounds {
    pub q1: f64,
    pub q3: f64,
    pub lower: f64,
    pub upper: f64,
}

impl IqrBounds {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

/// Rows falling outside one column's bounds
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnOutliers {
    pub column: MetricColumn,
    pub bounds: IqrBounds,
    /// Indices into the input rows
    pub rows: Vec<usize>,
    pub groups: Vec<String>,
}

/// Result of filtering a table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilteredRows {
    pub kept: Vec<ThreatGroupMetrics>,
    /// Only columns that had outliers
    pub outliers: Vec<ColumnOutliers>,
    pub removed: usize,
}

/// IQR-based outlier filter
#[derive(Debug, Clone)]
pub struct IqrFilter {
    multiplier: f64,
}

impl Default for IqrFilter {
    fn default() -> Self {
        Self::new(1.5)
    }
}

impl IqrFilter {
    pub fn new(multiplier: f64) -> Self {
        Self { multiplier }
    }

    /// Bounds from the present values; `None` if there are none
    pub fn bounds(&self, values: &[f64]) -> Option<IqrBounds> {
        let (q1, q3) = quartiles(values)?;
        let iqr = q3 - q1;
        Some(IqrBounds {
            q1,
            q3,
            lower: q1 - self.multiplier * iqr,
            upper: q3 + self.multiplier * iqr,
        })
    }

    /// Indices of values outside the bounds. Missing values never are.
    pub fn outlier_indices(&self, values: &[Option<f64>]) -> (Option<IqrBounds>, Vec<usize>) {
        let present: Vec<f64> = values.iter().flatten().copied().collect();
        let Some(bounds) = self.bounds(&present) else {
            return (None, Vec::new());
        };
        let indices = values
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.filter(|v| !bounds.contains(*v)).map(|_| i))
            .collect();
        (Some(bounds), indices)
    }

    /// Drop every row that is an outlier in any of `columns`
    pub fn filter(&self, rows: &[ThreatGroupMetrics], columns: &[MetricColumn]) -> FilteredRows {
        let mut dropped = BTreeSet::new();
        let mut outliers = Vec::new();

        for column in columns {
            let values: Vec<Option<f64>> = rows.iter().map(|row| column.value(row)).collect();
            let (bounds, indices) = self.outlier_indices(&values);
            let Some(bounds) = bounds else { continue };
            if indices.is_empty() {
                continue;
            }
            dropped.extend(indices.iter().copied());
            outliers.push(ColumnOutliers {
                column: *column,
                bounds,
                groups: indices.iter().map(|i| rows[*i].threat_group.clone()).collect(),
                rows: indices,
            });
        }

        let kept = rows
            .iter()
            .enumerate()
            .filter(|(i, _)| !dropped.contains(i))
            .map(|(_, row)| row.clone())
            .collect();

        FilteredRows {
            kept,
            outliers,
            removed: dropped.len(),
        }
    }
}
