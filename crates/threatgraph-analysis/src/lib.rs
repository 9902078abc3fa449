//! # Threatgraph Analysis
//!
//! Statistics over the per-group metrics and pulse timeline projected out
//! of the threat graph:
//! - descriptive statistics and density histograms per metric column
//! - IQR outlier screening
//! - simple and multiple linear regression on TTP counts
//! - monthly pulse activity, its PMF and inactive/emerging classification

pub mod classify;
pub mod columns;
pub mod descriptive;
pub mod error;
pub mod outliers;
pub mod regression;
pub mod report;
pub mod temporal;

pub use classify::{classify, group_activity, Classification, ClassifierConfig, GroupActivity};
pub use columns::MetricColumn;
pub use descriptive::{describe, ColumnStatistics, ColumnSummary, Histogram, NormalFit, HISTOGRAM_BINS};
pub use error::{AnalysisError, AnalysisResult};
pub use outliers::{ColumnOutliers, FilteredRows, IqrBounds, IqrFilter};
pub use regression::{notable_groups, Coefficient, OlsFit, Prediction, SimpleRegression, TtpModel};
pub use report::{ActivityReport, MetricsReport, Section};
pub use temporal::{pulse_count_pmf, ActivityTimeline, MonthlyCount, PmfEntry, Timeline};
