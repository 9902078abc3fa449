//! Linear models relating TTP counts to tooling and aliases

use crate::columns::MetricColumn;
use crate::descriptive::{quantile, sorted};
use crate::error::{AnalysisError, AnalysisResult};
use crate::outliers::{ColumnOutliers, IqrFilter};
use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, FisherSnedecor, StudentsT};
use threatgraph_store::ThreatGroupMetrics;
use tracing::debug;

/// Two-sided p-value of a t statistic
fn t_p_value(t: f64, df: f64) -> AnalysisResult<f64> {
    if t.is_nan() {
        return Ok(f64::NAN);
    }
    let dist = StudentsT::new(0.0, 1.0, df).map_err(|e| AnalysisError::Distribution(e.to_string()))?;
    Ok(2.0 * (1.0 - dist.cdf(t.abs())))
}

/// Least squares fit of `y` on a single regressor `x`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimpleRegression {
    pub x: MetricColumn,
    pub y: MetricColumn,
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    pub pearson_r: f64,
    /// Two-sided p-value of the correlation
    pub p_value: f64,
    pub observations: usize,
}

impl SimpleRegression {
    pub fn fit(rows: &[ThreatGroupMetrics], x: MetricColumn, y: MetricColumn) -> AnalysisResult<Self> {
        let pairs: Vec<(f64, f64)> = rows
            .iter()
            .filter_map(|row| Some((x.value(row)?, y.value(row)?)))
            .collect();
        let n = pairs.len();
        if n < 2 {
            return Err(AnalysisError::InsufficientData {
                what: format!("{} vs {}", y, x),
                needed: 2,
                have: n,
            });
        }

        let nf = n as f64;
        let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / nf;
        let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / nf;
        let sxx: f64 = pairs.iter().map(|(x, _)| (x - mean_x).powi(2)).sum();
        let syy: f64 = pairs.iter().map(|(_, y)| (y - mean_y).powi(2)).sum();
        let sxy: f64 = pairs.iter().map(|(x, y)| (x - mean_x) * (y - mean_y)).sum();

        // a constant column still gives a flat line; only r is undefined
        let slope = if sxx == 0.0 { 0.0 } else { sxy / sxx };
        let intercept = mean_y - slope * mean_x;
        let (r, p_value) = if sxx == 0.0 || syy == 0.0 {
            debug!(x = %x, y = %y, "Constant column, correlation undefined");
            (f64::NAN, f64::NAN)
        } else {
            let r = (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0);
            let df = nf - 2.0;
            let p_value = if n == 2 {
                1.0
            } else if r.abs() >= 1.0 {
                0.0
            } else {
                t_p_value(r * (df / (1.0 - r * r)).sqrt(), df)?
            };
            (r, p_value)
        };

        Ok(Self {
            x,
            y,
            slope,
            intercept,
            r_squared: r * r,
            pearson_r: r,
            p_value,
            observations: n,
        })
    }
}

/// One estimated coefficient
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Coefficient {
    pub name: String,
    pub estimate: f64,
    pub std_error: f64,
    pub t_value: f64,
    pub p_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub threat_group: String,
    pub actual: f64,
    pub predicted: f64,
}

/// Ordinary least squares with an intercept
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OlsFit {
    pub dependent: MetricColumn,
    /// Intercept first, then one per regressor
    pub coefficients: Vec<Coefficient>,
    pub r_squared: f64,
    pub adj_r_squared: f64,
    pub f_statistic: f64,
    pub f_p_value: f64,
    pub observations: usize,
    pub df_model: usize,
    pub df_residuals: usize,
    pub predictions: Vec<Prediction>,
}

impl OlsFit {
    /// Fit `dependent` on `[const, regressors...]`. Rows with a missing
    /// value in any used column are left out.
    pub fn fit(rows: &[ThreatGroupMetrics], dependent: MetricColumn, regressors: &[MetricColumn]) -> AnalysisResult<Self> {
        let usable: Vec<(&ThreatGroupMetrics, Vec<f64>, f64)> = rows
            .iter()
            .filter_map(|row| {
                let xs: Option<Vec<f64>> = regressors.iter().map(|c| c.value(row)).collect();
                Some((row, xs?, dependent.value(row)?))
            })
            .collect();

        let n = usable.len();
        let k = regressors.len() + 1;
        let x = DMatrix::from_fn(n, k, |i, j| if j == 0 { 1.0 } else { usable[i].1[j - 1] });
        let y = DVector::from_iterator(n, usable.iter().map(|(_, _, y)| *y));

        // minimum-norm solution; aliased columns do not count towards the
        // model degrees of freedom
        let xtx = x.transpose() * &x;
        let svd = xtx.svd(true, true);
        let eps = svd.singular_values.max().max(1.0) * 1e-10;
        let rank = svd.rank(eps);
        if n <= rank {
            return Err(AnalysisError::InsufficientData {
                what: format!("OLS of {}", dependent),
                needed: rank + 1,
                have: n,
            });
        }
        let xtx_inv = svd
            .pseudo_inverse(eps)
            .map_err(|e| AnalysisError::Decomposition(e.to_string()))?;

        let beta = &xtx_inv * x.transpose() * &y;
        let fitted = &x * &beta;
        let residuals = &y - &fitted;

        let df_residuals = n - rank;
        let df_model = rank.saturating_sub(1);
        let ssr = residuals.norm_squared();
        let mean_y = y.mean();
        let sst = y.iter().map(|v| (v - mean_y).powi(2)).sum::<f64>();
        let sigma2 = ssr / df_residuals as f64;

        let mut names = vec!["const".to_string()];
        names.extend(regressors.iter().map(|c| c.name().to_string()));

        let coefficients = names
            .into_iter()
            .enumerate()
            .map(|(j, name)| {
                let std_error = (xtx_inv[(j, j)].max(0.0) * sigma2).sqrt();
                let t_value = beta[j] / std_error;
                Ok(Coefficient {
                    name,
                    estimate: beta[j],
                    std_error,
                    t_value,
                    p_value: t_p_value(t_value, df_residuals as f64)?,
                })
            })
            .collect::<AnalysisResult<Vec<_>>>()?;

        let r_squared = if sst > 0.0 { 1.0 - ssr / sst } else { f64::NAN };
        let adj_r_squared = 1.0 - (1.0 - r_squared) * (n - 1) as f64 / df_residuals as f64;
        let f_statistic = if df_model == 0 {
            f64::NAN
        } else {
            ((sst - ssr) / df_model as f64) / sigma2
        };
        let f_p_value = if f_statistic.is_finite() {
            let dist = FisherSnedecor::new(df_model as f64, df_residuals as f64)
                .map_err(|e| AnalysisError::Distribution(e.to_string()))?;
            1.0 - dist.cdf(f_statistic)
        } else if f_statistic.is_infinite() {
            0.0
        } else {
            f64::NAN
        };

        debug!(observations = n, r_squared, "OLS fitted");

        Ok(Self {
            dependent,
            coefficients,
            r_squared,
            adj_r_squared,
            f_statistic,
            f_p_value,
            observations: n,
            df_model,
            df_residuals,
            predictions: usable
                .iter()
                .zip(fitted.iter())
                .map(|((row, _, actual), predicted)| Prediction {
                    threat_group: row.threat_group.clone(),
                    actual: *actual,
                    predicted: *predicted,
                })
                .collect(),
        })
    }

    pub fn coefficient(&self, name: &str) -> Option<&Coefficient> {
        self.coefficients.iter().find(|c| c.name == name)
    }
}

/// Columns screened for outliers before the TTP model
pub const TTP_MODEL_SCREENED: [MetricColumn; 3] = [
    MetricColumn::CombinedRelatedEntities,
    MetricColumn::AliasCount,
    MetricColumn::TtpCount,
];

/// TTP count explained by tooling and aliases, after outlier removal
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TtpModel {
    pub outliers: Vec<ColumnOutliers>,
    pub removed: usize,
    pub fit: OlsFit,
}

impl TtpModel {
    pub fn fit(rows: &[ThreatGroupMetrics]) -> AnalysisResult<Self> {
        let filtered = IqrFilter::default().filter(rows, &TTP_MODEL_SCREENED);
        let fit = OlsFit::fit(
            &filtered.kept,
            MetricColumn::TtpCount,
            &[MetricColumn::CombinedRelatedEntities, MetricColumn::AliasCount],
        )?;
        Ok(Self {
            outliers: filtered.outliers,
            removed: filtered.removed,
            fit,
        })
    }
}

/// Groups above the 80th percentile of TTP count or related entities
pub fn notable_groups(rows: &[ThreatGroupMetrics]) -> Vec<String> {
    let threshold = |column: MetricColumn| quantile(&sorted(&column.values(rows)), 0.8);
    let (Some(ttp_cut), Some(related_cut)) = (
        threshold(MetricColumn::TtpCount),
        threshold(MetricColumn::AllRelatedEntities),
    ) else {
        return Vec::new();
    };

    rows.iter()
        .filter(|row| row.ttp_count as f64 > ttp_cut || row.all_related_entities as f64 > related_cut)
        .map(|row| row.threat_group.clone())
        .collect()
}
