//! Rolling association between constituent and aggregate returns
//!
//! For each window length W, the statistic at date t uses the W most recent
//! observations ending at and including t (trailing, right-aligned):
//!
//! beta_t = Cov(r_c, r_agg) / Var(r_c)
//! corr_t = Cov(r_c, r_agg) / (sd(r_c) * sd(r_agg))
//!
//! Dates with fewer than W observations of history have no value at all, so a
//! RollingStat over N observations holds exactly N - W + 1 entries (none when
//! N < W). A window in which the constituent does not move yields NaN.

use crate::error::{EngineError, Result};
use crate::returns::ReturnSeries;
use chrono::NaiveDate;
use derive_more::Display;
use ndarray::{ArrayView1, Zip};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Configuration for the rolling estimator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollingConfig {
    /// Window lengths in periods (default: 60, 120, 252 trading days)
    pub windows: Vec<usize>,
    /// Also compute rolling correlation (default: true)
    pub correlation: bool,
}

impl Default for RollingConfig {
    fn default() -> Self {
        Self {
            windows: vec![60, 120, 252],
            correlation: true,
        }
    }
}

/// A windowed statistic; only dates with a full window are present
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingStat {
    /// Window length
    pub window: usize,
    /// Dates with a defined value
    pub dates: Vec<NaiveDate>,
    /// Statistic per date (NaN when undefined for that window)
    pub values: Vec<f64>,
}

impl RollingStat {
    /// Number of defined entries.
    pub const fn len(&self) -> usize {
        self.dates.len()
    }

    /// Whether no date had a full window.
    pub const fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Most recent `(date, value)`.
    pub fn latest(&self) -> Option<(NaiveDate, f64)> {
        self.dates.last().copied().zip(self.values.last().copied())
    }

    /// Value on `date`, if that date has a full window.
    pub fn get(&self, date: NaiveDate) -> Option<f64> {
        self.dates
            .binary_search(&date)
            .ok()
            .map(|i| self.values[i])
    }
}

/// Rolling statistics for one window length
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingAssociation {
    /// Window length
    pub window: usize,
    /// Rolling beta of the aggregate on the constituent
    pub beta: RollingStat,
    /// Rolling correlation, when requested
    pub correlation: Option<RollingStat>,
}

/// How strongly the aggregate co-moves with the constituent, by beta band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum BetaRegime {
    /// beta < 0.05
    #[display("marginal")]
    Marginal,
    /// 0.05 <= beta < 0.10
    #[display("influential")]
    Influential,
    /// 0.10 <= beta < 0.15
    #[display("strong")]
    Strong,
    /// beta >= 0.15
    #[display("systemic")]
    Systemic,
}

impl BetaRegime {
    /// Classify a beta value; `None` for NaN.
    pub fn classify(beta: f64) -> Option<Self> {
        if beta.is_nan() {
            None
        } else if beta < 0.05 {
            Some(Self::Marginal)
        } else if beta < 0.10 {
            Some(Self::Influential)
        } else if beta < 0.15 {
            Some(Self::Strong)
        } else {
            Some(Self::Systemic)
        }
    }
}

/// Rolling beta / correlation estimator
#[derive(Debug, Default)]
pub struct RollingEstimator {
    config: RollingConfig,
}

impl RollingEstimator {
    /// Create a new estimator.
    ///
    /// # Errors
    /// `InvalidParameter` for an empty window list or a zero-length window.
    pub fn new(config: RollingConfig) -> Result<Self> {
        if config.windows.is_empty() {
            return Err(EngineError::InvalidParameter(
                "at least one window length is required".to_string(),
            ));
        }
        if config.windows.contains(&0) {
            return Err(EngineError::InvalidParameter(
                "window length must be positive".to_string(),
            ));
        }
        Ok(Self { config })
    }

    /// Get the configuration
    pub const fn config(&self) -> &RollingConfig {
        &self.config
    }

    /// Estimate rolling statistics for every configured window.
    ///
    /// Output order follows the configured window order.
    ///
    /// # Errors
    /// `MisalignedIndex` unless both series share the same index,
    /// `ConventionMismatch` for mixed conventions.
    pub fn estimate(
        &self,
        constituent: &ReturnSeries,
        aggregate: &ReturnSeries,
    ) -> Result<Vec<RollingAssociation>> {
        constituent.ensure_same_convention(aggregate)?;
        constituent.series().ensure_same_index(aggregate.series())?;

        let dates = constituent.series().dates();
        let c = ArrayView1::from(constituent.series().values());
        let a = ArrayView1::from(aggregate.series().values());

        Ok(self
            .config
            .windows
            .par_iter()
            .map(|&window| self.estimate_window(dates, c, a, window))
            .collect())
    }

    fn estimate_window(
        &self,
        dates: &[NaiveDate],
        c: ArrayView1<'_, f64>,
        a: ArrayView1<'_, f64>,
        window: usize,
    ) -> RollingAssociation {
        let mut beta = Vec::new();
        let mut corr = Vec::new();

        if c.len() >= window {
            for (cw, aw) in c.windows(window).into_iter().zip(a.windows(window)) {
                let stats = WindowMoments::compute(cw, aw);
                beta.push(stats.beta());
                corr.push(stats.correlation());
            }
        }

        let window_dates = if dates.len() >= window {
            dates[window - 1..].to_vec()
        } else {
            Vec::new()
        };

        RollingAssociation {
            window,
            beta: RollingStat {
                window,
                dates: window_dates.clone(),
                values: beta,
            },
            correlation: self.config.correlation.then(|| RollingStat {
                window,
                dates: window_dates,
                values: corr,
            }),
        }
    }
}

/// Sample second moments of one window
struct WindowMoments {
    var_c: f64,
    var_a: f64,
    cov: f64,
    flat_c: bool,
    flat_a: bool,
}

impl WindowMoments {
    fn compute(c: ArrayView1<'_, f64>, a: ArrayView1<'_, f64>) -> Self {
        let n = c.len() as f64;
        let mean_c = c.sum() / n;
        let mean_a = a.sum() / n;

        let mut var_c = 0.0;
        let mut var_a = 0.0;
        let mut cov = 0.0;
        Zip::from(&c).and(&a).for_each(|&x, &y| {
            let dx = x - mean_c;
            let dy = y - mean_a;
            var_c += dx * dx;
            var_a += dy * dy;
            cov += dx * dy;
        });

        // Sample (n - 1) normalisation; a single-observation window has no variance.
        let dof = (n - 1.0).max(1.0);
        Self {
            var_c: var_c / dof,
            var_a: var_a / dof,
            cov: cov / dof,
            flat_c: is_flat(c),
            flat_a: is_flat(a),
        }
    }

    fn beta(&self) -> f64 {
        if self.flat_c || self.var_c == 0.0 {
            f64::NAN
        } else {
            self.cov / self.var_c
        }
    }

    fn correlation(&self) -> f64 {
        if self.flat_c || self.flat_a || self.var_c == 0.0 || self.var_a == 0.0 {
            f64::NAN
        } else {
            self.cov / (self.var_c.sqrt() * self.var_a.sqrt())
        }
    }
}

// Rounding in the mean can leave a tiny non-zero variance for a constant window.
fn is_flat(values: ArrayView1<'_, f64>) -> bool {
    values.first().is_none_or(|first| values.iter().all(|v| v == first))
}
