//! Drawdown and recovery metrics
//!
//! Measures how far a simulated price path falls below its reference level
//! and how long it takes to get back:
//!
//! dd[t] = (P[t] - ref[t]) / ref[t]
//!
//! With the fixed reference, ref[t] is the pre-shock price for every t. With
//! the running peak, ref[t] is the highest price seen up to t.

use crate::error::{EngineError, Result};
use crate::shock::SimulatedPath;
use chrono::NaiveDate;
use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Level a path is measured against
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawdownReference {
    /// The pre-shock reference price
    #[default]
    #[display("fixed_reference")]
    FixedReference,
    /// Running maximum of the path
    #[display("running_peak")]
    RunningPeak,
}

/// Drawdown configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrawdownConfig {
    /// Reference policy (default: fixed reference)
    pub reference: DrawdownReference,
}

/// Time to regain the reference level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryDuration {
    /// Periods after the shock date until the reference was regained
    Finite(usize),
    /// The reference was never regained within the horizon
    Infinite,
}

impl RecoveryDuration {
    /// Whether the path recovered.
    pub const fn is_finite(self) -> bool {
        matches!(self, Self::Finite(_))
    }

    /// Periods as `f64`, `+inf` for no recovery.
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Finite(periods) => periods as f64,
            Self::Infinite => f64::INFINITY,
        }
    }
}

impl std::fmt::Display for RecoveryDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Finite(periods) => write!(f, "{}", periods),
            Self::Infinite => write!(f, "inf"),
        }
    }
}

/// Drawdown metrics of one path
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DrawdownResult {
    /// Deepest drawdown, never positive
    pub max_drawdown: f64,
    /// Date of the deepest point
    pub trough_date: NaiveDate,
    /// Period index of the deepest point (0 is the pre-shock date)
    pub trough_period: usize,
    /// Date the reference was regained
    pub recovery_date: Option<NaiveDate>,
    /// Time to regain the reference
    pub recovery_duration: RecoveryDuration,
}

impl DrawdownResult {
    /// Whether the path regained its reference within the horizon.
    pub const fn recovered(&self) -> bool {
        self.recovery_duration.is_finite()
    }
}

/// Computes drawdown metrics for simulated paths
#[derive(Debug, Clone, Default)]
pub struct DrawdownAnalyzer {
    config: DrawdownConfig,
}

impl DrawdownAnalyzer {
    /// Create an analyzer.
    pub const fn new(config: DrawdownConfig) -> Self {
        Self { config }
    }

    /// Get the configuration
    pub const fn config(&self) -> &DrawdownConfig {
        &self.config
    }

    /// Analyze one path.
    ///
    /// # Errors
    /// `InsufficientData` for an empty path, `InvalidPrice` for a non-positive
    /// reference level.
    pub fn analyze(&self, path: &SimulatedPath) -> Result<DrawdownResult> {
        let prices = &path.prices;
        let Some(&reference) = prices.first() else {
            return Err(EngineError::InsufficientData {
                required: 1,
                actual: 0,
            });
        };
        let Some(&start) = path.dates.first() else {
            return Err(EngineError::InsufficientData {
                required: 1,
                actual: 0,
            });
        };
        if !reference.is_finite() || reference <= 0.0 {
            return Err(EngineError::InvalidPrice {
                date: start,
                price: reference,
            });
        }

        let levels = self.reference_levels(prices);

        let mut trough_period = 0;
        let mut max_drawdown = 0.0;
        for (t, (price, level)) in prices.iter().zip(&levels).enumerate() {
            let dd = (price - level) / level;
            if dd < max_drawdown {
                max_drawdown = dd;
                trough_period = t;
            }
        }

        // Regaining the level in force at the trough.
        let target = levels[trough_period];
        let recovery = prices
            .iter()
            .enumerate()
            .skip(trough_period.max(1))
            .find(|(_, price)| **price >= target)
            .map(|(t, _)| t);

        let trough_date = path.dates.get(trough_period).copied().unwrap_or(start);
        let (recovery_date, recovery_duration) = match recovery {
            Some(t) => (
                path.dates.get(t).copied(),
                RecoveryDuration::Finite(t - 1),
            ),
            None => (None, RecoveryDuration::Infinite),
        };

        Ok(DrawdownResult {
            max_drawdown,
            trough_date,
            trough_period,
            recovery_date,
            recovery_duration,
        })
    }

    fn reference_levels(&self, prices: &[f64]) -> Vec<f64> {
        match self.config.reference {
            DrawdownReference::FixedReference => vec![prices[0]; prices.len()],
            DrawdownReference::RunningPeak => prices
                .iter()
                .scan(f64::NEG_INFINITY, |peak, price| {
                    *peak = peak.max(*price);
                    Some(*peak)
                })
                .collect(),
        }
    }
}
