//! One-period shock simulation
//!
//! A hypothetical shock hits the constituent on the first period after the
//! pre-shock reference date. The realized aggregate return is split at the
//! scenario's own weight w, r_ex = (r_agg - w * r_c) / (1 - w), and
//! recombined with the shocked constituent return r_c':
//!
//! r_sim = w * r_c' + (1 - w) * r_ex = r_agg + w * (r_c' - r_c)
//!
//! where r_c' = r_c + s (additive shock) or r_c' = s (replacement shock).
//! The closed form stays defined at w = 1, and a zero additive shock
//! reproduces the realized aggregate return for every w.
//!
//! After the shock the path either stays flat (zero returns) or replays
//! (1 - w) * r_ex = r_agg - w * r_c, the realized aggregate with the
//! constituent held flat. The price path compounds those returns from the
//! reference price and holds horizon + 1 points.

use crate::decompose::DecomposedReturns;
use crate::error::{EngineError, Result};
use crate::returns::{ReturnConvention, ReturnSeries};
use crate::series::TimeSeries;
use chrono::{Datelike, NaiveDate, Weekday};
use derive_more::Display;
use serde::{Deserialize, Serialize};

/// How the shock combines with the constituent's realized return
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShockMode {
    /// Baseline return plus the shock
    #[default]
    #[display("additive")]
    Additive,
    /// The shock replaces the baseline return
    #[display("replace")]
    Replace,
}

/// Returns applied after the shock period
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContinuationPolicy {
    /// Zero returns
    #[default]
    #[display("flat")]
    Flat,
    /// Realized ex-constituent returns at the scenario weight, times (1 - w)
    #[display("historical_replay")]
    HistoricalReplay,
}

/// Configuration shared by every simulated path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShockConfig {
    /// Number of simulated periods including the shock (default: 20)
    pub horizon: usize,
    /// Shock combination (default: additive)
    pub mode: ShockMode,
    /// Post-shock continuation (default: flat)
    pub continuation: ContinuationPolicy,
}

impl Default for ShockConfig {
    fn default() -> Self {
        Self {
            horizon: 20,
            mode: ShockMode::Additive,
            continuation: ContinuationPolicy::Flat,
        }
    }
}

/// Inputs that fully define one simulated path
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShockScenario {
    /// Return delta applied to the constituent (e.g. -0.20)
    pub shock_magnitude: f64,
    /// Assumed constituent weight in the aggregate
    pub exposure_weight: f64,
    /// Date of the reference price; the shock lands on the next period
    pub pre_shock_date: NaiveDate,
}

impl ShockScenario {
    /// Create a scenario.
    pub const fn new(shock_magnitude: f64, exposure_weight: f64, pre_shock_date: NaiveDate) -> Self {
        Self {
            shock_magnitude,
            exposure_weight,
            pre_shock_date,
        }
    }
}

/// A simulated aggregate price path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedPath {
    /// Dates; `dates[0]` is the pre-shock date, `dates[1]` the shock date
    pub dates: Vec<NaiveDate>,
    /// Prices; `prices[0]` is the reference price
    pub prices: Vec<f64>,
    /// Simulated aggregate returns for periods 1..=horizon
    pub returns: Vec<f64>,
    /// Convention used to compound the returns
    pub convention: ReturnConvention,
}

impl SimulatedPath {
    /// Pre-shock reference price.
    pub fn reference_price(&self) -> f64 {
        self.prices.first().copied().unwrap_or(f64::NAN)
    }

    /// Number of simulated periods.
    pub const fn horizon(&self) -> usize {
        self.returns.len()
    }

    /// Shock date.
    pub fn shock_date(&self) -> Option<NaiveDate> {
        self.dates.get(1).copied()
    }

    /// Last simulated price.
    pub fn final_price(&self) -> f64 {
        self.prices.last().copied().unwrap_or(f64::NAN)
    }
}

/// Propagates constituent shocks through a decomposition
#[derive(Debug, Clone)]
pub struct ShockSimulator<'a> {
    decomposed: &'a DecomposedReturns,
    prices: &'a TimeSeries,
    config: ShockConfig,
}

impl<'a> ShockSimulator<'a> {
    /// Create a simulator over a decomposition and the aggregate's price levels.
    ///
    /// # Errors
    /// `InvalidParameter` for a zero horizon.
    pub fn new(
        decomposed: &'a DecomposedReturns,
        prices: &'a TimeSeries,
        config: ShockConfig,
    ) -> Result<Self> {
        if config.horizon == 0 {
            return Err(EngineError::InvalidParameter(
                "horizon must be at least one period".to_string(),
            ));
        }
        Ok(Self {
            decomposed,
            prices,
            config,
        })
    }

    /// Get the configuration
    pub const fn config(&self) -> &ShockConfig {
        &self.config
    }

    /// Get the decomposition being shocked
    pub const fn decomposed(&self) -> &DecomposedReturns {
        self.decomposed
    }

    /// Simulate one scenario.
    ///
    /// # Errors
    /// `InvalidWeight`, `InvalidShock`, `DateNotFound` for an unknown
    /// pre-shock date, `InsufficientData` when no return follows it or a
    /// replay runs past the data, `MissingValue` for a missing aggregate or
    /// constituent return.
    pub fn simulate(&self, scenario: &ShockScenario) -> Result<SimulatedPath> {
        let w = validate_weight(scenario.exposure_weight)?;
        if !scenario.shock_magnitude.is_finite() {
            return Err(EngineError::InvalidShock(scenario.shock_magnitude));
        }

        let reference_price = self
            .prices
            .get(scenario.pre_shock_date)
            .ok_or(EngineError::DateNotFound(scenario.pre_shock_date))?;
        if !reference_price.is_finite() || reference_price <= 0.0 {
            return Err(EngineError::InvalidPrice {
                date: scenario.pre_shock_date,
                price: reference_price,
            });
        }

        let agg = self.decomposed.aggregate().series();
        let shock_idx =
            agg.position_after(scenario.pre_shock_date)
                .ok_or(EngineError::InsufficientData {
                    required: 1,
                    actual: 0,
                })?;

        let horizon = self.config.horizon;
        let convention = self.decomposed.aggregate().convention();

        let mut returns = Vec::with_capacity(horizon);
        returns.push(self.shocked_return(shock_idx, scenario.shock_magnitude, w)?);

        match self.config.continuation {
            ContinuationPolicy::Flat => returns.resize(horizon, 0.0),
            ContinuationPolicy::HistoricalReplay => {
                let available = agg.len() - shock_idx;
                if available < horizon {
                    return Err(EngineError::InsufficientData {
                        required: horizon,
                        actual: available,
                    });
                }
                for idx in shock_idx + 1..shock_idx + horizon {
                    returns.push(self.residual_contribution(idx, w)?);
                }
            }
        }

        let mut prices = Vec::with_capacity(horizon + 1);
        prices.push(reference_price);
        let mut level = reference_price;
        for r in &returns {
            level = convention.compound(level, *r);
            prices.push(level);
        }

        let mut dates = Vec::with_capacity(horizon + 1);
        dates.push(scenario.pre_shock_date);
        dates.extend(agg.dates().iter().skip(shock_idx).take(horizon).copied());
        while dates.len() < horizon + 1 {
            let last = dates[dates.len() - 1];
            dates.push(next_weekday(last));
        }

        Ok(SimulatedPath {
            dates,
            prices,
            returns,
            convention,
        })
    }

    /// Whole-history counterfactual aggregate returns: r_agg - w * r_c on
    /// every date (constituent flat) and the shocked recombination on the
    /// shock date.
    ///
    /// # Errors
    /// Same as [`Self::simulate`] for the shock date; other missing returns
    /// propagate as NaN.
    pub fn counterfactual_returns(&self, scenario: &ShockScenario) -> Result<ReturnSeries> {
        let w = validate_weight(scenario.exposure_weight)?;
        if !scenario.shock_magnitude.is_finite() {
            return Err(EngineError::InvalidShock(scenario.shock_magnitude));
        }

        let agg = self.decomposed.aggregate().series();
        let c = self.decomposed.constituent().series();
        let shock_idx =
            agg.position_after(scenario.pre_shock_date)
                .ok_or(EngineError::InsufficientData {
                    required: 1,
                    actual: 0,
                })?;
        let shocked = self.shocked_return(shock_idx, scenario.shock_magnitude, w)?;

        let values = agg
            .values()
            .iter()
            .zip(c.values())
            .enumerate()
            .map(|(i, (r_agg, r_c))| if i == shock_idx { shocked } else { r_agg - w * r_c })
            .collect();

        Ok(ReturnSeries::new(
            TimeSeries::new(agg.dates().to_vec(), values)?,
            self.decomposed.aggregate().convention(),
        ))
    }

    /// (1 - w) * r_ex at weight `w` on date `idx`, i.e. r_agg - w * r_c.
    fn residual_contribution(&self, idx: usize, w: f64) -> Result<f64> {
        let agg = self.decomposed.aggregate().series();
        let r_agg = agg.values()[idx];
        let r_c = self.decomposed.constituent().series().values()[idx];
        if !r_agg.is_finite() || !r_c.is_finite() {
            return Err(EngineError::MissingValue(agg.dates()[idx]));
        }
        Ok(r_agg - w * r_c)
    }

    fn shocked_return(&self, idx: usize, shock: f64, w: f64) -> Result<f64> {
        let residual = self.residual_contribution(idx, w)?;

        let baseline = self.decomposed.constituent().series().values()[idx];
        let shocked_constituent = match self.config.mode {
            ShockMode::Additive => baseline + shock,
            ShockMode::Replace => shock,
        };

        // A simple return of -100% or worse wipes out the position.
        if self.decomposed.constituent().convention() == ReturnConvention::Simple
            && shocked_constituent <= -1.0
        {
            return Err(EngineError::InvalidShock(shock));
        }

        Ok(w * shocked_constituent + residual)
    }
}

fn validate_weight(w: f64) -> Result<f64> {
    if w.is_finite() && (0.0..=1.0).contains(&w) {
        Ok(w)
    } else {
        Err(EngineError::InvalidWeight(w))
    }
}

fn next_weekday(date: NaiveDate) -> NaiveDate {
    let mut next = date + chrono::Days::new(1);
    while matches!(next.weekday(), Weekday::Sat | Weekday::Sun) {
        next = next + chrono::Days::new(1);
    }
    next
}
