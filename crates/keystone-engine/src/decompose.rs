//! Linear return decomposition
//!
//! Splits an aggregate (index) return into the contribution of one named
//! constituent and everything else:
//!
//! r_agg = w * r_c + (1 - w) * r_ex
//!
//! so the ex-constituent return is
//!
//! r_ex = (r_agg - w * r_c) / (1 - w)
//!
//! A weight of exactly 1 leaves no residual to solve for. Those dates get a
//! NaN ex-constituent return instead of an error, and downstream consumers
//! decide whether to propagate or drop them.

use crate::error::{EngineError, Result};
use crate::returns::{ReturnConvention, ReturnSeries};
use crate::series::TimeSeries;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Assumed fractional contribution of the constituent to the aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExposureWeight {
    /// Same weight on every date
    Constant(f64),
    /// Per-date weights; must cover every date being decomposed
    Series(TimeSeries),
}

impl ExposureWeight {
    /// Resolve the weight on each of `dates`.
    ///
    /// # Errors
    /// `MisalignedIndex` if a weight series misses a date, `InvalidWeight` for a
    /// non-finite weight.
    pub fn resolve(&self, dates: &[NaiveDate]) -> Result<TimeSeries> {
        let resolved = match self {
            Self::Constant(w) => TimeSeries::constant(dates, *w)?,
            Self::Series(series) => series.reindex(dates)?,
        };

        if let Some(&bad) = resolved.values().iter().find(|w| !w.is_finite()) {
            return Err(EngineError::InvalidWeight(bad));
        }

        let out_of_range = resolved
            .values()
            .iter()
            .filter(|w| !(0.0..=1.0).contains(*w))
            .count();
        if out_of_range > 0 {
            warn!(
                out_of_range,
                "exposure weight outside [0, 1] on some dates; decomposing anyway"
            );
        }

        Ok(resolved)
    }
}

impl From<f64> for ExposureWeight {
    fn from(w: f64) -> Self {
        Self::Constant(w)
    }
}

/// Aggregate, constituent and ex-constituent returns on one date index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecomposedReturns {
    aggregate: ReturnSeries,
    constituent: ReturnSeries,
    ex_constituent: ReturnSeries,
    weights: TimeSeries,
}

impl DecomposedReturns {
    /// Aggregate returns.
    pub const fn aggregate(&self) -> &ReturnSeries {
        &self.aggregate
    }

    /// Constituent returns.
    pub const fn constituent(&self) -> &ReturnSeries {
        &self.constituent
    }

    /// Residual ("everything except the constituent") returns.
    pub const fn ex_constituent(&self) -> &ReturnSeries {
        &self.ex_constituent
    }

    /// Weight applied on each date.
    pub const fn weights(&self) -> &TimeSeries {
        &self.weights
    }

    /// Shared date index.
    pub fn dates(&self) -> &[NaiveDate] {
        self.aggregate.series().dates()
    }

    /// Dates where the weight was exactly 1 and the residual is undefined.
    pub fn degenerate_dates(&self) -> Vec<NaiveDate> {
        self.ex_constituent
            .series()
            .iter()
            .zip(self.weights.values())
            .filter(|((_, ex), w)| ex.is_nan() && **w == 1.0)
            .map(|((date, _), _)| date)
            .collect()
    }

    /// Re-substitute the parts: w * r_c + (1 - w) * r_ex on every date.
    pub fn reconstruct(&self) -> TimeSeries {
        let values = self
            .constituent
            .series()
            .values()
            .iter()
            .zip(self.ex_constituent.series().values())
            .zip(self.weights.values())
            .map(|((c, ex), w)| w * c + (1.0 - w) * ex)
            .collect();

        // Same index as the inputs, so this cannot fail.
        TimeSeries::new(self.dates().to_vec(), values).unwrap_or_else(|_| TimeSeries::empty())
    }

    /// Largest relative gap between the aggregate and its reconstruction,
    /// `|rebuilt - actual| / max(|actual|, 1)`, ignoring degenerate dates.
    pub fn max_identity_error(&self) -> f64 {
        self.reconstruct()
            .values()
            .iter()
            .zip(self.aggregate.series().values())
            .map(|(rebuilt, actual)| (rebuilt - actual).abs() / actual.abs().max(1.0))
            .filter(|err| !err.is_nan())
            .fold(0.0, f64::max)
    }
}

/// Decompose aggregate returns into constituent and ex-constituent parts.
///
/// Both series must share exactly the same date index and convention.
///
/// # Errors
/// `MisalignedIndex` for differing indices or an incomplete weight series,
/// `ConventionMismatch` for mixed conventions, `InvalidWeight` for non-finite
/// weights.
pub fn decompose(
    aggregate: &ReturnSeries,
    constituent: &ReturnSeries,
    weight: &ExposureWeight,
) -> Result<DecomposedReturns> {
    aggregate.ensure_same_convention(constituent)?;
    aggregate.series().ensure_same_index(constituent.series())?;

    let dates = aggregate.series().dates();
    let weights = weight.resolve(dates)?;

    let ex_values: Vec<f64> = aggregate
        .series()
        .values()
        .iter()
        .zip(constituent.series().values())
        .zip(weights.values())
        .map(|((agg, c), w)| {
            if *w == 1.0 {
                f64::NAN
            } else {
                (agg - w * c) / (1.0 - w)
            }
        })
        .collect();

    let ex_constituent = ReturnSeries::new(
        TimeSeries::new(dates.to_vec(), ex_values)?,
        aggregate.convention(),
    );

    let result = DecomposedReturns {
        aggregate: aggregate.clone(),
        constituent: constituent.clone(),
        ex_constituent,
        weights,
    };

    let degenerate = result.degenerate_dates().len();
    if degenerate > 0 {
        debug!(degenerate, "weight of 1 on some dates; ex-constituent set to NaN");
    }

    Ok(result)
}

/// Inner-join two price series on date, build returns under `convention`,
/// then decompose.
///
/// Joining prices rather than returns keeps every return a one-step change
/// between two dates both series traded. A return computed across a gap in
/// the other series would otherwise be paired with a one-day return.
///
/// # Errors
/// `InsufficientData` if fewer than two dates are shared, plus anything
/// `ReturnSeries::from_prices` or [`decompose`] rejects.
pub fn decompose_aligned(
    aggregate_prices: &TimeSeries,
    constituent_prices: &TimeSeries,
    convention: ReturnConvention,
    weight: &ExposureWeight,
) -> Result<DecomposedReturns> {
    let (aggregate_prices, constituent_prices) = aggregate_prices.inner_join(constituent_prices);
    if aggregate_prices.len() < 2 {
        return Err(EngineError::InsufficientData {
            required: 2,
            actual: aggregate_prices.len(),
        });
    }
    let aggregate = ReturnSeries::from_prices(&aggregate_prices, convention)?;
    let constituent = ReturnSeries::from_prices(&constituent_prices, convention)?;
    decompose(&aggregate, &constituent, weight)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn dates(n: usize) -> Vec<NaiveDate> {
        (0..n)
            .map(|i| NaiveDate::from_ymd_opt(2024, 5, 1 + i as u32).unwrap())
            .collect()
    }

    fn returns(values: &[f64]) -> ReturnSeries {
        ReturnSeries::new(
            TimeSeries::new(dates(values.len()), values.to_vec()).unwrap(),
            ReturnConvention::Simple,
        )
    }

    #[test]
    fn test_worked_example() {
        let aggregate = returns(&[0.01, -0.02, 0.015]);
        let constituent = returns(&[0.05, -0.10, 0.08]);

        let result = decompose(&aggregate, &constituent, &ExposureWeight::Constant(0.2)).unwrap();
        let ex = result.ex_constituent().series().values();

        assert_relative_eq!(ex[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(ex[1], 0.0, epsilon = 1e-12);
        assert_relative_eq!(ex[2], -0.00125, epsilon = 1e-12);

        let rebuilt = result.reconstruct();
        for (r, a) in rebuilt.values().iter().zip(aggregate.series().values()) {
            assert_relative_eq!(*r, *a, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_identity_error_is_relative_to_large_returns() {
        let aggregate = returns(&[0.01, 4.0]);
        let constituent = returns(&[0.02, 3.0]);
        let mut result =
            decompose(&aggregate, &constituent, &ExposureWeight::Constant(0.2)).unwrap();
        assert!(result.max_identity_error() < 1e-12);

        // Off by 0.004 on a 400% return and by 0.0005 on a 1% return.
        let ex = result.ex_constituent.series().values().to_vec();
        result.ex_constituent = ReturnSeries::new(
            TimeSeries::new(dates(2), vec![ex[0] + 0.0005 / 0.8, ex[1] + 0.004 / 0.8]).unwrap(),
            ReturnConvention::Simple,
        );
        assert_relative_eq!(result.max_identity_error(), 0.001, epsilon = 1e-12);
    }

    #[test]
    fn test_degenerate_weight_is_nan_only_on_that_date() {
        let aggregate = returns(&[0.01, 0.02, 0.03]);
        let constituent = returns(&[0.02, 0.04, 0.01]);
        let weights = TimeSeries::new(dates(3), vec![0.1, 1.0, 0.1]).unwrap();

        let result =
            decompose(&aggregate, &constituent, &ExposureWeight::Series(weights)).unwrap();
        let ex = result.ex_constituent().series().values();

        assert!(!ex[0].is_nan());
        assert!(ex[1].is_nan());
        assert!(!ex[2].is_nan());
        assert_eq!(result.degenerate_dates(), vec![dates(3)[1]]);
        assert!(result.max_identity_error() < 1e-12);
    }

    #[test]
    fn test_misaligned_inputs_fail() {
        let aggregate = returns(&[0.01, 0.02, 0.03]);
        let constituent = returns(&[0.02, 0.04]);
        let result = decompose(&aggregate, &constituent, &0.1.into());
        assert!(matches!(result, Err(EngineError::MisalignedIndex(_))));
    }

    #[test]
    fn test_weight_series_must_cover_dates() {
        let aggregate = returns(&[0.01, 0.02, 0.03]);
        let constituent = returns(&[0.02, 0.04, 0.01]);
        let weights = TimeSeries::new(dates(2), vec![0.1, 0.1]).unwrap();
        let result = decompose(&aggregate, &constituent, &ExposureWeight::Series(weights));
        assert!(matches!(result, Err(EngineError::MisalignedIndex(_))));
    }

    #[test]
    fn test_nan_weight_rejected() {
        let aggregate = returns(&[0.01]);
        let constituent = returns(&[0.02]);
        let result = decompose(&aggregate, &constituent, &ExposureWeight::Constant(f64::NAN));
        assert!(matches!(result, Err(EngineError::InvalidWeight(_))));
    }

    #[test]
    fn test_decompose_aligned_joins_prices_first() {
        let aggregate = TimeSeries::new(dates(4), vec![100.0, 100.0, 90.0, 100.0]).unwrap();
        // No constituent print on the day the aggregate fell.
        let c_dates = vec![dates(4)[0], dates(4)[1], dates(4)[3]];
        let constituent = TimeSeries::new(c_dates.clone(), vec![50.0, 50.0, 55.0]).unwrap();

        let result =
            decompose_aligned(&aggregate, &constituent, ReturnConvention::Simple, &0.5.into())
                .unwrap();
        assert_eq!(result.dates(), &c_dates[1..]);

        // 100 -> 100 across the gap, not the one-day 90 -> 100 rebound.
        let agg = result.aggregate().series().values();
        assert_relative_eq!(agg[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(agg[1], 0.0, epsilon = 1e-12);
        assert_relative_eq!(
            result.ex_constituent().series().values()[1],
            (0.0 - 0.5 * 0.10) / 0.5,
            epsilon = 1e-12
        );
        assert!(result.max_identity_error() < 1e-12);
    }

    #[test]
    fn test_decompose_aligned_needs_two_shared_dates() {
        let aggregate = TimeSeries::new(dates(2), vec![100.0, 101.0]).unwrap();
        let constituent = TimeSeries::new(dates(3)[1..].to_vec(), vec![50.0, 51.0]).unwrap();
        let result =
            decompose_aligned(&aggregate, &constituent, ReturnConvention::Simple, &0.1.into());
        assert!(matches!(
            result,
            Err(EngineError::InsufficientData { required: 2, actual: 1 })
        ));
    }
}
