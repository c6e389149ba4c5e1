//! Return series construction
//!
//! Converts adjusted price levels into period returns under one fixed
//! convention. The linear decomposition identity only holds exactly when every
//! series in an analysis uses the same convention, so each [`ReturnSeries`]
//! carries the convention it was built with.
//!
//! - Simple: r_t = p_t / p_{t-1} - 1
//! - Log:    r_t = ln(p_t / p_{t-1})

use crate::error::{EngineError, Result};
use crate::series::{TimeSeries, align_all};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Return convention shared by all derived series
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnConvention {
    /// p[t] / p[t-1] - 1
    #[default]
    #[display("simple")]
    Simple,
    /// ln(p[t] / p[t-1])
    #[display("log")]
    Log,
}

impl ReturnConvention {
    /// Return between two consecutive price levels.
    pub fn period_return(self, previous: f64, current: f64) -> f64 {
        match self {
            Self::Simple => current / previous - 1.0,
            Self::Log => (current / previous).ln(),
        }
    }

    /// Apply a return to a price level.
    pub fn compound(self, level: f64, ret: f64) -> f64 {
        match self {
            Self::Simple => level * (1.0 + ret),
            Self::Log => level * ret.exp(),
        }
    }
}

/// A return series tagged with the convention it was built with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnSeries {
    convention: ReturnConvention,
    series: TimeSeries,
}

impl ReturnSeries {
    /// Wrap already-computed returns.
    pub const fn new(series: TimeSeries, convention: ReturnConvention) -> Self {
        Self { convention, series }
    }

    /// Build returns from a price series.
    ///
    /// The return dated `t` is computed from the prices on `t` and on the
    /// previous observation, so the output is one element shorter.
    ///
    /// # Errors
    /// `InsufficientData` with fewer than 2 prices, `InvalidPrice` for
    /// non-finite or non-positive levels.
    pub fn from_prices(prices: &TimeSeries, convention: ReturnConvention) -> Result<Self> {
        if prices.len() < 2 {
            return Err(EngineError::InsufficientData {
                required: 2,
                actual: prices.len(),
            });
        }

        if let Some((date, price)) = prices.iter().find(|(_, p)| !p.is_finite() || *p <= 0.0) {
            return Err(EngineError::InvalidPrice { date, price });
        }

        let levels = prices.values();
        let returns = levels
            .windows(2)
            .map(|pair| convention.period_return(pair[0], pair[1]))
            .collect();

        let series = TimeSeries::new(prices.dates()[1..].to_vec(), returns)?;
        Ok(Self::new(series, convention))
    }

    /// The convention these returns were built with.
    pub const fn convention(&self) -> ReturnConvention {
        self.convention
    }

    /// The underlying date-indexed values.
    pub const fn series(&self) -> &TimeSeries {
        &self.series
    }

    /// Number of returns.
    pub const fn len(&self) -> usize {
        self.series.len()
    }

    /// Whether the series is empty.
    pub const fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Fail with `ConventionMismatch` unless `other` uses the same convention.
    pub fn ensure_same_convention(&self, other: &Self) -> Result<()> {
        if self.convention == other.convention {
            Ok(())
        } else {
            Err(EngineError::ConventionMismatch)
        }
    }

    /// Growth of one unit invested at the start: the compounded level after
    /// each return. NaN returns poison every later level.
    pub fn cumulative_growth(&self) -> TimeSeries {
        let mut level = 1.0;
        self.series.map(|r| {
            level = self.convention.compound(level, r);
            level
        })
    }
}

/// Inner join every price series on date.
///
/// Tickers trade on slightly different calendars; dropping dates missing from
/// any ticker keeps the decomposition well defined.
pub fn align_prices(prices: &BTreeMap<String, TimeSeries>) -> BTreeMap<String, TimeSeries> {
    let series: Vec<&TimeSeries> = prices.values().collect();
    prices
        .keys()
        .cloned()
        .zip(align_all(&series))
        .collect()
}

/// Convert every ticker's prices into returns under one convention.
pub fn build_returns(
    prices: &BTreeMap<String, TimeSeries>,
    convention: ReturnConvention,
) -> Result<BTreeMap<String, ReturnSeries>> {
    prices
        .iter()
        .map(|(ticker, series)| {
            ReturnSeries::from_prices(series, convention).map(|r| (ticker.clone(), r))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;
    use rstest::rstest;

    fn prices(values: &[f64]) -> TimeSeries {
        let dates = (0..values.len())
            .map(|i| NaiveDate::from_ymd_opt(2024, 3, 1 + i as u32).unwrap())
            .collect();
        TimeSeries::new(dates, values.to_vec()).unwrap()
    }

    #[test]
    fn test_simple_returns() {
        let r = ReturnSeries::from_prices(&prices(&[100.0, 110.0, 99.0]), ReturnConvention::Simple)
            .unwrap();
        assert_eq!(r.len(), 2);
        assert_relative_eq!(r.series().values()[0], 0.10, epsilon = 1e-12);
        assert_relative_eq!(r.series().values()[1], -0.10, epsilon = 1e-12);
        assert_eq!(r.series().first_date(), NaiveDate::from_ymd_opt(2024, 3, 2));
    }

    #[test]
    fn test_log_returns() {
        let r = ReturnSeries::from_prices(&prices(&[100.0, 200.0]), ReturnConvention::Log).unwrap();
        assert_relative_eq!(r.series().values()[0], 2.0_f64.ln(), epsilon = 1e-12);
    }

    #[rstest]
    #[case(&[])]
    #[case(&[100.0])]
    fn test_insufficient_prices(#[case] levels: &[f64]) {
        let result = ReturnSeries::from_prices(&prices(levels), ReturnConvention::Simple);
        assert!(matches!(result, Err(EngineError::InsufficientData { required: 2, .. })));
    }

    #[rstest]
    #[case(0.0)]
    #[case(-5.0)]
    #[case(f64::NAN)]
    fn test_invalid_price(#[case] bad: f64) {
        let result = ReturnSeries::from_prices(&prices(&[100.0, bad, 90.0]), ReturnConvention::Log);
        assert!(matches!(result, Err(EngineError::InvalidPrice { .. })));
    }

    #[rstest]
    #[case(ReturnConvention::Simple)]
    #[case(ReturnConvention::Log)]
    fn test_cumulative_growth_recovers_price_ratio(#[case] convention: ReturnConvention) {
        let levels = [50.0, 55.0, 40.0, 61.0];
        let r = ReturnSeries::from_prices(&prices(&levels), convention).unwrap();
        let growth = r.cumulative_growth();
        assert_relative_eq!(*growth.values().last().unwrap(), 61.0 / 50.0, epsilon = 1e-12);
    }

    #[test]
    fn test_convention_mismatch() {
        let a = ReturnSeries::from_prices(&prices(&[1.0, 2.0]), ReturnConvention::Simple).unwrap();
        let b = ReturnSeries::from_prices(&prices(&[1.0, 2.0]), ReturnConvention::Log).unwrap();
        assert_eq!(a.ensure_same_convention(&b), Err(EngineError::ConventionMismatch));
    }

    #[test]
    fn test_build_returns_per_ticker() {
        let mut map = BTreeMap::new();
        map.insert("SPX".to_string(), prices(&[100.0, 101.0, 102.0]));
        map.insert("NVDA".to_string(), prices(&[10.0, 12.0, 9.0]));

        let returns = build_returns(&map, ReturnConvention::Simple).unwrap();
        assert_eq!(returns.len(), 2);
        assert!(returns.values().all(|r| r.len() == 2));
    }

    #[test]
    fn test_align_prices_drops_partial_dates() {
        let spx = prices(&[100.0, 101.0, 102.0]);
        let nvda = TimeSeries::new(spx.dates()[1..].to_vec(), vec![12.0, 9.0]).unwrap();

        let mut map = BTreeMap::new();
        map.insert("SPX".to_string(), spx);
        map.insert("NVDA".to_string(), nvda);

        let aligned = align_prices(&map);
        assert_eq!(aligned["SPX"].len(), 2);
        assert!(aligned["SPX"].same_index(&aligned["NVDA"]));
    }

    #[test]
    fn test_convention_display() {
        assert_eq!(ReturnConvention::Simple.to_string(), "simple");
        assert_eq!(ReturnConvention::Log.to_string(), "log");
    }
}
