//! Date-indexed series
//!
//! `TimeSeries` is the ordered container every component exchanges: a strictly
//! increasing sequence of dates paired with one `f64` per date. Gaps (non-trading
//! days) are allowed; series from different tickers are brought onto a common
//! index with [`TimeSeries::inner_join`] before they are combined.

use crate::error::{EngineError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Ordered `(date, value)` series with a strictly increasing date index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSeries", into = "RawSeries")]
pub struct TimeSeries {
    dates: Vec<NaiveDate>,
    values: Vec<f64>,
}

#[derive(Serialize, Deserialize)]
struct RawSeries {
    dates: Vec<NaiveDate>,
    values: Vec<f64>,
}

impl TryFrom<RawSeries> for TimeSeries {
    type Error = EngineError;

    fn try_from(raw: RawSeries) -> Result<Self> {
        Self::new(raw.dates, raw.values)
    }
}

impl From<TimeSeries> for RawSeries {
    fn from(series: TimeSeries) -> Self {
        Self {
            dates: series.dates,
            values: series.values,
        }
    }
}

impl TimeSeries {
    /// Create a series, validating the index.
    ///
    /// # Errors
    /// `LengthMismatch` if the vectors differ in length, `UnorderedIndex` if the
    /// dates are not strictly increasing.
    pub fn new(dates: Vec<NaiveDate>, values: Vec<f64>) -> Result<Self> {
        if dates.len() != values.len() {
            return Err(EngineError::LengthMismatch {
                dates: dates.len(),
                values: values.len(),
            });
        }

        if let Some(position) = dates.windows(2).position(|pair| pair[0] >= pair[1]) {
            return Err(EngineError::UnorderedIndex {
                position: position + 1,
            });
        }

        Ok(Self { dates, values })
    }

    /// Create a series from `(date, value)` pairs already in date order.
    pub fn from_points<I>(points: I) -> Result<Self>
    where
        I: IntoIterator<Item = (NaiveDate, f64)>,
    {
        let (dates, values) = points.into_iter().unzip();
        Self::new(dates, values)
    }

    /// Series holding the same value on every date of `dates`.
    pub fn constant(dates: &[NaiveDate], value: f64) -> Result<Self> {
        Self::new(dates.to_vec(), vec![value; dates.len()])
    }

    /// An empty series.
    pub const fn empty() -> Self {
        Self {
            dates: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Number of observations.
    pub const fn len(&self) -> usize {
        self.dates.len()
    }

    /// Whether the series has no observations.
    pub const fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// The date index.
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// The values, in date order.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// First date, if any.
    pub fn first_date(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    /// Last date, if any.
    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    /// Iterate over `(date, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.dates.iter().copied().zip(self.values.iter().copied())
    }

    /// Position of `date` in the index.
    pub fn position(&self, date: NaiveDate) -> Option<usize> {
        self.dates.binary_search(&date).ok()
    }

    /// Value on `date`.
    pub fn get(&self, date: NaiveDate) -> Option<f64> {
        self.position(date).map(|i| self.values[i])
    }

    /// Position of the first date strictly after `date`.
    pub fn position_after(&self, date: NaiveDate) -> Option<usize> {
        let idx = self.dates.partition_point(|d| *d <= date);
        (idx < self.dates.len()).then_some(idx)
    }

    /// Whether both series share exactly the same date index.
    pub fn same_index(&self, other: &Self) -> bool {
        self.dates == other.dates
    }

    /// Fail with `MisalignedIndex` unless both series share the same index.
    pub fn ensure_same_index(&self, other: &Self) -> Result<()> {
        if self.same_index(other) {
            return Ok(());
        }

        let first_diff = self
            .dates
            .iter()
            .zip(other.dates.iter())
            .find(|(a, b)| a != b)
            .map(|(a, b)| format!("first difference {} vs {}", a, b))
            .unwrap_or_else(|| "one index is a prefix of the other".to_string());

        Err(EngineError::MisalignedIndex(format!(
            "{} vs {} observations, {}",
            self.len(),
            other.len(),
            first_diff
        )))
    }

    /// Restrict both series to the dates they have in common.
    pub fn inner_join(&self, other: &Self) -> (Self, Self) {
        let mut left = Self::empty();
        let mut right = Self::empty();
        let (mut i, mut j) = (0, 0);

        while i < self.len() && j < other.len() {
            match self.dates[i].cmp(&other.dates[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    left.dates.push(self.dates[i]);
                    left.values.push(self.values[i]);
                    right.dates.push(other.dates[j]);
                    right.values.push(other.values[j]);
                    i += 1;
                    j += 1;
                }
            }
        }

        (left, right)
    }

    /// Restrict the series to the dates listed in `dates`.
    ///
    /// # Errors
    /// `MisalignedIndex` if any requested date is missing from the series.
    pub fn reindex(&self, dates: &[NaiveDate]) -> Result<Self> {
        let values = dates
            .iter()
            .map(|date| {
                self.get(*date).ok_or_else(|| {
                    EngineError::MisalignedIndex(format!("no observation on {}", date))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Self::new(dates.to_vec(), values)
    }

    /// Apply `f` to every value, keeping the index.
    pub fn map<F>(&self, mut f: F) -> Self
    where
        F: FnMut(f64) -> f64,
    {
        Self {
            dates: self.dates.clone(),
            values: self.values.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Drop observations whose value is NaN.
    pub fn drop_nan(&self) -> Self {
        let (dates, values) = self.iter().filter(|(_, v)| !v.is_nan()).unzip();
        Self { dates, values }
    }

    /// Observations from position `start` onwards.
    pub fn tail_from(&self, start: usize) -> Self {
        let start = start.min(self.len());
        Self {
            dates: self.dates[start..].to_vec(),
            values: self.values[start..].to_vec(),
        }
    }

    /// Observations with `start <= date <= end`.
    pub fn between(&self, start: NaiveDate, end: NaiveDate) -> Self {
        let (dates, values) = self
            .iter()
            .filter(|(d, _)| *d >= start && *d <= end)
            .unzip();
        Self { dates, values }
    }
}

/// Inner join of any number of series: every output shares the dates present
/// in all inputs.
pub fn align_all(series: &[&TimeSeries]) -> Vec<TimeSeries> {
    let Some((first, rest)) = series.split_first() else {
        return Vec::new();
    };

    let common: Vec<NaiveDate> = first
        .dates()
        .iter()
        .copied()
        .filter(|d| rest.iter().all(|s| s.position(*d).is_some()))
        .collect();

    series
        .iter()
        .map(|s| {
            let values = common
                .iter()
                .filter_map(|d| s.get(*d))
                .collect::<Vec<_>>();
            TimeSeries {
                dates: common.clone(),
                values,
            }
        })
        .collect()
}
