//! Conversion between quote DataFrames and date-indexed series.
//!
//! Quote frames carry at least `symbol` (str), `date` (Date) and
//! `adjusted_close` (f64) columns, in any row order.

use crate::error::{DataError, Result};
use chrono::NaiveDate;
use keystone_engine::TimeSeries;
use polars::prelude::*;
use std::collections::BTreeMap;

/// Symbol column
pub const SYMBOL: &str = "symbol";
/// Trading date column
pub const DATE: &str = "date";
/// Split and dividend adjusted close column
pub const ADJUSTED_CLOSE: &str = "adjusted_close";

/// Days from 0001-01-01 to 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Convert a polars date (days since the Unix epoch) to a `NaiveDate`.
pub fn date_from_epoch_days(days: i32) -> Result<NaiveDate> {
    days.checked_add(UNIX_EPOCH_DAYS_FROM_CE)
        .and_then(NaiveDate::from_num_days_from_ce_opt)
        .ok_or_else(|| DataError::TimeConversion(format!("date out of range: {} days", days)))
}

/// Split a quote frame into one adjusted close series per symbol.
///
/// Rows with a null symbol, date or price are skipped. When a symbol has
/// several rows for one date the last one in frame order wins.
pub fn frame_to_series(df: &DataFrame) -> Result<BTreeMap<String, TimeSeries>> {
    let sorted = df
        .clone()
        .lazy()
        .select([
            col(SYMBOL),
            col(DATE).cast(DataType::Int32),
            col(ADJUSTED_CLOSE).cast(DataType::Float64),
        ])
        .sort(
            [SYMBOL, DATE],
            SortMultipleOptions::default().with_maintain_order(true),
        )
        .collect()?;

    let symbols = sorted.column(SYMBOL)?.str()?;
    let days = sorted.column(DATE)?.i32()?;
    let prices = sorted.column(ADJUSTED_CLOSE)?.f64()?;

    let mut points: BTreeMap<String, Vec<(NaiveDate, f64)>> = BTreeMap::new();
    for i in 0..sorted.height() {
        let (Some(symbol), Some(day), Some(price)) = (symbols.get(i), days.get(i), prices.get(i))
        else {
            continue;
        };
        let date = date_from_epoch_days(day)?;
        let entry = points.entry(symbol.to_string()).or_default();
        match entry.last_mut() {
            Some(last) if last.0 == date => last.1 = price,
            _ => entry.push((date, price)),
        }
    }

    points
        .into_iter()
        .map(|(symbol, series)| Ok((symbol, TimeSeries::from_points(series)?)))
        .collect()
}

/// Build a quote frame (`symbol`, `date`, `adjusted_close`) from one series.
pub fn series_to_frame(symbol: &str, series: &TimeSeries) -> Result<DataFrame> {
    let dates: Vec<String> = series.dates().iter().map(ToString::to_string).collect();

    let df = DataFrame::new(vec![
        Series::new(SYMBOL.into(), vec![symbol; series.len()]).into(),
        Series::new(DATE.into(), dates).into(),
        Series::new(ADJUSTED_CLOSE.into(), series.values().to_vec()).into(),
    ])?;

    let df = df
        .lazy()
        .with_column(col(DATE).cast(DataType::Date))
        .collect()?;

    Ok(df)
}
