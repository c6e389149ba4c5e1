//! Quote data fetching from Yahoo Finance.

use crate::error::{DataError, Result};
use crate::frame::{ADJUSTED_CLOSE, DATE, SYMBOL};
use chrono::{Days, NaiveDate, NaiveTime};
use polars::prelude::*;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;
use yahoo_finance_api as yahoo;

/// Yahoo Finance quote provider with rate limiting.
pub struct YahooQuoteProvider {
    provider: yahoo::YahooConnector,
    rate_limit_delay: Duration,
}

impl std::fmt::Debug for YahooQuoteProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YahooQuoteProvider")
            .field("rate_limit_delay", &self.rate_limit_delay)
            .finish_non_exhaustive()
    }
}

impl YahooQuoteProvider {
    /// Create a provider with default rate limiting (1 req/sec).
    pub fn new() -> Result<Self> {
        Self::with_rate_limit(Duration::from_millis(1000))
    }

    /// Create a provider with custom rate limiting.
    pub fn with_rate_limit(rate_limit_delay: Duration) -> Result<Self> {
        Ok(Self {
            provider: yahoo::YahooConnector::new()?,
            rate_limit_delay,
        })
    }

    /// Delay applied after each request.
    pub const fn rate_limit_delay(&self) -> Duration {
        self.rate_limit_delay
    }

    /// Fetch daily quotes for a single symbol, both ends inclusive.
    ///
    /// # Returns
    /// A Polars DataFrame with columns: symbol, date, close, adjusted_close
    pub async fn fetch_quotes(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<DataFrame> {
        if start > end {
            return Err(DataError::InvalidDateRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }

        if symbol.trim().is_empty() {
            return Err(DataError::InvalidSymbol("Empty symbol".to_string()));
        }

        // Yahoo treats the end timestamp as exclusive.
        let end_exclusive = end
            .checked_add_days(Days::new(1))
            .ok_or_else(|| DataError::TimeConversion(format!("end date out of range: {}", end)))?;
        let start_time = to_offset_datetime(start)?;
        let end_time = to_offset_datetime(end_exclusive)?;

        debug!(symbol, %start, %end, "requesting quote history");
        let response = self
            .provider
            .get_quote_history(symbol, start_time, end_time)
            .await?;

        let quotes = response
            .quotes()
            .map_err(|e| DataError::YahooApi(e.to_string()))?;

        if quotes.is_empty() {
            return Err(DataError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: "No data returned from Yahoo Finance".to_string(),
            });
        }

        let timestamps: Vec<i64> = quotes.iter().map(|q| q.timestamp).collect();
        let closes: Vec<f64> = quotes.iter().map(|q| q.close).collect();
        let adj_closes: Vec<f64> = quotes.iter().map(|q| q.adjclose).collect();

        let mut df = DataFrame::new(vec![
            Series::new("timestamp".into(), timestamps).into(),
            Series::new("close".into(), closes).into(),
            Series::new(ADJUSTED_CLOSE.into(), adj_closes).into(),
        ])?;

        let symbol_col: Column = Series::new(SYMBOL.into(), vec![symbol; df.height()]).into();
        df.with_column(symbol_col)?;

        let df = df
            .lazy()
            .with_column(
                (col("timestamp") * lit(1_000_000_000))
                    .cast(DataType::Datetime(TimeUnit::Nanoseconds, None))
                    .cast(DataType::Date)
                    .alias(DATE),
            )
            .select(&[col(SYMBOL), col(DATE), col("close"), col(ADJUSTED_CLOSE)])
            .collect()?;

        sleep(self.rate_limit_delay).await;

        Ok(df)
    }
}

fn to_offset_datetime(date: NaiveDate) -> Result<time::OffsetDateTime> {
    let timestamp = date.and_time(NaiveTime::MIN).and_utc().timestamp();
    time::OffsetDateTime::from_unix_timestamp(timestamp)
        .map_err(|e| DataError::TimeConversion(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_datetime_is_midnight_utc() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let odt = to_offset_datetime(date).unwrap();
        assert_eq!(odt.unix_timestamp(), 1_704_153_600);
    }

    #[tokio::test]
    async fn test_invalid_date_range() {
        let provider = YahooQuoteProvider::with_rate_limit(Duration::ZERO).unwrap();
        let start = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        let result = provider.fetch_quotes("NVDA", start, end).await;
        assert!(matches!(result, Err(DataError::InvalidDateRange { .. })));
    }

    #[tokio::test]
    async fn test_invalid_symbol() {
        let provider = YahooQuoteProvider::with_rate_limit(Duration::ZERO).unwrap();
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();

        let result = provider.fetch_quotes(" ", start, end).await;
        assert!(matches!(result, Err(DataError::InvalidSymbol(_))));
    }

    #[tokio::test]
    #[ignore = "requires network access"]
    async fn test_fetch_quotes() {
        let provider = YahooQuoteProvider::new().unwrap();
        let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();

        let df = provider.fetch_quotes("NVDA", start, end).await.unwrap();
        assert!(df.height() > 0);
        assert_eq!(
            df.get_column_names(),
            vec!["symbol", "date", "close", "adjusted_close"]
        );
    }
}
