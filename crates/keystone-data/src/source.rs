//! Price sources.
//!
//! A [`PriceSource`] returns one adjusted close series per requested ticker,
//! restricted to `start..=end`. Every requested ticker must come back with at
//! least one observation or the whole request fails.

use crate::cache::SqliteCache;
use crate::error::{DataError, Result};
use crate::frame::frame_to_series;
use crate::yahoo::YahooQuoteProvider;
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use keystone_engine::TimeSeries;
use polars::prelude::DataFrame;
use std::collections::BTreeMap;
use std::future::Future;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Default number of concurrent fetches.
const DEFAULT_CONCURRENCY: usize = 4;

/// Supplies adjusted close prices per ticker
pub trait PriceSource {
    /// Fetch adjusted closes for every ticker within `start..=end`.
    ///
    /// # Errors
    /// `InvalidDateRange` for `start > end`, `InvalidSymbol` for an empty
    /// ticker, `DataUnavailable` when a ticker has no prices in the range.
    fn fetch_prices(
        &self,
        tickers: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> impl Future<Output = Result<BTreeMap<String, TimeSeries>>> + Send;
}

fn validate_request(tickers: &[String], start: NaiveDate, end: NaiveDate) -> Result<()> {
    if start > end {
        return Err(DataError::InvalidDateRange {
            start: start.to_string(),
            end: end.to_string(),
        });
    }
    if tickers.is_empty() {
        return Err(DataError::InvalidSymbol("No tickers requested".to_string()));
    }
    if let Some(bad) = tickers.iter().find(|t| t.trim().is_empty()) {
        return Err(DataError::InvalidSymbol(format!("{:?}", bad)));
    }
    Ok(())
}

/// Restrict each requested series to the range, failing on empty results.
fn select_range(
    mut available: BTreeMap<String, TimeSeries>,
    tickers: &[String],
    start: NaiveDate,
    end: NaiveDate,
) -> Result<BTreeMap<String, TimeSeries>> {
    tickers
        .iter()
        .map(|ticker| {
            let series = available
                .remove(ticker)
                .map(|s| s.between(start, end))
                .filter(|s| !s.is_empty())
                .ok_or_else(|| DataError::DataUnavailable {
                    symbol: ticker.clone(),
                    reason: format!("no prices between {} and {}", start, end),
                })?;
            Ok((ticker.clone(), series))
        })
        .collect()
}

/// Fixed, in-process price series
#[derive(Debug, Clone, Default)]
pub struct InMemoryPriceSource {
    series: BTreeMap<String, TimeSeries>,
}

impl InMemoryPriceSource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a ticker's prices.
    pub fn with_series(mut self, ticker: impl Into<String>, prices: TimeSeries) -> Self {
        self.insert(ticker, prices);
        self
    }

    /// Add (or replace) a ticker's prices in place.
    pub fn insert(&mut self, ticker: impl Into<String>, prices: TimeSeries) {
        self.series.insert(ticker.into(), prices);
    }

    /// Known tickers.
    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }
}

impl From<BTreeMap<String, TimeSeries>> for InMemoryPriceSource {
    fn from(series: BTreeMap<String, TimeSeries>) -> Self {
        Self { series }
    }
}

impl PriceSource for InMemoryPriceSource {
    fn fetch_prices(
        &self,
        tickers: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> impl Future<Output = Result<BTreeMap<String, TimeSeries>>> + Send {
        let result = validate_request(tickers, start, end).and_then(|()| {
            let requested = tickers
                .iter()
                .filter_map(|t| self.series.get(t).map(|s| (t.clone(), s.clone())))
                .collect();
            select_range(requested, tickers, start, end)
        });
        std::future::ready(result)
    }
}

/// Yahoo Finance prices with an optional SQLite quote cache
#[derive(Debug)]
pub struct YahooPriceSource {
    provider: YahooQuoteProvider,
    cache: Option<Mutex<SqliteCache>>,
    concurrency: usize,
    force_refresh: bool,
}

impl YahooPriceSource {
    /// Create a source without a cache.
    pub const fn new(provider: YahooQuoteProvider) -> Self {
        Self {
            provider,
            cache: None,
            concurrency: DEFAULT_CONCURRENCY,
            force_refresh: false,
        }
    }

    /// Read from and write to `cache`.
    pub fn with_cache(mut self, cache: SqliteCache) -> Self {
        self.cache = Some(Mutex::new(cache));
        self
    }

    /// Maximum number of tickers fetched at once (at least 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Ignore cached quotes and refetch everything (results are still cached).
    pub const fn with_force_refresh(mut self, force_refresh: bool) -> Self {
        self.force_refresh = force_refresh;
        self
    }

    /// Whether a cache is attached.
    pub const fn has_cache(&self) -> bool {
        self.cache.is_some()
    }

    async fn cached_frame(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> Option<DataFrame> {
        if self.force_refresh {
            return None;
        }
        let cache = self.cache.as_ref()?.lock().await;
        match cache.has_quotes(ticker, start, end) {
            Ok(true) => cache.get_quotes(ticker, start, end).ok(),
            Ok(false) => None,
            Err(e) => {
                warn!(ticker, error = %e, "cache lookup failed");
                None
            }
        }
    }

    async fn store(&self, ticker: &str, df: &DataFrame) {
        let Some(cache) = self.cache.as_ref() else {
            return;
        };
        match cache.lock().await.put_quotes(df) {
            Ok(rows) => debug!(ticker, rows, "cached quotes"),
            Err(e) => warn!(ticker, error = %e, "failed to cache quotes"),
        }
    }
}

impl PriceSource for YahooPriceSource {
    async fn fetch_prices(
        &self,
        tickers: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BTreeMap<String, TimeSeries>> {
        validate_request(tickers, start, end)?;

        let mut frames = Vec::with_capacity(tickers.len());
        let mut to_fetch = Vec::new();
        for ticker in tickers {
            match self.cached_frame(ticker, start, end).await {
                Some(df) => {
                    debug!(ticker = ticker.as_str(), "using cached quotes");
                    frames.push(df);
                }
                None => to_fetch.push(ticker.clone()),
            }
        }

        if !to_fetch.is_empty() {
            info!(
                tickers = to_fetch.len(),
                concurrency = self.concurrency,
                "fetching quotes from Yahoo Finance"
            );
        }

        let fetched: Vec<(String, Result<DataFrame>)> = stream::iter(to_fetch)
            .map(|ticker| async move {
                let result = self.provider.fetch_quotes(&ticker, start, end).await;
                (ticker, result)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut first_error = None;
        for (ticker, result) in fetched {
            match result {
                Ok(df) => {
                    self.store(&ticker, &df).await;
                    frames.push(df);
                }
                Err(e) => {
                    warn!(ticker = ticker.as_str(), error = %e, "failed to fetch quotes");
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        let mut available = BTreeMap::new();
        for df in &frames {
            available.extend(frame_to_series(df)?);
        }

        select_range(available, tickers, start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
    }

    fn source() -> InMemoryPriceSource {
        InMemoryPriceSource::new()
            .with_series(
                "^GSPC",
                TimeSeries::new(vec![d(1), d(2), d(3), d(6)], vec![5000.0, 5010.0, 4990.0, 5020.0])
                    .unwrap(),
            )
            .with_series(
                "NVDA",
                TimeSeries::new(vec![d(2), d(3), d(6)], vec![850.0, 860.0, 880.0]).unwrap(),
            )
    }

    fn tickers(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    #[tokio::test]
    async fn test_in_memory_range() {
        let prices = source()
            .fetch_prices(&tickers(&["^GSPC", "NVDA"]), d(2), d(3))
            .await
            .unwrap();

        assert_eq!(prices.len(), 2);
        assert_eq!(prices["^GSPC"].dates(), &[d(2), d(3)]);
        assert_eq!(prices["NVDA"].values(), &[850.0, 860.0]);
    }

    #[tokio::test]
    async fn test_unknown_ticker() {
        let result = source()
            .fetch_prices(&tickers(&["^GSPC", "MSFT"]), d(1), d(6))
            .await;
        assert!(matches!(
            result,
            Err(DataError::DataUnavailable { ref symbol, .. }) if symbol == "MSFT"
        ));
    }

    #[tokio::test]
    async fn test_empty_range() {
        let result = source()
            .fetch_prices(&tickers(&["NVDA"]), d(4), d(5))
            .await;
        assert!(matches!(result, Err(DataError::DataUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_invalid_requests() {
        let src = source();
        assert!(matches!(
            src.fetch_prices(&tickers(&["NVDA"]), d(6), d(1)).await,
            Err(DataError::InvalidDateRange { .. })
        ));
        assert!(matches!(
            src.fetch_prices(&tickers(&[""]), d(1), d(6)).await,
            Err(DataError::InvalidSymbol(_))
        ));
        assert!(matches!(
            src.fetch_prices(&[], d(1), d(6)).await,
            Err(DataError::InvalidSymbol(_))
        ));
    }
}
