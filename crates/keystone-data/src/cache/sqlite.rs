//! SQLite caching layer for adjusted close prices.

use crate::error::{DataError, Result};
use crate::frame::{ADJUSTED_CLOSE, DATE, SYMBOL};
use chrono::{Days, NaiveDate, Utc};
use polars::prelude::*;
use rusqlite::{Connection, params};
use std::path::Path;

/// Calendar days of slack at either end of a requested range when deciding
/// whether the cache covers it (weekends and market holidays).
const COVERAGE_SLACK_DAYS: u64 = 4;

/// SQLite cache for market data.
#[derive(Debug)]
pub struct SqliteCache {
    conn: Connection,
}

impl SqliteCache {
    /// Create a new SQLite cache.
    ///
    /// # Arguments
    /// * `path` - Path to the SQLite database file
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let cache = Self { conn };
        cache.initialize_schema()?;
        Ok(cache)
    }

    /// Create an in-memory cache (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let cache = Self { conn };
        cache.initialize_schema()?;
        Ok(cache)
    }

    fn initialize_schema(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS quotes (
                symbol TEXT NOT NULL,
                date TEXT NOT NULL,
                adjusted_close REAL NOT NULL,
                cached_at TEXT NOT NULL,
                PRIMARY KEY (symbol, date)
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_quotes_symbol_date ON quotes(symbol, date)",
            [],
        )?;

        Ok(())
    }

    /// Check if the cached quotes for a symbol span the date range.
    pub fn has_quotes(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<bool> {
        let (first, last): (Option<String>, Option<String>) = self.conn.query_row(
            "SELECT MIN(date), MAX(date) FROM quotes
             WHERE symbol = ?1 AND date >= ?2 AND date <= ?3",
            params![symbol, start.to_string(), end.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let (Some(first), Some(last)) = (first, last) else {
            return Ok(false);
        };
        let first = parse_date(&first)?;
        let last = parse_date(&last)?;

        let slack = Days::new(COVERAGE_SLACK_DAYS);
        let covers_start = start.checked_add_days(slack).is_none_or(|d| first <= d);
        let covers_end = end.checked_sub_days(slack).is_none_or(|d| last >= d);
        Ok(covers_start && covers_end)
    }

    /// Get cached quotes (`symbol`, `date`, `adjusted_close`) for a symbol and
    /// date range.
    pub fn get_quotes(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<DataFrame> {
        let mut stmt = self.conn.prepare(
            "SELECT date, adjusted_close
             FROM quotes
             WHERE symbol = ?1 AND date >= ?2 AND date <= ?3
             ORDER BY date ASC",
        )?;

        let rows = stmt.query_map(params![symbol, start.to_string(), end.to_string()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?;

        let mut dates = Vec::new();
        let mut adj_closes = Vec::new();
        for row in rows {
            let (date, adj_close) = row?;
            dates.push(date);
            adj_closes.push(adj_close);
        }

        if dates.is_empty() {
            return Err(DataError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: "No cached data found".to_string(),
            });
        }

        let df = DataFrame::new(vec![
            Series::new(SYMBOL.into(), vec![symbol; dates.len()]).into(),
            Series::new(DATE.into(), dates).into(),
            Series::new(ADJUSTED_CLOSE.into(), adj_closes).into(),
        ])?;

        let df = df
            .lazy()
            .with_column(col(DATE).cast(DataType::Date))
            .collect()?;

        Ok(df)
    }

    /// Store quotes in the cache, replacing existing rows for the same
    /// `(symbol, date)`.
    pub fn put_quotes(&self, df: &DataFrame) -> Result<usize> {
        let cached_at = Utc::now().to_rfc3339();

        let symbols = df.column(SYMBOL)?.str()?;
        let dates = df.column(DATE)?.cast(&DataType::String)?;
        let dates = dates.str()?;
        let adj_closes = df.column(ADJUSTED_CLOSE)?.f64()?;

        let tx = self.conn.unchecked_transaction()?;
        let mut written = 0;

        for i in 0..df.height() {
            let symbol = symbols
                .get(i)
                .ok_or_else(|| DataError::Parse("Missing symbol".to_string()))?;
            let date = dates
                .get(i)
                .ok_or_else(|| DataError::Parse("Missing date".to_string()))?;
            // Yahoo leaves gaps as nulls; nothing to cache for those rows.
            let Some(adj_close) = adj_closes.get(i) else {
                continue;
            };

            written += tx.execute(
                "INSERT OR REPLACE INTO quotes (symbol, date, adjusted_close, cached_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![symbol, date, adj_close, cached_at],
            )?;
        }

        tx.commit()?;
        Ok(written)
    }

    /// Symbols with at least one cached quote.
    pub fn symbols(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT symbol FROM quotes ORDER BY symbol")?;
        let symbols = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(symbols)
    }

    /// Clear all cached data.
    pub fn clear_all(&self) -> Result<()> {
        self.conn.execute("DELETE FROM quotes", [])?;
        Ok(())
    }

    /// Clear cached data for a specific symbol.
    pub fn clear_symbol(&self, symbol: &str) -> Result<usize> {
        let removed = self
            .conn
            .execute("DELETE FROM quotes WHERE symbol = ?1", params![symbol])?;
        Ok(removed)
    }

    /// Get cache statistics.
    pub fn get_stats(&self) -> Result<CacheStats> {
        let (quotes_count, symbols_count, oldest, newest): (
            i64,
            i64,
            Option<String>,
            Option<String>,
        ) = self.conn.query_row(
            "SELECT COUNT(*), COUNT(DISTINCT symbol), MIN(date), MAX(date) FROM quotes",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?;

        Ok(CacheStats {
            total_quotes: quotes_count as usize,
            unique_symbols: symbols_count as usize,
            oldest_date: oldest.as_deref().map(parse_date).transpose()?,
            newest_date: newest.as_deref().map(parse_date).transpose()?,
        })
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| DataError::Parse(format!("Invalid cached date {}: {}", s, e)))
}

/// Cache statistics.
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Total number of quote records
    pub total_quotes: usize,
    /// Number of unique symbols
    pub unique_symbols: usize,
    /// Earliest cached date
    pub oldest_date: Option<NaiveDate>,
    /// Latest cached date
    pub newest_date: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{frame_to_series, series_to_frame};
    use keystone_engine::TimeSeries;

    fn weekdays(start: NaiveDate, n: usize) -> Vec<NaiveDate> {
        use chrono::Datelike;
        start
            .iter_days()
            .filter(|d| d.weekday().number_from_monday() <= 5)
            .take(n)
            .collect()
    }

    fn cached(symbol: &str, dates: Vec<NaiveDate>) -> DataFrame {
        let values = (0..dates.len()).map(|i| 100.0 + i as f64).collect();
        series_to_frame(symbol, &TimeSeries::new(dates, values).unwrap()).unwrap()
    }

    #[test]
    fn test_cache_initialization() {
        let cache = SqliteCache::in_memory();
        assert!(cache.is_ok());
    }

    #[test]
    fn test_quote_round_trip() {
        let cache = SqliteCache::in_memory().unwrap();
        let dates = weekdays(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(), 20);
        let df = cached("NVDA", dates.clone());

        assert_eq!(cache.put_quotes(&df).unwrap(), 20);

        let back = cache
            .get_quotes("NVDA", dates[0], dates[19])
            .unwrap();
        assert_eq!(back.height(), 20);

        let series = frame_to_series(&back).unwrap();
        assert_eq!(series["NVDA"].dates(), dates.as_slice());
        assert_eq!(series["NVDA"].values()[3], 103.0);
    }

    #[test]
    fn test_put_replaces_existing_rows() {
        let cache = SqliteCache::in_memory().unwrap();
        let dates = weekdays(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(), 5);
        cache.put_quotes(&cached("SPX", dates.clone())).unwrap();
        cache.put_quotes(&cached("SPX", dates)).unwrap();

        let stats = cache.get_stats().unwrap();
        assert_eq!(stats.total_quotes, 5);
        assert_eq!(stats.unique_symbols, 1);
    }

    #[test]
    fn test_has_quotes_coverage() {
        let cache = SqliteCache::in_memory().unwrap();
        // Tue 2024-01-02 .. Fri 2024-01-26
        let dates = weekdays(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(), 19);
        cache.put_quotes(&cached("SPX", dates)).unwrap();

        let d = |m, day| NaiveDate::from_ymd_opt(2024, m, day).unwrap();
        assert!(cache.has_quotes("SPX", d(1, 1), d(1, 28)).unwrap());
        assert!(!cache.has_quotes("SPX", d(1, 1), d(2, 28)).unwrap());
        assert!(!cache.has_quotes("SPX", d(2, 1), d(2, 28)).unwrap());
        assert!(!cache.has_quotes("NVDA", d(1, 1), d(1, 28)).unwrap());
    }

    #[test]
    fn test_get_missing_symbol() {
        let cache = SqliteCache::in_memory().unwrap();
        let d = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert!(matches!(
            cache.get_quotes("NVDA", d, d),
            Err(DataError::DataUnavailable { .. })
        ));
    }

    #[test]
    fn test_clear_operations() {
        let cache = SqliteCache::in_memory().unwrap();
        let dates = weekdays(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(), 3);
        cache.put_quotes(&cached("SPX", dates.clone())).unwrap();
        cache.put_quotes(&cached("NVDA", dates.clone())).unwrap();

        assert_eq!(cache.symbols().unwrap(), vec!["NVDA", "SPX"]);
        assert_eq!(cache.clear_symbol("NVDA").unwrap(), 3);

        let stats = cache.get_stats().unwrap();
        assert_eq!(stats.unique_symbols, 1);
        assert_eq!(stats.oldest_date, Some(dates[0]));
        assert_eq!(stats.newest_date, Some(dates[2]));

        cache.clear_all().unwrap();
        let stats = cache.get_stats().unwrap();
        assert_eq!(stats.total_quotes, 0);
        assert_eq!(stats.oldest_date, None);
    }
}
