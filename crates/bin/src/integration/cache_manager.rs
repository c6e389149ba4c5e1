//! Location and maintenance of the on-disk quote cache.

use keystone_data::{DataError, SqliteCache};
use std::path::PathBuf;

/// Get the default cache directory path.
///
/// Uses platform-specific cache directories:
/// - Linux: `~/.cache/keystone/`
/// - macOS: `~/Library/Caches/keystone/`
/// - Windows: `%LOCALAPPDATA%\keystone\`
pub(crate) fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("keystone")
}

/// Get the default cache database path.
pub(crate) fn default_cache_path() -> PathBuf {
    default_cache_dir().join("quotes.db")
}

/// Open the cache, creating the directory if needed.
pub(crate) fn open_cache() -> Result<SqliteCache, DataError> {
    let cache_path = default_cache_path();

    if let Some(parent) = cache_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    SqliteCache::new(&cache_path)
}

/// Print location, size and date coverage of the cache.
pub(crate) fn print_cache_info(cache: &SqliteCache) -> Result<(), DataError> {
    let stats = cache.get_stats()?;
    println!("Cache location: {}", default_cache_path().display());
    println!(
        "Cached data: {} quotes for {} symbols",
        stats.total_quotes, stats.unique_symbols
    );
    if let (Some(oldest), Some(newest)) = (stats.oldest_date, stats.newest_date) {
        println!("Date range: {} to {}", oldest, newest);
    }

    let symbols = cache.symbols()?;
    if !symbols.is_empty() {
        println!("Symbols: {}", symbols.join(", "));
    }
    Ok(())
}

/// Clear one symbol, or everything when `symbol` is `None`.
pub(crate) fn clear_cache(cache: &SqliteCache, symbol: Option<&str>) -> Result<(), DataError> {
    match symbol {
        Some(symbol) => {
            let removed = cache.clear_symbol(&symbol.to_uppercase())?;
            println!("Removed {} cached quotes for {}", removed, symbol.to_uppercase());
        }
        None => {
            cache.clear_all()?;
            println!("Cache cleared");
        }
    }
    Ok(())
}
