//! Fetching, running and printing for the CLI commands.

use super::cache_manager;
use indicatif::{ProgressBar, ProgressStyle};
use keystone::pipeline::{AnalysisConfig, AnalysisResult, LatestAssociation};
use keystone_data::{DataError, PriceSource, YahooPriceSource, YahooQuoteProvider};
use keystone_engine::{ContinuationPolicy, DrawdownReference, GridMetric, ShockMode, TimeSeries};
use keystone_output::pct_label;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::warn;

/// Configuration for data fetching.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FetchConfig {
    /// Whether to use caching.
    pub(crate) use_cache: bool,
    /// Whether to force refresh cached data.
    pub(crate) force_refresh: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            use_cache: true,
            force_refresh: false,
        }
    }
}

/// Yahoo source with the on-disk cache attached when enabled.
///
/// A cache that cannot be opened is skipped with a warning.
pub(crate) fn build_source(fetch: FetchConfig) -> Result<YahooPriceSource, DataError> {
    let source =
        YahooPriceSource::new(YahooQuoteProvider::new()?).with_force_refresh(fetch.force_refresh);
    if !fetch.use_cache {
        return Ok(source);
    }

    match cache_manager::open_cache() {
        Ok(cache) => Ok(source.with_cache(cache)),
        Err(e) => {
            warn!(error = %e, "cache unavailable; fetching without it");
            Ok(source)
        }
    }
}

/// Fetch the configured tickers behind a spinner.
pub(crate) async fn fetch_with_spinner<S: PriceSource>(
    source: &S,
    config: &AnalysisConfig,
) -> Result<BTreeMap<String, TimeSeries>, Box<dyn std::error::Error>> {
    let (start, end) = config.period();
    let tickers = config.tickers();

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(format!(
        "Fetching {} from {} to {}...",
        tickers.join(", "),
        start,
        end
    ));

    match source.fetch_prices(&tickers, start, end).await {
        Ok(prices) => {
            let points: usize = prices.values().map(TimeSeries::len).sum();
            pb.finish_with_message(format!(
                "Fetched {} tickers ({} prices)",
                prices.len(),
                points
            ));
            Ok(prices)
        }
        Err(e) => {
            pb.finish_with_message("Failed!");
            Err(format!("Failed to fetch prices: {}", e).into())
        }
    }
}

pub(crate) fn parse_shock_mode(s: &str) -> Result<ShockMode, String> {
    match s.to_lowercase().as_str() {
        "additive" => Ok(ShockMode::Additive),
        "replace" => Ok(ShockMode::Replace),
        other => Err(format!("unknown shock mode '{}' (additive, replace)", other)),
    }
}

pub(crate) fn parse_continuation(s: &str) -> Result<ContinuationPolicy, String> {
    match s.to_lowercase().replace('-', "_").as_str() {
        "flat" => Ok(ContinuationPolicy::Flat),
        "historical_replay" | "replay" => Ok(ContinuationPolicy::HistoricalReplay),
        other => Err(format!(
            "unknown continuation '{}' (flat, historical-replay)",
            other
        )),
    }
}

pub(crate) fn parse_reference(s: &str) -> Result<DrawdownReference, String> {
    match s.to_lowercase().replace('-', "_").as_str() {
        "fixed" | "fixed_reference" => Ok(DrawdownReference::FixedReference),
        "peak" | "running_peak" => Ok(DrawdownReference::RunningPeak),
        other => Err(format!("unknown drawdown reference '{}' (fixed, peak)", other)),
    }
}

fn print_banner(title: &str) {
    println!("\n╔══════════════════════════════════════════════════════════════╗");
    println!("║{:^62}║", title);
    println!("╚══════════════════════════════════════════════════════════════╝\n");
}

/// Print the latest rolling betas as a table.
pub(crate) fn print_rolling(latest: &[LatestAssociation]) {
    if latest.is_empty() {
        println!("Rolling beta: not enough history for any window");
        return;
    }

    println!("{:<8} {:<12} {:>8} {:>8}  Regime", "Window", "Date", "Beta", "Corr");
    println!("{}", "-".repeat(50));
    for row in latest {
        let corr = row
            .correlation
            .map_or_else(|| "-".to_string(), |c| format!("{:.3}", c));
        let regime = row
            .regime
            .map_or_else(|| "undefined".to_string(), |r| r.to_string());
        println!(
            "{:<8} {:<12} {:>8.4} {:>8}  {}",
            row.window, row.date, row.beta, corr, regime
        );
    }
}

/// Print a rolling-only run.
pub(crate) fn print_rolling_report(config: &AnalysisConfig, latest: &[LatestAssociation]) {
    print_banner(&format!(
        "ROLLING BETA: {} vs {}",
        config.constituent, config.aggregate
    ));
    print_rolling(latest);
    println!();
}

/// Print a full analysis in text form.
pub(crate) fn print_analysis(result: &AnalysisResult) {
    let config = &result.config;
    print_banner(&format!(
        "STRESS TEST: {} IN {}",
        config.constituent, config.aggregate
    ));

    let prices = &result.aggregate_prices;
    if let (Some(first), Some(last)) = (prices.first_date(), prices.last_date()) {
        println!("Period: {} to {} ({} aligned dates)", first, last, prices.len());
    }
    println!(
        "Baseline weight: {}%  Convention: {}",
        pct_label(config.weight),
        config.convention
    );
    println!(
        "Shock: {} mode, {} continuation, {} periods  Drawdown reference: {}",
        config.grid.shock.mode,
        config.grid.shock.continuation,
        config.grid.shock.horizon,
        config.grid.drawdown.reference
    );
    let degenerate = result.decomposed.degenerate_dates().len();
    if degenerate > 0 {
        println!("Dates with undefined ex-constituent return: {}", degenerate);
    }
    println!();

    println!("Rolling beta (latest)");
    print_rolling(&result.latest_rolling());

    print!("{}", result.summary.to_ascii_table());
    println!();
    println!("{}", result.heatmap(GridMetric::MaxDrawdown));
    println!("{}", result.heatmap(GridMetric::RecoveryDuration));
}
