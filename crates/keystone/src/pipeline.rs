//! End-to-end analysis pipeline.
//!
//! prices -> aligned returns -> decomposition -> rolling association
//! -> sensitivity grid -> scenario summary.
//!
//! Every stage is an explicit call on values produced by the previous one; no
//! state is shared between runs.

use chrono::{Days, NaiveDate, Utc};
use keystone_data::{DataError, PriceSource};
use keystone_engine::{
    BetaRegime, DecomposedReturns, EngineError, ExposureWeight, GridConfig, GridMetric,
    ReturnConvention, ReturnSeries, RollingAssociation, RollingConfig, RollingEstimator,
    SensitivityGrid, SensitivityGridResult, ShockScenario, ShockSimulator, SimulatedPath,
    TimeSeries, decompose,
};
use keystone_output::{
    CounterfactualRecord, DecompositionRecord, ExportError, ExportFormat, Exporter,
    GridCellRecord, HeatmapTable, PathRecord, Report, ReportBuilder, ReportError, RollingRecord,
    ScenarioSummary,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur while running an analysis.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Engine error.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Data retrieval error.
    #[error("Data error: {0}")]
    Data(#[from] DataError),

    /// Export error.
    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    /// Report error.
    #[error("Report error: {0}")]
    Report(#[from] ReportError),

    /// Configuration file could not be parsed or written.
    #[error("Config serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Inconsistent configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A requested ticker is missing from the price data.
    #[error("No prices for ticker: {0}")]
    MissingTicker(String),
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Configuration of one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Aggregate (index) ticker (default: ^GSPC)
    pub aggregate: String,
    /// Constituent ticker (default: NVDA)
    pub constituent: String,
    /// First price date; `history_years` before `end` when unset
    pub start: Option<NaiveDate>,
    /// Last price date; today when unset
    pub end: Option<NaiveDate>,
    /// Years of history fetched when `start` is unset (default: 5)
    pub history_years: u32,
    /// Return convention (default: simple)
    pub convention: ReturnConvention,
    /// Exposure weight used to back out the ex-constituent returns (default: 0.07)
    pub weight: f64,
    /// Rolling beta and correlation windows
    pub rolling: RollingConfig,
    /// Scenario grid, shock and drawdown policies
    pub grid: GridConfig,
    /// Date of the pre-shock reference price; the latest date that leaves a
    /// full horizon of history when unset
    pub pre_shock_date: Option<NaiveDate>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            aggregate: "^GSPC".to_string(),
            constituent: "NVDA".to_string(),
            start: None,
            end: None,
            history_years: 5,
            convention: ReturnConvention::Simple,
            weight: 0.07,
            rolling: RollingConfig::default(),
            grid: GridConfig::default(),
            pre_shock_date: None,
        }
    }
}

impl AnalysisConfig {
    /// Load a configuration from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as pretty JSON.
    pub fn to_json_file(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Tickers to fetch, aggregate first.
    pub fn tickers(&self) -> Vec<String> {
        vec![self.aggregate.clone(), self.constituent.clone()]
    }

    /// Resolved `(start, end)` price range.
    pub fn period(&self) -> (NaiveDate, NaiveDate) {
        let end = self.end.unwrap_or_else(|| Utc::now().date_naive());
        let start = self.start.unwrap_or_else(|| {
            end.checked_sub_days(Days::new(365 * u64::from(self.history_years)))
                .unwrap_or(end)
        });
        (start, end)
    }

    /// Check the parts of the configuration no engine component validates.
    pub fn validate(&self) -> Result<()> {
        if self.aggregate.trim().is_empty() || self.constituent.trim().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "aggregate and constituent tickers are required".to_string(),
            ));
        }
        if self.aggregate == self.constituent {
            return Err(PipelineError::InvalidConfig(format!(
                "aggregate and constituent are both {}",
                self.aggregate
            )));
        }
        if !self.weight.is_finite() {
            return Err(EngineError::InvalidWeight(self.weight).into());
        }
        let (start, end) = self.period();
        if start > end {
            return Err(PipelineError::InvalidConfig(format!(
                "start {} is after end {}",
                start, end
            )));
        }
        Ok(())
    }
}

/// Latest rolling beta of one window, with its regime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestAssociation {
    /// Window length
    pub window: usize,
    /// Date of the latest full window
    pub date: NaiveDate,
    /// Rolling beta
    pub beta: f64,
    /// Rolling correlation, when computed
    pub correlation: Option<f64>,
    /// Beta band; `None` when beta is undefined
    pub regime: Option<BetaRegime>,
}

/// Latest value of every window that has one.
pub fn latest_associations(associations: &[RollingAssociation]) -> Vec<LatestAssociation> {
    associations
        .iter()
        .filter_map(|assoc| {
            let (date, beta) = assoc.beta.latest()?;
            Some(LatestAssociation {
                window: assoc.window,
                date,
                beta,
                correlation: assoc.correlation.as_ref().and_then(|c| c.get(date)),
                regime: BetaRegime::classify(beta),
            })
        })
        .collect()
}

/// Aligned prices and returns for the two tickers.
#[derive(Debug, Clone)]
struct Prepared {
    aggregate_prices: TimeSeries,
    aggregate: ReturnSeries,
    constituent: ReturnSeries,
}

fn prepare(prices: &BTreeMap<String, TimeSeries>, config: &AnalysisConfig) -> Result<Prepared> {
    config.validate()?;

    let lookup = |ticker: &str| {
        prices
            .get(ticker)
            .ok_or_else(|| PipelineError::MissingTicker(ticker.to_string()))
    };
    let (aggregate_prices, constituent_prices) =
        lookup(&config.aggregate)?.inner_join(lookup(&config.constituent)?);
    debug!(
        dates = aggregate_prices.len(),
        first = ?aggregate_prices.first_date(),
        last = ?aggregate_prices.last_date(),
        "aligned prices"
    );

    let aggregate = ReturnSeries::from_prices(&aggregate_prices, config.convention)?;
    let constituent = ReturnSeries::from_prices(&constituent_prices, config.convention)?;

    Ok(Prepared {
        aggregate_prices,
        aggregate,
        constituent,
    })
}

/// Rolling statistics only, without the scenario grid.
pub fn estimate_rolling(
    prices: &BTreeMap<String, TimeSeries>,
    config: &AnalysisConfig,
) -> Result<Vec<RollingAssociation>> {
    let prepared = prepare(prices, config)?;
    let estimator = RollingEstimator::new(config.rolling.clone())?;
    Ok(estimator.estimate(&prepared.constituent, &prepared.aggregate)?)
}

/// The pre-shock date to use: the configured one, else the latest price date
/// followed by at least `horizon` returns.
fn resolve_pre_shock_date(
    aggregate_prices: &TimeSeries,
    config: &AnalysisConfig,
) -> Result<NaiveDate> {
    if let Some(date) = config.pre_shock_date {
        if aggregate_prices.position(date).is_none() {
            return Err(EngineError::DateNotFound(date).into());
        }
        return Ok(date);
    }

    let horizon = config.grid.shock.horizon;
    let returns = aggregate_prices.len().saturating_sub(1);
    returns
        .checked_sub(horizon)
        .map(|idx| aggregate_prices.dates()[idx])
        .ok_or_else(|| {
            EngineError::InsufficientData {
                required: horizon + 1,
                actual: aggregate_prices.len(),
            }
            .into()
        })
}

/// Everything one run produces.
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    /// Configuration the run used, with the pre-shock date resolved
    pub config: AnalysisConfig,
    /// Aggregate prices on the aligned calendar
    pub aggregate_prices: TimeSeries,
    /// Baseline decomposition at the configured weight
    pub decomposed: DecomposedReturns,
    /// Rolling beta and correlation per window
    pub rolling: Vec<RollingAssociation>,
    /// Scenario grid
    pub grid: SensitivityGridResult,
    /// Scenarios ordered by drawdown depth
    pub summary: ScenarioSummary,
}

impl AnalysisResult {
    /// Pre-shock reference date of the grid.
    pub const fn pre_shock_date(&self) -> NaiveDate {
        self.grid.pre_shock_date()
    }

    /// Pivot one grid metric.
    pub fn heatmap(&self, metric: GridMetric) -> HeatmapTable {
        HeatmapTable::from_grid(&self.grid, metric)
    }

    /// Latest rolling values per window.
    pub fn latest_rolling(&self) -> Vec<LatestAssociation> {
        latest_associations(&self.rolling)
    }

    fn simulator(&self) -> Result<ShockSimulator<'_>> {
        Ok(ShockSimulator::new(
            &self.decomposed,
            &self.aggregate_prices,
            self.config.grid.shock.clone(),
        )?)
    }

    /// Re-simulate the price path of one scenario.
    pub fn simulate_path(&self, weight: f64, shock: f64) -> Result<SimulatedPath> {
        let scenario = ShockScenario::new(shock, weight, self.pre_shock_date());
        Ok(self.simulator()?.simulate(&scenario)?)
    }

    /// Realized aggregate returns next to the whole-history counterfactual of
    /// one scenario.
    pub fn counterfactual(&self, weight: f64, shock: f64) -> Result<Vec<CounterfactualRecord>> {
        let scenario = ShockScenario::new(shock, weight, self.pre_shock_date());
        let counterfactual = self.simulator()?.counterfactual_returns(&scenario)?;
        Ok(CounterfactualRecord::from_returns(
            self.decomposed.aggregate(),
            &counterfactual,
        )?)
    }

    /// JSON report with the configuration, summary, heatmaps and latest betas.
    pub fn report(&self) -> Result<Report> {
        let (start, end) = match (
            self.aggregate_prices.first_date(),
            self.aggregate_prices.last_date(),
        ) {
            (Some(start), Some(end)) => (start, end),
            _ => self.config.period(),
        };

        let report = ReportBuilder::new()
            .tickers(&self.config.aggregate, &self.config.constituent)
            .period(start, end)
            .section("config", &self.config)?
            .section("summary", &self.summary)?
            .section("max_drawdown", &self.heatmap(GridMetric::MaxDrawdown))?
            .section("recovery_duration", &self.heatmap(GridMetric::RecoveryDuration))?
            .section("rolling_latest", &self.latest_rolling())?
            .build()?;
        Ok(report)
    }

    /// Write every artifact into `dir`, creating it if needed.
    ///
    /// Returns the written paths.
    pub fn export(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;
        let mut written = Vec::new();
        let csv = ExportFormat::Csv;

        let path = dir.join("decomposition.csv");
        DecompositionRecord::from_decomposition(&self.decomposed).export_to_file(&path, csv)?;
        written.push(path);

        let path = dir.join("rolling.csv");
        RollingRecord::from_associations(&self.rolling).export_to_file(&path, csv)?;
        written.push(path);

        let path = dir.join("grid.csv");
        GridCellRecord::from_grid(&self.grid).export_to_file(&path, csv)?;
        written.push(path);

        let path = dir.join("summary.csv");
        self.summary.export_to_file(&path, csv)?;
        written.push(path);

        for metric in [GridMetric::MaxDrawdown, GridMetric::RecoveryDuration] {
            let path = dir.join(format!("heatmap_{}.csv", metric));
            self.heatmap(metric).export_to_file(&path, csv)?;
            written.push(path);
        }

        if let Some(worst) = self.summary.worst() {
            let path = dir.join("worst_path.csv");
            let simulated = self.simulate_path(worst.weight, worst.shock)?;
            PathRecord::from_path(&simulated).export_to_file(&path, csv)?;
            written.push(path);

            let path = dir.join("worst_counterfactual.csv");
            self.counterfactual(worst.weight, worst.shock)?.export_to_file(&path, csv)?;
            written.push(path);
        }

        let path = dir.join("summary.md");
        std::fs::write(&path, self.summary.to_markdown())?;
        written.push(path);

        let path = dir.join("report.json");
        self.report()?.write_to_file(&path)?;
        written.push(path);

        info!(files = written.len(), dir = %dir.display(), "exported analysis");
        Ok(written)
    }
}

/// Run the full analysis over already loaded prices.
///
/// `prices` must hold the configured aggregate and constituent tickers.
pub fn run_analysis(
    prices: &BTreeMap<String, TimeSeries>,
    config: &AnalysisConfig,
) -> Result<AnalysisResult> {
    let prepared = prepare(prices, config)?;

    let decomposed = decompose(
        &prepared.aggregate,
        &prepared.constituent,
        &ExposureWeight::Constant(config.weight),
    )?;
    debug!(
        identity_error = decomposed.max_identity_error(),
        "decomposed aggregate returns"
    );

    let rolling = RollingEstimator::new(config.rolling.clone())?
        .estimate(&prepared.constituent, &prepared.aggregate)?;

    let pre_shock_date = resolve_pre_shock_date(&prepared.aggregate_prices, config)?;
    let grid = SensitivityGrid::new(config.grid.clone())?.evaluate(
        &decomposed,
        &prepared.aggregate_prices,
        pre_shock_date,
    )?;
    let summary = ScenarioSummary::from_grid(&grid);

    info!(
        aggregate = %config.aggregate,
        constituent = %config.constituent,
        %pre_shock_date,
        scenarios = summary.len(),
        failed = summary.failed,
        "analysis complete"
    );

    let mut config = config.clone();
    config.pre_shock_date = Some(pre_shock_date);

    Ok(AnalysisResult {
        config,
        aggregate_prices: prepared.aggregate_prices,
        decomposed,
        rolling,
        grid,
        summary,
    })
}

/// Fetch prices for the configured tickers and period, then run the analysis.
pub async fn fetch_and_run<S: PriceSource>(
    source: &S,
    config: &AnalysisConfig,
) -> Result<AnalysisResult> {
    config.validate()?;
    let (start, end) = config.period();
    info!(%start, %end, "fetching prices");
    let prices = source.fetch_prices(&config.tickers(), start, end).await?;
    run_analysis(&prices, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn market(n: usize) -> BTreeMap<String, TimeSeries> {
        let dates: Vec<NaiveDate> = (0..n as u64)
            .map(|i| NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Days::new(i))
            .collect();
        let index = (0..n).map(|i| 4000.0 + 20.0 * (i as f64 * 0.3).sin()).collect();
        let stock = (0..n)
            .map(|i| 500.0 + 15.0 * (i as f64 * 0.3).sin() + 4.0 * (i as f64 * 0.9).cos())
            .collect();

        let mut prices = BTreeMap::new();
        prices.insert("^GSPC".to_string(), TimeSeries::new(dates.clone(), index).unwrap());
        prices.insert("NVDA".to_string(), TimeSeries::new(dates, stock).unwrap());
        prices
    }

    fn small_config() -> AnalysisConfig {
        let mut config = AnalysisConfig::default();
        config.rolling.windows = vec![10, 20];
        config.grid.shock.horizon = 10;
        config
    }

    #[test]
    fn test_default_config() {
        let config = AnalysisConfig::default();
        assert_eq!(config.aggregate, "^GSPC");
        assert_eq!(config.constituent, "NVDA");
        assert_relative_eq!(config.weight, 0.07);
        assert_eq!(config.rolling.windows, vec![60, 120, 252]);
        assert_eq!(config.grid.shock.horizon, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_period_resolution() {
        let config = AnalysisConfig {
            end: NaiveDate::from_ymd_opt(2024, 12, 31),
            history_years: 1,
            ..AnalysisConfig::default()
        };
        let (start, end) = config.period();
        assert_eq!(end, NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    }

    #[rstest]
    #[case("", "NVDA")]
    #[case("NVDA", "NVDA")]
    fn test_invalid_tickers(#[case] aggregate: &str, #[case] constituent: &str) {
        let config = AnalysisConfig {
            aggregate: aggregate.to_string(),
            constituent: constituent.to_string(),
            ..AnalysisConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_default_pre_shock_date_leaves_horizon() {
        let prices = market(40);
        let result = run_analysis(&prices, &small_config()).unwrap();

        // 39 returns, horizon 10: shock lands on return 29 of 39.
        let dates = prices["^GSPC"].dates();
        assert_eq!(result.pre_shock_date(), dates[29]);
        assert_eq!(result.config.pre_shock_date, Some(dates[29]));
    }

    #[test]
    fn test_run_analysis() {
        let result = run_analysis(&market(40), &small_config()).unwrap();

        assert_eq!(result.decomposed.dates().len(), 39);
        assert!(result.decomposed.max_identity_error() < 1e-12);
        assert_eq!(result.rolling.len(), 2);
        assert_eq!(result.rolling[0].beta.len(), 30);
        assert_eq!(result.grid.len(), 35);
        assert_eq!(result.summary.len() + result.summary.failed, 35);
        assert_eq!(result.latest_rolling().len(), 2);
    }

    #[test]
    fn test_counterfactual_matches_worst_path() {
        let result = run_analysis(&market(40), &small_config()).unwrap();
        let worst = result.summary.worst().unwrap();

        let records = result.counterfactual(worst.weight, worst.shock).unwrap();
        let path = result.simulate_path(worst.weight, worst.shock).unwrap();
        assert_eq!(records.len(), result.decomposed.dates().len());

        let shock_date = path.dates[1];
        let row = records.iter().find(|r| r.date == shock_date).unwrap();
        assert_relative_eq!(row.counterfactual_return, path.returns[0], epsilon = 1e-12);
        assert_relative_eq!(
            records.last().unwrap().realized_growth,
            result.aggregate_prices.values().last().unwrap() / result.aggregate_prices.values()[0],
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_missing_ticker() {
        let mut prices = market(40);
        prices.remove("NVDA");
        let result = run_analysis(&prices, &small_config());
        assert!(matches!(result, Err(PipelineError::MissingTicker(t)) if t == "NVDA"));
    }

    #[test]
    fn test_unknown_pre_shock_date() {
        let config = AnalysisConfig {
            pre_shock_date: NaiveDate::from_ymd_opt(2030, 1, 1),
            ..small_config()
        };
        let result = run_analysis(&market(40), &config);
        assert!(matches!(
            result,
            Err(PipelineError::Engine(EngineError::DateNotFound(_)))
        ));
    }

    #[test]
    fn test_too_short_for_horizon() {
        let mut config = small_config();
        config.rolling.windows = vec![3];
        let result = run_analysis(&market(8), &config);
        assert!(matches!(
            result,
            Err(PipelineError::Engine(EngineError::InsufficientData { .. }))
        ));
    }

    #[test]
    fn test_simulate_path_matches_grid() {
        let result = run_analysis(&market(40), &small_config()).unwrap();
        let path = result.simulate_path(0.07, -0.3).unwrap();
        let cell = result.grid.get(0.07, -0.3).unwrap();
        let drawdown = cell.outcome.as_ref().unwrap();

        assert_eq!(path.horizon(), 10);
        let depth = path.prices.iter().fold(f64::INFINITY, |m, p| m.min(*p))
            / path.reference_price()
            - 1.0;
        assert_relative_eq!(depth, drawdown.max_drawdown, epsilon = 1e-12);
    }
}
