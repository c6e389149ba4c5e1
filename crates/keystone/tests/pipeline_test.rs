//! End-to-end pipeline tests over in-memory prices.

use chrono::{Days, NaiveDate};
use keystone::data::{DataError, InMemoryPriceSource};
use keystone::engine::{ContinuationPolicy, GridMetric, TimeSeries};
use keystone::{AnalysisConfig, PipelineError, fetch_and_run};

fn series(n: usize, f: impl Fn(f64) -> f64) -> TimeSeries {
    let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
    let dates = (0..n as u64).map(|i| start + Days::new(i)).collect();
    let values = (0..n).map(|i| f(i as f64)).collect();
    TimeSeries::new(dates, values).unwrap()
}

fn source() -> InMemoryPriceSource {
    InMemoryPriceSource::new()
        .with_series("^GSPC", series(80, |i| 4000.0 * (1.0 + 0.001 * i + 0.004 * (i * 0.5).sin())))
        .with_series("NVDA", series(80, |i| 400.0 * (1.0 + 0.003 * i + 0.02 * (i * 0.5).sin())))
}

fn config() -> AnalysisConfig {
    let mut config = AnalysisConfig {
        start: NaiveDate::from_ymd_opt(2023, 1, 1),
        end: NaiveDate::from_ymd_opt(2023, 12, 31),
        ..AnalysisConfig::default()
    };
    config.rolling.windows = vec![20, 40, 120];
    config
}

#[tokio::test]
async fn test_fetch_and_run() {
    let result = fetch_and_run(&source(), &config()).await.unwrap();

    assert_eq!(result.decomposed.dates().len(), 79);
    assert_eq!(result.rolling[0].beta.len(), 60);
    assert_eq!(result.rolling[1].beta.len(), 40);
    assert!(result.rolling[2].beta.is_empty());
    assert_eq!(result.latest_rolling().len(), 2);

    assert_eq!(result.grid.len(), 35);
    assert!(result.grid.errors().is_empty());

    // Deeper shocks never produce shallower drawdowns.
    let depth = result.grid.to_matrix(GridMetric::MaxDrawdown);
    for row in depth.rows() {
        assert!(row.windows(2).into_iter().all(|w| w[1] <= w[0]));
    }
    let worst = result.summary.worst().unwrap();
    assert_eq!(worst.scenario, "w10_shock_-50pct");
}

#[tokio::test]
async fn test_historical_replay() {
    let mut config = config();
    config.grid.shock.continuation = ContinuationPolicy::HistoricalReplay;

    let result = fetch_and_run(&source(), &config).await.unwrap();
    assert!(result.grid.errors().is_empty());
    let path = result.simulate_path(0.07, -0.3).unwrap();
    assert_eq!(path.prices.len(), 21);
}

#[tokio::test]
async fn test_unknown_ticker() {
    let config = AnalysisConfig {
        constituent: "AAPL".to_string(),
        ..config()
    };
    let result = fetch_and_run(&source(), &config).await;
    assert!(matches!(
        result,
        Err(PipelineError::Data(DataError::DataUnavailable { .. }))
    ));
}

#[tokio::test]
async fn test_export_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let result = fetch_and_run(&source(), &config()).await.unwrap();

    let written = result.export(&dir.path().join("out")).unwrap();
    assert_eq!(written.len(), 10);
    assert!(written.iter().all(|p| p.exists()));

    let report = std::fs::read_to_string(dir.path().join("out/report.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&report).unwrap();
    assert_eq!(value["constituent"], "NVDA");
    assert!(value["sections"]["max_drawdown"]["values"].is_array());

    let counterfactual =
        std::fs::read_to_string(dir.path().join("out/worst_counterfactual.csv")).unwrap();
    assert_eq!(counterfactual.lines().count(), result.decomposed.dates().len() + 1);
    let markdown = std::fs::read_to_string(dir.path().join("out/summary.md")).unwrap();
    assert!(markdown.contains("w10_shock_-50pct"));
}

#[test]
fn test_config_json_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");

    let mut original = config();
    original.weight = 0.065;
    original.grid.shocks = vec![-0.15, -0.25];
    original.to_json_file(&path).unwrap();

    let loaded = AnalysisConfig::from_json_file(&path).unwrap();
    assert_eq!(loaded, original);
}

#[test]
fn test_partial_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("partial.json");
    std::fs::write(&path, r#"{"constituent": "AAPL", "grid": {"shock": {"horizon": 5}}}"#)
        .unwrap();

    let loaded = AnalysisConfig::from_json_file(&path).unwrap();
    assert_eq!(loaded.constituent, "AAPL");
    assert_eq!(loaded.aggregate, "^GSPC");
    assert_eq!(loaded.grid.shock.horizon, 5);
    assert_eq!(loaded.grid.weights.len(), 7);
}
