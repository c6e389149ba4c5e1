//! Integration tests for exports, summaries and reports.

use chrono::NaiveDate;
use keystone_engine::{
    ExposureWeight, GridConfig, GridMetric, ReturnConvention, ReturnSeries, RollingConfig,
    RollingEstimator, SensitivityGrid, ShockConfig, TimeSeries, decompose,
};
use keystone_output::{
    DecompositionRecord, ExportFormat, Exporter, GridCellRecord, HeatmapTable, ReportBuilder,
    RollingRecord, ScenarioSummary,
};

fn market() -> (TimeSeries, TimeSeries) {
    let dates: Vec<NaiveDate> = (1..=30)
        .map(|d| NaiveDate::from_ymd_opt(2024, 6, d).unwrap())
        .collect();
    let agg: Vec<f64> = (0..30)
        .map(|i| 5000.0 + 10.0 * (i as f64 * 0.7).sin())
        .collect();
    let stock: Vec<f64> = (0..30)
        .map(|i| 900.0 + 25.0 * (i as f64 * 0.7).sin() + 3.0 * (i as f64 * 1.3).cos())
        .collect();
    (
        TimeSeries::new(dates.clone(), agg).unwrap(),
        TimeSeries::new(dates, stock).unwrap(),
    )
}

#[test]
fn test_full_export_workflow() {
    let dir = tempfile::tempdir().unwrap();
    let (agg_prices, stock_prices) = market();

    let agg = ReturnSeries::from_prices(&agg_prices, ReturnConvention::Simple).unwrap();
    let stock = ReturnSeries::from_prices(&stock_prices, ReturnConvention::Simple).unwrap();
    let decomposed = decompose(&agg, &stock, &ExposureWeight::Constant(0.07)).unwrap();

    let records = DecompositionRecord::from_decomposition(&decomposed);
    let path = dir.path().join(format!("decomposition.{}", ExportFormat::Csv.extension()));
    records.export_to_file(&path, ExportFormat::Csv).unwrap();
    let written = std::fs::read_to_string(&path).unwrap();
    assert_eq!(written.lines().count(), 30); // header + 29 returns

    let rolling = RollingEstimator::new(RollingConfig {
        windows: vec![5, 10],
        correlation: true,
    })
    .unwrap()
    .estimate(&stock, &agg)
    .unwrap();
    let rolling_records = RollingRecord::from_associations(&rolling);
    assert_eq!(rolling_records.len(), 25 + 20);
    let json = rolling_records.export_to_string(ExportFormat::Json).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.as_array().unwrap().len(), 45);

    let grid = SensitivityGrid::new(GridConfig {
        weights: vec![0.05, 0.07],
        shocks: vec![-0.1, -0.2, -0.3],
        shock: ShockConfig {
            horizon: 5,
            ..ShockConfig::default()
        },
        ..GridConfig::default()
    })
    .unwrap()
    .evaluate(&decomposed, &agg_prices, agg_prices.dates()[10])
    .unwrap();

    let cells = GridCellRecord::from_grid(&grid);
    assert_eq!(cells.len(), 6);
    assert!(cells.iter().all(|c| c.error.is_none()));

    let summary = ScenarioSummary::from_grid(&grid);
    assert_eq!(summary.len(), 6);
    assert!(summary.worst().unwrap().shock == -0.3);

    let heatmap = HeatmapTable::from_grid(&grid, GridMetric::MaxDrawdown);
    heatmap
        .export_to_file(&dir.path().join("heatmap.csv"), ExportFormat::Csv)
        .unwrap();

    let report = ReportBuilder::new()
        .tickers("^GSPC", "NVDA")
        .period(agg_prices.dates()[0], agg_prices.dates()[29])
        .section("summary", &summary)
        .unwrap()
        .section("heatmap", &heatmap)
        .unwrap()
        .build()
        .unwrap();
    let report_path = dir.path().join("report.json");
    report.write_to_file(&report_path).unwrap();

    let text = std::fs::read_to_string(report_path).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["sections"]["summary"]["rows"].as_array().unwrap().len(), 6);
}
