//! Sensitivity grid benchmarks

#![allow(missing_docs)]

use chrono::NaiveDate;
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use keystone_engine::{
    ContinuationPolicy, ExposureWeight, GridConfig, ReturnConvention, ReturnSeries,
    RollingConfig, RollingEstimator, SensitivityGrid, ShockConfig, TimeSeries, decompose,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn synthetic_prices(n: usize, seed: u64) -> (TimeSeries, TimeSeries) {
    let mut rng = StdRng::seed_from_u64(seed);
    let start = NaiveDate::from_ymd_opt(2015, 1, 1).unwrap();
    let dates: Vec<NaiveDate> = (0..n as u64)
        .map(|i| start + chrono::Days::new(i))
        .collect();

    let mut agg = Vec::with_capacity(n);
    let mut stock = Vec::with_capacity(n);
    let (mut a, mut s) = (100.0_f64, 50.0_f64);
    for _ in 0..n {
        let market = rng.gen_range(-0.02..0.02);
        a *= 1.0 + market;
        s *= 1.0 + 1.5 * market + rng.gen_range(-0.01..0.01);
        agg.push(a);
        stock.push(s);
    }

    (
        TimeSeries::new(dates.clone(), agg).unwrap(),
        TimeSeries::new(dates, stock).unwrap(),
    )
}

fn bench_grid(c: &mut Criterion) {
    let (agg_prices, stock_prices) = synthetic_prices(2_000, 42);
    let agg = ReturnSeries::from_prices(&agg_prices, ReturnConvention::Simple).unwrap();
    let stock = ReturnSeries::from_prices(&stock_prices, ReturnConvention::Simple).unwrap();
    let decomposed = decompose(&agg, &stock, &ExposureWeight::Constant(0.07)).unwrap();
    let pre_shock = agg_prices.dates()[1_000];

    let mut group = c.benchmark_group("sensitivity_grid");
    for size in [5, 10, 20] {
        let config = GridConfig {
            weights: (1..=size).map(|i| i as f64 * 0.01).collect(),
            shocks: (1..=size).map(|i| -(i as f64) * 0.02).collect(),
            shock: ShockConfig {
                horizon: 60,
                continuation: ContinuationPolicy::HistoricalReplay,
                ..ShockConfig::default()
            },
            ..GridConfig::default()
        };
        let grid = SensitivityGrid::new(config).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(size), &grid, |b, grid| {
            b.iter(|| {
                grid.evaluate(black_box(&decomposed), black_box(&agg_prices), pre_shock)
                    .unwrap()
            });
        });
    }
    group.finish();
}

fn bench_rolling(c: &mut Criterion) {
    let (agg_prices, stock_prices) = synthetic_prices(2_000, 7);
    let agg = ReturnSeries::from_prices(&agg_prices, ReturnConvention::Simple).unwrap();
    let stock = ReturnSeries::from_prices(&stock_prices, ReturnConvention::Simple).unwrap();
    let estimator = RollingEstimator::new(RollingConfig::default()).unwrap();

    c.bench_function("rolling_default_windows", |b| {
        b.iter(|| estimator.estimate(black_box(&stock), black_box(&agg)).unwrap());
    });
}

criterion_group!(benches, bench_grid, bench_rolling);
criterion_main!(benches);
