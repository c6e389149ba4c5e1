#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/keystone/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod decompose;
pub mod drawdown;
pub mod error;
pub mod grid;
pub mod returns;
pub mod rolling;
pub mod series;
pub mod shock;

pub use decompose::{DecomposedReturns, ExposureWeight, decompose, decompose_aligned};
pub use drawdown::{DrawdownAnalyzer, DrawdownConfig, DrawdownReference, DrawdownResult, RecoveryDuration};
pub use error::{EngineError, Result};
pub use grid::{GridCell, GridConfig, GridMetric, SensitivityGrid, SensitivityGridResult};
pub use returns::{ReturnConvention, ReturnSeries, align_prices, build_returns};
pub use rolling::{BetaRegime, RollingAssociation, RollingConfig, RollingEstimator, RollingStat};
pub use series::TimeSeries;
pub use shock::{ContinuationPolicy, ShockConfig, ShockMode, ShockScenario, ShockSimulator, SimulatedPath};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
