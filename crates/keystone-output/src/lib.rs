#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/keystone/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod export;
pub mod heatmap;
pub mod report;
pub mod summary;

pub use export::{
    CounterfactualRecord, DecompositionRecord, ExportError, ExportFormat, Exporter,
    GridCellRecord, PathRecord, RollingRecord,
};
pub use heatmap::HeatmapTable;
pub use report::{Report, ReportBuilder, ReportError};
pub use summary::{ScenarioRow, ScenarioSummary, pct_label, scenario_label};

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
