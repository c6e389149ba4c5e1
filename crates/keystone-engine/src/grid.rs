//! Weight x shock sensitivity grid
//!
//! Every (exposure weight, shock magnitude) pair is simulated and measured
//! independently. Cells run in parallel over read-only inputs and a failing
//! cell keeps its error without affecting its neighbours.

use crate::decompose::DecomposedReturns;
use crate::drawdown::{DrawdownAnalyzer, DrawdownConfig, DrawdownResult};
use crate::error::{EngineError, Result};
use crate::series::TimeSeries;
use crate::shock::{ShockConfig, ShockScenario, ShockSimulator};
use chrono::NaiveDate;
use derive_more::Display;
use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Grid configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Exposure weights (rows)
    pub weights: Vec<f64>,
    /// Shock magnitudes (columns)
    pub shocks: Vec<f64>,
    /// Simulation settings shared by every cell
    pub shock: ShockConfig,
    /// Drawdown settings shared by every cell
    pub drawdown: DrawdownConfig,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            weights: vec![0.04, 0.05, 0.06, 0.07, 0.08, 0.09, 0.10],
            shocks: vec![-0.10, -0.20, -0.30, -0.40, -0.50],
            shock: ShockConfig::default(),
            drawdown: DrawdownConfig::default(),
        }
    }
}

/// Scalar read out of each cell by [`SensitivityGridResult::to_matrix`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridMetric {
    /// Deepest drawdown
    #[display("max_drawdown")]
    MaxDrawdown,
    /// Periods to recovery, `+inf` if never
    #[display("recovery_duration")]
    RecoveryDuration,
    /// Period of the trough
    #[display("trough_period")]
    TroughPeriod,
}

/// Outcome of one (weight, shock) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridCell {
    /// Exposure weight
    pub weight: f64,
    /// Shock magnitude
    pub shock: f64,
    /// Drawdown metrics, or the error that stopped this cell
    pub outcome: std::result::Result<DrawdownResult, EngineError>,
}

impl GridCell {
    /// Read a metric, NaN for a failed cell.
    pub fn metric(&self, metric: GridMetric) -> f64 {
        self.outcome.as_ref().map_or(f64::NAN, |r| match metric {
            GridMetric::MaxDrawdown => r.max_drawdown,
            GridMetric::RecoveryDuration => r.recovery_duration.as_f64(),
            GridMetric::TroughPeriod => r.trough_period as f64,
        })
    }
}

/// Immutable grid of outcomes in row-major (weight, shock) order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityGridResult {
    weights: Vec<f64>,
    shocks: Vec<f64>,
    pre_shock_date: NaiveDate,
    cells: Vec<GridCell>,
}

impl SensitivityGridResult {
    /// Weight axis.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Shock axis.
    pub fn shocks(&self) -> &[f64] {
        &self.shocks
    }

    /// Date of the reference price.
    pub const fn pre_shock_date(&self) -> NaiveDate {
        self.pre_shock_date
    }

    /// All cells, row-major.
    pub fn cells(&self) -> &[GridCell] {
        &self.cells
    }

    /// Number of cells.
    pub const fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the grid has no cells.
    pub const fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Cell at row `i` (weight) and column `j` (shock).
    pub fn cell(&self, i: usize, j: usize) -> Option<&GridCell> {
        if j >= self.shocks.len() {
            return None;
        }
        self.cells.get(i * self.shocks.len() + j)
    }

    /// Cell for an exact (weight, shock) pair.
    pub fn get(&self, weight: f64, shock: f64) -> Option<&GridCell> {
        let i = self.weights.iter().position(|w| *w == weight)?;
        let j = self.shocks.iter().position(|s| *s == shock)?;
        self.cell(i, j)
    }

    /// Weights x shocks matrix of one metric.
    pub fn to_matrix(&self, metric: GridMetric) -> Array2<f64> {
        Array2::from_shape_fn((self.weights.len(), self.shocks.len()), |(i, j)| {
            self.cell(i, j).map_or(f64::NAN, |c| c.metric(metric))
        })
    }

    /// Cells that failed.
    pub fn errors(&self) -> Vec<&GridCell> {
        self.cells.iter().filter(|c| c.outcome.is_err()).collect()
    }
}

/// Evaluates the weight x shock grid
#[derive(Debug, Clone)]
pub struct SensitivityGrid {
    config: GridConfig,
}

impl SensitivityGrid {
    /// Create a grid evaluator.
    ///
    /// # Errors
    /// `InvalidParameter` for an empty, non-finite or duplicated axis.
    pub fn new(config: GridConfig) -> Result<Self> {
        validate_axis("weights", &config.weights)?;
        validate_axis("shocks", &config.shocks)?;
        Ok(Self { config })
    }

    /// Create with default configuration
    pub fn try_default() -> Result<Self> {
        Self::new(GridConfig::default())
    }

    /// Get the configuration
    pub const fn config(&self) -> &GridConfig {
        &self.config
    }

    /// Simulate and measure every cell.
    ///
    /// # Errors
    /// Only configuration errors shared by all cells (e.g. a zero horizon);
    /// per-cell failures are stored in the cells.
    pub fn evaluate(
        &self,
        decomposed: &DecomposedReturns,
        prices: &TimeSeries,
        pre_shock_date: NaiveDate,
    ) -> Result<SensitivityGridResult> {
        let simulator = ShockSimulator::new(decomposed, prices, self.config.shock.clone())?;
        let analyzer = DrawdownAnalyzer::new(self.config.drawdown);

        let weights = &self.config.weights;
        let shocks = &self.config.shocks;
        debug!(
            weights = weights.len(),
            shocks = shocks.len(),
            %pre_shock_date,
            "evaluating sensitivity grid"
        );

        let cells: Vec<GridCell> = (0..weights.len() * shocks.len())
            .into_par_iter()
            .map(|idx| {
                let weight = weights[idx / shocks.len()];
                let shock = shocks[idx % shocks.len()];
                let scenario = ShockScenario::new(shock, weight, pre_shock_date);
                let outcome = simulator
                    .simulate(&scenario)
                    .and_then(|path| analyzer.analyze(&path));
                GridCell {
                    weight,
                    shock,
                    outcome,
                }
            })
            .collect();

        let failed = cells.iter().filter(|c| c.outcome.is_err()).count();
        if failed > 0 {
            warn!(failed, total = cells.len(), "some grid cells failed");
        }

        Ok(SensitivityGridResult {
            weights: weights.clone(),
            shocks: shocks.clone(),
            pre_shock_date,
            cells,
        })
    }
}

fn validate_axis(name: &str, values: &[f64]) -> Result<()> {
    if values.is_empty() {
        return Err(EngineError::InvalidParameter(format!("{} must not be empty", name)));
    }
    if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
        return Err(EngineError::InvalidParameter(format!(
            "{} contains non-finite value {}",
            name, bad
        )));
    }
    for (i, v) in values.iter().enumerate() {
        if values[..i].contains(v) {
            return Err(EngineError::InvalidParameter(format!(
                "{} contains duplicate value {}",
                name, v
            )));
        }
    }
    Ok(())
}
