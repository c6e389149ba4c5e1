//! CSV and JSON export of engine results.
//!
//! Every exported type flattens into one record per row so the CSV and JSON
//! forms carry the same fields. NaN values are written as `NaN` in CSV and
//! `null` in JSON.

use chrono::NaiveDate;
use keystone_engine::{
    DecomposedReturns, ReturnSeries, RollingAssociation, SensitivityGridResult, SimulatedPath,
};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during export operations.
#[derive(Debug, Error)]
pub enum ExportError {
    /// CSV serialization error.
    #[error("CSV serialization error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization error.
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid format error.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

/// Export format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Comma-separated values format.
    Csv,

    /// Compact JSON format.
    Json,

    /// Pretty-printed JSON format.
    PrettyJson,
}

impl ExportFormat {
    /// Get the file extension for this format.
    pub const fn extension(&self) -> &str {
        match self {
            Self::Csv => "csv",
            Self::Json | Self::PrettyJson => "json",
        }
    }
}

/// Trait for exporting data in various formats.
pub trait Exporter {
    /// Export data to a string in the specified format.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError>;

    /// Export data to a file in the specified format.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or file writing fails.
    fn export_to_file(&self, path: &Path, format: ExportFormat) -> Result<(), ExportError> {
        let content = self.export_to_string(format)?;
        let mut file = File::create(path)?;
        file.write_all(content.as_bytes())?;
        Ok(())
    }
}

/// Serialize records with a header row.
pub(crate) fn records_to_csv<T: Serialize>(records: &[T]) -> Result<String, ExportError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    for record in records {
        wtr.serialize(record)?;
    }
    csv_into_string(wtr)
}

pub(crate) fn csv_into_string(wtr: csv::Writer<Vec<u8>>) -> Result<String, ExportError> {
    let bytes = wtr.into_inner().map_err(|e| e.into_error())?;
    String::from_utf8(bytes).map_err(|e| ExportError::InvalidFormat(e.to_string()))
}

fn export_records<T: Serialize>(records: &[T], format: ExportFormat) -> Result<String, ExportError> {
    match format {
        ExportFormat::Csv => records_to_csv(records),
        ExportFormat::Json => Ok(serde_json::to_string(records)?),
        ExportFormat::PrettyJson => Ok(serde_json::to_string_pretty(records)?),
    }
}

/// One date of a decomposition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecompositionRecord {
    /// Return date.
    pub date: NaiveDate,

    /// Aggregate return.
    pub aggregate: f64,

    /// Constituent return.
    pub constituent: f64,

    /// Ex-constituent return (NaN on degenerate dates).
    pub ex_constituent: f64,

    /// Exposure weight.
    pub weight: f64,
}

impl DecompositionRecord {
    /// Flatten a decomposition into one record per date.
    pub fn from_decomposition(decomposed: &DecomposedReturns) -> Vec<Self> {
        decomposed
            .dates()
            .iter()
            .enumerate()
            .map(|(i, date)| Self {
                date: *date,
                aggregate: decomposed.aggregate().series().values()[i],
                constituent: decomposed.constituent().series().values()[i],
                ex_constituent: decomposed.ex_constituent().series().values()[i],
                weight: decomposed.weights().values()[i],
            })
            .collect()
    }
}

impl Exporter for Vec<DecompositionRecord> {
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
        export_records(self, format)
    }
}

/// One date of one rolling window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RollingRecord {
    /// Window length.
    pub window: usize,

    /// Window end date.
    pub date: NaiveDate,

    /// Rolling beta.
    pub beta: f64,

    /// Rolling correlation, when computed.
    pub correlation: Option<f64>,
}

impl RollingRecord {
    /// Flatten rolling statistics into long format (window, date).
    pub fn from_associations(associations: &[RollingAssociation]) -> Vec<Self> {
        associations
            .iter()
            .flat_map(|assoc| {
                assoc
                    .beta
                    .dates
                    .iter()
                    .zip(&assoc.beta.values)
                    .enumerate()
                    .map(move |(i, (date, beta))| Self {
                        window: assoc.window,
                        date: *date,
                        beta: *beta,
                        correlation: assoc.correlation.as_ref().map(|c| c.values[i]),
                    })
            })
            .collect()
    }
}

impl Exporter for Vec<RollingRecord> {
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
        export_records(self, format)
    }
}

/// One period of a simulated path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathRecord {
    /// Period index; 0 is the pre-shock date.
    pub period: usize,

    /// Date.
    pub date: NaiveDate,

    /// Simulated price.
    pub price: f64,

    /// Simulated return into this period (absent for period 0).
    pub simulated_return: Option<f64>,
}

impl PathRecord {
    /// Flatten a simulated path.
    pub fn from_path(path: &SimulatedPath) -> Vec<Self> {
        path.dates
            .iter()
            .zip(&path.prices)
            .enumerate()
            .map(|(period, (date, price))| Self {
                period,
                date: *date,
                price: *price,
                simulated_return: period
                    .checked_sub(1)
                    .and_then(|i| path.returns.get(i).copied()),
            })
            .collect()
    }
}

impl Exporter for Vec<PathRecord> {
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
        export_records(self, format)
    }
}

/// Realized against counterfactual return on one date, with the growth of
/// one unit under each.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CounterfactualRecord {
    /// Date.
    pub date: NaiveDate,

    /// Realized aggregate return.
    pub realized_return: f64,

    /// Aggregate return with the shock applied on its date.
    pub counterfactual_return: f64,

    /// Realized growth of one unit.
    pub realized_growth: f64,

    /// Counterfactual growth of one unit.
    pub counterfactual_growth: f64,
}

impl CounterfactualRecord {
    /// Pair realized and counterfactual returns date by date.
    ///
    /// # Errors
    /// `InvalidFormat` if the two series do not share a date index.
    pub fn from_returns(
        realized: &ReturnSeries,
        counterfactual: &ReturnSeries,
    ) -> Result<Vec<Self>, ExportError> {
        if realized.series().dates() != counterfactual.series().dates() {
            return Err(ExportError::InvalidFormat(
                "realized and counterfactual returns cover different dates".to_string(),
            ));
        }
        let realized_growth = realized.cumulative_growth();
        let counterfactual_growth = counterfactual.cumulative_growth();

        Ok(realized
            .series()
            .dates()
            .iter()
            .enumerate()
            .map(|(i, date)| Self {
                date: *date,
                realized_return: realized.series().values()[i],
                counterfactual_return: counterfactual.series().values()[i],
                realized_growth: realized_growth.values()[i],
                counterfactual_growth: counterfactual_growth.values()[i],
            })
            .collect())
    }
}

impl Exporter for Vec<CounterfactualRecord> {
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
        export_records(self, format)
    }
}

/// One cell of a sensitivity grid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GridCellRecord {
    /// Exposure weight.
    pub weight: f64,

    /// Shock magnitude.
    pub shock: f64,

    /// Deepest drawdown.
    pub max_drawdown: Option<f64>,

    /// Trough date.
    pub trough_date: Option<NaiveDate>,

    /// Periods after the shock until recovery; empty when never recovered.
    pub recovery_periods: Option<usize>,

    /// Recovery date.
    pub recovery_date: Option<NaiveDate>,

    /// Failure message for cells that could not be evaluated.
    pub error: Option<String>,
}

impl GridCellRecord {
    /// Flatten a grid in row-major (weight, shock) order.
    pub fn from_grid(grid: &SensitivityGridResult) -> Vec<Self> {
        grid.cells()
            .iter()
            .map(|cell| match &cell.outcome {
                Ok(result) => Self {
                    weight: cell.weight,
                    shock: cell.shock,
                    max_drawdown: Some(result.max_drawdown),
                    trough_date: Some(result.trough_date),
                    recovery_periods: match result.recovery_duration {
                        keystone_engine::RecoveryDuration::Finite(n) => Some(n),
                        keystone_engine::RecoveryDuration::Infinite => None,
                    },
                    recovery_date: result.recovery_date,
                    error: None,
                },
                Err(e) => Self {
                    weight: cell.weight,
                    shock: cell.shock,
                    max_drawdown: None,
                    trough_date: None,
                    recovery_periods: None,
                    recovery_date: None,
                    error: Some(e.to_string()),
                },
            })
            .collect()
    }
}

impl Exporter for Vec<GridCellRecord> {
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
        export_records(self, format)
    }
}
