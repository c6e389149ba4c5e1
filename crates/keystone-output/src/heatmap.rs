//! Weight x shock pivot of one grid metric, the matrix behind a heatmap.

use crate::export::{ExportError, ExportFormat, Exporter, csv_into_string};
use crate::summary::pct_label;
use keystone_engine::{GridMetric, SensitivityGridResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pivot table: rows are exposure weights, columns are shock magnitudes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HeatmapTable {
    /// Metric in the cells.
    pub metric: GridMetric,

    /// Weight axis (fractions).
    pub weights: Vec<f64>,

    /// Shock axis (fractions).
    pub shocks: Vec<f64>,

    /// Row-major values; NaN for failed cells, `inf` for no recovery.
    pub values: Vec<Vec<f64>>,
}

impl HeatmapTable {
    /// Pivot a grid on one metric.
    pub fn from_grid(grid: &SensitivityGridResult, metric: GridMetric) -> Self {
        let matrix = grid.to_matrix(metric);
        Self {
            metric,
            weights: grid.weights().to_vec(),
            shocks: grid.shocks().to_vec(),
            values: matrix.rows().into_iter().map(|row| row.to_vec()).collect(),
        }
    }

    /// Value at (weight index, shock index).
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        self.values.get(row).and_then(|r| r.get(col)).copied()
    }

    /// Row labels, weights in percent.
    pub fn row_labels(&self) -> Vec<String> {
        self.weights.iter().map(|w| format!("{}%", pct_label(*w))).collect()
    }

    /// Column labels, shocks in percent.
    pub fn column_labels(&self) -> Vec<String> {
        self.shocks.iter().map(|s| format!("{}%", pct_label(*s))).collect()
    }

    fn to_csv(&self) -> Result<String, ExportError> {
        let mut wtr = csv::Writer::from_writer(vec![]);

        let mut header = vec!["weight".to_string()];
        header.extend(self.shocks.iter().map(|s| s.to_string()));
        wtr.write_record(&header)?;

        for (weight, row) in self.weights.iter().zip(&self.values) {
            let mut record = vec![weight.to_string()];
            record.extend(row.iter().map(|v| v.to_string()));
            wtr.write_record(&record)?;
        }

        csv_into_string(wtr)
    }
}

impl fmt::Display for HeatmapTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scale = match self.metric {
            GridMetric::MaxDrawdown => 100.0,
            GridMetric::RecoveryDuration | GridMetric::TroughPeriod => 1.0,
        };

        writeln!(f, "{} (rows: weight, columns: shock)", self.metric)?;
        write!(f, "{:>8}", "")?;
        for label in self.column_labels() {
            write!(f, " {:>9}", label)?;
        }
        writeln!(f)?;

        for (label, row) in self.row_labels().iter().zip(&self.values) {
            write!(f, "{:>8}", label)?;
            for value in row {
                if value.is_nan() {
                    write!(f, " {:>9}", "n/a")?;
                } else if value.is_infinite() {
                    write!(f, " {:>9}", "never")?;
                } else {
                    write!(f, " {:>9.2}", value * scale)?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl Exporter for HeatmapTable {
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
        match format {
            ExportFormat::Csv => self.to_csv(),
            ExportFormat::Json => Ok(serde_json::to_string(self)?),
            ExportFormat::PrettyJson => Ok(serde_json::to_string_pretty(self)?),
        }
    }
}
