//! Scenario summary tables.
//!
//! Flattens a sensitivity grid into one row per successful scenario, ordered
//! from the deepest drawdown to the shallowest.

use crate::export::{ExportError, ExportFormat, Exporter, records_to_csv};
use chrono::NaiveDate;
use keystone_engine::{RecoveryDuration, SensitivityGridResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Format a fraction as a percentage label: 0.07 -> "7", 0.045 -> "4.5".
pub fn pct_label(fraction: f64) -> String {
    let pct = fraction * 100.0;
    if (pct - pct.round()).abs() < 1e-9 {
        format!("{:.0}", pct)
    } else {
        format!("{:.1}", pct)
    }
}

/// Scenario label such as `w7_shock_-30pct`.
pub fn scenario_label(weight: f64, shock: f64) -> String {
    format!("w{}_shock_{}pct", pct_label(weight), pct_label(shock))
}

/// One evaluated scenario.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScenarioRow {
    /// Scenario label.
    pub scenario: String,

    /// Exposure weight.
    pub weight: f64,

    /// Shock magnitude.
    pub shock: f64,

    /// Deepest drawdown (fraction, never positive).
    pub max_drawdown: f64,

    /// Deepest drawdown in percent.
    pub max_drawdown_pct: f64,

    /// Trough date.
    pub trough_date: NaiveDate,

    /// Periods after the shock until recovery; empty when never recovered.
    pub recovery_periods: Option<usize>,

    /// Recovery date.
    pub recovery_date: Option<NaiveDate>,
}

/// Scenario summary of a sensitivity grid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScenarioSummary {
    /// Date of the pre-shock reference price.
    pub pre_shock_date: NaiveDate,

    /// Successful scenarios, deepest drawdown first.
    pub rows: Vec<ScenarioRow>,

    /// Number of cells that failed and are not listed.
    pub failed: usize,
}

impl ScenarioSummary {
    /// Summarize a grid.
    pub fn from_grid(grid: &SensitivityGridResult) -> Self {
        let mut rows: Vec<ScenarioRow> = grid
            .cells()
            .iter()
            .filter_map(|cell| {
                let result = cell.outcome.as_ref().ok()?;
                Some(ScenarioRow {
                    scenario: scenario_label(cell.weight, cell.shock),
                    weight: cell.weight,
                    shock: cell.shock,
                    max_drawdown: result.max_drawdown,
                    max_drawdown_pct: result.max_drawdown * 100.0,
                    trough_date: result.trough_date,
                    recovery_periods: match result.recovery_duration {
                        RecoveryDuration::Finite(n) => Some(n),
                        RecoveryDuration::Infinite => None,
                    },
                    recovery_date: result.recovery_date,
                })
            })
            .collect();

        // Stable, so equal drawdowns keep grid order.
        rows.sort_by(|a, b| a.max_drawdown.total_cmp(&b.max_drawdown));

        Self {
            pre_shock_date: grid.pre_shock_date(),
            failed: grid.len() - rows.len(),
            rows,
        }
    }

    /// Number of listed scenarios.
    pub const fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether no scenario succeeded.
    pub const fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The deepest scenario.
    pub fn worst(&self) -> Option<&ScenarioRow> {
        self.rows.first()
    }

    /// Format as ASCII table for terminal display.
    pub fn to_ascii_table(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!(
            "\nScenario Summary (pre-shock date {})\n",
            self.pre_shock_date
        ));
        output.push_str(&"=".repeat(72));
        output.push('\n');
        output.push_str(&format!(
            "{:<24} {:>8} {:>8} {:>12} {:>14}\n",
            "Scenario", "Weight", "Shock", "Max DD", "Recovery"
        ));
        output.push_str(&"-".repeat(72));
        output.push('\n');

        for row in &self.rows {
            let recovery = row
                .recovery_periods
                .map_or_else(|| "never".to_string(), |n| format!("{} periods", n));
            output.push_str(&format!(
                "{:<24} {:>7.2}% {:>7.1}% {:>11.2}% {:>14}\n",
                row.scenario,
                row.weight * 100.0,
                row.shock * 100.0,
                row.max_drawdown_pct,
                recovery
            ));
        }

        if self.failed > 0 {
            output.push_str(&format!("\n{} scenario(s) could not be evaluated\n", self.failed));
        }
        output.push_str(&"=".repeat(72));
        output.push('\n');

        output
    }

    /// Format as Markdown for documentation.
    pub fn to_markdown(&self) -> String {
        let mut output = String::new();

        output.push_str("# Scenario Summary\n\n");
        output.push_str(&format!("**Pre-shock date:** {}\n\n", self.pre_shock_date));
        output.push_str("| Scenario | Weight | Shock | Max Drawdown | Recovery |\n");
        output.push_str("|----------|--------|-------|--------------|----------|\n");

        for row in &self.rows {
            let recovery = row
                .recovery_periods
                .map_or_else(|| "never".to_string(), |n| n.to_string());
            output.push_str(&format!(
                "| {} | {:.2}% | {:.1}% | {:.2}% | {} |\n",
                row.scenario,
                row.weight * 100.0,
                row.shock * 100.0,
                row.max_drawdown_pct,
                recovery
            ));
        }

        output
    }
}

impl fmt::Display for ScenarioSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Scenario Summary: {} scenarios ({} failed), pre-shock {}",
            self.rows.len(),
            self.failed,
            self.pre_shock_date
        )?;
        if let Some(worst) = self.worst() {
            writeln!(
                f,
                "  Worst: {} at {:.2}%",
                worst.scenario, worst.max_drawdown_pct
            )?;
        }
        Ok(())
    }
}

impl Exporter for ScenarioSummary {
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
        match format {
            ExportFormat::Csv => records_to_csv(&self.rows),
            ExportFormat::Json => Ok(serde_json::to_string(self)?),
            ExportFormat::PrettyJson => Ok(serde_json::to_string_pretty(self)?),
        }
    }
}
