//! Report generation for keystone analyses.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during report generation.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Required field not set on the builder.
    #[error("Missing report field: {0}")]
    MissingField(&'static str),
}

/// A report of one analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// Aggregate (index) ticker.
    pub aggregate: String,

    /// Constituent ticker.
    pub constituent: String,

    /// Report generation timestamp.
    pub timestamp: DateTime<Utc>,

    /// First date of the analysed data.
    pub period_start: Option<NaiveDate>,

    /// Last date of the analysed data.
    pub period_end: Option<NaiveDate>,

    /// Named report sections (JSON format).
    pub sections: serde_json::Map<String, serde_json::Value>,
}

impl Report {
    /// Create a new report with no sections.
    pub fn new(aggregate: String, constituent: String) -> Self {
        Self {
            aggregate,
            constituent,
            timestamp: Utc::now(),
            period_start: None,
            period_end: None,
            sections: serde_json::Map::new(),
        }
    }

    /// A section by name.
    pub fn section(&self, name: &str) -> Option<&serde_json::Value> {
        self.sections.get(name)
    }

    /// Convert report to JSON string.
    pub fn to_json(&self) -> Result<String, ReportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the JSON report to `path`.
    pub fn write_to_file(&self, path: &Path) -> Result<(), ReportError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

/// Builder for creating reports.
#[derive(Debug, Default)]
pub struct ReportBuilder {
    aggregate: Option<String>,
    constituent: Option<String>,
    period: Option<(NaiveDate, NaiveDate)>,
    sections: serde_json::Map<String, serde_json::Value>,
}

impl ReportBuilder {
    /// Create a new report builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the aggregate and constituent tickers.
    pub fn tickers(mut self, aggregate: impl Into<String>, constituent: impl Into<String>) -> Self {
        self.aggregate = Some(aggregate.into());
        self.constituent = Some(constituent.into());
        self
    }

    /// Set the analysed period.
    pub const fn period(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.period = Some((start, end));
        self
    }

    /// Add a section from any serializable value.
    pub fn section<T: Serialize>(mut self, name: &str, value: &T) -> Result<Self, ReportError> {
        self.sections
            .insert(name.to_string(), serde_json::to_value(value)?);
        Ok(self)
    }

    /// Build the report.
    pub fn build(self) -> Result<Report, ReportError> {
        let aggregate = self.aggregate.ok_or(ReportError::MissingField("aggregate"))?;
        let constituent = self
            .constituent
            .ok_or(ReportError::MissingField("constituent"))?;

        let mut report = Report::new(aggregate, constituent);
        if let Some((start, end)) = self.period {
            report.period_start = Some(start);
            report.period_end = Some(end);
        }
        report.sections = self.sections;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_creation() {
        let report = Report::new("^GSPC".to_string(), "NVDA".to_string());

        assert_eq!(report.aggregate, "^GSPC");
        assert!(report.sections.is_empty());
    }

    #[test]
    fn test_report_builder() {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        let report = ReportBuilder::new()
            .tickers("^GSPC", "NVDA")
            .period(start, end)
            .section("config", &serde_json::json!({"weight": 0.07}))
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(report.constituent, "NVDA");
        assert_eq!(report.period_end, Some(end));
        assert_eq!(report.section("config").unwrap()["weight"], 0.07);

        let json = report.to_json().unwrap();
        assert!(json.contains("\"sections\""));
    }

    #[test]
    fn test_builder_requires_tickers() {
        let result = ReportBuilder::new().build();
        assert!(matches!(result, Err(ReportError::MissingField("aggregate"))));
    }
}
