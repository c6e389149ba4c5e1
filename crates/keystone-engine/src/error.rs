//! Error types for engine computations.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised at the point a precondition of a core computation is violated.
///
/// Degenerate exposure weights (`w == 1`) are not errors: the decomposer
/// yields `NaN` for those dates instead.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum EngineError {
    /// Too few observations for the requested computation
    #[error("Insufficient data: need at least {required} observations, got {actual}")]
    InsufficientData {
        /// Required number of observations
        required: usize,
        /// Actual number of observations
        actual: usize,
    },

    /// Date indices of two inputs do not match
    #[error("Misaligned index: {0}")]
    MisalignedIndex(String),

    /// Dates are not strictly increasing
    #[error("Dates must be strictly increasing (violated at position {position})")]
    UnorderedIndex {
        /// Position of the first offending date
        position: usize,
    },

    /// Dates and values differ in length
    #[error("Length mismatch: {dates} dates, {values} values")]
    LengthMismatch {
        /// Number of dates
        dates: usize,
        /// Number of values
        values: usize,
    },

    /// Return series built under different conventions were combined
    #[error("Return series use different conventions")]
    ConventionMismatch,

    /// Price level that cannot produce a return
    #[error("Invalid price {price} on {date}")]
    InvalidPrice {
        /// Date of the offending price
        date: NaiveDate,
        /// Offending price
        price: f64,
    },

    /// Exposure weight outside its admissible range or not finite
    #[error("Invalid exposure weight: {0}")]
    InvalidWeight(f64),

    /// Shock magnitude that cannot be applied
    #[error("Invalid shock magnitude: {0}")]
    InvalidShock(f64),

    /// Requested date is not in the index
    #[error("Date {0} not found in index")]
    DateNotFound(NaiveDate),

    /// A value needed by the computation is NaN
    #[error("Missing value on {0}")]
    MissingValue(NaiveDate),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}
