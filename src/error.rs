//! Unified error handling for the cell-matcher library.
//!
//! Malformed input rows never surface here: they are dropped and counted
//! during normalization. Only parameter/configuration problems and broken
//! auxiliary documents (config files, GeoJSON regions) become errors.

use std::fmt;

/// Unified error type for cell-matcher operations.
#[derive(Debug, Clone, PartialEq)]
pub enum CellMatchError {
    /// A numeric parameter is negative, non-finite or out of range
    InvalidParameter {
        name: String,
        value: f64,
        reason: String,
    },
    /// Configuration document could not be used
    ConfigError { message: String },
    /// Region document is not usable GeoJSON
    GeoJsonError { message: String },
    /// Reading an auxiliary file failed
    Io { path: String, message: String },
    /// Generic internal error
    Internal { message: String },
}

impl CellMatchError {
    pub(crate) fn invalid_parameter(name: &str, value: f64, reason: &str) -> Self {
        CellMatchError::InvalidParameter {
            name: name.to_string(),
            value,
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for CellMatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellMatchError::InvalidParameter {
                name,
                value,
                reason,
            } => {
                write!(f, "Invalid parameter '{}' = {}: {}", name, value, reason)
            }
            CellMatchError::ConfigError { message } => {
                write!(f, "Configuration error: {}", message)
            }
            CellMatchError::GeoJsonError { message } => {
                write!(f, "GeoJSON error: {}", message)
            }
            CellMatchError::Io { path, message } => {
                write!(f, "I/O error on '{}': {}", path, message)
            }
            CellMatchError::Internal { message } => {
                write!(f, "Internal error: {}", message)
            }
        }
    }
}

impl std::error::Error for CellMatchError {}

/// Result type alias for cell-matcher operations.
pub type Result<T> = std::result::Result<T, CellMatchError>;

/// Extension trait for converting Option to CellMatchError.
pub trait OptionExt<T> {
    /// Convert Option to Result with a GeoJSON error.
    fn ok_or_geojson(self, message: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_geojson(self, message: &str) -> Result<T> {
        self.ok_or_else(|| CellMatchError::GeoJsonError {
            message: message.to_string(),
        })
    }
}

/// Reject negative or non-finite values.
pub(crate) fn require_non_negative(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(CellMatchError::invalid_parameter(name, value, "must be finite"));
    }
    if value < 0.0 {
        return Err(CellMatchError::invalid_parameter(
            name,
            value,
            "must not be negative",
        ));
    }
    Ok(())
}

/// Reject zero, negative or non-finite values.
pub(crate) fn require_positive(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(CellMatchError::invalid_parameter(name, value, "must be finite"));
    }
    if value <= 0.0 {
        return Err(CellMatchError::invalid_parameter(
            name,
            value,
            "must be greater than zero",
        ));
    }
    Ok(())
}
