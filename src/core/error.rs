//! Error types for the covmodel library.

use std::path::PathBuf;

use thiserror::Error;

use crate::model::Metric;

/// Result type alias using covmodel's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building, merging or reading coverage trees.
#[derive(Error, Debug)]
pub enum Error {
    /// A node already has a child with the same name.
    #[error("There is already a child with the name '{name}' in {parent}")]
    DuplicateChildName { parent: String, name: String },

    /// A node already stores a value for the metric.
    #[error("There is already a value with the metric {metric} in {node}")]
    DuplicateMetricValue { node: String, metric: Metric },

    /// Two trees with different root metrics cannot be merged.
    #[error("Cannot merge nodes of different metrics: {left} - {right}")]
    IncompatibleMetric { left: Metric, right: Metric },

    /// Two trees with different root names cannot be merged.
    #[error("Cannot merge nodes with different names: {left} - {right}")]
    IncompatibleName { left: String, right: String },

    /// Merging requires at least one tree.
    #[error("Cannot merge an empty list of nodes")]
    EmptyMerge,

    /// Two versions of a file disagree on the number of coverage items of a line.
    #[error("Cannot merge coverage information for line {line} in {file}: {left} items vs. {right} items")]
    LineHitCountMismatch {
        file: String,
        line: u32,
        left: u32,
        right: u32,
    },

    /// The root of a tree has no parent.
    #[error("Parent is not set for {node}")]
    NoParent { node: String },

    /// A required attribute is missing in a report record.
    #[error("Could not obtain attribute '{attribute}' from {context}")]
    MissingAttribute { attribute: String, context: String },

    /// A value does not fit the metric it was created for.
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// A directory-based reader was given something else.
    #[error("Not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// Parse error in a report artifact.
    #[error("Parse error in {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// The format of a report could not be detected.
    #[error("Could not detect report format of {path}")]
    UnknownFormat { path: PathBuf },

    /// I/O error reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Threshold violation (for CI/CD integration).
    #[error("Threshold violation: {message}")]
    ThresholdViolation { message: String, score: f64 },
}

impl Error {
    /// Create a new parse error for the given artifact.
    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a new invalid value error.
    pub fn invalid_value(message: impl Into<String>) -> Self {
        Self::InvalidValue(message.into())
    }

    /// Create a threshold violation error.
    pub fn threshold_violation(message: impl Into<String>, score: f64) -> Self {
        Self::ThresholdViolation {
            message: message.into(),
            score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::parse("coverage.json", "unexpected end of file");
        assert_eq!(
            err.to_string(),
            "Parse error in coverage.json: unexpected end of file"
        );

        let err = Error::NotADirectory {
            path: PathBuf::from("report.html"),
        };
        assert_eq!(err.to_string(), "Not a directory: report.html");
    }

    #[test]
    fn test_line_mismatch_display() {
        let err = Error::LineHitCountMismatch {
            file: "Main.java".to_string(),
            line: 20,
            left: 3,
            right: 2,
        };
        let message = err.to_string();
        assert!(message.contains("line 20"));
        assert!(message.contains("Main.java"));
    }

    #[test]
    fn test_threshold_violation() {
        let err = Error::threshold_violation("Line coverage below minimum", 45.0);
        match err {
            Error::ThresholdViolation { message, score } => {
                assert_eq!(message, "Line coverage below minimum");
                assert!((score - 45.0).abs() < f64::EPSILON);
            }
            _ => panic!("Expected ThresholdViolation"),
        }
    }
}
