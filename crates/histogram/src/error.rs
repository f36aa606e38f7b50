//! Error types for histograms.

use thiserror::Error;

/// Errors that can occur when creating or combining histograms.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HistogramError {
    /// Options out of range
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// The HDR backend rejected the configuration
    #[error("Histogram creation failed: {0}")]
    Creation(String),

    /// Another histogram's values do not fit this one's range
    #[error("Histogram addition failed: {0}")]
    Addition(String),

    /// Interval sampling needs a tokio runtime and none is running
    #[error("No tokio runtime available for interval sampling")]
    NoRuntime,
}

/// Result type for histogram operations.
pub type HistogramResult<T> = Result<T, HistogramError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HistogramError::InvalidArguments("figures must be between 1 and 5".to_string());
        assert_eq!(
            err.to_string(),
            "Invalid arguments: figures must be between 1 and 5"
        );
        assert_eq!(
            HistogramError::NoRuntime.to_string(),
            "No tokio runtime available for interval sampling"
        );
    }
}
