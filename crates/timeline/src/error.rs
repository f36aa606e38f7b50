//! Error types for the performance timeline.

use thiserror::Error;

/// Errors raised synchronously by timeline operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimelineError {
    /// Missing or conflicting options passed to `observe` or `measure`
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// An observer tried to switch between `type` and `entryTypes` subscriptions
    #[error("Invalid modification: {0}")]
    InvalidModification(String),

    /// A mark name used by `measure` does not exist in the timeline
    #[error("Mark '{0}' not found")]
    ReferenceNotFound(String),
}

/// Result type for timeline operations.
pub type TimelineResult<T> = Result<T, TimelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TimelineError::ReferenceNotFound("start".to_string());
        assert_eq!(err.to_string(), "Mark 'start' not found");

        let err = TimelineError::InvalidModification(
            "cannot change the observer type".to_string(),
        );
        assert_eq!(
            err.to_string(),
            "Invalid modification: cannot change the observer type"
        );
    }
}
