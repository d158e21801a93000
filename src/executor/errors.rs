//! Executor error types
//!
//! Error codes:
//! - PIPELINE_UNBOUND_VARIABLE
//! - PIPELINE_UNFILLED_PLACEHOLDER
//! - PIPELINE_INVALID_PATTERN

use thiserror::Error;

/// Result type for pipeline execution
pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// Pipeline execution errors.
///
/// These only arise from malformed pipelines, never from record content.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutorError {
    /// A `Var` referenced outside any binding `Filter` or `Map`
    #[error("Unbound variable: {0}")]
    UnboundVariable(String),

    /// A template was executed before all holes were filled
    #[error("Unfilled placeholder: {0}")]
    UnfilledPlaceholder(String),

    /// A text pattern failed to compile
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

impl ExecutorError {
    /// Returns the stable error code
    pub fn code(&self) -> &'static str {
        match self {
            ExecutorError::UnboundVariable(_) => "PIPELINE_UNBOUND_VARIABLE",
            ExecutorError::UnfilledPlaceholder(_) => "PIPELINE_UNFILLED_PLACEHOLDER",
            ExecutorError::InvalidPattern { .. } => "PIPELINE_INVALID_PATTERN",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            ExecutorError::UnboundVariable("e0".into()).code(),
            "PIPELINE_UNBOUND_VARIABLE"
        );
        let err = ExecutorError::InvalidPattern {
            pattern: "(".into(),
            reason: "unclosed group".into(),
        };
        assert_eq!(err.code(), "PIPELINE_INVALID_PATTERN");
        assert!(err.to_string().contains("unclosed group"));
    }
}
