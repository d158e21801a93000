//! Store error types

use thiserror::Error;

use crate::executor::ExecutorError;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Store errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    // ==================
    // Write Errors
    // ==================
    /// Record without a usable `_id`
    #[error("Record without _id written to {area}")]
    MissingId { area: String },

    /// Insert of an identifier already present
    #[error("Duplicate _id {id} in {area}")]
    DuplicateId { area: String, id: String },

    // ==================
    // Query Errors
    // ==================
    /// A facet pipeline could not be executed
    #[error("Pipeline failed: {0}")]
    Pipeline(#[from] ExecutorError),

    // ==================
    // Backend Errors
    // ==================
    /// Backend-specific failure
    #[error("Store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Returns the stable error code
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::MissingId { .. } => "STORE_MISSING_ID",
            StoreError::DuplicateId { .. } => "STORE_DUPLICATE_ID",
            StoreError::Pipeline(_) => "STORE_PIPELINE_FAILED",
            StoreError::Backend(_) => "STORE_BACKEND_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = StoreError::DuplicateId {
            area: "orders".into(),
            id: "\"a\"".into(),
        };
        assert_eq!(err.code(), "STORE_DUPLICATE_ID");
        assert!(err.to_string().contains("orders"));

        let wrapped: StoreError = ExecutorError::UnboundVariable("e0".into()).into();
        assert_eq!(wrapped.code(), "STORE_PIPELINE_FAILED");
    }
}
