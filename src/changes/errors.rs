//! Change detection errors

use thiserror::Error;

use crate::executor::ExecutorError;
use crate::store::StoreError;

/// Result type for change detection
pub type ChangeResult<T> = Result<T, ChangeError>;

/// Change detection errors.
///
/// Only contract violations and failures of the primary store round
/// trips surface here. Best-effort lookups and staging cleanup degrade
/// silently (they are logged).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChangeError {
    /// The call violates the engine contract; raised before any I/O
    #[error("Invalid invocation: {0}")]
    InvalidInvocation(String),

    /// A required store operation failed
    #[error("Store failure: {0}")]
    Store(#[from] StoreError),

    /// A page pipeline could not be evaluated locally
    #[error("Pipeline failure: {0}")]
    Executor(#[from] ExecutorError),
}

impl ChangeError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        ChangeError::InvalidInvocation(reason.into())
    }

    /// Returns the stable error code
    pub fn code(&self) -> &'static str {
        match self {
            ChangeError::InvalidInvocation(_) => "CHANGE_INVALID_INVOCATION",
            ChangeError::Store(_) => "CHANGE_STORE_FAILED",
            ChangeError::Executor(_) => "CHANGE_PIPELINE_FAILED",
        }
    }

    /// Returns true for contract violations by the caller
    pub fn is_invalid_invocation(&self) -> bool {
        matches!(self, ChangeError::InvalidInvocation(_))
    }
}
