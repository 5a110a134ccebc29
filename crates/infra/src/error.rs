//! Service-level error type.

use thiserror::Error;

use stockledger_core::DomainError;

use crate::store::StoreError;

/// Error returned by every service in this crate.
///
/// Domain failures pass through untouched. Store conflicts are folded into
/// `DomainError::ConcurrentModification` so callers see one retryable kind.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Persisting or reading failed for an infrastructure reason.
    #[error("store error: {0}")]
    Store(StoreError),

    /// Failed to deserialize historical event payloads into the aggregate event type.
    #[error("event deserialization failed: {0}")]
    Deserialize(String),
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Concurrency(msg) => {
                ServiceError::Domain(DomainError::ConcurrentModification(msg))
            }
            other => ServiceError::Store(other),
        }
    }
}

impl ServiceError {
    /// The domain error, if this is one.
    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            ServiceError::Domain(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.domain().is_some_and(DomainError::is_retryable)
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
