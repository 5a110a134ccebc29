//! Domain error model.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::id::{LocationId, ProductId};

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// One item that could not be covered by the stock at its location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockShortage {
    pub location_id: LocationId,
    pub product_id: ProductId,
    pub requested: i64,
    pub available: i64,
}

impl core::fmt::Display for StockShortage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "product {} at {}: requested {}, available {}",
            self.product_id, self.location_id, self.requested, self.available
        )
    }
}

fn list_shortages(shortages: &[StockShortage]) -> String {
    shortages
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, conflicts). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Applying the change would leave stock negative or eat into another hold.
    ///
    /// Multi-item operations list every offending item, not just the first.
    #[error("insufficient stock: {}", list_shortages(.0))]
    InsufficientStock(Vec<StockShortage>),

    /// An order was asked to move to a state its current state does not allow.
    #[error("invalid {entity} state transition from {from} to {to}")]
    InvalidStateTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    /// A malformed transfer request (same endpoints, non-positive quantity, ...).
    #[error("invalid transfer: {0}")]
    InvalidTransfer(String),

    /// Referential integrity failure against the location/product catalog.
    #[error("unknown location {location} or product {product}")]
    UnknownLocationOrProduct {
        location: LocationId,
        product: ProductId,
    },

    /// A removal was requested for a pair that has never held stock.
    #[error("no existing inventory for product {product} at {location}")]
    NoExistingInventory {
        location: LocationId,
        product: ProductId,
    },

    /// Optimistic version conflict; safe to retry after reloading.
    #[error("concurrent modification: {0}")]
    ConcurrentModification(String),

    /// Receiving more than what is still outstanding on a line.
    #[error("over-receipt on line {line_no}: requested {requested}, remaining {remaining}")]
    OverReceipt {
        line_no: u32,
        requested: i64,
        remaining: i64,
    },

    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found")]
    NotFound,
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_transfer(msg: impl Into<String>) -> Self {
        Self::InvalidTransfer(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::ConcurrentModification(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn transition(
        entity: &'static str,
        from: impl core::fmt::Debug,
        to: impl core::fmt::Debug,
    ) -> Self {
        Self::InvalidStateTransition {
            entity,
            from: format!("{from:?}"),
            to: format!("{to:?}"),
        }
    }

    pub fn shortage(
        location_id: LocationId,
        product_id: ProductId,
        requested: i64,
        available: i64,
    ) -> Self {
        Self::InsufficientStock(vec![StockShortage {
            location_id,
            product_id,
            requested,
            available,
        }])
    }

    /// Whether retrying the whole operation after a reload can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentModification(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_error_reports_both_states() {
        #[derive(Debug)]
        enum S {
            Received,
            Cancelled,
        }
        let err = DomainError::transition("transfer", S::Received, S::Cancelled);
        assert_eq!(
            err.to_string(),
            "invalid transfer state transition from Received to Cancelled"
        );
    }

    #[test]
    fn only_conflicts_are_retryable() {
        assert!(DomainError::conflict("stale").is_retryable());
        assert!(!DomainError::validation("bad").is_retryable());
        assert!(!DomainError::shortage(LocationId::new(), ProductId::new(), 5, 1).is_retryable());
    }
}
