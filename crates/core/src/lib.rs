//! Shared building blocks for the ledger: ids, errors, order aggregates, locations.

pub mod aggregate;
pub mod error;
pub mod id;
pub mod location;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult, StockShortage};
pub use id::{
    LocationId, ProductId, PurchaseOrderId, ReceiptId, SupplierId, TransactionId, TransferId,
    UserId,
};
pub use location::{LocationKind, StockLocation};
