//! Persistence boundary for ledger state and order streams.
//!
//! The services in this crate never assume a storage engine. They read through
//! `InventoryStore` and write through a single `commit` of a `UnitOfWork`, which
//! the store must apply atomically: every position write, stock transaction and
//! stream append in the unit lands, or none does.

pub mod events;
pub mod in_memory;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use stockledger_core::{ExpectedVersion, LocationId, ProductId, StockLocation, SupplierId};
use stockledger_inventory::{InventoryPosition, PositionKey, StockTransaction};

pub use events::{StoredEvent, UncommittedEvent};
pub use in_memory::InMemoryInventoryStore;

/// Catalog entry for a product, as far as the ledger cares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: ProductId,
    pub sku: String,
    pub name: String,
    pub supplier_id: Option<SupplierId>,
}

/// New revision of a position, guarded by the version it was derived from.
///
/// `expected_version == 0` means the position must not exist yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionWrite {
    pub expected_version: u64,
    pub position: InventoryPosition,
}

/// Events to append to one aggregate stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamAppend {
    pub aggregate_id: Uuid,
    pub expected_version: ExpectedVersion,
    pub events: Vec<UncommittedEvent>,
}

/// Everything one operation writes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitOfWork {
    pub positions: Vec<PositionWrite>,
    pub transactions: Vec<StockTransaction>,
    pub streams: Vec<StreamAppend>,
}

impl UnitOfWork {
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty() && self.transactions.is_empty() && self.streams.is_empty()
    }
}

/// What a successful commit wrote.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommittedWork {
    pub positions: Vec<InventoryPosition>,
    pub transactions: Vec<StockTransaction>,
    pub events: Vec<StoredEvent>,
}

/// Store operation error.
///
/// These are infrastructure errors, as opposed to domain errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// An expected version did not match; nothing was written.
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    /// The unit of work is malformed or would break a ledger invariant.
    #[error("invalid write: {0}")]
    InvalidWrite(String),

    #[error("aggregate type mismatch: {0}")]
    AggregateTypeMismatch(String),

    /// The backend could not serve the request (e.g. poisoned lock).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Transactional persistence for locations, products, positions, stock
/// transactions and order event streams.
///
/// Implementations must:
/// - apply `commit` atomically
/// - check every position write against its expected version, per key, so writes to
///   different (product, location) pairs never conflict
/// - reject transactions whose deltas do not explain the position written with them
/// - keep transactions and events append-only
pub trait InventoryStore: Send + Sync {
    fn location(&self, id: LocationId) -> Result<Option<StockLocation>, StoreError>;

    /// Create a location, or update its active flag. Identity, kind and name are fixed.
    fn put_location(&self, location: StockLocation) -> Result<(), StoreError>;

    fn product(&self, id: ProductId) -> Result<Option<ProductRecord>, StoreError>;

    fn put_product(&self, product: ProductRecord) -> Result<(), StoreError>;

    fn position(&self, key: PositionKey) -> Result<Option<InventoryPosition>, StoreError>;

    /// All positions, optionally restricted to one location.
    fn positions(&self, location: Option<LocationId>) -> Result<Vec<InventoryPosition>, StoreError>;

    /// Transactions for one position, oldest first.
    fn transactions(&self, key: PositionKey) -> Result<Vec<StockTransaction>, StoreError>;

    fn load_stream(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, StoreError>;

    fn commit(&self, work: UnitOfWork) -> Result<CommittedWork, StoreError>;
}

impl<S> InventoryStore for Arc<S>
where
    S: InventoryStore + ?Sized,
{
    fn location(&self, id: LocationId) -> Result<Option<StockLocation>, StoreError> {
        (**self).location(id)
    }

    fn put_location(&self, location: StockLocation) -> Result<(), StoreError> {
        (**self).put_location(location)
    }

    fn product(&self, id: ProductId) -> Result<Option<ProductRecord>, StoreError> {
        (**self).product(id)
    }

    fn put_product(&self, product: ProductRecord) -> Result<(), StoreError> {
        (**self).put_product(product)
    }

    fn position(&self, key: PositionKey) -> Result<Option<InventoryPosition>, StoreError> {
        (**self).position(key)
    }

    fn positions(&self, location: Option<LocationId>) -> Result<Vec<InventoryPosition>, StoreError> {
        (**self).positions(location)
    }

    fn transactions(&self, key: PositionKey) -> Result<Vec<StockTransaction>, StoreError> {
        (**self).transactions(key)
    }

    fn load_stream(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, StoreError> {
        (**self).load_stream(aggregate_id)
    }

    fn commit(&self, work: UnitOfWork) -> Result<CommittedWork, StoreError> {
        (**self).commit(work)
    }
}
