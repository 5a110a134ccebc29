//! Stock Ledger service: the only writer of inventory positions.
//!
//! Single-position operations (`post`, `reserve`, `release`, `set_thresholds`)
//! each run as one unit of work with bounded retry on conflicts. Multi-item
//! operations stage their changes in a `LedgerBatch` and commit the result together
//! with whatever else the caller writes (order events), so a transition either
//! lands for every item or for none.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, LocationId, ProductId, StockShortage, TransactionId};
use stockledger_inventory::{
    InventoryPosition, PositionKey, Posting, ReorderThresholds, ReservationChange,
    StockTransaction, apply_posting, apply_reservation,
};

use crate::error::{ServiceError, ServiceResult};
use crate::retry::{RetryPolicy, with_retry};
use crate::store::{InventoryStore, PositionWrite, UnitOfWork};

/// Result of one successful post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostOutcome {
    pub position: InventoryPosition,
    pub transaction: StockTransaction,
}

#[derive(Debug)]
pub struct Ledger<S> {
    store: S,
    retry: RetryPolicy,
}

impl<S> Ledger<S> {
    pub fn new(store: S, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }
}

impl<S> Ledger<S>
where
    S: InventoryStore,
{
    /// Apply one posting and append its transaction, atomically.
    pub fn post(&self, posting: Posting) -> ServiceResult<PostOutcome> {
        let key = posting.key;
        let outcome = with_retry(&self.retry, "ledger.post", || {
            let mut batch = self.stage();
            let transaction = batch.post(&posting)?;
            let staged = batch.finish()?;
            let position = staged.position(key).cloned();
            self.store.commit(staged.into_unit())?;

            match (position, transaction) {
                (Some(position), Some(transaction)) => Ok(PostOutcome {
                    position,
                    transaction,
                }),
                _ => Err(DomainError::validation("posting produced no change").into()),
            }
        })?;

        tracing::info!(
            product_id = %key.product_id,
            location_id = %key.location_id,
            kind = ?outcome.transaction.kind,
            delta = outcome.transaction.delta,
            balance = outcome.transaction.resulting_balance,
            "stock posted"
        );
        Ok(outcome)
    }

    /// Hold `quantity` of available stock.
    pub fn reserve(
        &self,
        location_id: LocationId,
        product_id: ProductId,
        quantity: i64,
    ) -> ServiceResult<InventoryPosition> {
        self.change_reservation(
            PositionKey::new(product_id, location_id),
            ReservationChange::Reserve(quantity),
            "ledger.reserve",
        )
    }

    /// Drop up to `quantity` of a hold.
    pub fn release(
        &self,
        location_id: LocationId,
        product_id: ProductId,
        quantity: i64,
    ) -> ServiceResult<InventoryPosition> {
        self.change_reservation(
            PositionKey::new(product_id, location_id),
            ReservationChange::Release(quantity),
            "ledger.release",
        )
    }

    fn change_reservation(
        &self,
        key: PositionKey,
        change: ReservationChange,
        operation: &'static str,
    ) -> ServiceResult<InventoryPosition> {
        let position = with_retry(&self.retry, operation, || {
            let mut batch = self.stage();
            batch.change_reservation(key, change)?;
            let position = batch.position(key)?.clone();
            let staged = batch.finish()?;
            // Holds only exist on stocked positions; never create one here.
            if !position.exists() {
                return Err(DomainError::NoExistingInventory {
                    location: key.location_id,
                    product: key.product_id,
                }
                .into());
            }
            if !staged.is_empty() {
                self.store.commit(staged.into_unit())?;
            }
            Ok(position)
        })?;

        tracing::info!(
            operation,
            product_id = %key.product_id,
            location_id = %key.location_id,
            reserved = position.quantity_reserved(),
            available = position.quantity_available(),
            "reservation changed"
        );
        Ok(position)
    }

    /// Configure replenishment thresholds, creating the position if needed.
    pub fn set_thresholds(
        &self,
        location_id: LocationId,
        product_id: ProductId,
        reorder_point: i64,
        min_stock_level: i64,
    ) -> ServiceResult<InventoryPosition> {
        let thresholds = ReorderThresholds::new(reorder_point, min_stock_level)?;
        let key = PositionKey::new(product_id, location_id);

        with_retry(&self.retry, "ledger.set_thresholds", || {
            let mut batch = self.stage();
            batch.set_thresholds(key, thresholds)?;
            let staged = batch.finish()?;
            let position = staged.position(key).cloned();
            self.store.commit(staged.into_unit())?;
            position.ok_or_else(|| DomainError::not_found().into())
        })
    }

    pub fn position(
        &self,
        location_id: LocationId,
        product_id: ProductId,
    ) -> ServiceResult<Option<InventoryPosition>> {
        Ok(self.store.position(PositionKey::new(product_id, location_id))?)
    }

    /// Transactions for one position, oldest first.
    pub fn history(
        &self,
        location_id: LocationId,
        product_id: ProductId,
    ) -> ServiceResult<Vec<StockTransaction>> {
        Ok(self.store.transactions(PositionKey::new(product_id, location_id))?)
    }

    /// Start staging a multi-item change against current store state.
    pub fn stage(&self) -> LedgerBatch<'_, S> {
        LedgerBatch::new(&self.store, Utc::now())
    }
}

#[derive(Debug, Clone)]
struct Staged {
    base_version: u64,
    position: InventoryPosition,
}

/// Uncommitted changes to any number of positions.
///
/// Each position is read once; later steps on the same key build on the staged
/// revision. Stock shortages are collected rather than returned so that a
/// multi-item transition reports every item that could not be covered.
#[derive(Debug)]
pub struct LedgerBatch<'a, S> {
    store: &'a S,
    now: DateTime<Utc>,
    working: BTreeMap<PositionKey, Staged>,
    verified: HashSet<PositionKey>,
    transactions: Vec<StockTransaction>,
    shortages: Vec<StockShortage>,
}

impl<'a, S> LedgerBatch<'a, S>
where
    S: InventoryStore,
{
    fn new(store: &'a S, now: DateTime<Utc>) -> Self {
        Self {
            store,
            now,
            working: BTreeMap::new(),
            verified: HashSet::new(),
            transactions: Vec::new(),
            shortages: Vec::new(),
        }
    }

    /// Current staged view of a position (an empty one if it has never existed).
    pub fn position(&mut self, key: PositionKey) -> ServiceResult<&InventoryPosition> {
        self.ensure_known(key)?;
        self.load(key).map(|staged| &staged.position)
    }

    /// Stage a posting. Returns `None` if it was recorded as a shortage.
    pub fn post(&mut self, posting: &Posting) -> ServiceResult<Option<StockTransaction>> {
        self.ensure_known(posting.key)?;
        let now = self.now;
        let staged = self.load(posting.key)?;

        match apply_posting(&staged.position, posting, TransactionId::new(), now) {
            Ok((next, transaction)) => {
                tracing::debug!(
                    key = %posting.key,
                    kind = ?transaction.kind,
                    delta = transaction.delta,
                    "posting staged"
                );
                staged.position = next;
                self.transactions.push(transaction.clone());
                Ok(Some(transaction))
            }
            Err(DomainError::InsufficientStock(shortages)) => {
                self.shortages.extend(shortages);
                Ok(None)
            }
            Err(other) => Err(other.into()),
        }
    }

    pub fn reserve(&mut self, key: PositionKey, quantity: i64) -> ServiceResult<()> {
        self.change_reservation(key, ReservationChange::Reserve(quantity))
    }

    pub fn release(&mut self, key: PositionKey, quantity: i64) -> ServiceResult<()> {
        self.change_reservation(key, ReservationChange::Release(quantity))
    }

    fn change_reservation(&mut self, key: PositionKey, change: ReservationChange) -> ServiceResult<()> {
        self.ensure_known(key)?;
        let now = self.now;
        let staged = self.load(key)?;

        match apply_reservation(&staged.position, change, now) {
            Ok(next) => {
                staged.position = next;
                Ok(())
            }
            Err(DomainError::InsufficientStock(shortages)) => {
                self.shortages.extend(shortages);
                Ok(())
            }
            Err(other) => Err(other.into()),
        }
    }

    pub fn set_thresholds(
        &mut self,
        key: PositionKey,
        thresholds: ReorderThresholds,
    ) -> ServiceResult<()> {
        self.ensure_known(key)?;
        let now = self.now;
        let staged = self.load(key)?;
        staged.position = staged.position.with_thresholds(thresholds, now);
        Ok(())
    }

    pub fn has_shortages(&self) -> bool {
        !self.shortages.is_empty()
    }

    /// Close the batch. Fails with every collected shortage if there were any.
    pub fn finish(self) -> ServiceResult<StagedWork> {
        if !self.shortages.is_empty() {
            return Err(DomainError::InsufficientStock(self.shortages).into());
        }

        let positions = self
            .working
            .into_values()
            .filter(|s| s.position.version() != s.base_version)
            .map(|s| PositionWrite {
                expected_version: s.base_version,
                position: s.position,
            })
            .collect();

        Ok(StagedWork {
            positions,
            transactions: self.transactions,
        })
    }

    fn ensure_known(&mut self, key: PositionKey) -> ServiceResult<()> {
        if self.verified.contains(&key) {
            return Ok(());
        }
        let location_known = self.store.location(key.location_id)?.is_some();
        let product_known = self.store.product(key.product_id)?.is_some();
        if !location_known || !product_known {
            return Err(DomainError::UnknownLocationOrProduct {
                location: key.location_id,
                product: key.product_id,
            }
            .into());
        }
        self.verified.insert(key);
        Ok(())
    }

    fn load(&mut self, key: PositionKey) -> ServiceResult<&mut Staged> {
        if !self.working.contains_key(&key) {
            let position = self
                .store
                .position(key)?
                .unwrap_or_else(|| InventoryPosition::empty(key, self.now));
            self.working.insert(
                key,
                Staged {
                    base_version: position.version(),
                    position,
                },
            );
        }
        self.working
            .get_mut(&key)
            .ok_or_else(|| ServiceError::Domain(DomainError::not_found()))
    }
}

/// Position writes and transactions produced by a finished batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StagedWork {
    pub positions: Vec<PositionWrite>,
    pub transactions: Vec<StockTransaction>,
}

impl StagedWork {
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty() && self.transactions.is_empty()
    }

    pub fn position(&self, key: PositionKey) -> Option<&InventoryPosition> {
        self.positions
            .iter()
            .map(|w| &w.position)
            .find(|p| p.key() == key)
    }

    pub fn into_unit(self) -> UnitOfWork {
        UnitOfWork {
            positions: self.positions,
            transactions: self.transactions,
            streams: Vec::new(),
        }
    }
}
