use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, DomainResult, LocationId, ProductId};

/// Key of a position: one product at one location.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PositionKey {
    pub product_id: ProductId,
    pub location_id: LocationId,
}

impl PositionKey {
    pub fn new(product_id: ProductId, location_id: LocationId) -> Self {
        Self {
            product_id,
            location_id,
        }
    }
}

impl core::fmt::Display for PositionKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}@{}", self.product_id, self.location_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionStatus {
    Available,
    Reserved,
    InTransit,
    Damaged,
    Expired,
    Quarantined,
}

/// Replenishment thresholds configured per position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderThresholds {
    pub reorder_point: i64,
    pub min_stock_level: i64,
}

impl ReorderThresholds {
    pub fn new(reorder_point: i64, min_stock_level: i64) -> DomainResult<Self> {
        if reorder_point < 0 || min_stock_level < 0 {
            return Err(DomainError::validation("reorder thresholds cannot be negative"));
        }
        Ok(Self {
            reorder_point,
            min_stock_level,
        })
    }
}

/// Current stock state for one (product, location) pair.
///
/// Invariants: `0 <= quantity_reserved <= quantity_on_hand`. Created lazily on the
/// first stock event; never deleted, so zero-quantity positions keep their history.
/// Only the posting rules in this crate produce new values of this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryPosition {
    key: PositionKey,
    quantity_on_hand: i64,
    quantity_reserved: i64,
    /// Prices in the smallest currency unit (e.g. cents).
    cost_price: u64,
    retail_price: u64,
    status: PositionStatus,
    thresholds: ReorderThresholds,
    version: u64,
    updated_at: DateTime<Utc>,
}

impl InventoryPosition {
    /// A position that has never been written (version 0).
    pub fn empty(key: PositionKey, now: DateTime<Utc>) -> Self {
        Self {
            key,
            quantity_on_hand: 0,
            quantity_reserved: 0,
            cost_price: 0,
            retail_price: 0,
            status: PositionStatus::Available,
            thresholds: ReorderThresholds::default(),
            version: 0,
            updated_at: now,
        }
    }

    pub fn key(&self) -> PositionKey {
        self.key
    }

    pub fn product_id(&self) -> ProductId {
        self.key.product_id
    }

    pub fn location_id(&self) -> LocationId {
        self.key.location_id
    }

    pub fn quantity_on_hand(&self) -> i64 {
        self.quantity_on_hand
    }

    pub fn quantity_reserved(&self) -> i64 {
        self.quantity_reserved
    }

    pub fn quantity_available(&self) -> i64 {
        self.quantity_on_hand - self.quantity_reserved
    }

    pub fn cost_price(&self) -> u64 {
        self.cost_price
    }

    pub fn retail_price(&self) -> u64 {
        self.retail_price
    }

    pub fn status(&self) -> PositionStatus {
        self.status
    }

    pub fn thresholds(&self) -> ReorderThresholds {
        self.thresholds
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Whether the position has ever been persisted.
    pub fn exists(&self) -> bool {
        self.version > 0
    }

    /// Next revision with new thresholds. Quantities are untouched.
    pub fn with_thresholds(&self, thresholds: ReorderThresholds, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.thresholds = thresholds;
        next.touch(now);
        next
    }

    pub(crate) fn set_quantities(&mut self, on_hand: i64, reserved: i64) {
        debug_assert!(0 <= reserved && reserved <= on_hand);
        self.quantity_on_hand = on_hand;
        self.quantity_reserved = reserved;

        // Damaged/expired/quarantined stock keeps its status until explicitly reclassified.
        if matches!(self.status, PositionStatus::Available | PositionStatus::Reserved) {
            self.status = if reserved > 0 && reserved == on_hand {
                PositionStatus::Reserved
            } else {
                PositionStatus::Available
            };
        }
    }

    pub(crate) fn set_prices(&mut self, cost_price: Option<u64>, retail_price: Option<u64>) {
        if let Some(cost) = cost_price {
            self.cost_price = cost;
        }
        if let Some(retail) = retail_price {
            self.retail_price = retail;
        }
    }

    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        self.version += 1;
        self.updated_at = now;
    }
}
