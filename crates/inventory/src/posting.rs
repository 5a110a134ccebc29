//! Posting rules: the single place quantities change.
//!
//! Every function here takes the current position and returns the next revision
//! (plus, for postings, the transaction that explains it). Nothing is written on
//! failure because nothing is mutated in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, DomainResult, TransactionId, UserId};

use crate::position::{InventoryPosition, PositionKey};
use crate::transaction::{Reference, StockTransaction, TransactionType};

/// How the on-hand quantity should change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuantityChange {
    /// Signed change relative to the current quantity.
    Delta(i64),
    /// Replace the on-hand quantity (stock count). Only valid for adjustments.
    SetExact(i64),
}

/// Prices to stamp on the position as part of a posting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceUpdate {
    pub cost_price: Option<u64>,
    pub retail_price: Option<u64>,
}

/// A request to change one position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub key: PositionKey,
    pub kind: TransactionType,
    pub change: QuantityChange,
    pub actor: UserId,
    pub reference: Option<Reference>,
    pub note: Option<String>,
    /// Reserved quantity released in the same step as the change (dispatch of a hold).
    pub consume_reservation: i64,
    pub prices: Option<PriceUpdate>,
}

impl Posting {
    pub fn new(key: PositionKey, kind: TransactionType, delta: i64, actor: UserId) -> Self {
        Self {
            key,
            kind,
            change: QuantityChange::Delta(delta),
            actor,
            reference: None,
            note: None,
            consume_reservation: 0,
            prices: None,
        }
    }

    /// Stock-count adjustment that sets the on-hand quantity outright.
    pub fn set_exact(key: PositionKey, quantity: i64, actor: UserId) -> Self {
        Self {
            change: QuantityChange::SetExact(quantity),
            ..Self::new(key, TransactionType::Adjustment, 0, actor)
        }
    }

    pub fn with_reference(mut self, reference: Reference) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn consuming_reservation(mut self, quantity: i64) -> Self {
        self.consume_reservation = quantity;
        self
    }

    pub fn with_prices(mut self, prices: PriceUpdate) -> Self {
        self.prices = Some(prices);
        self
    }
}

/// Apply `posting` to `current`, producing the next position and its transaction.
///
/// Fails with `InsufficientStock` if on-hand would go negative or drop below the
/// quantity still held for other reservations. A `SetExact` count bypasses that
/// check: it computes its own delta and, if the count lands below the reserved
/// quantity, shrinks the reservation to the counted stock.
pub fn apply_posting(
    current: &InventoryPosition,
    posting: &Posting,
    transaction_id: TransactionId,
    now: DateTime<Utc>,
) -> DomainResult<(InventoryPosition, StockTransaction)> {
    if current.key() != posting.key {
        return Err(DomainError::validation("posting key does not match position"));
    }
    if posting.consume_reservation < 0 {
        return Err(DomainError::validation(
            "consumed reservation cannot be negative",
        ));
    }

    let on_hand = current.quantity_on_hand();
    let released = posting.consume_reservation.min(current.quantity_reserved());
    let still_reserved = current.quantity_reserved() - released;

    let (delta, new_on_hand, new_reserved) = match posting.change {
        QuantityChange::SetExact(target) => {
            if posting.kind != TransactionType::Adjustment {
                return Err(DomainError::validation(
                    "set-exact is only valid for adjustments",
                ));
            }
            if target < 0 {
                return Err(DomainError::validation("counted quantity cannot be negative"));
            }
            (target - on_hand, target, still_reserved.min(target))
        }
        QuantityChange::Delta(delta) => {
            posting.kind.validate_delta(delta)?;
            let new_on_hand = on_hand
                .checked_add(delta)
                .ok_or_else(|| DomainError::validation("quantity overflow"))?;
            if new_on_hand < 0 || new_on_hand < still_reserved {
                return Err(DomainError::shortage(
                    posting.key.location_id,
                    posting.key.product_id,
                    delta.saturating_neg(),
                    on_hand - still_reserved,
                ));
            }
            (delta, new_on_hand, still_reserved)
        }
    };

    let mut next = current.clone();
    next.set_quantities(new_on_hand, new_reserved);
    if let Some(prices) = posting.prices {
        next.set_prices(prices.cost_price, prices.retail_price);
    }
    next.touch(now);

    let transaction = StockTransaction {
        id: transaction_id,
        product_id: posting.key.product_id,
        location_id: posting.key.location_id,
        kind: posting.kind,
        delta,
        resulting_balance: new_on_hand,
        actor: posting.actor,
        reference: posting.reference,
        note: posting.note.clone(),
        occurred_at: now,
    };

    Ok((next, transaction))
}

/// Hold or un-hold available stock without moving it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationChange {
    Reserve(i64),
    /// Saturates at zero: releasing more than is held releases what is held,
    /// and releasing when nothing is held leaves the position untouched.
    Release(i64),
}

/// Apply a reservation change, keeping `0 <= reserved <= on_hand`.
pub fn apply_reservation(
    current: &InventoryPosition,
    change: ReservationChange,
    now: DateTime<Utc>,
) -> DomainResult<InventoryPosition> {
    let reserved = current.quantity_reserved();
    let new_reserved = match change {
        ReservationChange::Reserve(quantity) => {
            if quantity <= 0 {
                return Err(DomainError::validation("reserved quantity must be positive"));
            }
            if quantity > current.quantity_available() {
                return Err(DomainError::shortage(
                    current.location_id(),
                    current.product_id(),
                    quantity,
                    current.quantity_available(),
                ));
            }
            reserved + quantity
        }
        ReservationChange::Release(quantity) => {
            if quantity <= 0 {
                return Err(DomainError::validation("released quantity must be positive"));
            }
            if reserved == 0 {
                return Ok(current.clone());
            }
            reserved - quantity.min(reserved)
        }
    };

    let mut next = current.clone();
    next.set_quantities(current.quantity_on_hand(), new_reserved);
    next.touch(now);
    Ok(next)
}
