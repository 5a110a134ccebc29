//! Stock ledger domain module.
//!
//! Per-location stock positions, the immutable transaction records that explain
//! them, and the pure rules that turn a posting request into both. Implemented
//! as deterministic domain logic (no IO, no storage).

pub mod position;
pub mod posting;
pub mod transaction;

pub use position::{InventoryPosition, PositionKey, PositionStatus, ReorderThresholds};
pub use posting::{
    PriceUpdate, Posting, QuantityChange, ReservationChange, apply_posting, apply_reservation,
};
pub use transaction::{Reference, ReferenceKind, StockTransaction, TransactionType, ledger_balance};
