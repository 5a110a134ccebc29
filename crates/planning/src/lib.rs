//! Replenishment planning (read-only).
//!
//! Scans ledger positions against their configured thresholds and proposes
//! order quantities. Nothing here mutates stock; a caller turns suggestions into
//! purchase orders.

pub mod reorder;

pub use reorder::{
    ReorderSuggestion, ScanOptions, SupplierGroup, SupplierLookup, group_by_supplier,
    needs_reorder, scan, suggested_quantity,
};
