//! Purchasing domain module (Purchase Orders, event-sourced).
//!
//! This crate contains business rules for purchase orders, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage). Receiving decides how
//! much of each line is accepted; the ledger postings for that stock are made by
//! the infrastructure layer in the same unit of work.

pub mod order;

pub use order::{
    AddLine, CancelPurchaseOrder, CreatePurchaseOrder, GoodsReceived, MarkOrdered,
    PurchaseOrder, PurchaseOrderCancelled, PurchaseOrderCommand, PurchaseOrderCreated,
    PurchaseOrderEvent, PurchaseOrderItem, PurchaseOrderLine, PurchaseOrderLineAdded,
    PurchaseOrderOrdered, PurchaseOrderStatus, PurchaseOrderSubmitted, ReceiptLine,
    ReceiveGoods, ReceivedQuantity, SubmitPurchaseOrder,
};
