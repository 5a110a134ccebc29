//! Infrastructure layer: persistence boundary, ledger service, order engines,
//! configuration.
//!
//! Domain crates decide; this crate loads state, stages ledger postings, commits
//! them together with order events, retries conflicts and publishes.

pub mod adjustment;
pub mod command_dispatcher;
pub mod config;
pub mod error;
pub mod ledger;
pub mod purchase_order_engine;
pub mod reorder;
pub mod retry;
pub mod services;
pub mod store;
pub mod transfer_engine;

pub use adjustment::{
    AdjustmentMode, AdjustmentOutcome, AdjustmentReason, AdjustmentRequest, AdjustmentService,
    LinkedTransfer,
};
pub use command_dispatcher::{CommandDispatcher, Dispatched};
pub use config::LedgerConfig;
pub use error::{ServiceError, ServiceResult};
pub use ledger::{Ledger, LedgerBatch, PostOutcome, StagedWork};
pub use purchase_order_engine::{NewPurchaseOrder, PurchaseOrderEngine, ReceiptOutcome};
pub use reorder::ReorderService;
pub use retry::{BackoffStrategy, RetryPolicy};
pub use services::{InMemoryBus, InMemoryServices, StockServices};
pub use store::{InMemoryInventoryStore, InventoryStore, ProductRecord, StoreError};
pub use transfer_engine::{NewTransfer, NewTransferItem, TransferEngine};

#[cfg(test)]
mod integration_tests;
