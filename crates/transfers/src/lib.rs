//! Transfers domain module (stock movement between locations, event-sourced).
//!
//! The `Transfer` aggregate owns the workflow state machine. It never touches
//! quantities: the infrastructure layer turns its transitions into ledger postings.

pub mod transfer;

pub use transfer::{
    ApproveTransfer, CancelTransfer, CreateTransfer, DispatchTransfer, ReceiveTransfer,
    ReceivedLine, SubmitTransfer, Transfer, TransferApproved, TransferCancelled, TransferCommand,
    TransferCreated, TransferDispatched, TransferEvent, TransferItem, TransferLine,
    TransferPriority, TransferReceived, TransferStatus, TransferSubmitted,
};
