//! Adjustment Service: direct stock corrections through the ledger.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use stockledger_core::{DomainError, LocationId, ProductId, UserId};
use stockledger_events::{EventBus, EventEnvelope};
use stockledger_inventory::{
    InventoryPosition, PositionKey, Posting, StockTransaction, TransactionType,
};
use stockledger_transfers::{Transfer, TransferPriority};

use crate::command_dispatcher::CommandDispatcher;
use crate::error::{ServiceError, ServiceResult};
use crate::store::InventoryStore;
use crate::transfer_engine::{NewTransfer, NewTransferItem, TransferEngine};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdjustmentMode {
    Add(i64),
    Remove(i64),
    /// Stock count: the on-hand quantity becomes exactly this.
    SetExact(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdjustmentReason {
    StockCount,
    Damage,
    Expiry,
    Return,
    Correction,
}

impl AdjustmentReason {
    pub fn transaction_type(self) -> TransactionType {
        match self {
            AdjustmentReason::Damage => TransactionType::Damage,
            AdjustmentReason::Expiry => TransactionType::Expiry,
            AdjustmentReason::Return => TransactionType::Return,
            AdjustmentReason::StockCount | AdjustmentReason::Correction => {
                TransactionType::Adjustment
            }
        }
    }

    fn label(self) -> &'static str {
        match self {
            AdjustmentReason::StockCount => "stock count",
            AdjustmentReason::Damage => "damage",
            AdjustmentReason::Expiry => "expiry",
            AdjustmentReason::Return => "return",
            AdjustmentReason::Correction => "correction",
        }
    }
}

/// Follow-up transfer to draft once the adjustment has been posted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedTransfer {
    pub destination: LocationId,
    pub priority: TransferPriority,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentRequest {
    pub location_id: LocationId,
    pub product_id: ProductId,
    pub mode: AdjustmentMode,
    pub reason: AdjustmentReason,
    pub actor: UserId,
    pub note: Option<String>,
    pub linked_transfer: Option<LinkedTransfer>,
}

impl AdjustmentRequest {
    pub fn new(
        location_id: LocationId,
        product_id: ProductId,
        mode: AdjustmentMode,
        reason: AdjustmentReason,
        actor: UserId,
    ) -> Self {
        Self {
            location_id,
            product_id,
            mode,
            reason,
            actor,
            note: None,
            linked_transfer: None,
        }
    }

    pub fn with_linked_transfer(mut self, destination: LocationId, priority: TransferPriority) -> Self {
        self.linked_transfer = Some(LinkedTransfer {
            destination,
            priority,
        });
        self
    }
}

/// A posted adjustment, plus the separate result of the linked transfer if one
/// was requested. A failed transfer never means the adjustment failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjustmentOutcome {
    pub position: InventoryPosition,
    pub transaction: StockTransaction,
    pub linked_transfer: Option<Result<Transfer, ServiceError>>,
}

pub struct AdjustmentService<S, B> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
    transfers: TransferEngine<S, B>,
}

impl<S, B> AdjustmentService<S, B>
where
    S: InventoryStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(dispatcher: Arc<CommandDispatcher<S, B>>) -> Self {
        let transfers = TransferEngine::new(Arc::clone(&dispatcher));
        Self {
            dispatcher,
            transfers,
        }
    }

    pub fn adjust(&self, request: AdjustmentRequest) -> ServiceResult<AdjustmentOutcome> {
        let key = PositionKey::new(request.product_id, request.location_id);
        let posting = self.posting_for(&request, key)?;

        let outcome = self.dispatcher.ledger().post(posting)?;
        tracing::info!(
            product_id = %key.product_id,
            location_id = %key.location_id,
            reason = request.reason.label(),
            delta = outcome.transaction.delta,
            balance = outcome.position.quantity_on_hand(),
            "stock adjusted"
        );

        let linked_transfer = request
            .linked_transfer
            .map(|link| self.create_linked_transfer(&request, link, &outcome.transaction));

        Ok(AdjustmentOutcome {
            position: outcome.position,
            transaction: outcome.transaction,
            linked_transfer,
        })
    }

    fn posting_for(&self, request: &AdjustmentRequest, key: PositionKey) -> ServiceResult<Posting> {
        let kind = request.reason.transaction_type();
        let posting = match request.mode {
            AdjustmentMode::Add(quantity) => {
                ensure_positive(quantity)?;
                Posting::new(key, kind, quantity, request.actor)
            }
            AdjustmentMode::Remove(quantity) => {
                ensure_positive(quantity)?;
                // A position holding only thresholds has never been stocked.
                let history = self.dispatcher.ledger().history(key.location_id, key.product_id)?;
                if history.is_empty() {
                    return Err(DomainError::NoExistingInventory {
                        location: key.location_id,
                        product: key.product_id,
                    }
                    .into());
                }
                Posting::new(key, kind, -quantity, request.actor)
            }
            AdjustmentMode::SetExact(quantity) => {
                if kind != TransactionType::Adjustment {
                    return Err(DomainError::validation(format!(
                        "a stock count cannot be recorded as {}",
                        request.reason.label()
                    ))
                    .into());
                }
                Posting::set_exact(key, quantity, request.actor)
            }
        };

        Ok(match &request.note {
            Some(note) => posting.with_note(note.clone()),
            None => posting.with_note(request.reason.label()),
        })
    }

    /// Draft a transfer of the adjusted quantity away from the adjusted location.
    fn create_linked_transfer(
        &self,
        request: &AdjustmentRequest,
        link: LinkedTransfer,
        transaction: &StockTransaction,
    ) -> ServiceResult<Transfer> {
        let mut item = NewTransferItem::new(request.product_id, transaction.delta.saturating_abs());
        item.adjustment_reason = Some(request.reason.label().to_string());

        let mut transfer = NewTransfer::new(
            request.location_id,
            link.destination,
            vec![item],
            request.actor,
        );
        transfer.priority = link.priority;
        transfer.notes = request.note.clone();

        self.transfers.create(transfer).inspect_err(|err| {
            tracing::warn!(
                product_id = %request.product_id,
                location_id = %request.location_id,
                destination = %link.destination,
                error = %err,
                "adjustment posted but linked transfer was not created"
            );
        })
    }
}

fn ensure_positive(quantity: i64) -> Result<(), DomainError> {
    if quantity <= 0 {
        return Err(DomainError::validation("adjustment quantity must be positive"));
    }
    Ok(())
}
