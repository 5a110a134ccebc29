//! Transfer Engine: moves stock between two locations.
//!
//! | transition | ledger effect (all items, one unit of work) |
//! |---|---|
//! | create | none |
//! | submit | reserve each item at the source |
//! | approve | none |
//! | dispatch | TRANSFER_OUT at the source, consuming the reservation |
//! | receive | TRANSFER_IN at the destination with target prices |
//! | cancel | release the reservation if one is held |

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use stockledger_core::{DomainError, LocationId, ProductId, TransferId, UserId};
use stockledger_events::{EventBus, EventEnvelope};
use stockledger_inventory::{PositionKey, Posting, PriceUpdate, Reference, TransactionType};
use stockledger_transfers::{
    ApproveTransfer, CancelTransfer, CreateTransfer, DispatchTransfer, ReceiveTransfer,
    ReceivedLine, SubmitTransfer, Transfer, TransferCommand, TransferEvent, TransferLine,
    TransferPriority,
};

use crate::command_dispatcher::CommandDispatcher;
use crate::error::ServiceResult;
use crate::ledger::LedgerBatch;
use crate::store::InventoryStore;

pub const TRANSFER_AGGREGATE: &str = "transfers.transfer";

/// One requested product on a new transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTransferItem {
    pub product_id: ProductId,
    pub quantity: i64,
    /// Defaults to the source cost price.
    pub target_cost_price: Option<u64>,
    /// Defaults to the source retail price.
    pub target_retail_price: Option<u64>,
    pub adjustment_reason: Option<String>,
}

impl NewTransferItem {
    pub fn new(product_id: ProductId, quantity: i64) -> Self {
        Self {
            product_id,
            quantity,
            target_cost_price: None,
            target_retail_price: None,
            adjustment_reason: None,
        }
    }

    pub fn with_target_prices(mut self, cost_price: u64, retail_price: u64) -> Self {
        self.target_cost_price = Some(cost_price);
        self.target_retail_price = Some(retail_price);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTransfer {
    pub source: LocationId,
    pub destination: LocationId,
    pub priority: TransferPriority,
    pub items: Vec<NewTransferItem>,
    pub expected_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub requested_by: UserId,
}

impl NewTransfer {
    pub fn new(
        source: LocationId,
        destination: LocationId,
        items: Vec<NewTransferItem>,
        requested_by: UserId,
    ) -> Self {
        Self {
            source,
            destination,
            priority: TransferPriority::Normal,
            items,
            expected_at: None,
            notes: None,
            requested_by,
        }
    }
}

pub struct TransferEngine<S, B> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
}

impl<S, B> Clone for TransferEngine<S, B> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: Arc::clone(&self.dispatcher),
        }
    }
}

impl<S, B> TransferEngine<S, B>
where
    S: InventoryStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(dispatcher: Arc<CommandDispatcher<S, B>>) -> Self {
        Self { dispatcher }
    }

    /// Create a DRAFT transfer. Stock is not touched.
    ///
    /// Source prices are captured from the source position at creation time.
    pub fn create(&self, request: NewTransfer) -> ServiceResult<Transfer> {
        self.validate_endpoints(&request)?;

        let store = self.dispatcher.ledger().store();
        let mut lines = Vec::with_capacity(request.items.len());
        for item in &request.items {
            let source_position = store.position(PositionKey::new(item.product_id, request.source))?;
            let (cost, retail) = source_position
                .map(|p| (p.cost_price(), p.retail_price()))
                .unwrap_or((0, 0));
            lines.push(TransferLine {
                product_id: item.product_id,
                requested_quantity: item.quantity,
                source_cost_price: cost,
                source_retail_price: retail,
                target_cost_price: item.target_cost_price.unwrap_or(cost),
                target_retail_price: item.target_retail_price.unwrap_or(retail),
                adjustment_reason: item.adjustment_reason.clone(),
            });
        }

        let transfer_id = TransferId::new();
        let command = TransferCommand::Create(CreateTransfer {
            transfer_id,
            source: request.source,
            destination: request.destination,
            priority: request.priority,
            lines,
            expected_at: request.expected_at,
            notes: request.notes,
            requested_by: request.requested_by,
            occurred_at: Utc::now(),
        });

        let transfer = self.run(transfer_id, &command, |_, _, _| Ok(()))?;
        tracing::info!(
            %transfer_id,
            source = %request.source,
            destination = %request.destination,
            items = transfer.items().len(),
            "transfer created"
        );
        Ok(transfer)
    }

    /// DRAFT → PENDING, holding every item at the source.
    ///
    /// If any item is short, fails with one shortage per short item and the
    /// transfer stays DRAFT.
    pub fn submit(&self, transfer_id: TransferId) -> ServiceResult<Transfer> {
        let command = TransferCommand::Submit(SubmitTransfer {
            transfer_id,
            occurred_at: Utc::now(),
        });

        let transfer = self.run(transfer_id, &command, |before, _, batch| {
            let source = endpoint(before.source())?;
            for item in before.items() {
                batch.reserve(PositionKey::new(item.product_id, source), item.requested_quantity)?;
            }
            Ok(())
        })?;

        tracing::info!(%transfer_id, "transfer submitted");
        Ok(transfer)
    }

    /// PENDING → APPROVED.
    pub fn approve(&self, transfer_id: TransferId, approved_by: UserId) -> ServiceResult<Transfer> {
        let command = TransferCommand::Approve(ApproveTransfer {
            transfer_id,
            approved_by,
            occurred_at: Utc::now(),
        });

        let transfer = self.run(transfer_id, &command, |_, _, _| Ok(()))?;
        tracing::info!(%transfer_id, %approved_by, "transfer approved");
        Ok(transfer)
    }

    /// PENDING/APPROVED → IN_TRANSIT. Each item's stock leaves the source and its
    /// hold is consumed in the same posting.
    pub fn dispatch(&self, transfer_id: TransferId, actor: UserId) -> ServiceResult<Transfer> {
        let command = TransferCommand::Dispatch(DispatchTransfer {
            transfer_id,
            occurred_at: Utc::now(),
        });

        let transfer = self.run(transfer_id, &command, |before, _, batch| {
            let source = endpoint(before.source())?;
            for item in before.items() {
                let posting = Posting::new(
                    PositionKey::new(item.product_id, source),
                    TransactionType::TransferOut,
                    -item.requested_quantity,
                    actor,
                )
                .with_reference(Reference::transfer(transfer_id))
                .consuming_reservation(item.requested_quantity);
                batch.post(&posting)?;
            }
            Ok(())
        })?;

        tracing::info!(%transfer_id, "transfer dispatched");
        Ok(transfer)
    }

    /// IN_TRANSIT → RECEIVED. Quantities above the requested amount are capped;
    /// shortfalls are not posted.
    pub fn receive(
        &self,
        transfer_id: TransferId,
        lines: Vec<ReceivedLine>,
        actor: UserId,
    ) -> ServiceResult<Transfer> {
        let command = TransferCommand::Receive(ReceiveTransfer {
            transfer_id,
            lines,
            occurred_at: Utc::now(),
        });

        let transfer = self.run(transfer_id, &command, |before, events, batch| {
            let destination = endpoint(before.destination())?;
            for event in events {
                let TransferEvent::Received(received) = event else {
                    continue;
                };
                for line in received.lines.iter().filter(|l| l.quantity > 0) {
                    let item = before.item(line.line_no).ok_or_else(|| {
                        DomainError::validation(format!("transfer has no line {}", line.line_no))
                    })?;
                    let posting = Posting::new(
                        PositionKey::new(item.product_id, destination),
                        TransactionType::TransferIn,
                        line.quantity,
                        actor,
                    )
                    .with_reference(Reference::transfer(transfer_id))
                    .with_prices(PriceUpdate {
                        cost_price: Some(item.target_cost_price),
                        retail_price: Some(item.target_retail_price),
                    });
                    batch.post(&posting)?;
                }
            }
            Ok(())
        })?;

        tracing::info!(%transfer_id, "transfer received");
        Ok(transfer)
    }

    /// Cancel from DRAFT, PENDING or APPROVED, releasing any hold.
    pub fn cancel(&self, transfer_id: TransferId, reason: Option<String>) -> ServiceResult<Transfer> {
        let command = TransferCommand::Cancel(CancelTransfer {
            transfer_id,
            reason,
            occurred_at: Utc::now(),
        });

        let transfer = self.run(transfer_id, &command, |before, _, batch| {
            if !before.status().holds_reservation() {
                return Ok(());
            }
            let source = endpoint(before.source())?;
            for item in before.items() {
                batch.release(PositionKey::new(item.product_id, source), item.requested_quantity)?;
            }
            Ok(())
        })?;

        tracing::info!(%transfer_id, "transfer cancelled");
        Ok(transfer)
    }

    pub fn get(&self, transfer_id: TransferId) -> ServiceResult<Transfer> {
        let transfer = self
            .dispatcher
            .load(*transfer_id.as_uuid(), Transfer::empty(transfer_id))?;
        if !transfer.exists() {
            return Err(DomainError::not_found().into());
        }
        Ok(transfer)
    }

    fn run(
        &self,
        transfer_id: TransferId,
        command: &TransferCommand,
        stage: impl FnMut(&Transfer, &[TransferEvent], &mut LedgerBatch<'_, S>) -> ServiceResult<()>,
    ) -> ServiceResult<Transfer> {
        let dispatched = self.dispatcher.dispatch(
            *transfer_id.as_uuid(),
            TRANSFER_AGGREGATE,
            command,
            || Transfer::empty(transfer_id),
            stage,
        )?;
        Ok(dispatched.aggregate)
    }

    fn validate_endpoints(&self, request: &NewTransfer) -> ServiceResult<()> {
        // Same-endpoint and empty requests are the aggregate's call.
        let Some(first) = request.items.first() else {
            return Ok(());
        };
        if request.source == request.destination {
            return Ok(());
        }

        let store = self.dispatcher.ledger().store();
        for location_id in [request.source, request.destination] {
            match store.location(location_id)? {
                None => {
                    return Err(DomainError::UnknownLocationOrProduct {
                        location: location_id,
                        product: first.product_id,
                    }
                    .into());
                }
                Some(location) if !location.is_active() => {
                    return Err(DomainError::invalid_transfer(format!(
                        "location {location_id} is inactive"
                    ))
                    .into());
                }
                Some(_) => {}
            }
        }

        for item in &request.items {
            if store.product(item.product_id)?.is_none() {
                return Err(DomainError::UnknownLocationOrProduct {
                    location: request.source,
                    product: item.product_id,
                }
                .into());
            }
        }
        Ok(())
    }
}

fn endpoint(location: Option<LocationId>) -> Result<LocationId, DomainError> {
    location.ok_or_else(|| DomainError::validation("transfer has no endpoint"))
}
