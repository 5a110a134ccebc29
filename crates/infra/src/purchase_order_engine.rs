//! Purchase Order Engine: orders stock from suppliers and receives it.
//!
//! Only receiving touches the ledger. Each receipt carries a caller-chosen
//! `ReceiptId`; the order remembers every receipt it has applied, so a retried
//! request is recognised and posts nothing.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use stockledger_core::{
    DomainError, LocationId, PurchaseOrderId, ReceiptId, SupplierId, UserId,
};
use stockledger_events::{EventBus, EventEnvelope};
use stockledger_inventory::{
    PositionKey, Posting, PriceUpdate, Reference, StockTransaction, TransactionType,
};
use stockledger_planning::SupplierGroup;
use stockledger_purchasing::{
    AddLine, CancelPurchaseOrder, CreatePurchaseOrder, MarkOrdered, PurchaseOrder,
    PurchaseOrderCommand, PurchaseOrderEvent, PurchaseOrderLine, ReceiptLine, ReceiveGoods,
    ReceivedQuantity, SubmitPurchaseOrder,
};

use crate::command_dispatcher::CommandDispatcher;
use crate::error::ServiceResult;
use crate::ledger::LedgerBatch;
use crate::store::InventoryStore;

pub const PURCHASE_ORDER_AGGREGATE: &str = "purchasing.order";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPurchaseOrder {
    pub supplier_id: SupplierId,
    pub warehouse_id: LocationId,
    pub lines: Vec<PurchaseOrderLine>,
    pub tax_rate_bps: u32,
    pub expected_delivery_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_by: UserId,
}

/// Result of a receive call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptOutcome {
    pub order: PurchaseOrder,
    /// The receipt had already been applied; nothing was posted this time.
    pub replayed: bool,
    /// Quantity accepted per line (empty on replay).
    pub accepted: Vec<ReceivedQuantity>,
    pub transactions: Vec<StockTransaction>,
}

pub struct PurchaseOrderEngine<S, B> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
}

impl<S, B> Clone for PurchaseOrderEngine<S, B> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: Arc::clone(&self.dispatcher),
        }
    }
}

impl<S, B> PurchaseOrderEngine<S, B>
where
    S: InventoryStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(dispatcher: Arc<CommandDispatcher<S, B>>) -> Self {
        Self { dispatcher }
    }

    /// Create a DRAFT order for delivery into an active warehouse.
    pub fn create(&self, request: NewPurchaseOrder) -> ServiceResult<PurchaseOrder> {
        self.validate_target(&request)?;

        let order_id = PurchaseOrderId::new();
        let command = PurchaseOrderCommand::CreatePurchaseOrder(CreatePurchaseOrder {
            order_id,
            supplier_id: request.supplier_id,
            warehouse_id: request.warehouse_id,
            lines: request.lines,
            tax_rate_bps: request.tax_rate_bps,
            expected_delivery_date: request.expected_delivery_date,
            notes: request.notes,
            created_by: request.created_by,
            occurred_at: Utc::now(),
        });

        let order = self.run(order_id, &command, no_ledger)?;
        tracing::info!(
            %order_id,
            supplier_id = %request.supplier_id,
            warehouse_id = %request.warehouse_id,
            total = order.total(),
            "purchase order created"
        );
        Ok(order)
    }

    /// Add a line while the order is still DRAFT.
    pub fn add_line(
        &self,
        order_id: PurchaseOrderId,
        line: PurchaseOrderLine,
    ) -> ServiceResult<PurchaseOrder> {
        if self.dispatcher.ledger().store().product(line.product_id)?.is_none() {
            let order = self.get(order_id)?;
            return Err(DomainError::UnknownLocationOrProduct {
                location: order
                    .warehouse_id()
                    .ok_or_else(|| DomainError::validation("purchase order has no warehouse"))?,
                product: line.product_id,
            }
            .into());
        }

        let command = PurchaseOrderCommand::AddLine(AddLine {
            order_id,
            line,
            occurred_at: Utc::now(),
        });
        self.run(order_id, &command, no_ledger)
    }

    /// DRAFT → SUBMITTED.
    pub fn submit(&self, order_id: PurchaseOrderId) -> ServiceResult<PurchaseOrder> {
        let command = PurchaseOrderCommand::Submit(SubmitPurchaseOrder {
            order_id,
            occurred_at: Utc::now(),
        });
        let order = self.run(order_id, &command, no_ledger)?;
        tracing::info!(%order_id, "purchase order submitted");
        Ok(order)
    }

    /// SUBMITTED → ORDERED (sent to the supplier).
    pub fn order(&self, order_id: PurchaseOrderId) -> ServiceResult<PurchaseOrder> {
        let command = PurchaseOrderCommand::MarkOrdered(MarkOrdered {
            order_id,
            occurred_at: Utc::now(),
        });
        let order = self.run(order_id, &command, no_ledger)?;
        tracing::info!(%order_id, "purchase order placed");
        Ok(order)
    }

    /// Receive goods against the order, posting PURCHASE at its warehouse.
    pub fn receive(
        &self,
        order_id: PurchaseOrderId,
        receipt_id: ReceiptId,
        lines: Vec<ReceiptLine>,
        received_by: UserId,
    ) -> ServiceResult<ReceiptOutcome> {
        let command = PurchaseOrderCommand::ReceiveGoods(ReceiveGoods {
            order_id,
            receipt_id,
            lines,
            received_by,
            occurred_at: Utc::now(),
        });

        let mut accepted: Vec<ReceivedQuantity> = Vec::new();
        let dispatched = self.dispatcher.dispatch(
            *order_id.as_uuid(),
            PURCHASE_ORDER_AGGREGATE,
            &command,
            || PurchaseOrder::empty(order_id),
            |before, events, batch| {
                accepted = events
                    .iter()
                    .filter_map(|e| match e {
                        PurchaseOrderEvent::GoodsReceived(r) => Some(r.lines.clone()),
                        _ => None,
                    })
                    .flatten()
                    .collect();
                post_receipts(before, events, batch, order_id, received_by)
            },
        )?;

        // An empty decision means the receipt id was already applied.
        let replayed = dispatched.events.is_empty();

        if replayed {
            // A conflicted attempt may have staged lines before the retry saw the replay.
            accepted.clear();
            tracing::info!(%order_id, %receipt_id, "receipt already applied; nothing posted");
        } else {
            tracing::info!(
                %order_id,
                %receipt_id,
                status = ?dispatched.aggregate.status(),
                lines = accepted.len(),
                "goods received"
            );
        }

        Ok(ReceiptOutcome {
            order: dispatched.aggregate,
            replayed,
            accepted,
            transactions: dispatched.transactions,
        })
    }

    /// Cancel unless already RECEIVED or CANCELLED. Nothing is reversed.
    pub fn cancel(
        &self,
        order_id: PurchaseOrderId,
        reason: Option<String>,
    ) -> ServiceResult<PurchaseOrder> {
        let command = PurchaseOrderCommand::Cancel(CancelPurchaseOrder {
            order_id,
            reason,
            occurred_at: Utc::now(),
        });
        let order = self.run(order_id, &command, no_ledger)?;
        tracing::info!(%order_id, "purchase order cancelled");
        Ok(order)
    }

    pub fn get(&self, order_id: PurchaseOrderId) -> ServiceResult<PurchaseOrder> {
        let order = self
            .dispatcher
            .load(*order_id.as_uuid(), PurchaseOrder::empty(order_id))?;
        if !order.exists() {
            return Err(DomainError::not_found().into());
        }
        Ok(order)
    }

    /// Turn one supplier group from the reorder planner into a DRAFT order.
    ///
    /// Lines are priced from the position cost price; zero-quantity suggestions
    /// are skipped.
    pub fn create_from_suggestions(
        &self,
        group: &SupplierGroup,
        warehouse_id: LocationId,
        tax_rate_bps: u32,
        created_by: UserId,
    ) -> ServiceResult<PurchaseOrder> {
        let supplier_id = group.supplier_id.ok_or_else(|| {
            DomainError::validation("suggestions without a supplier cannot be ordered")
        })?;

        let lines: Vec<PurchaseOrderLine> = group
            .suggestions
            .iter()
            .filter(|s| s.suggested_quantity > 0)
            .map(|s| PurchaseOrderLine {
                product_id: s.product_id,
                ordered_quantity: s.suggested_quantity,
                unit_price: s.unit_cost,
            })
            .collect();
        if lines.is_empty() {
            return Err(DomainError::validation("no suggestion has a quantity to order").into());
        }

        self.create(NewPurchaseOrder {
            supplier_id,
            warehouse_id,
            lines,
            tax_rate_bps,
            expected_delivery_date: None,
            notes: Some("generated from reorder suggestions".to_string()),
            created_by,
        })
    }

    fn run(
        &self,
        order_id: PurchaseOrderId,
        command: &PurchaseOrderCommand,
        stage: impl FnMut(&PurchaseOrder, &[PurchaseOrderEvent], &mut LedgerBatch<'_, S>) -> ServiceResult<()>,
    ) -> ServiceResult<PurchaseOrder> {
        let dispatched = self.dispatcher.dispatch(
            *order_id.as_uuid(),
            PURCHASE_ORDER_AGGREGATE,
            command,
            || PurchaseOrder::empty(order_id),
            stage,
        )?;
        Ok(dispatched.aggregate)
    }

    fn validate_target(&self, request: &NewPurchaseOrder) -> ServiceResult<()> {
        let store = self.dispatcher.ledger().store();
        let first_product = request.lines.first().map(|l| l.product_id);

        match store.location(request.warehouse_id)? {
            None => {
                return Err(match first_product {
                    Some(product) => DomainError::UnknownLocationOrProduct {
                        location: request.warehouse_id,
                        product,
                    },
                    None => DomainError::validation(format!(
                        "unknown warehouse {}",
                        request.warehouse_id
                    )),
                }
                .into());
            }
            Some(location) if !location.is_warehouse() => {
                return Err(DomainError::validation(format!(
                    "purchase orders deliver into a warehouse; {} is a store",
                    request.warehouse_id
                ))
                .into());
            }
            Some(location) if !location.is_active() => {
                return Err(DomainError::validation(format!(
                    "warehouse {} is inactive",
                    request.warehouse_id
                ))
                .into());
            }
            Some(_) => {}
        }

        for line in &request.lines {
            if store.product(line.product_id)?.is_none() {
                return Err(DomainError::UnknownLocationOrProduct {
                    location: request.warehouse_id,
                    product: line.product_id,
                }
                .into());
            }
        }
        Ok(())
    }
}

fn no_ledger<S>(
    _: &PurchaseOrder,
    _: &[PurchaseOrderEvent],
    _: &mut LedgerBatch<'_, S>,
) -> ServiceResult<()> {
    Ok(())
}

fn post_receipts<S: InventoryStore>(
    before: &PurchaseOrder,
    events: &[PurchaseOrderEvent],
    batch: &mut LedgerBatch<'_, S>,
    order_id: PurchaseOrderId,
    received_by: UserId,
) -> ServiceResult<()> {
    for event in events {
        let PurchaseOrderEvent::GoodsReceived(received) = event else {
            continue;
        };
        for line in received.lines.iter().filter(|l| l.accepted > 0) {
            let unit_price = before
                .item(line.line_no)
                .map(|i| i.unit_price)
                .ok_or_else(|| DomainError::validation(format!("purchase order has no line {}", line.line_no)))?;
            let posting = Posting::new(
                PositionKey::new(line.product_id, received.warehouse_id),
                TransactionType::Purchase,
                line.accepted,
                received_by,
            )
            .with_reference(Reference::purchase_order(order_id))
            .with_prices(PriceUpdate {
                cost_price: Some(unit_price),
                retail_price: None,
            });
            batch.post(&posting)?;
        }
    }
    Ok(())
}
