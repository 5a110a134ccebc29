use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{
    Aggregate, AggregateRoot, DomainError, LocationId, ProductId, PurchaseOrderId, ReceiptId,
    SupplierId, UserId,
};
use stockledger_events::Event;

const ENTITY: &str = "purchase order";

/// Tax rates are expressed in basis points (1/100 of a percent).
const BASIS_POINTS: u64 = 10_000;

/// Purchase order status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PurchaseOrderStatus {
    Draft,
    Submitted,
    Ordered,
    PartiallyReceived,
    Received,
    Cancelled,
}

impl PurchaseOrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PurchaseOrderStatus::Received | PurchaseOrderStatus::Cancelled
        )
    }
}

/// Requested line on a new purchase order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderLine {
    pub product_id: ProductId,
    pub ordered_quantity: i64,
    /// Price per unit in the smallest currency unit (e.g. cents).
    pub unit_price: u64,
}

/// Purchase order line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderItem {
    pub line_no: u32,
    pub product_id: ProductId,
    pub ordered_quantity: i64,
    /// Accumulates across receipts; never exceeds `ordered_quantity`.
    pub received_quantity: i64,
    pub unit_price: u64,
}

impl PurchaseOrderItem {
    pub fn remaining(&self) -> i64 {
        self.ordered_quantity - self.received_quantity
    }

    pub fn is_fully_received(&self) -> bool {
        self.received_quantity == self.ordered_quantity
    }

    /// Saturates; orders whose totals would overflow are rejected when lines are added.
    pub fn line_total(&self) -> u64 {
        self.unit_price.saturating_mul(self.ordered_quantity.unsigned_abs())
    }

    fn checked_line_total(&self) -> Option<u64> {
        self.unit_price.checked_mul(self.ordered_quantity.unsigned_abs())
    }
}

/// One line of a goods receipt as requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptLine {
    pub line_no: u32,
    pub quantity: i64,
}

/// One line of a goods receipt as accepted by the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedQuantity {
    pub line_no: u32,
    pub product_id: ProductId,
    pub requested: i64,
    /// `requested` clamped to what was still outstanding.
    pub accepted: i64,
}

/// Aggregate root: PurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseOrder {
    id: PurchaseOrderId,
    supplier_id: Option<SupplierId>,
    warehouse_id: Option<LocationId>,
    status: PurchaseOrderStatus,
    tax_rate_bps: u32,
    created_at: Option<DateTime<Utc>>,
    order_date: Option<DateTime<Utc>>,
    expected_delivery_date: Option<DateTime<Utc>>,
    notes: Option<String>,
    cancellation_reason: Option<String>,
    items: Vec<PurchaseOrderItem>,
    receipts: HashSet<ReceiptId>,
    version: u64,
    created: bool,
}

impl PurchaseOrder {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: PurchaseOrderId) -> Self {
        Self {
            id,
            supplier_id: None,
            warehouse_id: None,
            status: PurchaseOrderStatus::Draft,
            tax_rate_bps: 0,
            created_at: None,
            order_date: None,
            expected_delivery_date: None,
            notes: None,
            cancellation_reason: None,
            items: Vec::new(),
            receipts: HashSet::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PurchaseOrderId {
        self.id
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn supplier_id(&self) -> Option<SupplierId> {
        self.supplier_id
    }

    pub fn warehouse_id(&self) -> Option<LocationId> {
        self.warehouse_id
    }

    pub fn status(&self) -> PurchaseOrderStatus {
        self.status
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn order_date(&self) -> Option<DateTime<Utc>> {
        self.order_date
    }

    pub fn expected_delivery_date(&self) -> Option<DateTime<Utc>> {
        self.expected_delivery_date
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn cancellation_reason(&self) -> Option<&str> {
        self.cancellation_reason.as_deref()
    }

    pub fn items(&self) -> &[PurchaseOrderItem] {
        &self.items
    }

    pub fn item(&self, line_no: u32) -> Option<&PurchaseOrderItem> {
        self.items.iter().find(|i| i.line_no == line_no)
    }

    /// Whether a receipt with this idempotency key has already been applied.
    pub fn has_receipt(&self, receipt_id: ReceiptId) -> bool {
        self.receipts.contains(&receipt_id)
    }

    pub fn tax_rate_bps(&self) -> u32 {
        self.tax_rate_bps
    }

    pub fn subtotal(&self) -> u64 {
        self.items
            .iter()
            .map(PurchaseOrderItem::line_total)
            .fold(0, u64::saturating_add)
    }

    /// Tax on the subtotal, rounded half up to the smallest currency unit.
    pub fn tax(&self) -> u64 {
        tax_on(self.subtotal(), self.tax_rate_bps)
    }

    pub fn total(&self) -> u64 {
        self.subtotal().saturating_add(self.tax())
    }
}

impl AggregateRoot for PurchaseOrder {
    type Id = PurchaseOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreatePurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePurchaseOrder {
    pub order_id: PurchaseOrderId,
    pub supplier_id: SupplierId,
    pub warehouse_id: LocationId,
    pub lines: Vec<PurchaseOrderLine>,
    pub tax_rate_bps: u32,
    pub expected_delivery_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddLine (only allowed in Draft).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLine {
    pub order_id: PurchaseOrderId,
    pub line: PurchaseOrderLine,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SubmitPurchaseOrder (Draft → Submitted).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitPurchaseOrder {
    pub order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkOrdered (Submitted → Ordered), i.e. sent to the supplier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkOrdered {
    pub order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReceiveGoods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveGoods {
    pub order_id: PurchaseOrderId,
    pub receipt_id: ReceiptId,
    pub lines: Vec<ReceiptLine>,
    pub received_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelPurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelPurchaseOrder {
    pub order_id: PurchaseOrderId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderCommand {
    CreatePurchaseOrder(CreatePurchaseOrder),
    AddLine(AddLine),
    Submit(SubmitPurchaseOrder),
    MarkOrdered(MarkOrdered),
    ReceiveGoods(ReceiveGoods),
    Cancel(CancelPurchaseOrder),
}

/// Event: PurchaseOrderCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderCreated {
    pub order_id: PurchaseOrderId,
    pub supplier_id: SupplierId,
    pub warehouse_id: LocationId,
    pub items: Vec<PurchaseOrderItem>,
    pub tax_rate_bps: u32,
    pub expected_delivery_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseOrderLineAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderLineAdded {
    pub order_id: PurchaseOrderId,
    pub item: PurchaseOrderItem,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseOrderSubmitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderSubmitted {
    pub order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseOrderOrdered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderOrdered {
    pub order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: GoodsReceived.
///
/// Carries the accepted quantity per line; the infrastructure layer posts exactly
/// these quantities to the ledger at the order's warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoodsReceived {
    pub order_id: PurchaseOrderId,
    pub receipt_id: ReceiptId,
    pub warehouse_id: LocationId,
    pub lines: Vec<ReceivedQuantity>,
    pub status: PurchaseOrderStatus,
    pub received_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseOrderCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderCancelled {
    pub order_id: PurchaseOrderId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderEvent {
    PurchaseOrderCreated(PurchaseOrderCreated),
    PurchaseOrderLineAdded(PurchaseOrderLineAdded),
    PurchaseOrderSubmitted(PurchaseOrderSubmitted),
    PurchaseOrderOrdered(PurchaseOrderOrdered),
    GoodsReceived(GoodsReceived),
    PurchaseOrderCancelled(PurchaseOrderCancelled),
}

impl Event for PurchaseOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PurchaseOrderEvent::PurchaseOrderCreated(_) => "purchasing.order.created",
            PurchaseOrderEvent::PurchaseOrderLineAdded(_) => "purchasing.order.line_added",
            PurchaseOrderEvent::PurchaseOrderSubmitted(_) => "purchasing.order.submitted",
            PurchaseOrderEvent::PurchaseOrderOrdered(_) => "purchasing.order.ordered",
            PurchaseOrderEvent::GoodsReceived(_) => "purchasing.order.goods_received",
            PurchaseOrderEvent::PurchaseOrderCancelled(_) => "purchasing.order.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PurchaseOrderEvent::PurchaseOrderCreated(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseOrderLineAdded(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseOrderSubmitted(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseOrderOrdered(e) => e.occurred_at,
            PurchaseOrderEvent::GoodsReceived(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseOrderCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PurchaseOrder {
    type Command = PurchaseOrderCommand;
    type Event = PurchaseOrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PurchaseOrderEvent::PurchaseOrderCreated(e) => {
                self.id = e.order_id;
                self.supplier_id = Some(e.supplier_id);
                self.warehouse_id = Some(e.warehouse_id);
                self.items = e.items.clone();
                self.tax_rate_bps = e.tax_rate_bps;
                self.expected_delivery_date = e.expected_delivery_date;
                self.notes = e.notes.clone();
                self.created_at = Some(e.occurred_at);
                self.status = PurchaseOrderStatus::Draft;
                self.created = true;
            }
            PurchaseOrderEvent::PurchaseOrderLineAdded(e) => {
                self.items.push(e.item.clone());
            }
            PurchaseOrderEvent::PurchaseOrderSubmitted(_) => {
                self.status = PurchaseOrderStatus::Submitted;
            }
            PurchaseOrderEvent::PurchaseOrderOrdered(e) => {
                self.order_date = Some(e.occurred_at);
                self.status = PurchaseOrderStatus::Ordered;
            }
            PurchaseOrderEvent::GoodsReceived(e) => {
                for line in &e.lines {
                    if let Some(item) = self.items.iter_mut().find(|i| i.line_no == line.line_no) {
                        item.received_quantity += line.accepted;
                    }
                }
                self.receipts.insert(e.receipt_id);
                self.status = e.status;
            }
            PurchaseOrderEvent::PurchaseOrderCancelled(e) => {
                self.cancellation_reason = e.reason.clone();
                self.status = PurchaseOrderStatus::Cancelled;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PurchaseOrderCommand::CreatePurchaseOrder(cmd) => self.handle_create(cmd),
            PurchaseOrderCommand::AddLine(cmd) => self.handle_add_line(cmd),
            PurchaseOrderCommand::Submit(cmd) => self.handle_submit(cmd),
            PurchaseOrderCommand::MarkOrdered(cmd) => self.handle_mark_ordered(cmd),
            PurchaseOrderCommand::ReceiveGoods(cmd) => self.handle_receive(cmd),
            PurchaseOrderCommand::Cancel(cmd) => self.handle_cancel(cmd),
        }
    }
}

/// Never exceeds `subtotal` while the rate is at most 100%.
fn tax_on(subtotal: u64, tax_rate_bps: u32) -> u64 {
    let scaled = (u128::from(subtotal) * u128::from(tax_rate_bps) + u128::from(BASIS_POINTS / 2))
        / u128::from(BASIS_POINTS);
    u64::try_from(scaled).unwrap_or(u64::MAX)
}

/// Every line total, the subtotal and the taxed total must fit in `u64`.
fn ensure_total_fits<'a>(
    items: impl IntoIterator<Item = &'a PurchaseOrderItem>,
    tax_rate_bps: u32,
) -> Result<(), DomainError> {
    let subtotal = items.into_iter().try_fold(0u64, |acc, item| {
        item.checked_line_total().and_then(|t| acc.checked_add(t))
    });
    match subtotal.and_then(|s| s.checked_add(tax_on(s, tax_rate_bps))) {
        Some(_) => Ok(()),
        None => Err(DomainError::validation(
            "order total exceeds the representable amount",
        )),
    }
}

fn validate_line(line: &PurchaseOrderLine) -> Result<(), DomainError> {
    if line.ordered_quantity <= 0 {
        return Err(DomainError::validation(format!(
            "ordered quantity for product {} must be positive",
            line.product_id
        )));
    }
    Ok(())
}

impl PurchaseOrder {
    fn ensure_order_id(&self, order_id: PurchaseOrderId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != order_id {
            return Err(DomainError::validation("order_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(
        &self,
        cmd: &CreatePurchaseOrder,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::validation("purchase order already exists"));
        }
        if u64::from(cmd.tax_rate_bps) > BASIS_POINTS {
            return Err(DomainError::validation("tax rate cannot exceed 100%"));
        }

        let mut seen = HashSet::new();
        for line in &cmd.lines {
            validate_line(line)?;
            if !seen.insert(line.product_id) {
                return Err(DomainError::validation(format!(
                    "product {} appears more than once",
                    line.product_id
                )));
            }
        }

        let items: Vec<PurchaseOrderItem> = cmd
            .lines
            .iter()
            .zip(1u32..)
            .map(|(line, line_no)| PurchaseOrderItem {
                line_no,
                product_id: line.product_id,
                ordered_quantity: line.ordered_quantity,
                received_quantity: 0,
                unit_price: line.unit_price,
            })
            .collect();
        ensure_total_fits(&items, cmd.tax_rate_bps)?;

        Ok(vec![PurchaseOrderEvent::PurchaseOrderCreated(
            PurchaseOrderCreated {
                order_id: cmd.order_id,
                supplier_id: cmd.supplier_id,
                warehouse_id: cmd.warehouse_id,
                items,
                tax_rate_bps: cmd.tax_rate_bps,
                expected_delivery_date: cmd.expected_delivery_date,
                notes: cmd.notes.clone(),
                created_by: cmd.created_by,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_add_line(&self, cmd: &AddLine) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_order_id(cmd.order_id)?;

        if self.status != PurchaseOrderStatus::Draft {
            return Err(DomainError::validation(
                "cannot modify purchase order once submitted",
            ));
        }
        validate_line(&cmd.line)?;
        if self.items.iter().any(|i| i.product_id == cmd.line.product_id) {
            return Err(DomainError::validation(format!(
                "product {} is already on the order",
                cmd.line.product_id
            )));
        }

        let next_line_no = self.items.iter().map(|i| i.line_no).max().unwrap_or(0) + 1;
        let item = PurchaseOrderItem {
            line_no: next_line_no,
            product_id: cmd.line.product_id,
            ordered_quantity: cmd.line.ordered_quantity,
            received_quantity: 0,
            unit_price: cmd.line.unit_price,
        };
        ensure_total_fits(self.items.iter().chain(std::iter::once(&item)), self.tax_rate_bps)?;

        Ok(vec![PurchaseOrderEvent::PurchaseOrderLineAdded(
            PurchaseOrderLineAdded {
                order_id: cmd.order_id,
                item,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_submit(
        &self,
        cmd: &SubmitPurchaseOrder,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_order_id(cmd.order_id)?;

        if self.status != PurchaseOrderStatus::Draft {
            return Err(DomainError::transition(
                ENTITY,
                self.status,
                PurchaseOrderStatus::Submitted,
            ));
        }
        if self.items.is_empty() {
            return Err(DomainError::validation(
                "cannot submit purchase order without lines",
            ));
        }

        Ok(vec![PurchaseOrderEvent::PurchaseOrderSubmitted(
            PurchaseOrderSubmitted {
                order_id: cmd.order_id,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_mark_ordered(
        &self,
        cmd: &MarkOrdered,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_order_id(cmd.order_id)?;

        if self.status != PurchaseOrderStatus::Submitted {
            return Err(DomainError::transition(
                ENTITY,
                self.status,
                PurchaseOrderStatus::Ordered,
            ));
        }

        Ok(vec![PurchaseOrderEvent::PurchaseOrderOrdered(
            PurchaseOrderOrdered {
                order_id: cmd.order_id,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_receive(
        &self,
        cmd: &ReceiveGoods,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_order_id(cmd.order_id)?;

        // Replayed receipt: already applied, nothing to decide.
        if self.has_receipt(cmd.receipt_id) {
            return Ok(vec![]);
        }

        // A fully received order is still addressed here so that extra quantity
        // surfaces as an over-receipt rather than a state error.
        if !matches!(
            self.status,
            PurchaseOrderStatus::Ordered
                | PurchaseOrderStatus::PartiallyReceived
                | PurchaseOrderStatus::Received
        ) {
            return Err(DomainError::transition(
                ENTITY,
                self.status,
                PurchaseOrderStatus::PartiallyReceived,
            ));
        }

        let warehouse_id = self
            .warehouse_id
            .ok_or_else(|| DomainError::validation("purchase order has no warehouse"))?;

        if cmd.lines.is_empty() {
            return Err(DomainError::validation(
                "receipt must contain at least one line",
            ));
        }

        let mut seen = HashSet::new();
        let mut accepted_lines = Vec::with_capacity(cmd.lines.len());
        for line in &cmd.lines {
            if line.quantity < 0 {
                return Err(DomainError::validation(format!(
                    "received quantity on line {} cannot be negative",
                    line.line_no
                )));
            }
            if !seen.insert(line.line_no) {
                return Err(DomainError::validation(format!(
                    "line {} appears more than once in the receipt",
                    line.line_no
                )));
            }
            let item = self.item(line.line_no).ok_or_else(|| {
                DomainError::validation(format!("purchase order has no line {}", line.line_no))
            })?;

            if line.quantity == 0 {
                continue;
            }

            let remaining = item.remaining();
            if remaining == 0 {
                return Err(DomainError::OverReceipt {
                    line_no: line.line_no,
                    requested: line.quantity,
                    remaining,
                });
            }

            accepted_lines.push(ReceivedQuantity {
                line_no: item.line_no,
                product_id: item.product_id,
                requested: line.quantity,
                accepted: line.quantity.min(remaining),
            });
        }

        if accepted_lines.is_empty() {
            return Err(DomainError::validation("receipt accepts no quantity"));
        }

        let status = self.status_after(&accepted_lines);

        Ok(vec![PurchaseOrderEvent::GoodsReceived(GoodsReceived {
            order_id: cmd.order_id,
            receipt_id: cmd.receipt_id,
            warehouse_id,
            lines: accepted_lines,
            status,
            received_by: cmd.received_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn status_after(&self, accepted: &[ReceivedQuantity]) -> PurchaseOrderStatus {
        let received_after = |item: &PurchaseOrderItem| {
            item.received_quantity
                + accepted
                    .iter()
                    .filter(|l| l.line_no == item.line_no)
                    .map(|l| l.accepted)
                    .sum::<i64>()
        };

        if self
            .items
            .iter()
            .all(|item| received_after(item) == item.ordered_quantity)
        {
            PurchaseOrderStatus::Received
        } else if self.items.iter().any(|item| received_after(item) > 0) {
            PurchaseOrderStatus::PartiallyReceived
        } else {
            self.status
        }
    }

    fn handle_cancel(
        &self,
        cmd: &CancelPurchaseOrder,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_order_id(cmd.order_id)?;

        if self.status.is_terminal() {
            return Err(DomainError::transition(
                ENTITY,
                self.status,
                PurchaseOrderStatus::Cancelled,
            ));
        }

        Ok(vec![PurchaseOrderEvent::PurchaseOrderCancelled(
            PurchaseOrderCancelled {
                order_id: cmd.order_id,
                reason: cmd.reason.clone(),
                occurred_at: cmd.occurred_at,
            },
        )])
    }
}
