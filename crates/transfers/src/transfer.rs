use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{
    Aggregate, AggregateRoot, DomainError, LocationId, ProductId, TransferId, UserId,
};
use stockledger_events::Event;

const ENTITY: &str = "transfer";

/// Transfer status lifecycle.
///
/// `Draft → Pending → Approved → InTransit → Received`, or `Cancelled` from any
/// state before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    Draft,
    Pending,
    Approved,
    InTransit,
    Received,
    Cancelled,
}

impl TransferStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransferStatus::Received | TransferStatus::Cancelled)
    }

    /// States in which the source location holds a reservation for the items.
    pub fn holds_reservation(self) -> bool {
        matches!(self, TransferStatus::Pending | TransferStatus::Approved)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferPriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

/// Requested line on a new transfer.
///
/// Target prices are independent of source prices so a store can reprice on arrival.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferLine {
    pub product_id: ProductId,
    pub requested_quantity: i64,
    pub source_cost_price: u64,
    pub source_retail_price: u64,
    pub target_cost_price: u64,
    pub target_retail_price: u64,
    pub adjustment_reason: Option<String>,
}

/// Transfer line item as owned by the aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferItem {
    pub line_no: u32,
    pub product_id: ProductId,
    pub requested_quantity: i64,
    pub source_cost_price: u64,
    pub source_retail_price: u64,
    pub target_cost_price: u64,
    pub target_retail_price: u64,
    pub adjustment_reason: Option<String>,
    /// Always `<= requested_quantity`.
    pub received_quantity: i64,
}

/// Quantity actually received for one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedLine {
    pub line_no: u32,
    pub quantity: i64,
}

/// Aggregate root: Transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    id: TransferId,
    source: Option<LocationId>,
    destination: Option<LocationId>,
    status: TransferStatus,
    priority: TransferPriority,
    requested_at: Option<DateTime<Utc>>,
    expected_at: Option<DateTime<Utc>>,
    notes: Option<String>,
    requested_by: Option<UserId>,
    cancellation_reason: Option<String>,
    items: Vec<TransferItem>,
    version: u64,
    created: bool,
}

impl Transfer {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: TransferId) -> Self {
        Self {
            id,
            source: None,
            destination: None,
            status: TransferStatus::Draft,
            priority: TransferPriority::Normal,
            requested_at: None,
            expected_at: None,
            notes: None,
            requested_by: None,
            cancellation_reason: None,
            items: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> TransferId {
        self.id
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn source(&self) -> Option<LocationId> {
        self.source
    }

    pub fn destination(&self) -> Option<LocationId> {
        self.destination
    }

    pub fn status(&self) -> TransferStatus {
        self.status
    }

    pub fn priority(&self) -> TransferPriority {
        self.priority
    }

    pub fn requested_at(&self) -> Option<DateTime<Utc>> {
        self.requested_at
    }

    pub fn expected_at(&self) -> Option<DateTime<Utc>> {
        self.expected_at
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn requested_by(&self) -> Option<UserId> {
        self.requested_by
    }

    pub fn cancellation_reason(&self) -> Option<&str> {
        self.cancellation_reason.as_deref()
    }

    pub fn items(&self) -> &[TransferItem] {
        &self.items
    }

    pub fn item(&self, line_no: u32) -> Option<&TransferItem> {
        self.items.iter().find(|i| i.line_no == line_no)
    }
}

impl AggregateRoot for Transfer {
    type Id = TransferId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateTransfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTransfer {
    pub transfer_id: TransferId,
    pub source: LocationId,
    pub destination: LocationId,
    pub priority: TransferPriority,
    pub lines: Vec<TransferLine>,
    pub expected_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub requested_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SubmitTransfer (Draft → Pending).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitTransfer {
    pub transfer_id: TransferId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApproveTransfer (Pending → Approved).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveTransfer {
    pub transfer_id: TransferId,
    pub approved_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DispatchTransfer (Pending/Approved → InTransit).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchTransfer {
    pub transfer_id: TransferId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReceiveTransfer (InTransit → Received).
///
/// Lines not mentioned are treated as received with quantity zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveTransfer {
    pub transfer_id: TransferId,
    pub lines: Vec<ReceivedLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelTransfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelTransfer {
    pub transfer_id: TransferId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferCommand {
    Create(CreateTransfer),
    Submit(SubmitTransfer),
    Approve(ApproveTransfer),
    Dispatch(DispatchTransfer),
    Receive(ReceiveTransfer),
    Cancel(CancelTransfer),
}

/// Event: TransferCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferCreated {
    pub transfer_id: TransferId,
    pub source: LocationId,
    pub destination: LocationId,
    pub priority: TransferPriority,
    pub items: Vec<TransferItem>,
    pub expected_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub requested_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TransferSubmitted. Stock is held at the source from here on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSubmitted {
    pub transfer_id: TransferId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TransferApproved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferApproved {
    pub transfer_id: TransferId,
    pub approved_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TransferDispatched. Stock has left the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferDispatched {
    pub transfer_id: TransferId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TransferReceived.
///
/// Carries one entry per item with the accepted quantity, already capped at the
/// requested quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceived {
    pub transfer_id: TransferId,
    pub lines: Vec<ReceivedLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TransferCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferCancelled {
    pub transfer_id: TransferId,
    /// Status at the moment of cancellation; tells consumers whether a hold was released.
    pub previous_status: TransferStatus,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferEvent {
    Created(TransferCreated),
    Submitted(TransferSubmitted),
    Approved(TransferApproved),
    Dispatched(TransferDispatched),
    Received(TransferReceived),
    Cancelled(TransferCancelled),
}

impl Event for TransferEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TransferEvent::Created(_) => "transfers.transfer.created",
            TransferEvent::Submitted(_) => "transfers.transfer.submitted",
            TransferEvent::Approved(_) => "transfers.transfer.approved",
            TransferEvent::Dispatched(_) => "transfers.transfer.dispatched",
            TransferEvent::Received(_) => "transfers.transfer.received",
            TransferEvent::Cancelled(_) => "transfers.transfer.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            TransferEvent::Created(e) => e.occurred_at,
            TransferEvent::Submitted(e) => e.occurred_at,
            TransferEvent::Approved(e) => e.occurred_at,
            TransferEvent::Dispatched(e) => e.occurred_at,
            TransferEvent::Received(e) => e.occurred_at,
            TransferEvent::Cancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Transfer {
    type Command = TransferCommand;
    type Event = TransferEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            TransferEvent::Created(e) => {
                self.id = e.transfer_id;
                self.source = Some(e.source);
                self.destination = Some(e.destination);
                self.priority = e.priority;
                self.items = e.items.clone();
                self.expected_at = e.expected_at;
                self.notes = e.notes.clone();
                self.requested_by = Some(e.requested_by);
                self.requested_at = Some(e.occurred_at);
                self.status = TransferStatus::Draft;
                self.created = true;
            }
            TransferEvent::Submitted(_) => self.status = TransferStatus::Pending,
            TransferEvent::Approved(_) => self.status = TransferStatus::Approved,
            TransferEvent::Dispatched(_) => self.status = TransferStatus::InTransit,
            TransferEvent::Received(e) => {
                for line in &e.lines {
                    if let Some(item) = self.items.iter_mut().find(|i| i.line_no == line.line_no) {
                        item.received_quantity = line.quantity;
                    }
                }
                self.status = TransferStatus::Received;
            }
            TransferEvent::Cancelled(e) => {
                self.cancellation_reason = e.reason.clone();
                self.status = TransferStatus::Cancelled;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            TransferCommand::Create(cmd) => self.handle_create(cmd),
            TransferCommand::Submit(cmd) => self.handle_submit(cmd),
            TransferCommand::Approve(cmd) => self.handle_approve(cmd),
            TransferCommand::Dispatch(cmd) => self.handle_dispatch(cmd),
            TransferCommand::Receive(cmd) => self.handle_receive(cmd),
            TransferCommand::Cancel(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl Transfer {
    fn ensure_target(&self, transfer_id: TransferId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != transfer_id {
            return Err(DomainError::validation("transfer_id mismatch"));
        }
        Ok(())
    }

    fn ensure_status(
        &self,
        allowed: &[TransferStatus],
        target: TransferStatus,
    ) -> Result<(), DomainError> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(DomainError::transition(ENTITY, self.status, target))
        }
    }

    fn handle_create(&self, cmd: &CreateTransfer) -> Result<Vec<TransferEvent>, DomainError> {
        if self.created {
            return Err(DomainError::validation("transfer already exists"));
        }
        if cmd.source == cmd.destination {
            return Err(DomainError::invalid_transfer(
                "source and destination must be different locations",
            ));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::invalid_transfer("transfer must have at least one item"));
        }

        let mut seen = HashSet::new();
        for line in &cmd.lines {
            if line.requested_quantity <= 0 {
                return Err(DomainError::invalid_transfer(format!(
                    "requested quantity for product {} must be positive",
                    line.product_id
                )));
            }
            if !seen.insert(line.product_id) {
                return Err(DomainError::invalid_transfer(format!(
                    "product {} appears more than once",
                    line.product_id
                )));
            }
        }

        let items = cmd
            .lines
            .iter()
            .zip(1u32..)
            .map(|(line, line_no)| TransferItem {
                line_no,
                product_id: line.product_id,
                requested_quantity: line.requested_quantity,
                source_cost_price: line.source_cost_price,
                source_retail_price: line.source_retail_price,
                target_cost_price: line.target_cost_price,
                target_retail_price: line.target_retail_price,
                adjustment_reason: line.adjustment_reason.clone(),
                received_quantity: 0,
            })
            .collect();

        Ok(vec![TransferEvent::Created(TransferCreated {
            transfer_id: cmd.transfer_id,
            source: cmd.source,
            destination: cmd.destination,
            priority: cmd.priority,
            items,
            expected_at: cmd.expected_at,
            notes: cmd.notes.clone(),
            requested_by: cmd.requested_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_submit(&self, cmd: &SubmitTransfer) -> Result<Vec<TransferEvent>, DomainError> {
        self.ensure_target(cmd.transfer_id)?;
        self.ensure_status(&[TransferStatus::Draft], TransferStatus::Pending)?;

        Ok(vec![TransferEvent::Submitted(TransferSubmitted {
            transfer_id: cmd.transfer_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_approve(&self, cmd: &ApproveTransfer) -> Result<Vec<TransferEvent>, DomainError> {
        self.ensure_target(cmd.transfer_id)?;
        self.ensure_status(&[TransferStatus::Pending], TransferStatus::Approved)?;

        Ok(vec![TransferEvent::Approved(TransferApproved {
            transfer_id: cmd.transfer_id,
            approved_by: cmd.approved_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_dispatch(&self, cmd: &DispatchTransfer) -> Result<Vec<TransferEvent>, DomainError> {
        self.ensure_target(cmd.transfer_id)?;
        self.ensure_status(
            &[TransferStatus::Pending, TransferStatus::Approved],
            TransferStatus::InTransit,
        )?;

        Ok(vec![TransferEvent::Dispatched(TransferDispatched {
            transfer_id: cmd.transfer_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_receive(&self, cmd: &ReceiveTransfer) -> Result<Vec<TransferEvent>, DomainError> {
        self.ensure_target(cmd.transfer_id)?;
        self.ensure_status(&[TransferStatus::InTransit], TransferStatus::Received)?;

        let mut seen = HashSet::new();
        for line in &cmd.lines {
            if line.quantity < 0 {
                return Err(DomainError::validation(format!(
                    "received quantity on line {} cannot be negative",
                    line.line_no
                )));
            }
            if self.item(line.line_no).is_none() {
                return Err(DomainError::validation(format!(
                    "transfer has no line {}",
                    line.line_no
                )));
            }
            if !seen.insert(line.line_no) {
                return Err(DomainError::validation(format!(
                    "line {} received more than once",
                    line.line_no
                )));
            }
        }

        // Shortfalls are simply not posted; no backorder is tracked here.
        let lines = self
            .items
            .iter()
            .map(|item| {
                let received = cmd
                    .lines
                    .iter()
                    .find(|l| l.line_no == item.line_no)
                    .map(|l| l.quantity)
                    .unwrap_or(0);
                ReceivedLine {
                    line_no: item.line_no,
                    quantity: received.min(item.requested_quantity),
                }
            })
            .collect();

        Ok(vec![TransferEvent::Received(TransferReceived {
            transfer_id: cmd.transfer_id,
            lines,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelTransfer) -> Result<Vec<TransferEvent>, DomainError> {
        self.ensure_target(cmd.transfer_id)?;
        self.ensure_status(
            &[
                TransferStatus::Draft,
                TransferStatus::Pending,
                TransferStatus::Approved,
            ],
            TransferStatus::Cancelled,
        )?;

        Ok(vec![TransferEvent::Cancelled(TransferCancelled {
            transfer_id: cmd.transfer_id,
            previous_status: self.status,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn line(product_id: ProductId, quantity: i64) -> TransferLine {
        TransferLine {
            product_id,
            requested_quantity: quantity,
            source_cost_price: 100,
            source_retail_price: 200,
            target_cost_price: 100,
            target_retail_price: 250,
            adjustment_reason: None,
        }
    }

    fn create_cmd(id: TransferId, lines: Vec<TransferLine>) -> CreateTransfer {
        CreateTransfer {
            transfer_id: id,
            source: LocationId::new(),
            destination: LocationId::new(),
            priority: TransferPriority::High,
            lines,
            expected_at: None,
            notes: Some("restock front store".to_string()),
            requested_by: UserId::new(),
            occurred_at: test_time(),
        }
    }

    fn run(transfer: &mut Transfer, cmd: TransferCommand) -> Result<(), DomainError> {
        let events = transfer.handle(&cmd)?;
        for e in &events {
            transfer.apply(e);
        }
        Ok(())
    }

    fn draft(quantities: &[i64]) -> Transfer {
        let id = TransferId::new();
        let mut transfer = Transfer::empty(id);
        let lines = quantities.iter().map(|q| line(ProductId::new(), *q)).collect();
        run(&mut transfer, TransferCommand::Create(create_cmd(id, lines))).unwrap();
        transfer
    }

    fn submit(t: &mut Transfer) -> Result<(), DomainError> {
        let transfer_id = t.id_typed();
        run(
            t,
            TransferCommand::Submit(SubmitTransfer {
                transfer_id,
                occurred_at: test_time(),
            }),
        )
    }

    fn dispatch(t: &mut Transfer) -> Result<(), DomainError> {
        let transfer_id = t.id_typed();
        run(
            t,
            TransferCommand::Dispatch(DispatchTransfer {
                transfer_id,
                occurred_at: test_time(),
            }),
        )
    }

    fn receive(t: &mut Transfer, lines: Vec<ReceivedLine>) -> Result<(), DomainError> {
        let transfer_id = t.id_typed();
        run(
            t,
            TransferCommand::Receive(ReceiveTransfer {
                transfer_id,
                lines,
                occurred_at: test_time(),
            }),
        )
    }

    fn cancel(t: &mut Transfer) -> Result<(), DomainError> {
        let transfer_id = t.id_typed();
        run(
            t,
            TransferCommand::Cancel(CancelTransfer {
                transfer_id,
                reason: Some("no longer needed".to_string()),
                occurred_at: test_time(),
            }),
        )
    }

    #[test]
    fn create_numbers_lines_and_starts_in_draft() {
        let transfer = draft(&[5, 7]);
        assert_eq!(transfer.status(), TransferStatus::Draft);
        assert_eq!(transfer.version(), 1);
        let line_nos: Vec<u32> = transfer.items().iter().map(|i| i.line_no).collect();
        assert_eq!(line_nos, vec![1, 2]);
    }

    #[test]
    fn create_rejects_same_source_and_destination() {
        let id = TransferId::new();
        let mut cmd = create_cmd(id, vec![line(ProductId::new(), 1)]);
        cmd.destination = cmd.source;

        let err = Transfer::empty(id)
            .handle(&TransferCommand::Create(cmd))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransfer(_)));
    }

    #[test]
    fn create_rejects_non_positive_quantities_and_duplicates() {
        let id = TransferId::new();
        let cmd = create_cmd(id, vec![line(ProductId::new(), 0)]);
        assert!(matches!(
            Transfer::empty(id).handle(&TransferCommand::Create(cmd)),
            Err(DomainError::InvalidTransfer(_))
        ));

        let product = ProductId::new();
        let cmd = create_cmd(id, vec![line(product, 1), line(product, 2)]);
        assert!(matches!(
            Transfer::empty(id).handle(&TransferCommand::Create(cmd)),
            Err(DomainError::InvalidTransfer(_))
        ));
    }

    #[test]
    fn happy_path_reaches_received_with_capped_quantities() {
        let mut transfer = draft(&[30, 10]);
        submit(&mut transfer).unwrap();
        assert_eq!(transfer.status(), TransferStatus::Pending);
        dispatch(&mut transfer).unwrap();
        assert_eq!(transfer.status(), TransferStatus::InTransit);

        receive(
            &mut transfer,
            vec![
                ReceivedLine {
                    line_no: 1,
                    quantity: 20,
                },
                ReceivedLine {
                    line_no: 2,
                    quantity: 15,
                },
            ],
        )
        .unwrap();

        assert_eq!(transfer.status(), TransferStatus::Received);
        assert_eq!(transfer.items()[0].received_quantity, 20);
        assert_eq!(transfer.items()[1].received_quantity, 10);
    }

    #[test]
    fn unmentioned_lines_are_received_as_zero() {
        let mut transfer = draft(&[3, 4]);
        submit(&mut transfer).unwrap();
        dispatch(&mut transfer).unwrap();
        receive(
            &mut transfer,
            vec![ReceivedLine {
                line_no: 2,
                quantity: 4,
            }],
        )
        .unwrap();
        assert_eq!(transfer.items()[0].received_quantity, 0);
        assert_eq!(transfer.items()[1].received_quantity, 4);
    }

    #[test]
    fn receive_rejects_unknown_lines() {
        let mut transfer = draft(&[3]);
        submit(&mut transfer).unwrap();
        dispatch(&mut transfer).unwrap();
        let err = receive(
            &mut transfer,
            vec![ReceivedLine {
                line_no: 9,
                quantity: 1,
            }],
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(transfer.status(), TransferStatus::InTransit);
    }

    #[test]
    fn dispatch_from_draft_reports_both_states() {
        let mut transfer = draft(&[1]);
        match dispatch(&mut transfer).unwrap_err() {
            DomainError::InvalidStateTransition { entity, from, to } => {
                assert_eq!(entity, "transfer");
                assert_eq!(from, "Draft");
                assert_eq!(to, "InTransit");
            }
            other => panic!("expected InvalidStateTransition, got {other:?}"),
        }
    }

    #[test]
    fn cancel_is_rejected_once_stock_has_left() {
        let mut transfer = draft(&[1]);
        submit(&mut transfer).unwrap();
        dispatch(&mut transfer).unwrap();
        assert!(matches!(
            cancel(&mut transfer),
            Err(DomainError::InvalidStateTransition { .. })
        ));

        receive(&mut transfer, vec![]).unwrap();
        assert!(matches!(
            cancel(&mut transfer),
            Err(DomainError::InvalidStateTransition { .. })
        ));
    }

    #[test]
    fn cancel_records_previous_status() {
        let mut transfer = draft(&[1]);
        submit(&mut transfer).unwrap();
        let transfer_id = transfer.id_typed();
        let events = transfer
            .handle(&TransferCommand::Cancel(CancelTransfer {
                transfer_id,
                reason: None,
                occurred_at: test_time(),
            }))
            .unwrap();
        match &events[0] {
            TransferEvent::Cancelled(e) => assert_eq!(e.previous_status, TransferStatus::Pending),
            other => panic!("expected Cancelled, got {other:?}"),
        }
    }

    #[test]
    fn commands_against_missing_transfer_are_not_found() {
        let mut transfer = Transfer::empty(TransferId::new());
        assert!(matches!(submit(&mut transfer), Err(DomainError::NotFound)));
    }

    #[test]
    fn cancel_closes_every_pre_dispatch_state() {
        for expected in [TransferStatus::Draft, TransferStatus::Pending, TransferStatus::Approved] {
            let mut transfer = draft(&[2]);
            if expected != TransferStatus::Draft {
                submit(&mut transfer).unwrap();
            }
            if expected == TransferStatus::Approved {
                let transfer_id = transfer.id_typed();
                run(
                    &mut transfer,
                    TransferCommand::Approve(ApproveTransfer {
                        transfer_id,
                        approved_by: UserId::new(),
                        occurred_at: test_time(),
                    }),
                )
                .unwrap();
            }
            assert_eq!(transfer.status(), expected);

            cancel(&mut transfer).unwrap();
            assert_eq!(transfer.status(), TransferStatus::Cancelled);
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Property: received quantity never exceeds requested quantity.
        #[test]
        fn received_never_exceeds_requested(requested in 1i64..500, received in 0i64..1000) {
            let mut transfer = draft(&[requested]);
            submit(&mut transfer).unwrap();
            dispatch(&mut transfer).unwrap();
            receive(&mut transfer, vec![ReceivedLine { line_no: 1, quantity: received }]).unwrap();
            let item = &transfer.items()[0];
            prop_assert!(item.received_quantity <= item.requested_quantity);
            prop_assert_eq!(item.received_quantity, received.min(requested));
        }
    }
}
