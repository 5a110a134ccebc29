//! Integration tests for the full pipeline.
//!
//! Tests: Service → Ledger/Aggregate → InventoryStore (one unit of work) → EventBus
//!
//! Verifies:
//! - The stock scenarios for transfers, receiving and reorder planning
//! - Multi-item transitions are all-or-nothing
//! - Receipts are idempotent
//! - On-hand always equals the sum of transaction deltas, including under contention

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use anyhow::Context;

    use stockledger_core::{
        DomainError, LocationId, ProductId, ReceiptId, StockLocation, SupplierId, UserId,
    };
    use stockledger_events::{EventBus, Topic};
    use stockledger_inventory::{
        PositionKey, Posting, ReferenceKind, TransactionType, ledger_balance,
    };
    use stockledger_purchasing::{PurchaseOrderLine, PurchaseOrderStatus, ReceiptLine};
    use stockledger_transfers::{ReceivedLine, TransferEvent, TransferPriority, TransferStatus};

    use crate::adjustment::{AdjustmentMode, AdjustmentReason, AdjustmentRequest};
    use crate::config::LedgerConfig;
    use crate::error::ServiceError;
    use crate::purchase_order_engine::{NewPurchaseOrder, PURCHASE_ORDER_AGGREGATE};
    use crate::retry::RetryPolicy;
    use crate::services::InMemoryServices;
    use crate::store::{InventoryStore, ProductRecord};
    use crate::transfer_engine::{NewTransfer, NewTransferItem, TRANSFER_AGGREGATE};

    struct World {
        services: InMemoryServices,
        warehouse: LocationId,
        store_location: LocationId,
        actor: UserId,
    }

    impl World {
        fn new() -> Self {
            Self::with_retry(RetryPolicy::fixed(5, Duration::ZERO))
        }

        fn with_retry(retry: RetryPolicy) -> Self {
            let config = LedgerConfig {
                retry,
                ..LedgerConfig::default()
            };
            let services = InMemoryServices::in_memory(&config);

            let warehouse = LocationId::new();
            let store_location = LocationId::new();
            services
                .store()
                .put_location(StockLocation::warehouse(warehouse, "Central").unwrap())
                .unwrap();
            services
                .store()
                .put_location(StockLocation::store(store_location, "High Street").unwrap())
                .unwrap();

            Self {
                services,
                warehouse,
                store_location,
                actor: UserId::new(),
            }
        }

        fn product(&self, supplier_id: Option<SupplierId>) -> ProductId {
            let id = ProductId::new();
            self.services
                .store()
                .put_product(ProductRecord {
                    id,
                    sku: format!("SKU-{id}"),
                    name: "Test product".into(),
                    supplier_id,
                })
                .unwrap();
            id
        }

        fn stock(&self, location: LocationId, product: ProductId, quantity: i64) {
            self.services
                .ledger()
                .post(Posting::new(
                    PositionKey::new(product, location),
                    TransactionType::Purchase,
                    quantity,
                    self.actor,
                ))
                .unwrap();
        }

        fn on_hand(&self, location: LocationId, product: ProductId) -> i64 {
            self.services
                .ledger()
                .position(location, product)
                .unwrap()
                .map(|p| p.quantity_on_hand())
                .unwrap_or(0)
        }

        fn reserved(&self, location: LocationId, product: ProductId) -> i64 {
            self.services
                .ledger()
                .position(location, product)
                .unwrap()
                .map(|p| p.quantity_reserved())
                .unwrap_or(0)
        }

        fn history_len(&self, location: LocationId, product: ProductId) -> usize {
            self.services.ledger().history(location, product).unwrap().len()
        }

        /// On-hand equals the sum of deltas, and the reservation is within bounds,
        /// for every position in the store.
        fn assert_ledger_consistent(&self) {
            for position in self.services.store().positions(None).unwrap() {
                let history = self.services.store().transactions(position.key()).unwrap();
                assert_eq!(position.quantity_on_hand(), ledger_balance(&history));
                assert!(position.quantity_reserved() >= 0);
                assert!(position.quantity_reserved() <= position.quantity_on_hand());
            }
        }

        fn ordered_po(&self, product: ProductId, quantity: i64) -> stockledger_core::PurchaseOrderId {
            let po = self
                .services
                .purchase_orders
                .create(NewPurchaseOrder {
                    supplier_id: SupplierId::new(),
                    warehouse_id: self.warehouse,
                    lines: vec![PurchaseOrderLine {
                        product_id: product,
                        ordered_quantity: quantity,
                        unit_price: 250,
                    }],
                    tax_rate_bps: 0,
                    expected_delivery_date: None,
                    notes: None,
                    created_by: self.actor,
                })
                .unwrap();
            let id = po.id_typed();
            self.services.purchase_orders.submit(id).unwrap();
            self.services.purchase_orders.order(id).unwrap();
            id
        }
    }

    fn domain(err: &ServiceError) -> &DomainError {
        err.domain()
            .unwrap_or_else(|| panic!("expected a domain error, got {err:?}"))
    }

    #[test]
    fn transfer_moves_stock_with_partial_receipt() {
        let w = World::new();
        let p = w.product(None);
        w.stock(w.warehouse, p, 100);

        let transfers = &w.services.transfers;
        let transfer = transfers
            .create(NewTransfer::new(
                w.warehouse,
                w.store_location,
                vec![NewTransferItem::new(p, 30)],
                w.actor,
            ))
            .unwrap();
        assert_eq!(transfer.status(), TransferStatus::Draft);
        // Creation does not touch stock.
        assert_eq!(w.reserved(w.warehouse, p), 0);

        let id = transfer.id_typed();
        transfers.submit(id).unwrap();
        let position = w.services.ledger().position(w.warehouse, p).unwrap().unwrap();
        assert_eq!(position.quantity_reserved(), 30);
        assert_eq!(position.quantity_available(), 70);

        transfers.dispatch(id, w.actor).unwrap();
        assert_eq!(w.on_hand(w.warehouse, p), 70);
        assert_eq!(w.reserved(w.warehouse, p), 0);
        let out: Vec<_> = w
            .services
            .ledger()
            .history(w.warehouse, p)
            .unwrap()
            .into_iter()
            .filter(|t| t.kind == TransactionType::TransferOut)
            .collect();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].delta, -30);
        assert_eq!(out[0].reference.map(|r| r.kind), Some(ReferenceKind::Transfer));

        let received = transfers
            .receive(
                id,
                vec![ReceivedLine {
                    line_no: 1,
                    quantity: 20,
                }],
                w.actor,
            )
            .unwrap();
        assert_eq!(received.status(), TransferStatus::Received);
        assert_eq!(received.items()[0].received_quantity, 20);
        assert_eq!(w.on_hand(w.store_location, p), 20);

        w.assert_ledger_consistent();
    }

    #[test]
    fn receive_applies_target_prices_at_destination() {
        let w = World::new();
        let p = w.product(None);
        w.services
            .ledger()
            .post(
                Posting::new(
                    PositionKey::new(p, w.warehouse),
                    TransactionType::Purchase,
                    10,
                    w.actor,
                )
                .with_prices(stockledger_inventory::PriceUpdate {
                    cost_price: Some(400),
                    retail_price: Some(900),
                }),
            )
            .unwrap();

        let transfers = &w.services.transfers;
        let transfer = transfers
            .create(NewTransfer::new(
                w.warehouse,
                w.store_location,
                vec![NewTransferItem::new(p, 10).with_target_prices(400, 1200)],
                w.actor,
            ))
            .unwrap();
        assert_eq!(transfer.items()[0].source_retail_price, 900);

        let id = transfer.id_typed();
        transfers.submit(id).unwrap();
        transfers.dispatch(id, w.actor).unwrap();
        // Over-delivery is capped at the requested quantity.
        transfers
            .receive(id, vec![ReceivedLine { line_no: 1, quantity: 12 }], w.actor)
            .unwrap();

        let dest = w.services.ledger().position(w.store_location, p).unwrap().unwrap();
        assert_eq!(dest.quantity_on_hand(), 10);
        assert_eq!(dest.retail_price(), 1200);
        let source = w.services.ledger().position(w.warehouse, p).unwrap().unwrap();
        assert_eq!(source.retail_price(), 900);
    }

    #[test]
    fn dispatch_is_all_or_nothing() {
        let w = World::new();
        let products = [w.product(None), w.product(None), w.product(None)];
        for p in products {
            w.stock(w.warehouse, p, 10);
        }

        let transfers = &w.services.transfers;
        let transfer = transfers
            .create(NewTransfer::new(
                w.warehouse,
                w.store_location,
                products.iter().map(|p| NewTransferItem::new(*p, 5)).collect(),
                w.actor,
            ))
            .unwrap();
        let id = transfer.id_typed();
        transfers.submit(id).unwrap();

        // A recount finds only 2 units of the second product; its hold shrinks to match.
        w.services
            .adjustments
            .adjust(AdjustmentRequest::new(
                w.warehouse,
                products[1],
                AdjustmentMode::SetExact(2),
                AdjustmentReason::StockCount,
                w.actor,
            ))
            .unwrap();
        assert_eq!(w.reserved(w.warehouse, products[1]), 2);

        let err = transfers.dispatch(id, w.actor).unwrap_err();
        match domain(&err) {
            DomainError::InsufficientStock(shortages) => {
                assert_eq!(shortages.len(), 1);
                assert_eq!(shortages[0].product_id, products[1]);
                assert_eq!(shortages[0].requested, 5);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }

        for p in products {
            let history = w.services.ledger().history(w.warehouse, p).unwrap();
            assert!(history.iter().all(|t| t.kind != TransactionType::TransferOut));
        }
        assert_eq!(transfers.get(id).unwrap().status(), TransferStatus::Pending);
        assert_eq!(w.reserved(w.warehouse, products[0]), 5);
        assert_eq!(w.on_hand(w.warehouse, products[0]), 10);
        w.assert_ledger_consistent();
    }

    #[test]
    fn submit_reports_every_short_item_and_stays_draft() {
        let w = World::new();
        let a = w.product(None);
        let b = w.product(None);
        let c = w.product(None);
        w.stock(w.warehouse, a, 3);
        w.stock(w.warehouse, b, 50);

        let transfers = &w.services.transfers;
        let transfer = transfers
            .create(NewTransfer::new(
                w.warehouse,
                w.store_location,
                vec![
                    NewTransferItem::new(a, 5),
                    NewTransferItem::new(b, 5),
                    NewTransferItem::new(c, 1),
                ],
                w.actor,
            ))
            .unwrap();

        let err = transfers.submit(transfer.id_typed()).unwrap_err();
        match domain(&err) {
            DomainError::InsufficientStock(shortages) => {
                let short: Vec<_> = shortages.iter().map(|s| s.product_id).collect();
                assert_eq!(short, vec![a, c]);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }

        assert_eq!(
            transfers.get(transfer.id_typed()).unwrap().status(),
            TransferStatus::Draft
        );
        assert_eq!(w.reserved(w.warehouse, b), 0);
    }

    #[test]
    fn second_transfer_cannot_claim_held_stock() {
        let w = World::new();
        let p = w.product(None);
        w.stock(w.warehouse, p, 10);

        let transfers = &w.services.transfers;
        let request = || {
            NewTransfer::new(
                w.warehouse,
                w.store_location,
                vec![NewTransferItem::new(p, 8)],
                w.actor,
            )
        };
        let first = transfers.create(request()).unwrap();
        let second = transfers.create(request()).unwrap();

        transfers.submit(first.id_typed()).unwrap();
        let err = transfers.submit(second.id_typed()).unwrap_err();
        assert!(matches!(domain(&err), DomainError::InsufficientStock(_)));
    }

    #[test]
    fn malformed_transfers_are_rejected() {
        let w = World::new();
        let p = w.product(None);
        let transfers = &w.services.transfers;

        let err = transfers
            .create(NewTransfer::new(
                w.warehouse,
                w.warehouse,
                vec![NewTransferItem::new(p, 1)],
                w.actor,
            ))
            .unwrap_err();
        assert!(matches!(domain(&err), DomainError::InvalidTransfer(_)));

        let err = transfers
            .create(NewTransfer::new(
                w.warehouse,
                w.store_location,
                vec![NewTransferItem::new(p, 0)],
                w.actor,
            ))
            .unwrap_err();
        assert!(matches!(domain(&err), DomainError::InvalidTransfer(_)));

        let nowhere = LocationId::new();
        let err = transfers
            .create(NewTransfer::new(
                w.warehouse,
                nowhere,
                vec![NewTransferItem::new(p, 1)],
                w.actor,
            ))
            .unwrap_err();
        assert!(matches!(
            domain(&err),
            DomainError::UnknownLocationOrProduct { location, .. } if *location == nowhere
        ));
    }

    #[test]
    fn transfer_cancel_closure() {
        let w = World::new();
        let p = w.product(None);
        w.stock(w.warehouse, p, 100);
        let transfers = &w.services.transfers;
        let new = || {
            transfers
                .create(NewTransfer::new(
                    w.warehouse,
                    w.store_location,
                    vec![NewTransferItem::new(p, 10)],
                    w.actor,
                ))
                .unwrap()
                .id_typed()
        };

        // DRAFT
        let id = new();
        assert_eq!(transfers.cancel(id, None).unwrap().status(), TransferStatus::Cancelled);

        // PENDING: hold is released
        let id = new();
        transfers.submit(id).unwrap();
        assert_eq!(w.reserved(w.warehouse, p), 10);
        transfers.cancel(id, Some("not needed".into())).unwrap();
        assert_eq!(w.reserved(w.warehouse, p), 0);

        // APPROVED
        let id = new();
        transfers.submit(id).unwrap();
        transfers.approve(id, w.actor).unwrap();
        let cancelled = transfers.cancel(id, None).unwrap();
        assert_eq!(cancelled.status(), TransferStatus::Cancelled);
        assert_eq!(w.reserved(w.warehouse, p), 0);

        // IN_TRANSIT and RECEIVED cannot be cancelled
        let id = new();
        transfers.submit(id).unwrap();
        transfers.dispatch(id, w.actor).unwrap();
        let err = transfers.cancel(id, None).unwrap_err();
        assert!(matches!(domain(&err), DomainError::InvalidStateTransition { .. }));

        transfers
            .receive(id, vec![ReceivedLine { line_no: 1, quantity: 10 }], w.actor)
            .unwrap();
        let err = transfers.cancel(id, None).unwrap_err();
        match domain(&err) {
            DomainError::InvalidStateTransition { from, to, .. } => {
                assert_eq!(from, "Received");
                assert_eq!(to, "Cancelled");
            }
            other => panic!("expected InvalidStateTransition, got {other:?}"),
        }

        // A cancelled transfer is terminal too.
        let err = transfers.cancel(cancelled.id_typed(), None).unwrap_err();
        assert!(matches!(domain(&err), DomainError::InvalidStateTransition { .. }));
        w.assert_ledger_consistent();
    }

    #[test]
    fn purchase_order_partial_then_full_then_over_receipt() {
        let w = World::new();
        let p = w.product(None);
        let id = w.ordered_po(p, 50);
        let po = &w.services.purchase_orders;

        let first = po
            .receive(id, ReceiptId::new(), vec![ReceiptLine { line_no: 1, quantity: 30 }], w.actor)
            .unwrap();
        assert_eq!(first.order.status(), PurchaseOrderStatus::PartiallyReceived);
        assert_eq!(first.order.items()[0].received_quantity, 30);
        assert_eq!(first.transactions.len(), 1);
        assert_eq!(w.on_hand(w.warehouse, p), 30);

        let second = po
            .receive(id, ReceiptId::new(), vec![ReceiptLine { line_no: 1, quantity: 20 }], w.actor)
            .unwrap();
        assert_eq!(second.order.status(), PurchaseOrderStatus::Received);
        assert_eq!(second.order.items()[0].received_quantity, 50);
        assert_eq!(w.on_hand(w.warehouse, p), 50);

        let err = po
            .receive(id, ReceiptId::new(), vec![ReceiptLine { line_no: 1, quantity: 5 }], w.actor)
            .unwrap_err();
        assert!(matches!(domain(&err), DomainError::OverReceipt { line_no: 1, .. }));
        assert_eq!(w.on_hand(w.warehouse, p), 50);

        let history = w.services.ledger().history(w.warehouse, p).unwrap();
        assert!(history.iter().all(|t| t.kind == TransactionType::Purchase));
        assert!(
            history
                .iter()
                .all(|t| t.reference.map(|r| r.kind) == Some(ReferenceKind::PurchaseOrder))
        );
    }

    #[test]
    fn replayed_receipt_posts_nothing() -> anyhow::Result<()> {
        let w = World::new();
        let p = w.product(None);
        let id = w.ordered_po(p, 50);
        let po = &w.services.purchase_orders;

        let receipt_id = ReceiptId::new();
        let lines = vec![ReceiptLine { line_no: 1, quantity: 30 }];

        let first = po
            .receive(id, receipt_id, lines.clone(), w.actor)
            .context("first delivery")?;
        assert!(!first.replayed);
        assert_eq!(first.accepted[0].accepted, 30);

        let again = po
            .receive(id, receipt_id, lines, w.actor)
            .context("replayed delivery")?;
        assert!(again.replayed);
        assert!(again.transactions.is_empty());
        assert_eq!(again.order.items()[0].received_quantity, 30);

        assert_eq!(w.on_hand(w.warehouse, p), 30);
        assert_eq!(w.history_len(w.warehouse, p), 1);
        Ok(())
    }

    #[test]
    fn receiving_more_than_remaining_is_clamped() {
        let w = World::new();
        let p = w.product(None);
        let id = w.ordered_po(p, 10);

        let out = w
            .services
            .purchase_orders
            .receive(id, ReceiptId::new(), vec![ReceiptLine { line_no: 1, quantity: 15 }], w.actor)
            .unwrap();
        assert_eq!(out.accepted[0].accepted, 10);
        assert_eq!(out.order.status(), PurchaseOrderStatus::Received);
        assert_eq!(w.on_hand(w.warehouse, p), 10);
    }

    #[test]
    fn purchase_order_cancel_closure() {
        let w = World::new();
        let p = w.product(None);
        let po = &w.services.purchase_orders;

        let new_draft = || {
            po.create(NewPurchaseOrder {
                supplier_id: SupplierId::new(),
                warehouse_id: w.warehouse,
                lines: vec![PurchaseOrderLine {
                    product_id: p,
                    ordered_quantity: 10,
                    unit_price: 100,
                }],
                tax_rate_bps: 0,
                expected_delivery_date: None,
                notes: None,
                created_by: w.actor,
            })
            .unwrap()
            .id_typed()
        };

        let draft = new_draft();
        assert_eq!(po.cancel(draft, None).unwrap().status(), PurchaseOrderStatus::Cancelled);

        let submitted = new_draft();
        po.submit(submitted).unwrap();
        po.cancel(submitted, None).unwrap();

        let ordered = w.ordered_po(p, 10);
        po.cancel(ordered, None).unwrap();

        let partial = w.ordered_po(p, 10);
        po.receive(partial, ReceiptId::new(), vec![ReceiptLine { line_no: 1, quantity: 4 }], w.actor)
            .unwrap();
        let cancelled = po.cancel(partial, Some("supplier closed".into())).unwrap();
        assert_eq!(cancelled.cancellation_reason(), Some("supplier closed"));
        // Received stock stays; nothing is reversed.
        assert_eq!(w.on_hand(w.warehouse, p), 4);

        let received = w.ordered_po(p, 10);
        po.receive(received, ReceiptId::new(), vec![ReceiptLine { line_no: 1, quantity: 10 }], w.actor)
            .unwrap();
        let err = po.cancel(received, None).unwrap_err();
        assert!(matches!(domain(&err), DomainError::InvalidStateTransition { .. }));
    }

    #[test]
    fn purchase_orders_deliver_only_into_warehouses() {
        let w = World::new();
        let p = w.product(None);
        let err = w
            .services
            .purchase_orders
            .create(NewPurchaseOrder {
                supplier_id: SupplierId::new(),
                warehouse_id: w.store_location,
                lines: vec![PurchaseOrderLine {
                    product_id: p,
                    ordered_quantity: 1,
                    unit_price: 1,
                }],
                tax_rate_bps: 0,
                expected_delivery_date: None,
                notes: None,
                created_by: w.actor,
            })
            .unwrap_err();
        assert!(matches!(domain(&err), DomainError::Validation(_)));
    }

    #[test]
    fn purchase_order_with_an_unrepresentable_total_is_not_created() {
        let w = World::new();
        let p = w.product(None);
        let err = w
            .services
            .purchase_orders
            .create(NewPurchaseOrder {
                supplier_id: SupplierId::new(),
                warehouse_id: w.warehouse,
                lines: vec![PurchaseOrderLine {
                    product_id: p,
                    ordered_quantity: 3,
                    unit_price: u64::MAX / 2,
                }],
                tax_rate_bps: 0,
                expected_delivery_date: None,
                notes: None,
                created_by: w.actor,
            })
            .unwrap_err();
        assert!(matches!(domain(&err), DomainError::Validation(_)));
    }

    #[test]
    fn reorder_plan_feeds_a_purchase_order() {
        let w = World::new();
        let supplier = SupplierId::new();
        let p = w.product(Some(supplier));
        let unassigned = w.product(None);

        w.services
            .ledger()
            .post(
                Posting::new(
                    PositionKey::new(p, w.warehouse),
                    TransactionType::Purchase,
                    5,
                    w.actor,
                )
                .with_prices(stockledger_inventory::PriceUpdate {
                    cost_price: Some(120),
                    retail_price: None,
                }),
            )
            .unwrap();
        w.services.ledger().set_thresholds(w.warehouse, p, 10, 20).unwrap();
        w.stock(w.warehouse, unassigned, 1);
        w.services
            .ledger()
            .set_thresholds(w.warehouse, unassigned, 5, 5)
            .unwrap();

        let suggestions = w.services.reorder.scan(Some(w.warehouse), None).unwrap();
        let s = suggestions.iter().find(|s| s.product_id == p).unwrap();
        assert_eq!(s.suggested_quantity, 15);

        let groups = w.services.reorder.plan(None, None).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].supplier_id, Some(supplier));
        assert_eq!(groups[1].supplier_id, None);

        let order = w
            .services
            .purchase_orders
            .create_from_suggestions(&groups[0], w.warehouse, 0, w.actor)
            .unwrap();
        assert_eq!(order.status(), PurchaseOrderStatus::Draft);
        assert_eq!(order.items()[0].ordered_quantity, 15);
        assert_eq!(order.subtotal(), 15 * 120);

        // Planning never posts.
        assert_eq!(w.history_len(w.warehouse, p), 1);

        let err = w
            .services
            .purchase_orders
            .create_from_suggestions(&groups[1], w.warehouse, 0, w.actor)
            .unwrap_err();
        assert!(matches!(domain(&err), DomainError::Validation(_)));
    }

    #[test]
    fn adjustment_modes_compose_through_the_ledger() {
        let w = World::new();
        let p = w.product(None);
        let adjust = |mode, reason| {
            w.services
                .adjustments
                .adjust(AdjustmentRequest::new(w.warehouse, p, mode, reason, w.actor))
        };

        let err = adjust(AdjustmentMode::Remove(1), AdjustmentReason::Correction).unwrap_err();
        assert!(matches!(domain(&err), DomainError::NoExistingInventory { .. }));

        adjust(AdjustmentMode::Add(12), AdjustmentReason::Correction).unwrap();
        let damaged = adjust(AdjustmentMode::Remove(2), AdjustmentReason::Damage).unwrap();
        assert_eq!(damaged.transaction.kind, TransactionType::Damage);
        assert_eq!(damaged.position.quantity_on_hand(), 10);

        let counted = adjust(AdjustmentMode::SetExact(7), AdjustmentReason::StockCount).unwrap();
        assert_eq!(counted.transaction.delta, -3);
        assert_eq!(counted.transaction.kind, TransactionType::Adjustment);
        assert_eq!(counted.position.quantity_on_hand(), 7);

        let err = adjust(AdjustmentMode::Remove(8), AdjustmentReason::Correction).unwrap_err();
        assert!(matches!(domain(&err), DomainError::InsufficientStock(_)));

        let err = adjust(AdjustmentMode::SetExact(3), AdjustmentReason::Damage).unwrap_err();
        assert!(matches!(domain(&err), DomainError::Validation(_)));

        assert_eq!(w.on_hand(w.warehouse, p), 7);
        assert_eq!(w.history_len(w.warehouse, p), 3);
        w.assert_ledger_consistent();
    }

    #[test]
    fn removing_from_a_never_stocked_pair_reports_no_inventory() {
        let w = World::new();
        let p = w.product(None);

        let err = w.services.ledger().release(w.warehouse, p, 5).unwrap_err();
        assert!(matches!(domain(&err), DomainError::NoExistingInventory { .. }));
        assert_eq!(w.services.ledger().position(w.warehouse, p).unwrap(), None);

        w.services.ledger().set_thresholds(w.warehouse, p, 10, 20).unwrap();
        let err = w
            .services
            .adjustments
            .adjust(AdjustmentRequest::new(
                w.warehouse,
                p,
                AdjustmentMode::Remove(1),
                AdjustmentReason::Correction,
                w.actor,
            ))
            .unwrap_err();
        assert!(matches!(domain(&err), DomainError::NoExistingInventory { .. }));
        assert_eq!(w.history_len(w.warehouse, p), 0);
    }

    #[test]
    fn linked_transfer_failure_does_not_undo_the_adjustment() {
        let w = World::new();
        let p = w.product(None);

        let ok = w
            .services
            .adjustments
            .adjust(
                AdjustmentRequest::new(
                    w.warehouse,
                    p,
                    AdjustmentMode::Add(6),
                    AdjustmentReason::Correction,
                    w.actor,
                )
                .with_linked_transfer(w.store_location, TransferPriority::High),
            )
            .unwrap();
        let transfer = ok.linked_transfer.unwrap().unwrap();
        assert_eq!(transfer.status(), TransferStatus::Draft);
        assert_eq!(transfer.priority(), TransferPriority::High);
        assert_eq!(transfer.items()[0].requested_quantity, 6);

        let nowhere = LocationId::new();
        let outcome = w
            .services
            .adjustments
            .adjust(
                AdjustmentRequest::new(
                    w.warehouse,
                    p,
                    AdjustmentMode::Add(4),
                    AdjustmentReason::Correction,
                    w.actor,
                )
                .with_linked_transfer(nowhere, TransferPriority::Normal),
            )
            .unwrap();

        assert_eq!(outcome.position.quantity_on_hand(), 10);
        let failure = outcome.linked_transfer.unwrap().unwrap_err();
        assert!(matches!(
            domain(&failure),
            DomainError::UnknownLocationOrProduct { .. }
        ));
        assert_eq!(w.on_hand(w.warehouse, p), 10);
    }

    #[test]
    fn committed_events_are_published_in_stream_order() {
        let w = World::new();
        let p = w.product(None);
        w.stock(w.warehouse, p, 10);
        let sub = w.services.bus().subscribe(Topic::aggregate(TRANSFER_AGGREGATE));
        let orders = w.services.bus().subscribe(Topic::aggregate(PURCHASE_ORDER_AGGREGATE));

        let transfers = &w.services.transfers;
        let id = transfers
            .create(NewTransfer::new(
                w.warehouse,
                w.store_location,
                vec![NewTransferItem::new(p, 4)],
                w.actor,
            ))
            .unwrap()
            .id_typed();
        transfers.submit(id).unwrap();
        // Rejected transition: nothing committed, nothing published.
        assert!(transfers.receive(id, vec![], w.actor).is_err());
        transfers.dispatch(id, w.actor).unwrap();

        let envelopes = sub.drain();
        let types: Vec<_> = envelopes.iter().map(|e| e.event_type().to_string()).collect();
        assert_eq!(
            types,
            vec![
                "transfers.transfer.created",
                "transfers.transfer.submitted",
                "transfers.transfer.dispatched",
            ]
        );
        let seqs: Vec<_> = envelopes.iter().map(|e| e.sequence_number()).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert!(envelopes.iter().all(|e| e.aggregate_id() == *id.as_uuid()));
        assert!(orders.drain().is_empty());

        let created: TransferEvent = envelopes[0].decode().unwrap();
        assert!(matches!(created, TransferEvent::Created(c) if c.items.len() == 1));
    }

    #[test]
    fn concurrent_sales_never_oversell() {
        let w = Arc::new(World::with_retry(RetryPolicy::fixed(1_000, Duration::ZERO)));
        let p = w.product(None);
        w.stock(w.warehouse, p, 100);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let w = Arc::clone(&w);
                std::thread::spawn(move || {
                    let mut sold = 0;
                    for _ in 0..20 {
                        let sale = Posting::new(
                            PositionKey::new(p, w.warehouse),
                            TransactionType::Sale,
                            -1,
                            w.actor,
                        );
                        match w.services.ledger().post(sale) {
                            Ok(_) => sold += 1,
                            Err(e) => assert!(
                                matches!(e.domain(), Some(DomainError::InsufficientStock(_))),
                                "unexpected error: {e:?}"
                            ),
                        }
                    }
                    sold
                })
            })
            .collect();

        let sold: i64 = handles.into_iter().map(|h| h.join().unwrap()).sum();

        // 160 attempts against 100 units.
        assert_eq!(sold, 100);
        assert_eq!(w.on_hand(w.warehouse, p), 0);
        assert_eq!(w.history_len(w.warehouse, p), 101);
        w.assert_ledger_consistent();
    }

    #[test]
    fn concurrent_transfers_and_sales_keep_reservations_within_stock() {
        let w = Arc::new(World::with_retry(RetryPolicy::fixed(1_000, Duration::ZERO)));
        let p = w.product(None);
        w.stock(w.warehouse, p, 60);

        let transfer_worker = {
            let w = Arc::clone(&w);
            std::thread::spawn(move || {
                for _ in 0..5 {
                    let Ok(transfer) = w.services.transfers.create(NewTransfer::new(
                        w.warehouse,
                        w.store_location,
                        vec![NewTransferItem::new(p, 5)],
                        w.actor,
                    )) else {
                        continue;
                    };
                    let id = transfer.id_typed();
                    if w.services.transfers.submit(id).is_ok() {
                        let _ = w.services.transfers.dispatch(id, w.actor);
                    }
                }
            })
        };
        let sales_worker = {
            let w = Arc::clone(&w);
            std::thread::spawn(move || {
                for _ in 0..40 {
                    let _ = w.services.ledger().post(Posting::new(
                        PositionKey::new(p, w.warehouse),
                        TransactionType::Sale,
                        -1,
                        w.actor,
                    ));
                }
            })
        };

        transfer_worker.join().unwrap();
        sales_worker.join().unwrap();
        w.assert_ledger_consistent();
    }
}
