//! Wiring of the ledger services over one store and one bus.

use std::sync::Arc;

use serde_json::Value as JsonValue;

use stockledger_events::{EventBus, EventEnvelope, InMemoryEventBus};

use crate::adjustment::AdjustmentService;
use crate::command_dispatcher::CommandDispatcher;
use crate::config::LedgerConfig;
use crate::ledger::Ledger;
use crate::purchase_order_engine::PurchaseOrderEngine;
use crate::reorder::ReorderService;
use crate::store::{InMemoryInventoryStore, InventoryStore};
use crate::transfer_engine::TransferEngine;

pub type InMemoryBus = InMemoryEventBus<EventEnvelope<JsonValue>>;
pub type InMemoryServices = StockServices<Arc<InMemoryInventoryStore>, Arc<InMemoryBus>>;

/// All services, sharing one dispatcher (and so one ledger, store and bus).
pub struct StockServices<S, B> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
    pub transfers: TransferEngine<S, B>,
    pub purchase_orders: PurchaseOrderEngine<S, B>,
    pub adjustments: AdjustmentService<S, B>,
    pub reorder: ReorderService<S>,
}

impl<S, B> StockServices<S, B>
where
    S: InventoryStore + Clone,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(store: S, bus: B, config: &LedgerConfig) -> Self {
        let reorder = ReorderService::new(store.clone(), config.default_threshold_percent);
        let ledger = Ledger::new(store, config.retry.clone());
        let dispatcher = Arc::new(CommandDispatcher::new(ledger, bus));

        Self {
            transfers: TransferEngine::new(Arc::clone(&dispatcher)),
            purchase_orders: PurchaseOrderEngine::new(Arc::clone(&dispatcher)),
            adjustments: AdjustmentService::new(Arc::clone(&dispatcher)),
            reorder,
            dispatcher,
        }
    }

    pub fn ledger(&self) -> &Ledger<S> {
        self.dispatcher.ledger()
    }

    pub fn store(&self) -> &S {
        self.dispatcher.ledger().store()
    }

    pub fn bus(&self) -> &B {
        self.dispatcher.bus()
    }
}

impl InMemoryServices {
    /// In-memory wiring (dev/test).
    pub fn in_memory(config: &LedgerConfig) -> Self {
        let store = Arc::new(InMemoryInventoryStore::new());
        let bus: Arc<InMemoryBus> = Arc::new(InMemoryEventBus::new());
        Self::new(store, bus, config)
    }
}
