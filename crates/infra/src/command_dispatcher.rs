//! Command execution pipeline for event-sourced orders.
//!
//! ```text
//! Command
//!   ↓
//! 1. Load the order's stream and validate it
//!   ↓
//! 2. Rehydrate the aggregate
//!   ↓
//! 3. Handle the command (pure; state-machine violations fail here, before any stock is touched)
//!   ↓
//! 4. Stage the ledger changes the events imply
//!   ↓
//! 5. Commit events and ledger changes as one unit of work (optimistic on both)
//!   ↓
//! 6. Publish committed events to the bus
//! ```
//!
//! Steps 1-5 are retried as a whole on `ConcurrentModification`.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use stockledger_core::{Aggregate, DomainError, ExpectedVersion};
use stockledger_events::{Event, EventBus, EventEnvelope};
use stockledger_inventory::{InventoryPosition, StockTransaction};

use crate::error::{ServiceError, ServiceResult};
use crate::ledger::{Ledger, LedgerBatch};
use crate::retry::with_retry;
use crate::store::{InventoryStore, StoreError, StoredEvent, StreamAppend, UncommittedEvent};

/// Outcome of a dispatched command.
#[derive(Debug, Clone)]
pub struct Dispatched<A> {
    /// Aggregate state after the new events.
    pub aggregate: A,
    pub events: Vec<StoredEvent>,
    pub transactions: Vec<StockTransaction>,
    pub positions: Vec<InventoryPosition>,
}

/// Runs order commands against the ledger and publishes what they commit.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    ledger: Ledger<S>,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(ledger: Ledger<S>, bus: B) -> Self {
        Self { ledger, bus }
    }

    pub fn ledger(&self) -> &Ledger<S> {
        &self.ledger
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: InventoryStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Rehydrate an aggregate from its stream without changing anything.
    pub fn load<A>(&self, aggregate_id: Uuid, aggregate: A) -> ServiceResult<A>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.ledger.store().load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;
        let mut aggregate = aggregate;
        apply_history(&mut aggregate, &history)?;
        Ok(aggregate)
    }

    /// Dispatch a command through the full pipeline.
    ///
    /// `stage` receives the aggregate as it was before the command and the events
    /// the command decided, and records the ledger changes those events imply. It
    /// runs once per attempt. Shortages it collects fail the whole dispatch with
    /// every offending item listed, and nothing is written.
    pub fn dispatch<A>(
        &self,
        aggregate_id: Uuid,
        aggregate_type: &str,
        command: &A::Command,
        make_aggregate: impl Fn() -> A,
        mut stage: impl FnMut(&A, &[A::Event], &mut LedgerBatch<'_, S>) -> ServiceResult<()>,
    ) -> ServiceResult<Dispatched<A>>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: Event + Serialize + DeserializeOwned,
    {
        let dispatched = with_retry(self.ledger.retry_policy(), aggregate_type, || {
            // 1) Load + 2) rehydrate
            let history = self.ledger.store().load_stream(aggregate_id)?;
            validate_loaded_stream(aggregate_id, &history)?;
            let expected = ExpectedVersion::at(stream_version(&history));

            let mut aggregate = make_aggregate();
            apply_history(&mut aggregate, &history)?;

            // 3) Decide
            let decided = aggregate.handle(command)?;
            if decided.is_empty() {
                return Ok(Dispatched {
                    aggregate,
                    events: vec![],
                    transactions: vec![],
                    positions: vec![],
                });
            }

            // 4) Stage ledger changes
            let mut batch = self.ledger.stage();
            stage(&aggregate, &decided, &mut batch)?;
            let staged = batch.finish()?;

            // 5) Commit
            let uncommitted = decided
                .iter()
                .map(|ev| UncommittedEvent::from_typed(aggregate_id, aggregate_type, Uuid::now_v7(), ev))
                .collect::<Result<Vec<_>, _>>()?;

            let mut unit = staged.into_unit();
            unit.streams.push(StreamAppend {
                aggregate_id,
                expected_version: expected,
                events: uncommitted,
            });
            let committed = self.ledger.store().commit(unit)?;

            for ev in &decided {
                aggregate.apply(ev);
            }

            Ok(Dispatched {
                aggregate,
                events: committed.events,
                transactions: committed.transactions,
                positions: committed.positions,
            })
        })?;

        // 6) Publish (after commit). The stock already moved, so a bus failure is
        // logged rather than reported as a failed operation.
        for stored in &dispatched.events {
            match self.bus.publish(stored.to_envelope()) {
                Ok(delivered) => tracing::debug!(
                    aggregate_id = %stored.aggregate_id(),
                    sequence_number = stored.sequence_number(),
                    event_type = stored.event_type(),
                    delivered,
                    "event published"
                ),
                Err(e) => tracing::error!(
                    aggregate_id = %stored.aggregate_id(),
                    sequence_number = stored.sequence_number(),
                    event_type = stored.event_type(),
                    error = %e,
                    "event publication failed after commit"
                ),
            }
        }

        Ok(dispatched)
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(StoredEvent::sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(aggregate_id: Uuid, stream: &[StoredEvent]) -> ServiceResult<()> {
    // Ensure the stream belongs to the aggregate and is strictly increasing.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id() != aggregate_id {
            return Err(StoreError::InvalidWrite(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            ))
            .into());
        }
        if e.sequence_number() <= last {
            return Err(StoreError::InvalidWrite(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number()
            ))
            .into());
        }
        last = e.sequence_number();
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> ServiceResult<()>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = stored
            .decode()
            .map_err(|e| ServiceError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }
    Ok(())
}
