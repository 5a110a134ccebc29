use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use uuid::Uuid;

use stockledger_core::{LocationId, ProductId, StockLocation};
use stockledger_inventory::{InventoryPosition, PositionKey, StockTransaction};

use super::{
    CommittedWork, InventoryStore, ProductRecord, StoreError, StoredEvent, UnitOfWork,
};

#[derive(Debug, Default)]
struct State {
    locations: HashMap<LocationId, StockLocation>,
    products: HashMap<ProductId, ProductRecord>,
    positions: HashMap<PositionKey, InventoryPosition>,
    transactions: HashMap<PositionKey, Vec<StockTransaction>>,
    streams: HashMap<Uuid, Vec<StoredEvent>>,
}

/// In-memory inventory store.
///
/// Intended for tests/dev. Reads clone out of the lock; `commit` holds the write
/// lock only for validation and apply, and version checks are per key.
#[derive(Debug, Default)]
pub struct InMemoryInventoryStore {
    state: RwLock<State>,
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&State) -> T) -> Result<T, StoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        Ok(f(&state))
    }

    fn write<T>(&self, f: impl FnOnce(&mut State) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        f(&mut state)
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(StoredEvent::sequence_number).unwrap_or(0)
}

/// Check the whole unit against current state without touching it.
fn validate(state: &State, work: &UnitOfWork) -> Result<(), StoreError> {
    let mut written: HashMap<PositionKey, &InventoryPosition> = HashMap::new();
    for write in &work.positions {
        let key = write.position.key();
        if written.insert(key, &write.position).is_some() {
            return Err(StoreError::InvalidWrite(format!(
                "position {key} written twice in one unit"
            )));
        }

        let current = state.positions.get(&key).map(|p| p.version()).unwrap_or(0);
        if current != write.expected_version {
            return Err(StoreError::Concurrency(format!(
                "position {key}: expected version {}, found {current}",
                write.expected_version
            )));
        }
        if write.position.version() <= write.expected_version {
            return Err(StoreError::InvalidWrite(format!(
                "position {key}: new version must advance past {}",
                write.expected_version
            )));
        }

        let p = &write.position;
        if p.quantity_reserved() < 0 || p.quantity_reserved() > p.quantity_on_hand() {
            return Err(StoreError::InvalidWrite(format!(
                "position {key}: reserved {} outside 0..={}",
                p.quantity_reserved(),
                p.quantity_on_hand()
            )));
        }
    }

    // The transactions in the unit must explain every on-hand change in the unit.
    let mut deltas: HashMap<PositionKey, i64> = HashMap::new();
    for tx in &work.transactions {
        let key = tx.key();
        if !written.contains_key(&key) {
            return Err(StoreError::InvalidWrite(format!(
                "transaction {} has no position write for {key}",
                tx.id
            )));
        }
        *deltas.entry(key).or_default() += tx.delta;
    }
    for (key, position) in &written {
        let before = state
            .positions
            .get(key)
            .map(InventoryPosition::quantity_on_hand)
            .unwrap_or(0);
        let delta = deltas.get(key).copied().unwrap_or(0);
        if before + delta != position.quantity_on_hand() {
            return Err(StoreError::InvalidWrite(format!(
                "position {key}: on-hand {} does not match {before} + {delta}",
                position.quantity_on_hand()
            )));
        }
    }

    let mut appended: HashSet<Uuid> = HashSet::new();
    for append in &work.streams {
        if !appended.insert(append.aggregate_id) {
            return Err(StoreError::InvalidWrite(format!(
                "stream {} appended twice in one unit",
                append.aggregate_id
            )));
        }

        let Some(first) = append.events.first() else {
            return Err(StoreError::InvalidWrite(format!(
                "empty append to stream {}",
                append.aggregate_id
            )));
        };
        for (idx, e) in append.events.iter().enumerate() {
            if e.aggregate_id != append.aggregate_id {
                return Err(StoreError::InvalidWrite(format!(
                    "batch contains multiple aggregate_ids (index {idx})"
                )));
            }
            if e.aggregate_type != first.aggregate_type {
                return Err(StoreError::AggregateTypeMismatch(format!(
                    "batch contains multiple aggregate_types (index {idx})"
                )));
            }
        }

        let stream = state
            .streams
            .get(&append.aggregate_id)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let current = stream_version(stream);
        if !append.expected_version.matches(current) {
            return Err(StoreError::Concurrency(format!(
                "stream {}: expected {:?}, found {current}",
                append.aggregate_id, append.expected_version
            )));
        }
        if let Some(existing) = stream.first() {
            if existing.aggregate_type() != first.aggregate_type {
                return Err(StoreError::AggregateTypeMismatch(format!(
                    "stream aggregate_type is '{}', attempted append with '{}'",
                    existing.aggregate_type(),
                    first.aggregate_type
                )));
            }
        }
    }

    Ok(())
}

impl InventoryStore for InMemoryInventoryStore {
    fn location(&self, id: LocationId) -> Result<Option<StockLocation>, StoreError> {
        self.read(|s| s.locations.get(&id).cloned())
    }

    fn put_location(&self, location: StockLocation) -> Result<(), StoreError> {
        self.write(|s| {
            if let Some(existing) = s.locations.get(&location.id()) {
                if !existing.is_compatible_update(&location) {
                    return Err(StoreError::InvalidWrite(format!(
                        "location {} is immutable except for its active flag",
                        location.id()
                    )));
                }
            }
            s.locations.insert(location.id(), location);
            Ok(())
        })
    }

    fn product(&self, id: ProductId) -> Result<Option<ProductRecord>, StoreError> {
        self.read(|s| s.products.get(&id).cloned())
    }

    fn put_product(&self, product: ProductRecord) -> Result<(), StoreError> {
        self.write(|s| {
            s.products.insert(product.id, product);
            Ok(())
        })
    }

    fn position(&self, key: PositionKey) -> Result<Option<InventoryPosition>, StoreError> {
        self.read(|s| s.positions.get(&key).cloned())
    }

    fn positions(&self, location: Option<LocationId>) -> Result<Vec<InventoryPosition>, StoreError> {
        self.read(|s| {
            let mut out: Vec<InventoryPosition> = s
                .positions
                .values()
                .filter(|p| location.is_none_or(|loc| p.location_id() == loc))
                .cloned()
                .collect();
            out.sort_by_key(InventoryPosition::key);
            out
        })
    }

    fn transactions(&self, key: PositionKey) -> Result<Vec<StockTransaction>, StoreError> {
        self.read(|s| s.transactions.get(&key).cloned().unwrap_or_default())
    }

    fn load_stream(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, StoreError> {
        self.read(|s| s.streams.get(&aggregate_id).cloned().unwrap_or_default())
    }

    fn commit(&self, work: UnitOfWork) -> Result<CommittedWork, StoreError> {
        self.write(|s| {
            validate(s, &work)?;

            let mut committed = CommittedWork::default();

            for write in work.positions {
                s.positions.insert(write.position.key(), write.position.clone());
                committed.positions.push(write.position);
            }

            for tx in work.transactions {
                s.transactions.entry(tx.key()).or_default().push(tx.clone());
                committed.transactions.push(tx);
            }

            for append in work.streams {
                let stream = s.streams.entry(append.aggregate_id).or_default();
                let mut next = stream_version(stream) + 1;
                for e in append.events {
                    let stored = e.into_stored(next);
                    next += 1;
                    stream.push(stored.clone());
                    committed.events.push(stored);
                }
            }

            Ok(committed)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use stockledger_core::{ExpectedVersion, TransactionId, UserId};
    use stockledger_inventory::{Posting, TransactionType, apply_posting};

    use crate::store::{PositionWrite, StreamAppend, UncommittedEvent};

    fn purchase(
        current: &InventoryPosition,
        quantity: i64,
    ) -> (InventoryPosition, StockTransaction) {
        let posting = Posting::new(current.key(), TransactionType::Purchase, quantity, UserId::new());
        apply_posting(current, &posting, TransactionId::new(), Utc::now()).unwrap()
    }

    fn unit(expected_version: u64, position: InventoryPosition, tx: StockTransaction) -> UnitOfWork {
        UnitOfWork {
            positions: vec![PositionWrite {
                expected_version,
                position,
            }],
            transactions: vec![tx],
            streams: vec![],
        }
    }

    fn test_key() -> PositionKey {
        PositionKey::new(ProductId::new(), LocationId::new())
    }

    #[test]
    fn commit_writes_position_and_transaction_together() {
        let store = InMemoryInventoryStore::new();
        let empty = InventoryPosition::empty(test_key(), Utc::now());
        let (position, tx) = purchase(&empty, 10);

        store.commit(unit(0, position.clone(), tx)).unwrap();

        assert_eq!(store.position(position.key()).unwrap(), Some(position.clone()));
        assert_eq!(store.transactions(position.key()).unwrap().len(), 1);
    }

    #[test]
    fn stale_version_rejects_the_whole_unit() {
        let store = InMemoryInventoryStore::new();
        let empty = InventoryPosition::empty(test_key(), Utc::now());
        let (first, tx) = purchase(&empty, 10);
        store.commit(unit(0, first.clone(), tx)).unwrap();

        // Derived from the empty position, i.e. a stale read.
        let (stale, tx) = purchase(&empty, 5);
        let err = store.commit(unit(0, stale, tx)).unwrap_err();

        assert!(matches!(err, StoreError::Concurrency(_)));
        assert_eq!(store.position(first.key()).unwrap(), Some(first.clone()));
        assert_eq!(store.transactions(first.key()).unwrap().len(), 1);
    }

    #[test]
    fn unexplained_quantity_change_is_rejected() {
        let store = InMemoryInventoryStore::new();
        let empty = InventoryPosition::empty(test_key(), Utc::now());
        let (position, _) = purchase(&empty, 10);

        let err = store
            .commit(UnitOfWork {
                positions: vec![PositionWrite {
                    expected_version: 0,
                    position,
                }],
                ..UnitOfWork::default()
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidWrite(_)));
    }

    #[test]
    fn stream_conflict_also_discards_position_writes() {
        let store = InMemoryInventoryStore::new();
        let aggregate_id = Uuid::now_v7();
        let event = UncommittedEvent {
            event_id: Uuid::now_v7(),
            aggregate_id,
            aggregate_type: "test".to_string(),
            event_type: "test.happened".to_string(),
            event_version: 1,
            occurred_at: Utc::now(),
            payload: serde_json::json!({}),
        };

        let empty = InventoryPosition::empty(test_key(), Utc::now());
        let (position, tx) = purchase(&empty, 10);
        let mut work = unit(0, position.clone(), tx);
        work.streams.push(StreamAppend {
            aggregate_id,
            expected_version: ExpectedVersion::Exact(3),
            events: vec![event],
        });

        assert!(matches!(store.commit(work), Err(StoreError::Concurrency(_))));
        assert_eq!(store.position(position.key()).unwrap(), None);
    }

    #[test]
    fn location_kind_cannot_change() {
        let store = InMemoryInventoryStore::new();
        let id = LocationId::new();
        store
            .put_location(StockLocation::warehouse(id, "North").unwrap())
            .unwrap();

        let deactivated = StockLocation::warehouse(id, "North").unwrap().with_active(false);
        store.put_location(deactivated).unwrap();
        assert!(!store.location(id).unwrap().unwrap().is_active());

        let err = store
            .put_location(StockLocation::store(id, "North").unwrap())
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidWrite(_)));
    }
}
