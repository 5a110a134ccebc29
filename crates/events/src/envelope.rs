use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// A committed order event as seen by consumers.
///
/// Only built from persisted events, so `sequence_number` is final: 1-based and
/// gap-free within one aggregate stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    aggregate_id: Uuid,
    aggregate_type: String,
    sequence_number: u64,
    event_type: String,
    event_version: u32,
    occurred_at: DateTime<Utc>,
    payload: E,
}

/// Stream coordinates of an envelope, everything except the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeHeader {
    pub event_id: Uuid,
    pub aggregate_id: Uuid,
    pub aggregate_type: String,
    pub sequence_number: u64,
    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,
}

impl<E> EventEnvelope<E> {
    pub fn new(header: EnvelopeHeader, payload: E) -> Self {
        Self {
            event_id: header.event_id,
            aggregate_id: header.aggregate_id,
            aggregate_type: header.aggregate_type,
            sequence_number: header.sequence_number,
            event_type: header.event_type,
            event_version: header.event_version,
            occurred_at: header.occurred_at,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn aggregate_id(&self) -> Uuid {
        self.aggregate_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn event_version(&self) -> u32 {
        self.event_version
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }
}

impl EventEnvelope<JsonValue> {
    /// Deserialize the payload into the aggregate's typed event enum.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq, Deserialize)]
    enum Fact {
        Shipped { units: i64 },
    }

    fn header(event_type: &str) -> EnvelopeHeader {
        EnvelopeHeader {
            event_id: Uuid::now_v7(),
            aggregate_id: Uuid::now_v7(),
            aggregate_type: "transfers.transfer".into(),
            sequence_number: 3,
            event_type: event_type.into(),
            event_version: 1,
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn json_payload_decodes_into_typed_event() {
        let envelope = EventEnvelope::new(
            header("transfers.transfer.dispatched"),
            json!({ "Shipped": { "units": 12 } }),
        );
        assert_eq!(envelope.decode::<Fact>().unwrap(), Fact::Shipped { units: 12 });
        assert_eq!(envelope.sequence_number(), 3);
    }

    #[test]
    fn mismatched_payload_is_a_decode_error() {
        let envelope = EventEnvelope::new(header("x"), json!({ "Lost": {} }));
        assert!(envelope.decode::<Fact>().is_err());
    }
}
