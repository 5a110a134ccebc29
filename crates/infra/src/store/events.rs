//! Order events as the store holds them: JSON payload plus stream coordinates.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use stockledger_events::{EnvelopeHeader, Event, EventEnvelope};

use super::StoreError;

/// An order event staged in a unit of work; the store assigns its sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    pub event_id: Uuid,
    pub aggregate_id: Uuid,
    pub aggregate_type: String,
    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,
    pub payload: JsonValue,
}

impl UncommittedEvent {
    /// Serialize a typed order event, keeping the metadata needed to read it back.
    pub fn from_typed<E>(
        aggregate_id: Uuid,
        aggregate_type: impl Into<String>,
        event_id: Uuid,
        event: &E,
    ) -> Result<Self, StoreError>
    where
        E: Event + Serialize,
    {
        let payload = serde_json::to_value(event).map_err(|e| {
            StoreError::InvalidWrite(format!("{} payload not serializable: {e}", event.event_type()))
        })?;

        Ok(Self {
            event_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            occurred_at: event.occurred_at(),
            payload,
        })
    }

    /// Fix the event at `sequence_number` in its stream.
    pub fn into_stored(self, sequence_number: u64) -> StoredEvent {
        StoredEvent {
            header: EnvelopeHeader {
                event_id: self.event_id,
                aggregate_id: self.aggregate_id,
                aggregate_type: self.aggregate_type,
                sequence_number,
                event_type: self.event_type,
                event_version: self.event_version,
                occurred_at: self.occurred_at,
            },
            payload: self.payload,
        }
    }
}

/// An appended order event. Sequence numbers start at 1 per stream, without gaps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEvent {
    pub header: EnvelopeHeader,
    pub payload: JsonValue,
}

impl StoredEvent {
    pub fn aggregate_id(&self) -> Uuid {
        self.header.aggregate_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.header.aggregate_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.header.sequence_number
    }

    pub fn event_type(&self) -> &str {
        &self.header.event_type
    }

    /// Read the payload back as the aggregate's event type.
    pub fn decode<E: DeserializeOwned>(&self) -> Result<E, serde_json::Error> {
        E::deserialize(&self.payload)
    }

    pub fn to_envelope(&self) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(self.header.clone(), self.payload.clone())
    }
}
