//! Order events and their distribution.
//!
//! Transfer and purchase order aggregates emit typed events; infrastructure wraps
//! the persisted ones in envelopes and publishes them once the commit is done.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Routable, Subscription, Topic};
pub use envelope::{EnvelopeHeader, EventEnvelope};
pub use event::Event;
pub use in_memory_bus::{BusError, InMemoryEventBus};
