//! Publication of committed order events.
//!
//! Services commit first and publish second, so a consumer never sees an event
//! the store does not hold. A failed publish can be repeated; consumers dedupe on
//! `(aggregate_id, sequence_number)`.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use crate::envelope::EventEnvelope;

/// Messages that name the aggregate stream they belong to.
pub trait Routable {
    fn aggregate_type(&self) -> &str;
}

impl<E> Routable for EventEnvelope<E> {
    fn aggregate_type(&self) -> &str {
        EventEnvelope::aggregate_type(self)
    }
}

/// Which streams a subscriber wants.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Topic {
    #[default]
    All,
    /// A single aggregate type, e.g. "purchasing.order".
    Aggregate(String),
}

impl Topic {
    pub fn aggregate(aggregate_type: impl Into<String>) -> Self {
        Topic::Aggregate(aggregate_type.into())
    }

    pub fn matches(&self, aggregate_type: &str) -> bool {
        match self {
            Topic::All => true,
            Topic::Aggregate(wanted) => wanted == aggregate_type,
        }
    }
}

/// Receiving end of a subscription. Single consumer.
#[derive(Debug)]
pub struct Subscription<M> {
    topic: Topic,
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(topic: Topic, receiver: Receiver<M>) -> Self {
        Self { topic, receiver }
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Wait up to `timeout`; `None` on timeout or once the bus is gone.
    pub fn next(&self, timeout: Duration) -> Option<M> {
        match self.receiver.recv_timeout(timeout) {
            Ok(message) => Some(message),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Everything delivered so far, without blocking.
    pub fn drain(&self) -> Vec<M> {
        self.receiver.try_iter().collect()
    }
}

pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + core::fmt::Display + Send + Sync + 'static;

    /// Deliver to every matching subscriber; returns how many were reached.
    fn publish(&self, message: M) -> Result<usize, Self::Error>;

    fn subscribe(&self, topic: Topic) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<usize, Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self, topic: Topic) -> Subscription<M> {
        (**self).subscribe(topic)
    }
}
