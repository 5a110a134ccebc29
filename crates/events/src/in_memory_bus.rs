//! In-process fan-out over `std::sync::mpsc`, for tests and embedded use.

use std::sync::{Mutex, mpsc};

use thiserror::Error;

use crate::bus::{EventBus, Routable, Subscription, Topic};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("subscriber registry lock poisoned")]
    Poisoned,
}

#[derive(Debug)]
pub struct InMemoryEventBus<M> {
    subscribers: Mutex<Vec<(Topic, mpsc::Sender<M>)>>,
}

impl<M> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<M> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: Routable + Clone + Send + 'static,
{
    type Error = BusError;

    fn publish(&self, message: M) -> Result<usize, Self::Error> {
        let mut subscribers = self.subscribers.lock().map_err(|_| BusError::Poisoned)?;

        let mut delivered = 0;
        // A failed send means the subscription was dropped.
        subscribers.retain(|(topic, tx)| {
            if !topic.matches(message.aggregate_type()) {
                return true;
            }
            let alive = tx.send(message.clone()).is_ok();
            delivered += usize::from(alive);
            alive
        });

        Ok(delivered)
    }

    fn subscribe(&self, topic: Topic) -> Subscription<M> {
        let (tx, rx) = mpsc::channel();
        match self.subscribers.lock() {
            Ok(mut subscribers) => subscribers.push((topic.clone(), tx)),
            // Sender dropped: the subscription reads as disconnected.
            Err(_) => drop(tx),
        }
        Subscription::new(topic, rx)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Msg(&'static str, u32);

    impl Routable for Msg {
        fn aggregate_type(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn topics_filter_by_aggregate_type() {
        let bus = InMemoryEventBus::new();
        let all = bus.subscribe(Topic::All);
        let orders = bus.subscribe(Topic::aggregate("purchasing.order"));

        assert_eq!(bus.publish(Msg("transfers.transfer", 1)).unwrap(), 1);
        assert_eq!(bus.publish(Msg("purchasing.order", 2)).unwrap(), 2);

        assert_eq!(
            all.drain(),
            vec![Msg("transfers.transfer", 1), Msg("purchasing.order", 2)]
        );
        assert_eq!(orders.drain(), vec![Msg("purchasing.order", 2)]);
    }

    #[test]
    fn dropped_subscriptions_are_pruned_on_publish() {
        let bus = InMemoryEventBus::new();
        drop(bus.subscribe(Topic::All));
        let live = bus.subscribe(Topic::All);

        assert_eq!(bus.publish(Msg("transfers.transfer", 1)).unwrap(), 1);
        assert_eq!(live.next(Duration::from_millis(10)), Some(Msg("transfers.transfer", 1)));
        assert_eq!(bus.subscribers.lock().unwrap().len(), 1);
    }

    #[test]
    fn next_times_out_when_nothing_was_published() {
        let bus: InMemoryEventBus<Msg> = InMemoryEventBus::new();
        let sub = bus.subscribe(Topic::All);
        assert_eq!(sub.next(Duration::from_millis(5)), None);
    }
}
