//! In-process publish sinks.
//!
//! Each subscriber gets its own bounded channel, so every subscriber sees
//! every message until its channel fills up. Publishing never blocks.

use std::sync::Mutex;

use flume::{Receiver, Sender, TrySendError};
use tracing::debug;

use crate::error::PublishError;
use crate::utils::lock;

#[derive(Debug)]
pub struct Topic<T> {
    name: String,
    depth: usize,
    subscribers: Mutex<Vec<Sender<T>>>,
}

impl<T: Clone> Topic<T> {
    /// A topic whose subscribers each buffer up to `depth` messages
    pub fn new(name: impl Into<String>, depth: usize) -> Self {
        Self {
            name: name.into(),
            depth: depth.max(1),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subscribe(&self) -> Receiver<T> {
        let (tx, rx) = flume::bounded(self.depth);
        lock(&self.subscribers).push(tx);
        rx
    }

    /// Live subscribers; dropped receivers are forgotten here
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = lock(&self.subscribers);
        subscribers.retain(|tx| !tx.is_disconnected());
        subscribers.len()
    }

    /// Send `msg` to every subscriber with room for it. Returns how many
    /// received it.
    pub fn publish(&self, msg: T) -> Result<usize, PublishError> {
        let mut subscribers = lock(&self.subscribers);
        subscribers.retain(|tx| !tx.is_disconnected());
        if subscribers.is_empty() {
            return Err(PublishError::Disconnected(self.name.clone()));
        }

        let mut delivered = 0;
        for tx in subscribers.iter() {
            match tx.try_send(msg.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => debug!("{}: subscriber queue full", self.name),
                Err(TrySendError::Disconnected(_)) => {}
            }
        }
        if delivered == 0 {
            return Err(PublishError::SinkFull(self.name.clone()));
        }
        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fan_out_to_every_subscriber() {
        let topic = Topic::new("t", 4);
        let a = topic.subscribe();
        let b = topic.subscribe();
        assert_eq!(topic.publish(1).unwrap(), 2);
        assert_eq!(a.try_recv().unwrap(), 1);
        assert_eq!(b.try_recv().unwrap(), 1);
    }

    #[test]
    fn dropped_subscribers_are_not_counted() {
        let topic = Topic::<u8>::new("t", 1);
        assert_eq!(topic.subscriber_count(), 0);
        let rx = topic.subscribe();
        assert_eq!(topic.subscriber_count(), 1);
        drop(rx);
        assert_eq!(topic.subscriber_count(), 0);
        assert_eq!(topic.publish(1), Err(PublishError::Disconnected("t".into())));
    }

    #[test]
    fn full_subscriber_does_not_block() {
        let topic = Topic::new("t", 1);
        let _rx = topic.subscribe();
        topic.publish(1).unwrap();
        assert_eq!(topic.publish(2), Err(PublishError::SinkFull("t".into())));
    }
}
