//! Broadcast bridge to async consumers.
//!
//! [`EventBus`] wraps a [`tokio::sync::broadcast`] channel. Attaching it to
//! a [`Publisher`], [`Network`] or [`Client`] registers a subscriber that
//! forwards every delivery into the channel, so async tasks can `recv()`
//! what synchronous subscribers see.

use std::fmt;
use std::hash::Hash;

use tokio::sync::broadcast;

use super::{Client, KeyedEvent, Network, Publisher, Unsubscribe};
use crate::config::FanoutConfig;

/// Broadcast bus for items of type `T`.
///
/// Backed by a `tokio::broadcast` channel with a configurable capacity.
/// When the ring buffer is full, the oldest items are dropped for lagging
/// receivers. Forwarding never fails the synchronous publish: with no
/// receivers the item is silently dropped.
#[derive(Clone)]
pub struct EventBus<T> {
    sender: broadcast::Sender<T>,
}

impl<T> fmt::Debug for EventBus<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("receiver_count", &self.sender.receiver_count())
            .finish()
    }
}

impl<T> EventBus<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates a new `EventBus` with the given channel capacity (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Creates a bus sized by [`FanoutConfig::bus_capacity`].
    #[must_use]
    pub fn from_config(config: &FanoutConfig) -> Self {
        Self::new(config.bus_capacity)
    }

    /// Sends `item` to all receivers.
    ///
    /// Returns the number of receivers that received it; 0 if there are
    /// none.
    pub fn publish(&self, item: T) -> usize {
        self.sender.send(item).unwrap_or(0)
    }

    /// Creates a new receiver that will receive all future items.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.sender.subscribe()
    }

    /// Returns the current number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Forwards every payload delivered by `publisher` into this bus.
    pub fn attach(&self, publisher: &Publisher<T>) -> Unsubscribe {
        let sender = self.sender.clone();
        publisher.subscribe(move |payload: &T| {
            let _ = sender.send(payload.clone());
        })
    }
}

impl<K, P> EventBus<KeyedEvent<K, P>>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    P: Clone + Send + Sync + 'static,
{
    /// Forwards every follower notification of `network` as a
    /// [`KeyedEvent`]. The returned token detaches the bus.
    pub fn follow_network(&self, network: &Network<K, P>) -> Unsubscribe {
        self.forward_followers(network.followers())
    }

    /// Forwards every follower notification of `client` as a
    /// [`KeyedEvent`]. The returned token detaches the bus.
    pub fn follow_client(&self, client: &Client<K, P>) -> Unsubscribe {
        self.forward_followers(client.followers())
    }

    fn forward_followers(&self, followers: &Publisher<(K, P)>) -> Unsubscribe {
        let sender = self.sender.clone();
        followers.subscribe(move |(key, payload): &(K, P)| {
            let _ = sender.send(KeyedEvent::now(key.clone(), payload.clone()));
        })
    }
}
