//! Domain layer: fan-out primitives and keyed registries.
//!
//! Leaf-first: [`Dictionary`] is the ordered key table, [`Publisher`] the
//! fan-out channel, [`Store`] a retained value on top of a publisher, and
//! [`Network`]/[`Client`] multiplex publishers/stores by key. [`EventBus`]
//! bridges deliveries into a tokio broadcast channel.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod client;
pub mod dictionary;
pub mod event_bus;
pub mod keyed_event;
pub mod network;
pub mod publisher;
pub mod store;
pub mod subscription_id;
pub mod unsubscribe;

pub use client::Client;
pub use dictionary::Dictionary;
pub use event_bus::EventBus;
pub use keyed_event::KeyedEvent;
pub use network::Network;
pub use publisher::Publisher;
pub use store::Store;
pub use subscription_id::SubscriptionId;
pub use unsubscribe::Unsubscribe;

/// Locks `mutex`, recovering the data if a previous holder panicked.
///
/// No data lock in this crate is held while user callbacks run (only the
/// reentrant delivery gate is), and every critical section leaves its data
/// consistent, so a poisoned lock carries no broken invariant.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
