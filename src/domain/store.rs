//! Single retained value with change notification.
//!
//! [`Store<T>`] pairs an `Option<T>` slot with a [`Publisher<T>`]. `set`
//! overwrites the slot and then publishes the new value; subscribing does
//! not replay the current value.
//!
//! Unlike an equality-gated observable, every `set` notifies, including a
//! `set` that writes a value equal to the current one.

use std::fmt;
use std::sync::{Arc, Mutex};

use super::publisher::DeliveryGuard;
use super::{Publisher, Unsubscribe, lock};
use crate::config::FaultPolicy;
use crate::error::FanoutError;

/// Shared, optionally-unset value with subscribers.
///
/// Cloning a `Store` creates a new handle to the **same** value and
/// subscribers.
///
/// # Invariants
///
/// 1. `get()` is `None` until the first `set` (or unless built with a
///    value).
/// 2. The slot is written before any subscriber of that `set` runs, so a
///    subscriber calling `get()` observes the value it was handed.
/// 3. Clearing subscribers never touches the value.
/// 4. Concurrent `set`s deliver in the order they wrote, so the last value
///    a subscriber receives is the value `get()` returns.
pub struct Store<T> {
    value: Arc<Mutex<Option<T>>>,
    publisher: Publisher<T>,
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            publisher: self.publisher.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("value", &*lock(&self.value))
            .field("publisher", &self.publisher)
            .finish()
    }
}

impl<T> Store<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates an unset store.
    #[must_use]
    pub fn new() -> Self {
        Self::with_policy(None, FaultPolicy::default())
    }

    /// Creates a store already holding `value`.
    #[must_use]
    pub fn with_value(value: T) -> Self {
        Self::with_policy(Some(value), FaultPolicy::default())
    }

    /// Creates a store with an optional initial value and a fault policy
    /// for its subscribers.
    #[must_use]
    pub fn with_policy(initial: Option<T>, policy: FaultPolicy) -> Self {
        Self {
            value: Arc::new(Mutex::new(initial)),
            publisher: Publisher::with_policy(policy),
        }
    }

    /// Returns a clone of the current value, or `None` if never set.
    #[must_use]
    pub fn get(&self) -> Option<T> {
        lock(&self.value).clone()
    }

    /// Access the current value by reference without cloning.
    ///
    /// The lock is held while `f` runs; `f` must not call back into this
    /// store.
    pub fn with<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        f(lock(&self.value).as_ref())
    }

    /// Returns `true` once a value has been set.
    #[must_use]
    pub fn is_set(&self) -> bool {
        lock(&self.value).is_some()
    }

    /// Overwrites the value, then delivers it to every subscriber.
    ///
    /// # Errors
    ///
    /// Returns [`FanoutError::SubscriberFaults`] if a subscriber failed.
    /// The value is stored regardless.
    pub fn set(&self, value: T) -> Result<(), FanoutError> {
        let _delivery = self.publisher.enter_delivery();
        self.write(value.clone());
        self.publisher.publish(&value)
    }

    /// Overwrites the value without notifying anyone.
    pub(crate) fn write(&self, value: T) {
        *lock(&self.value) = Some(value);
    }

    /// Delivery gate of this store's publisher. Holding it across a
    /// [`Self::write`] and [`Self::publish`] keeps writes and deliveries in
    /// the same order across threads.
    pub(crate) fn enter_delivery(&self) -> DeliveryGuard<'_> {
        self.publisher.enter_delivery()
    }

    /// Delivers `value` to subscribers without storing it.
    pub(crate) fn publish(&self, value: &T) -> Result<(), FanoutError> {
        self.publisher.publish(value)
    }

    /// Returns `true` if both handles share the same value slot.
    pub(crate) fn same_store(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }

    /// Registers `callback` for future `set` calls.
    pub fn subscribe<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.publisher.subscribe(callback)
    }

    /// Registers a fallible callback for future `set` calls.
    pub fn try_subscribe<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.publisher.try_subscribe(callback)
    }

    /// Removes every subscriber; the value is kept.
    pub fn clear(&self) {
        self.publisher.clear();
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.publisher.subscriber_count()
    }
}

impl<T> Default for Store<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
