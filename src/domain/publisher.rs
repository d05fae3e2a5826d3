//! Synchronous fan-out channel.
//!
//! [`Publisher`] keeps an ordered table of subscriber callbacks keyed by
//! [`SubscriptionId`]. `publish` takes a snapshot of that table and invokes
//! every callback in registration order on the caller's thread.
//!
//! # Rules
//! - **Snapshot iteration**: a publish notifies exactly the subscribers
//!   present when it began. Subscribing or unsubscribing from inside a
//!   callback only affects later publishes.
//! - **No table lock during delivery**: the table lock is released before
//!   the first callback runs, so callbacks may publish, subscribe or
//!   unsubscribe on the same publisher.
//! - **Serialized delivery**: a reentrant per-publisher gate is held for
//!   the whole of a publish. Publishes from different threads deliver one
//!   after the other; a publish nested inside a callback on the same
//!   thread re-enters the gate.
//! - **Fault isolation**: each callback runs under `catch_unwind`. Errors
//!   and panics become [`SubscriberFault`]s, handled according to the
//!   publisher's [`FaultPolicy`].

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, PoisonError, Weak};
use std::thread::{self, ThreadId};

use super::unsubscribe::Detach;
use super::{SubscriptionId, Unsubscribe, lock};
use crate::config::FaultPolicy;
use crate::error::{FanoutError, SubscriberFault};

/// Type-erased subscriber callback.
pub(crate) type Callback<P> = Arc<dyn Fn(&P) -> anyhow::Result<()> + Send + Sync>;

/// Subscriber table shared between a publisher and its clones.
struct Subscribers<P> {
    callbacks: BTreeMap<SubscriptionId, Callback<P>>,
}

impl<P: 'static> Detach for Mutex<Subscribers<P>> {
    fn detach(&self, id: SubscriptionId) -> bool {
        lock(self).callbacks.remove(&id).is_some()
    }

    fn contains(&self, id: SubscriptionId) -> bool {
        lock(self).callbacks.contains_key(&id)
    }
}

/// Reentrant lock serializing deliveries of one publisher across threads.
#[derive(Debug, Default)]
pub(crate) struct DeliveryGate {
    holder: Mutex<GateHolder>,
    released: Condvar,
}

#[derive(Debug, Default)]
struct GateHolder {
    owner: Option<ThreadId>,
    depth: usize,
}

impl DeliveryGate {
    /// Blocks until no other thread holds the gate, then takes it.
    pub(crate) fn enter(&self) -> DeliveryGuard<'_> {
        let me = thread::current().id();
        let mut holder = lock(&self.holder);
        while holder.owner.is_some_and(|owner| owner != me) {
            holder = self
                .released
                .wait(holder)
                .unwrap_or_else(PoisonError::into_inner);
        }
        holder.owner = Some(me);
        holder.depth += 1;
        DeliveryGuard { gate: self }
    }
}

/// Held while a thread delivers; released on drop.
#[derive(Debug)]
pub(crate) struct DeliveryGuard<'a> {
    gate: &'a DeliveryGate,
}

impl Drop for DeliveryGuard<'_> {
    fn drop(&mut self) {
        let mut holder = lock(&self.gate.holder);
        holder.depth = holder.depth.saturating_sub(1);
        if holder.depth == 0 {
            holder.owner = None;
            self.gate.released.notify_one();
        }
    }
}

/// Fan-out channel delivering `&P` to every subscriber.
///
/// Cloning a `Publisher` creates a new handle to the **same** subscriber
/// table.
///
/// # Invariants
///
/// 1. Subscribers are notified in registration order.
/// 2. An [`Unsubscribe`] token removes exactly the registration it was
///    returned for, and only once.
/// 3. The same callback subscribed twice is delivered to twice.
/// 4. Two publishes never interleave their deliveries, even from
///    different threads. A callback that waits on another thread
///    publishing to the same publisher will deadlock.
pub struct Publisher<P> {
    subscribers: Arc<Mutex<Subscribers<P>>>,
    gate: Arc<DeliveryGate>,
    policy: FaultPolicy,
}

impl<P> Clone for Publisher<P> {
    fn clone(&self) -> Self {
        Self {
            subscribers: Arc::clone(&self.subscribers),
            gate: Arc::clone(&self.gate),
            policy: self.policy,
        }
    }
}

impl<P> fmt::Debug for Publisher<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("subscriber_count", &lock(&self.subscribers).callbacks.len())
            .field("policy", &self.policy)
            .finish()
    }
}

impl<P: 'static> Publisher<P> {
    /// Creates a publisher with no subscribers and the default
    /// [`FaultPolicy::Isolate`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_policy(FaultPolicy::default())
    }

    /// Creates a publisher with the given fault policy.
    #[must_use]
    pub fn with_policy(policy: FaultPolicy) -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Subscribers {
                callbacks: BTreeMap::new(),
            })),
            gate: Arc::new(DeliveryGate::default()),
            policy,
        }
    }

    /// Fault policy applied by [`Self::publish`].
    #[must_use]
    pub const fn policy(&self) -> FaultPolicy {
        self.policy
    }

    /// Registers `callback` and returns the token that removes it.
    pub fn subscribe<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(&P) + Send + Sync + 'static,
    {
        self.register(Arc::new(move |payload: &P| -> anyhow::Result<()> {
            callback(payload);
            Ok(())
        }))
    }

    /// Registers a fallible callback. An `Err` returned by it is reported
    /// as a [`SubscriberFault`] of kind `Error`.
    pub fn try_subscribe<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(&P) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register(Arc::new(callback))
    }

    pub(crate) fn register(&self, callback: Callback<P>) -> Unsubscribe {
        let id = SubscriptionId::next();
        lock(&self.subscribers).callbacks.insert(id, callback);
        let source: Weak<dyn Detach> = Arc::downgrade(&self.subscribers) as Weak<dyn Detach>;
        Unsubscribe::new(id, source)
    }

    /// Delivers `payload` to every subscriber registered when the call
    /// begins, in registration order.
    ///
    /// # Errors
    ///
    /// Returns [`FanoutError::SubscriberFaults`] if any subscriber returned
    /// an error or panicked. With [`FaultPolicy::Isolate`] every subscriber
    /// has still been called; with [`FaultPolicy::FailFast`] delivery
    /// stopped at the reported fault.
    pub fn publish(&self, payload: &P) -> Result<(), FanoutError> {
        let _delivery = self.gate.enter();
        let snapshot: Vec<(SubscriptionId, Callback<P>)> = lock(&self.subscribers)
            .callbacks
            .iter()
            .map(|(id, callback)| (*id, Arc::clone(callback)))
            .collect();

        let mut faults = Vec::new();
        for (id, callback) in snapshot {
            let Some(fault) = invoke(id, &callback, payload) else {
                continue;
            };
            tracing::warn!(
                subscription = %fault.subscription,
                kind = %fault.kind,
                message = %fault.message,
                "subscriber failed"
            );
            faults.push(fault);
            if self.policy.stops_on_fault() {
                break;
            }
        }
        FanoutError::from_faults(faults)
    }

    /// Takes this publisher's delivery gate. Publishing while holding it
    /// re-enters the gate, so a caller can order a write before the
    /// delivery it triggers.
    pub(crate) fn enter_delivery(&self) -> DeliveryGuard<'_> {
        self.gate.enter()
    }

    /// Removes every subscriber. Outstanding tokens become no-ops.
    pub fn clear(&self) {
        lock(&self.subscribers).callbacks.clear();
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).callbacks.len()
    }

    /// Returns `true` if nobody is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.subscribers).callbacks.is_empty()
    }
}

impl<P: 'static> Default for Publisher<P> {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs one callback, turning an error or a panic into a fault.
fn invoke<P>(id: SubscriptionId, callback: &Callback<P>, payload: &P) -> Option<SubscriberFault> {
    match panic::catch_unwind(AssertUnwindSafe(|| callback(payload))) {
        Ok(Ok(())) => None,
        Ok(Err(error)) => Some(SubscriberFault::from_error(id, &error)),
        Err(panic) => Some(SubscriberFault::from_panic(id, &*panic)),
    }
}
