//! Keyed event registry.
//!
//! [`Network`] multiplexes one [`Publisher`] per key behind a single
//! façade, plus a followers publisher that sees every publish regardless
//! of key. Per-key publishers are created lazily by `subscribe` and never
//! by `publish`.

use std::fmt;
use std::hash::Hash;
use std::sync::Mutex;

use super::{Dictionary, Publisher, Unsubscribe, lock};
use crate::config::{FanoutConfig, FaultPolicy};
use crate::error::FanoutError;

/// Map of key → publisher with registry-wide followers.
///
/// # Ordering
///
/// For one `publish(key, payload)` every subscriber of `key` runs before
/// any follower.
///
/// # Concurrency
///
/// The key table is guarded by a mutex so that get-or-create for a key is
/// atomic: concurrent first subscribes on the same key share one
/// publisher, and a subscription is registered before the mutex is
/// released. The mutex is never held while a callback runs.
pub struct Network<K, P> {
    channels: Mutex<Dictionary<K, Publisher<P>>>,
    followers: Publisher<(K, P)>,
    policy: FaultPolicy,
}

impl<K, P> fmt::Debug for Network<K, P>
where
    K: fmt::Debug + Eq + Hash + Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let channels = lock(&self.channels);
        f.debug_struct("Network")
            .field("keys", &channels.keys().collect::<Vec<_>>())
            .field("followers", &self.followers)
            .field("policy", &self.policy)
            .finish()
    }
}

impl<K, P> Network<K, P>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    P: Send + Sync + 'static,
{
    /// Creates an empty registry with the default fault policy.
    #[must_use]
    pub fn new() -> Self {
        Self::with_policy(FaultPolicy::default())
    }

    /// Creates an empty registry from configuration.
    #[must_use]
    pub fn with_config(config: &FanoutConfig) -> Self {
        Self::with_policy(config.fault_policy)
    }

    /// Creates an empty registry whose publishers use `policy`.
    #[must_use]
    pub fn with_policy(policy: FaultPolicy) -> Self {
        Self {
            channels: Mutex::new(Dictionary::new()),
            followers: Publisher::with_policy(policy),
            policy,
        }
    }

    /// Subscribes `callback` to `key`, creating the key's publisher if
    /// needed.
    pub fn subscribe<F>(&self, key: K, callback: F) -> Unsubscribe
    where
        F: Fn(&P) + Send + Sync + 'static,
    {
        self.with_channel(key, |channel| channel.subscribe(callback))
    }

    /// Subscribes a fallible callback to `key`.
    pub fn try_subscribe<F>(&self, key: K, callback: F) -> Unsubscribe
    where
        F: Fn(&P) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.with_channel(key, |channel| channel.try_subscribe(callback))
    }

    /// Registers a follower, called with `(key, payload)` on every publish
    /// after that key's own subscribers.
    pub fn follow<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(&K, &P) + Send + Sync + 'static,
    {
        self.followers
            .subscribe(move |(key, payload): &(K, P)| callback(key, payload))
    }

    /// Delivers `payload` to the subscribers of `key` (if the key has ever
    /// been subscribed to), then to every follower.
    ///
    /// Publishing to an unknown key creates nothing and still notifies
    /// followers.
    ///
    /// # Errors
    ///
    /// Returns [`FanoutError::SubscriberFaults`] with the faults of both
    /// stages. Under [`FaultPolicy::FailFast`] a per-key fault is returned
    /// before followers are notified.
    pub fn publish(&self, key: &K, payload: P) -> Result<(), FanoutError> {
        let channel = lock(&self.channels).get(key).cloned();

        let mut faults = Vec::new();
        match channel {
            Some(channel) => {
                if let Err(err) = channel.publish(&payload) {
                    if self.policy.stops_on_fault() {
                        return Err(err);
                    }
                    faults.extend(err.into_faults());
                }
            }
            None => tracing::trace!(?key, "publish to key without subscribers"),
        }

        let event = (key.clone(), payload);
        if let Err(err) = self.followers.publish(&event) {
            faults.extend(err.into_faults());
        }
        FanoutError::from_faults(faults)
    }

    /// Removes the subscribers of `key` only. Other keys and followers are
    /// untouched; the key stays registered.
    pub fn clear(&self, key: &K) {
        let channel = lock(&self.channels).get(key).cloned();
        if let Some(channel) = channel {
            channel.clear();
        }
    }

    /// Discards every key's publisher and removes every follower.
    pub fn full_clear(&self) {
        let discarded = {
            let mut channels = lock(&self.channels);
            let count = channels.len();
            channels.clear();
            count
        };
        self.followers.clear();
        tracing::info!(keys = discarded, "network cleared");
    }

    /// Returns `true` if a publisher exists for `key`.
    #[must_use]
    pub fn has(&self, key: &K) -> bool {
        lock(&self.channels).has(key)
    }

    /// Registered keys, in the order they were first subscribed to.
    #[must_use]
    pub fn keys(&self) -> Vec<K> {
        lock(&self.channels).keys().cloned().collect()
    }

    /// Number of registered keys.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.channels).len()
    }

    /// Returns `true` if no key has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.channels).is_empty()
    }

    /// Number of subscribers of `key` (0 for unknown keys).
    #[must_use]
    pub fn subscriber_count(&self, key: &K) -> usize {
        lock(&self.channels)
            .get(key)
            .map_or(0, Publisher::subscriber_count)
    }

    /// Number of followers.
    #[must_use]
    pub fn follower_count(&self) -> usize {
        self.followers.subscriber_count()
    }

    /// Runs `f` on the publisher for `key`, creating it if absent. The
    /// registry lock is held throughout so a concurrent `full_clear` cannot
    /// discard the publisher under `f`.
    fn with_channel<R>(&self, key: K, f: impl FnOnce(&Publisher<P>) -> R) -> R {
        let mut channels = lock(&self.channels);
        if !channels.has(&key) {
            tracing::debug!(?key, "creating channel");
        }
        let policy = self.policy;
        f(channels.get_or_insert_with(key, || Publisher::with_policy(policy)))
    }

    pub(crate) fn followers(&self) -> &Publisher<(K, P)> {
        &self.followers
    }
}

impl<K, P> Default for Network<K, P>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    P: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
