//! Keyed cell registry.
//!
//! [`Client`] multiplexes one [`Store`] per key behind a single façade,
//! plus a followers publisher carrying `(key, value)` on every `set`.

use std::fmt;
use std::hash::Hash;
use std::sync::Mutex;

use super::{Dictionary, Publisher, Store, Unsubscribe, lock};
use crate::config::{FanoutConfig, FaultPolicy};
use crate::error::FanoutError;

/// Map of key → store with registry-wide followers.
///
/// # Lifecycle
///
/// A key's store is created by the first `set` (already holding the value)
/// or the first `subscribe` (unset), and lives until [`Client::full_clear`].
/// [`Client::clear`] removes a key's subscribers but keeps its value.
///
/// # Ordering
///
/// For one `set(key, value)` every subscriber of `key` runs before any
/// follower. Concurrent sets of one key deliver to its subscribers in the
/// order they wrote.
pub struct Client<K, V> {
    stores: Mutex<Dictionary<K, Store<V>>>,
    followers: Publisher<(K, V)>,
    policy: FaultPolicy,
}

impl<K, V> fmt::Debug for Client<K, V>
where
    K: fmt::Debug + Eq + Hash + Clone,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stores = lock(&self.stores);
        f.debug_struct("Client")
            .field("stores", &stores.entries().collect::<Vec<_>>())
            .field("followers", &self.followers)
            .field("policy", &self.policy)
            .finish()
    }
}

impl<K, V> Client<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
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

    /// Creates an empty registry whose stores use `policy`.
    #[must_use]
    pub fn with_policy(policy: FaultPolicy) -> Self {
        Self {
            stores: Mutex::new(Dictionary::new()),
            followers: Publisher::with_policy(policy),
            policy,
        }
    }

    /// Current value of `key`, or `None` if it was never set.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        let store = lock(&self.stores).get(key).cloned();
        store.and_then(|store| store.get())
    }

    /// Stores `value` under `key` and notifies the key's subscribers, then
    /// every follower.
    ///
    /// The first `set` of a key creates its store holding `value` directly;
    /// nobody can be subscribed to it yet, so only followers run.
    ///
    /// # Errors
    ///
    /// Returns [`FanoutError::SubscriberFaults`] with the faults of both
    /// stages. The value is stored regardless. Under
    /// [`FaultPolicy::FailFast`] a per-key fault is returned before
    /// followers are notified.
    pub fn set(&self, key: K, value: V) -> Result<(), FanoutError> {
        let mut faults = Vec::new();
        while let Some(store) = self.existing_or_create(&key, &value) {
            let _delivery = store.enter_delivery();
            if !self.write_if_registered(&key, &store, &value) {
                tracing::debug!(?key, "store discarded during set, retrying");
                continue;
            }
            if let Err(err) = store.publish(&value) {
                if self.policy.stops_on_fault() {
                    return Err(err);
                }
                faults.extend(err.into_faults());
            }
            break;
        }

        let event = (key, value);
        if let Err(err) = self.followers.publish(&event) {
            faults.extend(err.into_faults());
        }
        FanoutError::from_faults(faults)
    }

    /// Subscribes `callback` to future sets of `key`, creating an unset
    /// store if needed. The current value is not replayed.
    pub fn subscribe<F>(&self, key: K, callback: F) -> Unsubscribe
    where
        F: Fn(&V) + Send + Sync + 'static,
    {
        self.with_store(key, |store| store.subscribe(callback))
    }

    /// Subscribes a fallible callback to future sets of `key`.
    pub fn try_subscribe<F>(&self, key: K, callback: F) -> Unsubscribe
    where
        F: Fn(&V) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.with_store(key, |store| store.try_subscribe(callback))
    }

    /// Registers a follower, called with `(key, value)` on every `set`
    /// after that key's own subscribers.
    pub fn follow<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(&K, &V) + Send + Sync + 'static,
    {
        self.followers
            .subscribe(move |(key, value): &(K, V)| callback(key, value))
    }

    /// Removes the subscribers of `key`; its value is kept.
    pub fn clear(&self, key: &K) {
        let store = lock(&self.stores).get(key).cloned();
        if let Some(store) = store {
            store.clear();
        }
    }

    /// Discards every store (values included) and removes every follower.
    pub fn full_clear(&self) {
        let discarded = {
            let mut stores = lock(&self.stores);
            let count = stores.len();
            stores.clear();
            count
        };
        self.followers.clear();
        tracing::info!(keys = discarded, "client cleared");
    }

    /// Returns `true` if a store exists for `key` (set or subscribed).
    #[must_use]
    pub fn has(&self, key: &K) -> bool {
        lock(&self.stores).has(key)
    }

    /// Registered keys, in creation order.
    #[must_use]
    pub fn keys(&self) -> Vec<K> {
        lock(&self.stores).keys().cloned().collect()
    }

    /// `(key, value)` for every key holding a value, in creation order.
    /// Keys that were only subscribed to are skipped.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(K, V)> {
        let stores = lock(&self.stores);
        let mut out = Vec::with_capacity(stores.len());
        stores.for_each(|store, key| {
            if let Some(value) = store.get() {
                out.push((key.clone(), value));
            }
        });
        out
    }

    /// Number of registered keys.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.stores).len()
    }

    /// Returns `true` if no key has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.stores).is_empty()
    }

    /// Number of subscribers of `key` (0 for unknown keys).
    #[must_use]
    pub fn subscriber_count(&self, key: &K) -> usize {
        lock(&self.stores)
            .get(key)
            .map_or(0, Store::subscriber_count)
    }

    /// Number of followers.
    #[must_use]
    pub fn follower_count(&self) -> usize {
        self.followers.subscriber_count()
    }

    /// Runs `f` on the store for `key`, creating an unset one if absent.
    /// The registry lock is held throughout, so a concurrent
    /// [`Self::full_clear`] cannot discard the store under `f`.
    fn with_store<R>(&self, key: K, f: impl FnOnce(&Store<V>) -> R) -> R {
        let mut stores = lock(&self.stores);
        if !stores.has(&key) {
            tracing::debug!(?key, "creating store from subscribe");
        }
        let policy = self.policy;
        f(stores.get_or_insert_with(key, || Store::with_policy(None, policy)))
    }

    /// Returns the registered store for `key`. An absent key gets a new
    /// store already holding `value` and yields `None`.
    fn existing_or_create(&self, key: &K, value: &V) -> Option<Store<V>> {
        let mut stores = lock(&self.stores);
        if let Some(store) = stores.get(key) {
            return Some(store.clone());
        }
        tracing::debug!(?key, "creating store from set");
        stores.set(
            key.clone(),
            Store::with_policy(Some(value.clone()), self.policy),
        );
        None
    }

    /// Writes `value` into `store` if it is still the one registered under
    /// `key`. Returns `false` if a `full_clear` discarded it.
    fn write_if_registered(&self, key: &K, store: &Store<V>, value: &V) -> bool {
        let stores = lock(&self.stores);
        match stores.get(key) {
            Some(current) if current.same_store(store) => {
                store.write(value.clone());
                true
            }
            _ => false,
        }
    }

    pub(crate) fn followers(&self) -> &Publisher<(K, V)> {
        &self.followers
    }
}

impl<K, V> Default for Client<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::test_support::Recorder;
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn get_before_set_is_none() {
        let client: Client<&str, u32> = Client::new();
        assert_eq!(client.get(&"likes"), None);
        assert!(!client.has(&"likes"));
    }

    #[test]
    fn set_then_get_then_subscribe() {
        let client = Client::new();
        assert_ok!(client.set("likes", 10));
        assert_eq!(client.get(&"likes"), Some(10));

        let rec = Recorder::new();
        let sink = rec.sink();
        client.subscribe("likes", move |v: &u32| sink(*v));
        assert_ok!(client.set("likes", 11));

        assert_eq!(rec.snapshot(), vec![11]);
        assert_eq!(client.get(&"likes"), Some(11));
    }

    #[test]
    fn subscribe_first_creates_unset_store() {
        let client: Client<&str, u32> = Client::new();
        client.subscribe("k", |_| {});
        assert!(client.has(&"k"));
        assert_eq!(client.get(&"k"), None);
        assert!(client.snapshot().is_empty());
    }

    #[test]
    fn first_set_notifies_followers_only() {
        let client: Client<&str, u32> = Client::new();
        let rec = Recorder::new();
        let sink = rec.sink();
        client.follow(move |k, v| sink((*k, *v)));

        assert_ok!(client.set("k", 1));
        assert_eq!(rec.snapshot(), vec![("k", 1)]);
    }

    #[test]
    fn subscribers_run_before_followers() {
        let client = Client::new();
        let rec = Recorder::new();
        let follower = rec.sink();
        client.follow(move |_: &&str, v: &u32| follower(("follower", *v)));
        let subscriber = rec.sink();
        client.subscribe("k", move |v: &u32| subscriber(("subscriber", *v)));

        assert_ok!(client.set("k", 2));
        assert_eq!(rec.snapshot(), vec![("subscriber", 2), ("follower", 2)]);
    }

    #[test]
    fn clear_key_keeps_value_and_other_keys() {
        let client = Client::new();
        let rec = Recorder::new();
        let (a, b) = (rec.sink(), rec.sink());
        client.subscribe("a", move |v: &u32| a(("a", *v)));
        client.subscribe("b", move |v: &u32| b(("b", *v)));
        assert_ok!(client.set("a", 1));

        client.clear(&"a");
        assert_eq!(client.get(&"a"), Some(1));
        assert_eq!(client.subscriber_count(&"a"), 0);
        assert_eq!(client.subscriber_count(&"b"), 1);

        assert_ok!(client.set("a", 2));
        assert_ok!(client.set("b", 3));
        assert_eq!(rec.snapshot(), vec![("a", 1), ("b", 3)]);
        assert_eq!(client.get(&"a"), Some(2));
    }

    #[test]
    fn full_clear_drops_values_and_followers() {
        let client = Client::new();
        let rec = Recorder::new();
        let sink = rec.sink();
        client.follow(move |_: &&str, v: &u32| sink(*v));
        assert_ok!(client.set("a", 1));

        client.full_clear();
        assert!(client.is_empty());
        assert_eq!(client.get(&"a"), None);
        assert_eq!(client.follower_count(), 0);

        assert_ok!(client.set("a", 2));
        assert_eq!(rec.snapshot(), vec![1]);
    }

    #[test]
    fn snapshot_lists_set_values_in_creation_order() {
        let client = Client::new();
        assert_ok!(client.set("b", 2));
        client.subscribe("unset", |_: &u32| {});
        assert_ok!(client.set("a", 1));
        assert_ok!(client.set("b", 20));

        assert_eq!(client.snapshot(), vec![("b", 20), ("a", 1)]);
        assert_eq!(client.keys(), vec!["b", "unset", "a"]);
        assert_eq!(client.len(), 3);
    }

    #[test]
    fn store_is_created_once() {
        let client: Client<&str, u32> = Client::new();
        client.subscribe("k", |_| {});
        assert_ok!(client.set("k", 1));
        client.subscribe("k", |_| {});
        assert_eq!(client.len(), 1);
        assert_eq!(client.subscriber_count(&"k"), 2);
    }

    #[test]
    fn failing_subscriber_does_not_lose_value_or_followers() {
        let client: Client<&str, u32> = Client::new();
        let rec = Recorder::new();
        client.try_subscribe("k", |v| anyhow::bail!("cannot take {v}"));
        let sink = rec.sink();
        client.follow(move |k, v| sink((*k, *v)));

        let err = assert_err!(client.set("k", 5));
        assert_eq!(err.faults().len(), 1);
        assert_eq!(client.get(&"k"), Some(5));
        assert_eq!(rec.snapshot(), vec![("k", 5)]);
    }

    #[test]
    fn fail_fast_skips_followers() {
        let client: Client<&str, u32> = Client::with_policy(FaultPolicy::FailFast);
        let rec = Recorder::new();
        client.subscribe("k", |_| panic!("no"));
        let sink = rec.sink();
        client.follow(move |k, v| sink((*k, *v)));

        assert_err!(client.set("k", 5));
        assert_eq!(client.get(&"k"), Some(5));
        assert!(rec.snapshot().is_empty());
    }

    #[test]
    fn concurrent_first_subscribe_creates_one_store() {
        let client: Arc<Client<u8, u32>> = Arc::new(Client::new());
        let rec = Recorder::new();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let client = Arc::clone(&client);
            let sink = rec.sink();
            handles.push(thread::spawn(move || {
                client.subscribe(1, move |v: &u32| sink(*v));
            }));
        }
        for handle in handles {
            assert!(handle.join().is_ok());
        }

        assert_eq!(client.len(), 1);
        assert_eq!(client.subscriber_count(&1), 8);
        assert_ok!(client.set(1, 4));
        assert_eq!(rec.snapshot(), vec![4; 8]);
    }

    #[test]
    fn set_waiting_on_delivery_survives_full_clear() {
        let client: Arc<Client<&str, u32>> = Arc::new(Client::new());
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (entered_tx, release_rx) = (Mutex::new(entered_tx), Mutex::new(release_rx));
        client.subscribe("k", move |v| {
            if *v == 1 {
                let _ = lock(&entered_tx).send(());
                let _ = lock(&release_rx).recv();
            }
        });

        let first = {
            let client = Arc::clone(&client);
            thread::spawn(move || client.set("k", 1))
        };
        assert_ok!(entered_rx.recv());
        let second = {
            let client = Arc::clone(&client);
            thread::spawn(move || client.set("k", 2))
        };
        thread::sleep(Duration::from_millis(50));
        client.full_clear();
        assert_ok!(release_tx.send(()));

        for handle in [first, second] {
            let Ok(result) = handle.join() else {
                panic!("setting thread panicked");
            };
            assert_ok!(result);
        }
        assert_eq!(client.get(&"k"), Some(2));
        assert_eq!(client.len(), 1);
    }

    #[test]
    fn concurrent_sets_of_one_key_deliver_in_write_order() {
        let client: Arc<Client<&str, u32>> = Arc::new(Client::new());
        let last = Arc::new(Mutex::new(None));
        let (entered_tx, entered_rx) = mpsc::channel();
        let entered_tx = Mutex::new(entered_tx);
        let seen = Arc::clone(&last);
        client.subscribe("k", move |v| {
            if *v == 1 {
                let _ = lock(&entered_tx).send(());
                thread::sleep(Duration::from_millis(50));
            }
            *lock(&seen) = Some(*v);
        });

        let first = {
            let client = Arc::clone(&client);
            thread::spawn(move || client.set("k", 1))
        };
        assert_ok!(entered_rx.recv());
        let second = {
            let client = Arc::clone(&client);
            thread::spawn(move || client.set("k", 2))
        };
        for handle in [first, second] {
            let Ok(result) = handle.join() else {
                panic!("setting thread panicked");
            };
            assert_ok!(result);
        }

        assert_eq!(client.get(&"k"), Some(2));
        assert_eq!(*lock(&last), Some(2));
    }

    #[test]
    fn with_config_uses_fault_policy() {
        let config = FanoutConfig {
            fault_policy: FaultPolicy::FailFast,
            ..FanoutConfig::default()
        };
        let client: Client<&str, u32> = Client::with_config(&config);
        let dbg = format!("{client:?}");
        assert!(dbg.contains("FailFast"));
    }
}
