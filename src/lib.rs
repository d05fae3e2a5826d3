//! # keyed-fanout
//!
//! In-process typed publish/subscribe toolkit.
//!
//! This crate decouples producers of state changes from their consumers
//! without a messaging system: everything is synchronous, in-process and
//! typed through generics.
//!
//! ## Architecture
//!
//! ```text
//!   Dictionary<K, V>          ordered key table (internal building block)
//!        │
//!   Publisher<P>              fan-out: publish(&P) → every subscriber
//!        │
//!   Store<T>                  Option<T> slot + Publisher<T>
//!        │
//!   ┌────┴─────────────────────────────┐
//!   Network<K, P>                      Client<K, V>
//!   key → Publisher<P> (lazy)          key → Store<V> (lazy)
//!   + followers: (K, P)                + followers: (K, V)
//!        │                                  │
//!        └────────────► EventBus<T> ◄───────┘
//!                 (tokio broadcast bridge)
//! ```
//!
//! ## Delivery rules
//! - Callbacks run synchronously on the publishing thread, in
//!   registration order.
//! - A publish notifies the subscribers registered when it began
//!   (snapshot iteration).
//! - For a registry, a key's subscribers run before the followers.
//! - A failing subscriber (error or panic) does not stop delivery under
//!   the default [`FaultPolicy::Isolate`]; faults are returned together in
//!   [`FanoutError::SubscriberFaults`].
//! - "No value" is always `None`.
//!
//! ## Example
//! ```rust
//! use keyed_fanout::{Client, Network, Store};
//!
//! # fn main() -> Result<(), keyed_fanout::FanoutError> {
//! let network: Network<&str, i32> = Network::new();
//! let last: Store<i32> = Store::new();
//! let sink = last.clone();
//! let unsubscribe = network.try_subscribe("a", move |v| Ok(sink.set(*v)?));
//! network.publish(&"a", 5)?;
//! unsubscribe.unsubscribe();
//! network.publish(&"a", 6)?;
//! assert_eq!(last.get(), Some(5));
//!
//! let client: Client<&str, u32> = Client::new();
//! assert_eq!(client.get(&"likes"), None);
//! client.set("likes", 10)?;
//! assert_eq!(client.get(&"likes"), Some(10));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod domain;
pub mod error;

#[cfg(test)]
mod test_support;

pub use config::{FanoutConfig, FaultPolicy};
pub use domain::{
    Client, Dictionary, EventBus, KeyedEvent, Network, Publisher, Store, SubscriptionId,
    Unsubscribe,
};
pub use error::{FanoutError, FaultKind, SubscriberFault};
