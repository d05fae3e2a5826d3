//! Synthetic subscription identifier.
//!
//! [`SubscriptionId`] is a newtype wrapper around a `u64` drawn from a
//! process-wide monotonic counter. Publishers key their subscriber maps by
//! it, so registering the same callback twice yields two independent
//! registrations, and ordering by id is ordering by registration time.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier of one subscriber registration.
///
/// Generated once at subscribe time and immutable thereafter. Used as the
/// key of a publisher's subscriber map, carried by the [`super::Unsubscribe`]
/// token, and reported in [`crate::error::SubscriberFault`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Allocates the next identifier. Strictly greater than every id
    /// allocated before it in this process.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Wraps a raw value. Does not reserve it; intended for tests and
    /// deserialized reports.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<SubscriptionId> for u64 {
    fn from(id: SubscriptionId) -> Self {
        id.0
    }
}
