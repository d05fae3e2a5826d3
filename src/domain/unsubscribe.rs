//! Unsubscribe token returned by every `subscribe`/`follow` call.

use std::fmt;
use std::sync::Weak;

use super::SubscriptionId;

/// Something a registration can be removed from.
///
/// Implemented by a publisher's subscriber table; the token only keeps a
/// weak reference, so it never extends the publisher's lifetime.
pub(crate) trait Detach: Send + Sync {
    /// Removes `id`; returns `true` if it was still registered.
    fn detach(&self, id: SubscriptionId) -> bool;

    /// Returns `true` if `id` is currently registered.
    fn contains(&self, id: SubscriptionId) -> bool;
}

/// Handle that removes exactly one registration.
///
/// Calling [`Unsubscribe::unsubscribe`] more than once is a no-op, as is
/// calling it after the publisher was cleared or dropped. Dropping the
/// token does **not** unsubscribe.
#[derive(Clone)]
pub struct Unsubscribe {
    id: SubscriptionId,
    source: Weak<dyn Detach>,
}

impl Unsubscribe {
    pub(crate) fn new(id: SubscriptionId, source: Weak<dyn Detach>) -> Self {
        Self { id, source }
    }

    /// Removes the registration. Returns `true` only on the call that
    /// actually removed it.
    pub fn unsubscribe(&self) -> bool {
        let removed = self
            .source
            .upgrade()
            .is_some_and(|source| source.detach(self.id));
        if removed {
            tracing::trace!(subscription = %self.id, "unsubscribed");
        }
        removed
    }

    /// Identifier of the registration this token controls.
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Returns `true` while the registration is still in place.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.source
            .upgrade()
            .is_some_and(|source| source.contains(self.id))
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
