//! Serializable envelope for follower notifications.
//!
//! Registries hand `(key, payload)` to followers by reference. When those
//! notifications leave the synchronous world (see [`super::EventBus`]) they
//! are wrapped in a [`KeyedEvent`] that owns its data and records when the
//! notification happened.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::FanoutError;

/// A `(key, payload)` notification with its delivery timestamp.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyedEvent<K, P> {
    /// Key the payload was published or set under.
    pub key: K,
    /// Published payload or stored value.
    pub payload: P,
    /// When the registry delivered the notification.
    pub timestamp: DateTime<Utc>,
}

impl<K, P> KeyedEvent<K, P> {
    /// Wraps a notification, stamping it with the current time.
    #[must_use]
    pub fn now(key: K, payload: P) -> Self {
        Self {
            key,
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Consumes the envelope, returning `(key, payload)`.
    #[must_use]
    pub fn into_parts(self) -> (K, P) {
        (self.key, self.payload)
    }
}

impl<K: Serialize, P: Serialize> KeyedEvent<K, P> {
    /// Renders the event as a JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`FanoutError::Serialization`] if the key or payload fails to
    /// serialize (for example a map keyed by non-strings).
    pub fn to_json(&self) -> Result<String, FanoutError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn now_stamps_current_time() {
        let before = Utc::now();
        let event = KeyedEvent::now("likes", 3_u32);
        assert!(event.timestamp >= before);
        assert_eq!(event.into_parts(), ("likes", 3));
    }

    #[test]
    fn serializes_key_payload_and_timestamp() {
        let event = KeyedEvent::now("likes".to_string(), vec![1, 2]);
        let Ok(json) = event.to_json() else {
            panic!("serialization failed");
        };
        assert!(json.contains("\"key\":\"likes\""));
        assert!(json.contains("\"payload\":[1,2]"));
        assert!(json.contains("\"timestamp\""));
    }
}
