//! Error types for delivery and configuration.
//!
//! [`FanoutError`] is the central error type of the crate. Delivery never
//! stops because one subscriber failed (unless [`FaultPolicy::FailFast`] is
//! selected); instead every failure is captured as a [`SubscriberFault`] and
//! the faults of one `publish`/`set` are returned together.
//!
//! [`FaultPolicy::FailFast`]: crate::config::FaultPolicy::FailFast

use std::any::Any;
use std::fmt;

use serde::Serialize;

use crate::domain::SubscriptionId;

/// How a subscriber failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// The callback returned an error.
    Error,
    /// The callback panicked; the panic was caught.
    Panic,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => f.write_str("error"),
            Self::Panic => f.write_str("panic"),
        }
    }
}

/// A single subscriber failure observed during delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("subscriber {subscription} failed ({kind}): {message}")]
pub struct SubscriberFault {
    /// Registration that failed.
    pub subscription: SubscriptionId,
    /// Whether the callback returned an error or panicked.
    pub kind: FaultKind,
    /// Rendered error or panic message.
    pub message: String,
}

impl SubscriberFault {
    /// Builds a fault from an error returned by a fallible callback.
    #[must_use]
    pub fn from_error(subscription: SubscriptionId, error: &anyhow::Error) -> Self {
        Self {
            subscription,
            kind: FaultKind::Error,
            message: format!("{error:#}"),
        }
    }

    /// Builds a fault from a caught panic payload.
    #[must_use]
    pub fn from_panic(subscription: SubscriptionId, payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self {
            subscription,
            kind: FaultKind::Panic,
            message,
        }
    }
}

/// Errors produced by this crate.
///
/// # Error Codes
///
/// | Code | Variant             |
/// |------|---------------------|
/// | 1001 | `SubscriberFaults`  |
/// | 2001 | `InvalidConfig`     |
/// | 2002 | `Serialization`     |
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum FanoutError {
    /// One or more subscribers failed while a payload was delivered.
    #[error("{} subscriber(s) failed during delivery", .0.len())]
    SubscriberFaults(Vec<SubscriberFault>),

    /// A configuration value could not be parsed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An event envelope could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FanoutError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::SubscriberFaults(_) => 1001,
            Self::InvalidConfig(_) => 2001,
            Self::Serialization(_) => 2002,
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    #[must_use]
    pub const fn as_label(&self) -> &'static str {
        match self {
            Self::SubscriberFaults(_) => "subscriber_faults",
            Self::InvalidConfig(_) => "invalid_config",
            Self::Serialization(_) => "serialization",
        }
    }

    /// Returns the subscriber faults carried by this error, if any.
    #[must_use]
    pub fn faults(&self) -> &[SubscriberFault] {
        match self {
            Self::SubscriberFaults(faults) => faults,
            _ => &[],
        }
    }

    /// Consumes the error, returning the carried subscriber faults.
    #[must_use]
    pub fn into_faults(self) -> Vec<SubscriberFault> {
        match self {
            Self::SubscriberFaults(faults) => faults,
            _ => Vec::new(),
        }
    }

    /// `Ok(())` when `faults` is empty, otherwise [`Self::SubscriberFaults`].
    ///
    /// # Errors
    ///
    /// Returns [`FanoutError::SubscriberFaults`] if at least one fault was
    /// collected.
    pub fn from_faults(faults: Vec<SubscriberFault>) -> Result<(), Self> {
        if faults.is_empty() {
            Ok(())
        } else {
            Err(Self::SubscriberFaults(faults))
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn from_faults_empty_is_ok() {
        assert!(FanoutError::from_faults(Vec::new()).is_ok());
    }

    #[test]
    fn from_faults_keeps_every_fault() {
        let faults = vec![
            SubscriberFault {
                subscription: SubscriptionId::from_raw(1),
                kind: FaultKind::Error,
                message: "a".to_string(),
            },
            SubscriberFault {
                subscription: SubscriptionId::from_raw(2),
                kind: FaultKind::Panic,
                message: "b".to_string(),
            },
        ];
        let Err(err) = FanoutError::from_faults(faults.clone()) else {
            panic!("expected an error");
        };
        assert_eq!(err.faults(), faults.as_slice());
        assert_eq!(err.to_string(), "2 subscriber(s) failed during delivery");
        assert_eq!(err.error_code(), 1001);
        assert_eq!(err.as_label(), "subscriber_faults");
    }

    #[test]
    fn panic_payload_messages() {
        let id = SubscriptionId::from_raw(7);
        let fault = SubscriberFault::from_panic(id, &"boom");
        assert_eq!(fault.message, "boom");
        assert_eq!(fault.kind, FaultKind::Panic);

        let fault = SubscriberFault::from_panic(id, &String::from("owned"));
        assert_eq!(fault.message, "owned");

        let fault = SubscriberFault::from_panic(id, &42_u8);
        assert_eq!(fault.message, "non-string panic payload");
    }

    #[test]
    fn error_fault_renders_context_chain() {
        let err = anyhow::anyhow!("inner").context("outer");
        let fault = SubscriberFault::from_error(SubscriptionId::from_raw(3), &err);
        assert_eq!(fault.kind, FaultKind::Error);
        assert_eq!(fault.message, "outer: inner");
        assert_eq!(
            fault.to_string(),
            "subscriber #3 failed (error): outer: inner"
        );
    }

    #[test]
    fn invalid_config_label() {
        let err = FanoutError::InvalidConfig("bad".to_string());
        assert_eq!(err.error_code(), 2001);
        assert_eq!(err.as_label(), "invalid_config");
        assert!(err.faults().is_empty());
        assert!(err.into_faults().is_empty());
    }
}
