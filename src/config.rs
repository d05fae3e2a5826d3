//! Fan-out configuration loaded from environment variables.
//!
//! Follows 12-factor style: settings come from environment variables (or a
//! `.env` file via `dotenvy`), with defaults for everything. Library code
//! never reads the environment on its own; callers opt in through
//! [`FanoutConfig::from_env`] and pass the result to the `with_config`
//! constructors.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FanoutError;

/// What a publisher does when a subscriber fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultPolicy {
    /// Catch the fault, keep delivering to the remaining subscribers and
    /// followers, and report every fault together.
    #[default]
    Isolate,
    /// Stop delivery at the first fault and report it. Followers are not
    /// notified when a per-key subscriber failed.
    FailFast,
}

impl FaultPolicy {
    /// Returns `true` if delivery stops at the first fault.
    #[must_use]
    pub const fn stops_on_fault(self) -> bool {
        matches!(self, Self::FailFast)
    }
}

impl fmt::Display for FaultPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Isolate => f.write_str("isolate"),
            Self::FailFast => f.write_str("fail_fast"),
        }
    }
}

impl FromStr for FaultPolicy {
    type Err = FanoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "isolate" => Ok(Self::Isolate),
            "fail_fast" | "fail-fast" | "failfast" => Ok(Self::FailFast),
            other => Err(FanoutError::InvalidConfig(format!(
                "unknown fault policy {other:?}; expected \"isolate\" or \"fail_fast\""
            ))),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanoutConfig {
    /// Fault policy applied by every publisher built from this config.
    pub fault_policy: FaultPolicy,

    /// Capacity of [`crate::domain::EventBus`] broadcast channels.
    pub bus_capacity: usize,
}

impl FanoutConfig {
    /// Default broadcast capacity.
    pub const DEFAULT_BUS_CAPACITY: usize = 1024;

    /// Loads configuration from environment variables.
    ///
    /// | Variable              | Default   |
    /// |-----------------------|-----------|
    /// | `FANOUT_FAULT_POLICY` | `isolate` |
    /// | `FANOUT_BUS_CAPACITY` | `1024`    |
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`FanoutError::InvalidConfig`] if `FANOUT_FAULT_POLICY` is set
    /// to an unknown value.
    pub fn from_env() -> Result<Self, FanoutError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from `lookup`, which maps a variable name
    /// to its value.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, FanoutError> {
        let fault_policy = match lookup("FANOUT_FAULT_POLICY") {
            Some(raw) => raw.parse()?,
            None => FaultPolicy::default(),
        };
        let bus_capacity = parse_var(&lookup, "FANOUT_BUS_CAPACITY", Self::DEFAULT_BUS_CAPACITY)
            .max(1);

        Ok(Self {
            fault_policy,
            bus_capacity,
        })
    }
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            fault_policy: FaultPolicy::default(),
            bus_capacity: Self::DEFAULT_BUS_CAPACITY,
        }
    }
}

/// Parses variable `key` as `T`, returning `default` on missing or invalid
/// values.
fn parse_var<T: FromStr>(lookup: impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
