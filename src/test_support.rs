//! Shared helpers for unit tests.

use std::sync::{Arc, Mutex};

use crate::domain::lock;

/// Thread-safe log of values seen by test callbacks.
#[derive(Debug)]
pub(crate) struct Recorder<T> {
    log: Arc<Mutex<Vec<T>>>,
}

impl<T> Clone for Recorder<T> {
    fn clone(&self) -> Self {
        Self {
            log: Arc::clone(&self.log),
        }
    }
}

impl<T: Clone + Send + 'static> Recorder<T> {
    pub(crate) fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Returns a closure that appends its argument to the log.
    pub(crate) fn sink(&self) -> impl Fn(T) + Clone + Send + Sync + use<T> {
        let log = Arc::clone(&self.log);
        move |value| lock(&log).push(value)
    }

    /// Copy of everything recorded so far.
    pub(crate) fn snapshot(&self) -> Vec<T> {
        lock(&self.log).clone()
    }
}
