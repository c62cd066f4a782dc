//! Per-key single-flight.
//!
//! Concurrent callers asking for the same key share one execution of the
//! work and all receive a clone of its result. If the task running the work
//! is dropped mid-way, one of the waiters picks the work up instead.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};

/// Deduplicates concurrent executions keyed by string.
pub struct SingleFlight<T> {
    in_flight: Mutex<HashMap<String, Arc<InFlightState<T>>>>,
}

struct InFlightState<T> {
    result: OnceCell<T>,
}

impl<T: Clone> SingleFlight<T> {
    pub fn new() -> Self {
        Self {
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Run `work` for `key` unless another caller already is, in which case
    /// wait for and return that caller's result.
    pub async fn run<F, Fut>(&self, key: &str, work: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let state = {
            let mut in_flight = self.in_flight.lock().await;
            in_flight
                .entry(key.to_string())
                .or_insert_with(|| {
                    Arc::new(InFlightState {
                        result: OnceCell::new(),
                    })
                })
                .clone()
        };

        let result = state.result.get_or_init(work).await.clone();

        let mut in_flight = self.in_flight.lock().await;
        if in_flight
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, &state))
        {
            in_flight.remove(key);
        }

        result
    }

    /// Number of keys currently being worked on.
    pub async fn in_flight(&self) -> usize {
        self.in_flight.lock().await.len()
    }
}

impl<T: Clone> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}
