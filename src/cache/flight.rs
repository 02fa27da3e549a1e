//! Single-flight de-duplication of concurrent identical work

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Coalesces concurrent calls with the same key into one execution
///
/// The first caller for a key (the leader) creates the future; every caller
/// that arrives while it is in flight awaits the same shared future instead of
/// starting its own. The entry is dropped once the shared future has
/// completed, so a later call starts fresh work.
pub struct SingleFlight<T: Clone> {
    calls: Mutex<HashMap<String, Shared<BoxFuture<'static, T>>>>,
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Runs `make()` unless a call for `key` is already in flight
    ///
    /// Returns the output and whether this caller was the leader.
    pub async fn run<F>(&self, key: &str, make: F) -> (T, bool)
    where
        F: FnOnce() -> BoxFuture<'static, T>,
    {
        let (call, leader) = {
            let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
            match calls.get(key) {
                Some(call) if call.peek().is_none() => (call.clone(), false),
                _ => {
                    let call = make().shared();
                    calls.insert(key.to_string(), call.clone());
                    (call, true)
                }
            }
        };

        if !leader {
            tracing::debug!("Joining in-flight fetch for {}", key);
        }

        let output = {
            let _cleanup = PanicCleanup {
                calls: &self.calls,
                key,
                call: &call,
            };
            call.clone().await
        };

        let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        if calls.get(key).is_some_and(|c| c.peek().is_some()) {
            calls.remove(key);
        }

        (output, leader)
    }

    /// Number of keys with work in flight
    pub fn in_flight(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|c| c.peek().is_none())
            .count()
    }
}

/// Forgets a call whose future panicked, so later callers start fresh work
/// instead of re-polling the poisoned shared future
struct PanicCleanup<'a, T: Clone> {
    calls: &'a Mutex<HashMap<String, Shared<BoxFuture<'static, T>>>>,
    key: &'a str,
    call: &'a Shared<BoxFuture<'static, T>>,
}

impl<T: Clone> Drop for PanicCleanup<'_, T> {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            return;
        }
        let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        if calls.get(self.key).is_some_and(|c| c.ptr_eq(self.call)) {
            calls.remove(self.key);
        }
    }
}

impl<T> Default for SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
