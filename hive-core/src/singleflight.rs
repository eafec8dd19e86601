//! # Single Flight
//!
//! Per-key duplicate call suppression. The first caller for a key runs the
//! work; every caller that arrives while it is in flight blocks on a latch
//! and receives a clone of the same result. Completed calls leave the
//! registry immediately, so the next round for the key starts fresh:
//! failures satisfy their waiters but are never cached.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

/// One in-flight call: a latch plus the slot its result is published into.
struct Call<T> {
    slot: Mutex<Option<T>>,
    ready: Condvar,
}

impl<T: Clone> Call<T> {
    fn new() -> Self {
        Call {
            slot: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    /// Blocks until the owner publishes, then clones the result out.
    fn wait(&self) -> T {
        let mut slot = self.slot.lock();
        while slot.is_none() {
            self.ready.wait(&mut slot);
        }
        slot.as_ref().expect("published result").clone()
    }

    fn publish(&self, value: T) {
        *self.slot.lock() = Some(value);
        self.ready.notify_all();
    }
}

/// Registry of in-flight calls keyed by request key.
#[derive(Default)]
pub struct Flight<T> {
    calls: Mutex<HashMap<String, Arc<Call<T>>>>,
}

impl<T> Flight<T> {
    pub fn new() -> Self {
        Flight {
            calls: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone> Flight<T> {
    /// Runs `work` unless a call for `key` is already in flight, in which
    /// case the caller waits for that call's result instead.
    ///
    /// The registry lock is never held while `work` runs or while waiting,
    /// so `work` may block for as long as it likes.
    pub fn flight<F>(&self, key: &str, work: F) -> T
    where
        F: FnOnce() -> T,
    {
        let call = {
            let mut calls = self.calls.lock();
            if let Some(existing) = calls.get(key) {
                let existing = Arc::clone(existing);
                drop(calls);
                return existing.wait();
            }
            let call = Arc::new(Call::new());
            calls.insert(key.to_owned(), Arc::clone(&call));
            call
        };

        let result = work();
        call.publish(result.clone());
        self.calls.lock().remove(key);
        result
    }
}
