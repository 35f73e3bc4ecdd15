//! Request coalescing for concurrent identical source fetches.
//!
//! Callers sharing a key wait on one in-flight execution and all receive a
//! clone of its result. Nothing is retained once the execution completes: the
//! next call with the same key runs a fresh fetch.

use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;

type Flight<T> = Arc<OnceCell<T>>;

pub(crate) struct Coalescer<K, T>
where
    K: Eq + Hash,
{
    in_flight: DashMap<K, Flight<T>>,
}

impl<K: Eq + Hash, T> Default for Coalescer<K, T> {
    fn default() -> Self {
        Self {
            in_flight: DashMap::new(),
        }
    }
}

/// Drops the table entry once no caller holds its flight, so a cancelled
/// caller never leaves an orphaned entry behind.
struct Departure<'a, K: Eq + Hash, T> {
    table: &'a DashMap<K, Flight<T>>,
    key: &'a K,
}

impl<K: Eq + Hash, T> Drop for Departure<'_, K, T> {
    fn drop(&mut self) {
        self.table
            .remove_if(self.key, |_, flight| Arc::strong_count(flight) == 1);
    }
}

impl<K, T> Coalescer<K, T>
where
    K: Eq + Hash + Clone,
    T: Clone,
{
    /// Run `work` unless an execution for `key` is already in flight, in
    /// which case wait for that one and share its result.
    ///
    /// If the executing caller is dropped mid-flight, one of the waiters
    /// takes over and runs its own `work`.
    pub(crate) async fn run<F, Fut>(&self, key: K, work: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        // declared before `flight` so it drops after it
        let _departure = Departure {
            table: &self.in_flight,
            key: &key,
        };
        let flight = self
            .in_flight
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let handle = &flight;
        let key_ref = &key;
        let result = flight
            .get_or_init(move || async move {
                let result = work().await;
                self.forget(key_ref, handle);
                result
            })
            .await;
        result.clone()
    }

    fn forget(&self, key: &K, flight: &Flight<T>) {
        self.in_flight
            .remove_if(key, |_, current| Arc::ptr_eq(current, flight));
    }

    #[cfg(test)]
    fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}
