//! Generation registry.
//!
//! Rather than a process-global, a process obtains one [`Generation`] value
//! at startup and threads it by value into the reconciler and container
//! manager (the "singleton row with a known primary key" pattern stays in
//! the store, but nothing in this crate reaches for a global to read it back).

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Mutex;

use crate::store::Store;

/// The process generation: a monotonically increasing integer assigned once
/// per process start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Generation(pub i64);

/// Serializes concurrent first-callers onto the same database
/// read-modify-write, so they all observe the same generation value.
pub struct GenerationRegistry {
    store: Store,
    lock: Arc<Mutex<Option<Generation>>>,
}

impl GenerationRegistry {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            lock: Arc::new(Mutex::new(None)),
        }
    }

    /// Return this process's generation, acquiring it from the store on the
    /// first call and memoizing it for the remainder of the process.
    pub async fn current(&self) -> Result<Generation> {
        let mut guard = self.lock.lock().await;
        if let Some(generation) = *guard {
            return Ok(generation);
        }

        let number = self.store.bump_generation().await?;
        let generation = Generation(number);
        tracing::info!(generation = number, "Acquired process generation");
        *guard = Some(generation);
        Ok(generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;

    #[tokio::test]
    async fn concurrent_first_callers_observe_the_same_generation() {
        let store = Store::connect_in_memory().await.unwrap();
        let registry = Arc::new(GenerationRegistry::new(store));

        let calls = (0..8).map(|_| {
            let registry = registry.clone();
            tokio::spawn(async move { registry.current().await.unwrap() })
        });
        let results: Vec<Generation> = join_all(calls)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert!(results.iter().all(|g| *g == results[0]));
        assert_eq!(results[0], Generation(1));
    }

    #[tokio::test]
    async fn subsequent_processes_get_increasing_generations() {
        let store = Store::connect_in_memory().await.unwrap();
        let first = GenerationRegistry::new(store.clone());
        assert_eq!(first.current().await.unwrap(), Generation(1));

        let second = GenerationRegistry::new(store.clone());
        assert_eq!(second.current().await.unwrap(), Generation(2));

        let third = GenerationRegistry::new(store);
        assert_eq!(third.current().await.unwrap(), Generation(3));
    }
}
