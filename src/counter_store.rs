use async_trait::async_trait;
use redis::RedisError;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

/// Integer key/value storage behind the ticket engine.
///
/// Implementations must be safe to share between concurrent callers, and
/// `advance_wrapping` must be atomic per key.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Short backend name used in logs and the health endpoint.
    fn backend(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<i64>, StoreError>;

    async fn set(&self, key: &str, value: i64) -> Result<(), StoreError>;

    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Atomically stores 0 when `key` is absent, otherwise
    /// `(value mod modulus + 1) mod modulus` (Euclidean), and returns the stored value.
    async fn advance_wrapping(&self, key: &str, modulus: i64) -> Result<i64, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),
    #[error("storage operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("counter map lock poisoned")]
    Poisoned,
}

/// In-process backend. Every operation holds the map lock for its whole
/// read-modify-write, so increments never interleave.
pub struct InMemoryCounterStore {
    counters: Mutex<HashMap<String, i64>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        InMemoryCounterStore {
            counters: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let counters = self.counters.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(counters.get(key).copied())
    }

    async fn set(&self, key: &str, value: i64) -> Result<(), StoreError> {
        let mut counters = self.counters.lock().map_err(|_| StoreError::Poisoned)?;
        counters.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut counters = self.counters.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(counters.remove(key).is_some())
    }

    async fn advance_wrapping(&self, key: &str, modulus: i64) -> Result<i64, StoreError> {
        let mut counters = self.counters.lock().map_err(|_| StoreError::Poisoned)?;
        // Reduce before adding so any stored i64 advances without overflow.
        let next = match counters.get(key) {
            Some(current) => (current.rem_euclid(modulus) + 1) % modulus,
            None => 0,
        };
        counters.insert(key.to_string(), next);
        Ok(next)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let _guard = self.counters.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(())
    }
}
