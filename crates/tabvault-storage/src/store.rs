//! Key-value store abstraction shared by every engine component

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use crate::Result;

/// Durable key-value store.
///
/// Mirrors the host storage area: point reads, full scans, batched writes and
/// batched removals. Implementations guarantee atomicity per key only.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Every stored entry, keyed by its storage key.
    async fn get_all(&self) -> Result<HashMap<String, Value>>;

    async fn set(&self, items: Vec<(String, Value)>) -> Result<()>;

    /// Removing a missing key is not an error.
    async fn remove(&self, keys: &[String]) -> Result<()>;

    async fn bytes_in_use(&self) -> Result<u64>;

    async fn set_one(&self, key: &str, value: Value) -> Result<()> {
        self.set(vec![(key.to_string(), value)]).await
    }

    async fn remove_one(&self, key: &str) -> Result<()> {
        self.remove(&[key.to_string()]).await
    }
}
