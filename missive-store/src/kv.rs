use std::time::Duration;

use async_trait::async_trait;

/// Shared key-value store.
///
/// Values are opaque strings; callers own their encoding. There is no
/// compare-and-swap, so every read-modify-write done through this trait is
/// last-writer-wins.
#[async_trait]
pub trait KeyValueStore: Send + Sync + std::fmt::Debug {
    /// Fetch a value, `None` if absent or expired
    async fn get(&self, key: &str) -> crate::Result<Option<String>>;

    /// Store a value, replacing any existing one. `ttl = None` never expires.
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> crate::Result<()>;

    /// Remove a key. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> crate::Result<()>;
}
