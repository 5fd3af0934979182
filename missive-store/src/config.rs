use std::sync::Arc;

use serde::Deserialize;

use crate::{
    CampaignRepository, KeyValueStore, MemoryKeyValueStore, MemoryRepository,
};

/// Configuration for the backing stores
///
/// In-memory stores (unlimited keys):
/// ```ron
/// Missive (
///     store: (type: "Memory"),
/// )
/// ```
///
/// With a key limit on the key-value side:
/// ```ron
/// Missive (
///     store: (type: "Memory", capacity: Some(100000)),
/// )
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum StoreConfig {
    Memory(MemoryConfig),
}

/// Configuration for the memory-backed stores
#[derive(Debug, Clone, Deserialize, Default)]
pub struct MemoryConfig {
    /// Maximum number of key-value entries (omit for unlimited)
    #[serde(default)]
    pub capacity: Option<usize>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Memory(MemoryConfig::default())
    }
}

/// The pair of stores a dispatcher runs against
#[derive(Debug, Clone)]
pub struct Stores {
    pub kv: Arc<dyn KeyValueStore>,
    pub repository: Arc<dyn CampaignRepository>,
}

impl StoreConfig {
    #[must_use]
    pub fn build(&self) -> Stores {
        match self {
            Self::Memory(config) => {
                let kv = config
                    .capacity
                    .map_or_else(MemoryKeyValueStore::new, MemoryKeyValueStore::with_capacity);
                Stores {
                    kv: Arc::new(kv),
                    repository: Arc::new(MemoryRepository::new()),
                }
            }
        }
    }
}
