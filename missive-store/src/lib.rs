//! Storage seams for the dispatch engine.
//!
//! Two stores are involved:
//! - a key-value store for ephemeral state (rate buckets, idempotency
//!   markers, cursors), with optional per-key TTL and no compare-and-swap
//! - a relational store for campaigns, templates, contacts and recipients
//!
//! Both are traits so deployments can plug in real backends; the in-memory
//! implementations here back the daemon's development mode and the tests.

pub mod backends;
pub mod config;
pub mod error;
pub mod kv;
pub mod repository;

pub use backends::{MemoryKeyValueStore, MemoryRepository};
pub use config::{MemoryConfig, StoreConfig, Stores};
pub use error::{Result, StoreError};
pub use kv::KeyValueStore;
pub use repository::CampaignRepository;
