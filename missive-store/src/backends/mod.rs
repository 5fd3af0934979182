//! Backend implementations for the store traits
//!
//! - `memory_kv`: in-memory key-value store with lazy TTL expiry
//! - `memory_repository`: in-memory relational store

pub mod memory_kv;
pub mod memory_repository;

pub use memory_kv::MemoryKeyValueStore;
pub use memory_repository::MemoryRepository;
