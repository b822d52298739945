//! # Connections Module
//!
//! The distributed cache / pub-sub / lock layer of the swxgate platform.
//! Everything here is a client-side orchestration over a replicated
//! key-value store that already provides the hard primitives: this module
//! handles connection lifecycle, retry discipline, topology selection
//! (standalone vs cluster), channel-listener bookkeeping, and the quorum
//! lock protocol. It never reimplements store semantics.

/// Bounded retry-with-delay around arbitrary async operations.
pub mod retry;

/// Connection configuration: topology, node addresses, retry options.
pub mod store_config;

/// The single store-client abstraction and its Redis implementation.
pub mod store_client;

/// Key/value cache operations with TTL support.
pub mod cache_redis;

/// Publish/subscribe broadcast channel with a per-channel listener registry.
pub mod pubsub_redis;

/// Quorum-based distributed mutual-exclusion lock.
pub mod lock_redis;

#[cfg(test)]
pub(crate) mod store_mock;

// --- Public API Re-exports ---
pub use cache_redis::CacheStore;
pub use lock_redis::{DistributedLock, LockHandle, LockOptions};
pub use pubsub_redis::BroadcastChannel;
pub use retry::{retry_async, RetryOptions};
pub use store_client::{RedisStoreClient, StoreApi, StoreError, StoreMessage};
pub use store_config::{NodeAddr, StoreConfig, StoreTopology};
