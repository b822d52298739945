//! # lib_switch
//!
//! Shared support library for the swxgate transaction-switching services.
//! Every folder under `src/` is an independently feature-gated concern so
//! that lean services only compile what they actually use.

// Declare the feature-gated modules
pub mod enums;
pub mod errors;

#[cfg(feature = "utils")]
pub mod utils;

#[cfg(feature = "loggers")]
pub mod loggers;

#[cfg(feature = "configs")]
pub mod configs;

#[cfg(feature = "connections")]
pub mod connections;

#[cfg(feature = "retrieve")]
pub mod retrieve;

#[cfg(feature = "health")]
pub mod health;

// Re-export the types virtually every consumer touches
pub use enums::Component;
pub use errors::SwitchError;

#[cfg(feature = "loggers")]
pub use loggers::loggerlocal::{LoggerLocal, LoggerLocalOptions};

#[cfg(feature = "connections")]
pub use connections::{
    cache_redis::CacheStore,
    retry::{retry_async, RetryOptions},
    lock_redis::{DistributedLock, LockHandle, LockOptions},
    pubsub_redis::BroadcastChannel,
    store_config::{NodeAddr, StoreConfig, StoreTopology},
};
