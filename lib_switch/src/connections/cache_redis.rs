//! # Cache Store
//!
//! Key/value operations with optional per-key expiry over the store client.
//! This is a stateless proxy with retry discipline, not a local cache: no
//! entry is ever materialized on the client side. Every operation is guarded
//! by "ensure the connection is open, reconnecting if necessary", wrapped in
//! the retry policy, and every failure is logged at error level before being
//! re-raised as a tagged system error.

use std::sync::Arc;

use crate::connections::retry::{retry_async, RetryOptions};
use crate::connections::store_client::{RedisStoreClient, StoreApi, StoreError};
use crate::connections::store_config::StoreConfig;
use crate::enums::Component;
use crate::errors::SwitchError;
use crate::loggers::loggerlocal::LoggerLocal;

/// A TTL-aware key/value wrapper over one store connection.
pub struct CacheStore<C: StoreApi = RedisStoreClient> {
    client: C,
    retry: RetryOptions,
    logger: Arc<LoggerLocal>,
}

impl CacheStore<RedisStoreClient> {
    /// Builds a cache store from validated connection parameters.
    ///
    /// The connection itself is established lazily, on the first operation
    /// (or eagerly via [`CacheStore::connect`]).
    pub fn open(config: StoreConfig, logger: Arc<LoggerLocal>) -> Result<Self, SwitchError> {
        config.validate()?;
        let retry = config.retry.normalized();
        Ok(Self {
            client: RedisStoreClient::new(config),
            retry,
            logger,
        })
    }
}

impl<C: StoreApi> CacheStore<C> {
    /// Builds a cache store over an externally supplied client. Used by
    /// tests; production callers go through [`CacheStore::open`].
    pub fn with_client(client: C, retry: RetryOptions, logger: Arc<LoggerLocal>) -> Self {
        Self {
            client,
            retry: retry.normalized(),
            logger,
        }
    }

    /// Opens the underlying connection. Idempotent: when the client is
    /// already open this logs and returns without touching the network.
    pub async fn connect(&self) -> Result<(), SwitchError> {
        if self.client.is_open().await {
            self.logger
                .info("cache store connection already open", None)
                .await;
            return Ok(());
        }
        match retry_async(
            || self.client.connect(),
            self.retry.attempts,
            self.retry.delay(),
            Some(&self.logger),
        )
        .await
        {
            Ok(()) => Ok(()),
            Err(e) => {
                self.logger
                    .error(&format!("cache store connect failed: {e}"), None)
                    .await;
                Err(SwitchError::connection(&[Component::Redis], e))
            }
        }
    }

    /// Gracefully closes the connection. Safe to call when never connected.
    /// Returns `true` on a clean shutdown.
    pub async fn disconnect(&self) -> bool {
        match self.client.quit().await {
            Ok(()) => true,
            Err(e) => {
                self.logger
                    .warn(&format!("cache store disconnect was not clean: {e}"), None)
                    .await;
                false
            }
        }
    }

    /// Live connection status, queried from the client itself.
    pub async fn is_connected(&self) -> bool {
        self.client.is_open().await
    }

    /// Liveness probe. Converts every failure into `false`; never raises.
    pub async fn health_check(&self) -> bool {
        if self.ensure_open().await.is_err() {
            return false;
        }
        match retry_async(
            || self.client.ping(),
            self.retry.attempts,
            self.retry.delay(),
            Some(&self.logger),
        )
        .await
        {
            Ok(reply) => reply.eq_ignore_ascii_case("PONG"),
            Err(_) => false,
        }
    }

    /// Fetches a key. Absent keys resolve to `None`, never an error.
    pub async fn get(&self, key: &str) -> Result<Option<String>, SwitchError> {
        self.ensure_open().await?;
        match self.run(|| self.client.get(key)).await {
            Ok(value) => Ok(value),
            Err(e) => Err(self.operation_failed("get", key, e).await),
        }
    }

    /// Stores a value. A positive `ttl_seconds` makes the entry expire;
    /// otherwise it persists until deleted or evicted by the store.
    pub async fn set(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: Option<u64>,
    ) -> Result<(), SwitchError> {
        self.ensure_open().await?;
        match self.run(|| self.client.set(key, value, ttl_seconds)).await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.operation_failed("set", key, e).await),
        }
    }

    /// Deletes a key. Idempotent: deleting an absent key is not an error.
    pub async fn delete(&self, key: &str) -> Result<u64, SwitchError> {
        self.ensure_open().await?;
        match self.run(|| self.client.del(key)).await {
            Ok(removed) => Ok(removed),
            Err(e) => Err(self.operation_failed("delete", key, e).await),
        }
    }

    /// Removes every key in the keyspace in one pipelined batch.
    ///
    /// An empty keyspace short-circuits: no batch call is issued at all.
    /// Returns the number of keys removed.
    pub async fn clear_cache(&self) -> Result<u64, SwitchError> {
        self.ensure_open().await?;
        let keys = match self.run(|| self.client.keys("*")).await {
            Ok(keys) => keys,
            Err(e) => return Err(self.operation_failed("clear_cache", "*", e).await),
        };
        if keys.is_empty() {
            self.logger
                .debug("clear_cache: keyspace already empty", None)
                .await;
            return Ok(0);
        }
        match self.run(|| self.client.del_batch(&keys)).await {
            Ok(removed) => {
                self.logger
                    .info(&format!("clear_cache removed {removed} key(s)"), None)
                    .await;
                Ok(removed)
            }
            Err(e) => Err(self.operation_failed("clear_cache", "*", e).await),
        }
    }

    /// Re-derives the connection state from the client and reconnects when
    /// it has dropped since the last operation.
    async fn ensure_open(&self) -> Result<(), SwitchError> {
        if self.client.is_open().await {
            return Ok(());
        }
        self.connect().await
    }

    async fn run<T, F, Fut>(&self, op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, StoreError>>,
    {
        retry_async(op, self.retry.attempts, self.retry.delay(), Some(&self.logger)).await
    }

    async fn operation_failed(&self, op: &str, key: &str, err: StoreError) -> SwitchError {
        self.logger
            .error(
                &format!(
                    "cache {op} '{key}' failed after {} attempt(s): {err}",
                    self.retry.attempts
                ),
                None,
            )
            .await;
        SwitchError::operation(&[Component::Redis], op, err)
    }
}

#[cfg(feature = "health")]
#[async_trait::async_trait]
impl<C: StoreApi> crate::health::HealthIndicator for CacheStore<C> {
    fn name(&self) -> &str {
        "redis-cache"
    }

    async fn health_check(&self) -> bool {
        CacheStore::health_check(self).await
    }
}
