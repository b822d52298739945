//! # Broadcast Channel (Pub/Sub)
//!
//! Publish/subscribe over the store, with one publisher connection and one
//! subscriber connection per instance, each with an independent state
//! machine. Subscriptions are tracked in a channel registry: exactly one
//! callback per channel, exact-match filtering before invocation, and
//! re-subscribing replaces the previous callback. In cluster mode the
//! subscriber requests the store's sharded-subscription mode (plain cluster
//! pub/sub does not deliver evenly across shards).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

use crate::connections::retry::{retry_async, RetryOptions};
use crate::connections::store_client::{RedisStoreClient, StoreApi, StoreError, StoreMessage};
use crate::connections::store_config::StoreConfig;
use crate::enums::Component;
use crate::errors::SwitchError;
use crate::loggers::loggerlocal::LoggerLocal;

/// A subscriber callback, invoked with the deserialized message.
pub type ChannelCallback = Arc<dyn Fn(Value) + Send + Sync>;

/// A dual-connection pub/sub wrapper with per-channel listener bookkeeping.
pub struct BroadcastChannel<C: StoreApi = RedisStoreClient> {
    publisher: C,
    subscriber: C,
    registry: Arc<Mutex<HashMap<String, ChannelCallback>>>,
    dispatcher: AsyncMutex<Option<JoinHandle<()>>>,
    retry: RetryOptions,
    logger: Arc<LoggerLocal>,
}

impl BroadcastChannel<RedisStoreClient> {
    /// Builds a broadcast channel from validated connection parameters.
    /// Two symmetric connections are created: one for publishing, one for
    /// subscribing (the subscriber negotiates push delivery).
    pub fn open(config: StoreConfig, logger: Arc<LoggerLocal>) -> Result<Self, SwitchError> {
        config.validate()?;
        let retry = config.retry.normalized();
        Ok(Self {
            publisher: RedisStoreClient::new(config.clone()),
            subscriber: RedisStoreClient::new_subscriber(config),
            registry: Arc::new(Mutex::new(HashMap::new())),
            dispatcher: AsyncMutex::new(None),
            retry,
            logger,
        })
    }
}

impl<C: StoreApi> BroadcastChannel<C> {
    /// Builds a broadcast channel over externally supplied clients. Used by
    /// tests; production callers go through [`BroadcastChannel::open`].
    pub fn with_clients(
        publisher: C,
        subscriber: C,
        retry: RetryOptions,
        logger: Arc<LoggerLocal>,
    ) -> Self {
        Self {
            publisher,
            subscriber,
            registry: Arc::new(Mutex::new(HashMap::new())),
            dispatcher: AsyncMutex::new(None),
            retry: retry.normalized(),
            logger,
        }
    }

    /// Opens both connections. Idempotent per connection.
    pub async fn connect(&self) -> Result<(), SwitchError> {
        self.ensure_publisher().await?;
        self.ensure_subscriber().await?;
        Ok(())
    }

    /// Serializes `message` to its canonical JSON encoding and publishes it.
    /// Returns the receiver count reported by the store.
    pub async fn publish<T: Serialize + ?Sized>(
        &self,
        channel: &str,
        message: &T,
    ) -> Result<u64, SwitchError> {
        let payload = serde_json::to_string(message).map_err(|e| {
            // Local-origin failures use the same tagged channel as transport ones
            SwitchError::operation(&[Component::Redis], "publish", e)
        })?;
        self.ensure_publisher().await?;
        match retry_async(
            || self.publisher.publish(channel, &payload),
            self.retry.attempts,
            self.retry.delay(),
            Some(&self.logger),
        )
        .await
        {
            Ok(receivers) => Ok(receivers),
            Err(e) => Err(self.operation_failed("publish", channel, e).await),
        }
    }

    /// Registers `callback` for exact matches of `channel` and subscribes at
    /// the store level. Re-subscribing replaces the previous callback: stale
    /// callbacks see no further messages. Returns the channel name.
    pub async fn subscribe<F>(&self, channel: &str, callback: F) -> Result<String, SwitchError>
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.ensure_subscriber().await?;
        match retry_async(
            || self.subscriber.subscribe(channel),
            self.retry.attempts,
            self.retry.delay(),
            Some(&self.logger),
        )
        .await
        {
            Ok(()) => {
                let replaced = self
                    .registry
                    .lock()
                    .expect("channel registry poisoned")
                    .insert(channel.to_string(), Arc::new(callback))
                    .is_some();
                if replaced {
                    self.logger
                        .debug(
                            &format!("listener on '{channel}' replaced by re-subscribe"),
                            None,
                        )
                        .await;
                }
                Ok(channel.to_string())
            }
            Err(e) => Err(self.operation_failed("subscribe", channel, e).await),
        }
    }

    /// Removes the listener for `channel`. A registered channel gets a
    /// targeted store-level unsubscribe; otherwise a broad unsubscribe is
    /// issued as fallback. The registry entry is removed on success.
    pub async fn unsubscribe(&self, channel: &str) -> Result<(), SwitchError> {
        self.ensure_subscriber().await?;
        let registered = self
            .registry
            .lock()
            .expect("channel registry poisoned")
            .contains_key(channel);
        let target = if registered { Some(channel) } else { None };
        match retry_async(
            || self.subscriber.unsubscribe(target),
            self.retry.attempts,
            self.retry.delay(),
            Some(&self.logger),
        )
        .await
        {
            Ok(()) => {
                self.registry
                    .lock()
                    .expect("channel registry poisoned")
                    .remove(channel);
                Ok(())
            }
            Err(e) => Err(self.operation_failed("unsubscribe", channel, e).await),
        }
    }

    /// Publishes the same message to each channel sequentially, in order.
    /// The first failing channel aborts the remainder: there is no rollback
    /// and no best-effort continuation, so front-load the critical channel.
    /// Returns the summed receiver counts.
    pub async fn broadcast<T: Serialize + ?Sized>(
        &self,
        channels: &[&str],
        message: &T,
    ) -> Result<u64, SwitchError> {
        let mut receivers = 0;
        for channel in channels {
            receivers += self.publish(channel, message).await?;
        }
        Ok(receivers)
    }

    /// Live status of the (publisher, subscriber) connections.
    pub async fn is_connected(&self) -> (bool, bool) {
        (
            self.publisher.is_open().await,
            self.subscriber.is_open().await,
        )
    }

    /// Liveness probe across both connections; never raises.
    pub async fn health_check(&self) -> bool {
        if self.connect().await.is_err() {
            return false;
        }
        let publisher_ok = matches!(
            self.publisher.ping().await.as_deref(),
            Ok(reply) if reply.eq_ignore_ascii_case("PONG")
        );
        let subscriber_ok = matches!(
            self.subscriber.ping().await.as_deref(),
            Ok(reply) if reply.eq_ignore_ascii_case("PONG")
        );
        publisher_ok && subscriber_ok
    }

    /// Closes both connections, stops the dispatch task, and clears the
    /// channel registry. Safe to call when never connected. Returns `true`
    /// on a fully clean shutdown.
    pub async fn disconnect(&self) -> bool {
        let publisher_clean = self.publisher.quit().await.is_ok();
        let subscriber_clean = self.subscriber.quit().await.is_ok();
        if let Some(handle) = self.dispatcher.lock().await.take() {
            handle.abort();
        }
        self.registry
            .lock()
            .expect("channel registry poisoned")
            .clear();
        if !(publisher_clean && subscriber_clean) {
            self.logger
                .warn("broadcast channel disconnect was not clean", None)
                .await;
        }
        publisher_clean && subscriber_clean
    }

    async fn ensure_publisher(&self) -> Result<(), SwitchError> {
        if self.publisher.is_open().await {
            return Ok(());
        }
        match retry_async(
            || self.publisher.connect(),
            self.retry.attempts,
            self.retry.delay(),
            Some(&self.logger),
        )
        .await
        {
            Ok(()) => Ok(()),
            Err(e) => {
                self.logger
                    .error(&format!("publisher connect failed: {e}"), None)
                    .await;
                Err(SwitchError::connection(&[Component::Redis], e))
            }
        }
    }

    async fn ensure_subscriber(&self) -> Result<(), SwitchError> {
        if self.subscriber.is_open().await {
            return Ok(());
        }
        match retry_async(
            || self.subscriber.connect(),
            self.retry.attempts,
            self.retry.delay(),
            Some(&self.logger),
        )
        .await
        {
            Ok(()) => {
                if let Some(rx) = self.subscriber.take_messages().await {
                    let handle = self.spawn_dispatcher(rx);
                    if let Some(old) = self.dispatcher.lock().await.replace(handle) {
                        old.abort();
                    }
                }
                self.resubscribe_registered().await
            }
            Err(e) => {
                self.logger
                    .error(&format!("subscriber connect failed: {e}"), None)
                    .await;
                Err(SwitchError::connection(&[Component::Redis], e))
            }
        }
    }

    /// Re-issues the store-level subscription for every registered channel.
    /// A fresh connection has no subscriptions, so after a reconnect the
    /// registry entries would otherwise be live in name only.
    async fn resubscribe_registered(&self) -> Result<(), SwitchError> {
        let channels: Vec<String> = self
            .registry
            .lock()
            .expect("channel registry poisoned")
            .keys()
            .cloned()
            .collect();
        for channel in &channels {
            if let Err(e) = self.subscriber.subscribe(channel).await {
                return Err(self.operation_failed("subscribe", channel, e).await);
            }
            self.logger
                .debug(&format!("restored subscription on '{channel}'"), None)
                .await;
        }
        Ok(())
    }

    /// Routes incoming messages to the registered callback for their exact
    /// channel. Unknown channels are dropped; non-JSON payloads are handed
    /// to the callback as a raw string after a warning.
    fn spawn_dispatcher(&self, mut rx: UnboundedReceiver<StoreMessage>) -> JoinHandle<()> {
        let registry = Arc::clone(&self.registry);
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let callback = registry
                    .lock()
                    .expect("channel registry poisoned")
                    .get(&msg.channel)
                    .cloned();
                let Some(callback) = callback else { continue };
                match serde_json::from_str::<Value>(&msg.payload) {
                    Ok(value) => callback(value),
                    Err(e) => {
                        log::warn!("non-JSON payload on '{}': {e}", msg.channel);
                        callback(Value::String(msg.payload));
                    }
                }
            }
        })
    }

    async fn operation_failed(&self, op: &str, channel: &str, err: StoreError) -> SwitchError {
        self.logger
            .error(
                &format!(
                    "pubsub {op} '{channel}' failed after {} attempt(s): {err}",
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
impl<C: StoreApi> crate::health::HealthIndicator for BroadcastChannel<C> {
    fn name(&self) -> &str {
        "redis-pubsub"
    }

    async fn health_check(&self) -> bool {
        BroadcastChannel::health_check(self).await
    }
}
