//! # Store Client Abstraction
//!
//! One client abstraction over the key-value store, one production
//! implementation ([`RedisStoreClient`]) covering both topologies. The
//! wrappers (`CacheStore`, `BroadcastChannel`, `DistributedLock`) only ever
//! talk to [`StoreApi`], which keeps them testable against an in-memory
//! implementation and keeps the store driver swappable behind one seam.
//!
//! Connection state is never cached in a separate boolean: `is_open` derives
//! from the live connection handle, and any fatal operation error drops the
//! handle so the next guarded operation reconnects.

use async_trait::async_trait;
use redis::aio::{ConnectionLike, MultiplexedConnection};
use redis::cluster::ClusterClientBuilder;
use redis::cluster_async::ClusterConnection;
use redis::{
    from_redis_value, AsyncConnectionConfig, Client, Cmd, Pipeline, ProtocolVersion, PushInfo,
    PushKind, RedisError, RedisFuture, Value,
};
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::connections::store_config::StoreConfig;

/// Atomic check-and-delete: removes the key only when it still holds the
/// caller's token. Prevents a stale holder from evicting a newer lock.
const DEL_IF_MATCH: &str = r#"
if redis.call('get', KEYS[1]) == ARGV[1] then
    return redis.call('del', KEYS[1])
else
    return 0
end"#;

/// Atomic check-and-extend: refreshes the TTL only when the key still holds
/// the caller's token.
const PEXPIRE_IF_MATCH: &str = r#"
if redis.call('get', KEYS[1]) == ARGV[1] then
    return redis.call('pexpire', KEYS[1], ARGV[2])
else
    return 0
end"#;

/// Errors raised by the store client layer. Wrappers normalize these into
/// tagged [`crate::errors::SwitchError`]s before they reach callers.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No live connection; the guarded wrappers reconnect on this.
    #[error("store connection is not open")]
    NotOpen,

    /// An error surfaced by the underlying driver.
    #[error(transparent)]
    Redis(#[from] RedisError),

    /// Any other client-side failure (used by test doubles as well).
    #[error("{0}")]
    Other(String),
}

/// A message delivered on a subscribed channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreMessage {
    /// The channel the message arrived on.
    pub channel: String,
    /// The raw payload string as published.
    pub payload: String,
}

/// The single store-client interface consumed by every wrapper in this layer.
///
/// Covers connection lifecycle, the data-plane commands, pub/sub, and the
/// conditional primitives the distributed lock needs. Implementations must be
/// callable through `&self`; connection state lives behind interior
/// mutability so retried closures can re-borrow freely.
#[async_trait]
pub trait StoreApi: Send + Sync {
    /// Opens the underlying connection. Idempotent: an already-open client
    /// returns success without reconnecting.
    async fn connect(&self) -> Result<(), StoreError>;

    /// Closes the connection and detaches all observers. Safe to call when
    /// never connected.
    async fn quit(&self) -> Result<(), StoreError>;

    /// Live connection status, derived from the connection handle itself.
    async fn is_open(&self) -> bool;

    /// Lightweight liveness probe; expected to answer "PONG".
    async fn ping(&self) -> Result<String, StoreError>;

    /// Fetches a key; absent keys yield `None`, not an error.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Stores a value, optionally expiring after `ttl_seconds`.
    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>)
        -> Result<(), StoreError>;

    /// Deletes a key, returning the number of keys removed.
    async fn del(&self, key: &str) -> Result<u64, StoreError>;

    /// Lists keys matching a glob pattern.
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError>;

    /// Deletes many keys in one pipelined batch, returning the total removed.
    async fn del_batch(&self, keys: &[String]) -> Result<u64, StoreError>;

    /// Publishes a payload, returning the receiver count reported by the store.
    async fn publish(&self, channel: &str, payload: &str) -> Result<u64, StoreError>;

    /// Registers a store-level subscription for a channel.
    async fn subscribe(&self, channel: &str) -> Result<(), StoreError>;

    /// Removes the subscription for one channel, or all when `None`.
    async fn unsubscribe(&self, channel: Option<&str>) -> Result<(), StoreError>;

    /// Hands over the incoming-message stream of a subscriber connection.
    /// Yields `Some` exactly once per successful subscriber `connect`.
    async fn take_messages(&self) -> Option<UnboundedReceiver<StoreMessage>>;

    /// Atomic SET-if-not-exists with a millisecond TTL. `true` when the key
    /// was set by this call.
    async fn set_nx_px(&self, key: &str, token: &str, ttl_ms: u64) -> Result<bool, StoreError>;

    /// Atomic check-and-delete; `true` when the stored value matched and the
    /// key was removed.
    async fn del_if_match(&self, key: &str, token: &str) -> Result<bool, StoreError>;

    /// Atomic check-and-extend; `true` when the stored value matched and the
    /// TTL was refreshed.
    async fn pexpire_if_match(
        &self,
        key: &str,
        token: &str,
        ttl_ms: u64,
    ) -> Result<bool, StoreError>;
}

/// A live connection to the store, one variant per topology. Both inner
/// connection types are cheap clones over a shared pipeline, which is what
/// lets the client hand out connections through `&self`.
#[derive(Clone)]
enum StoreConn {
    Standalone(MultiplexedConnection),
    Cluster(ClusterConnection),
}

impl ConnectionLike for StoreConn {
    fn req_packed_command<'a>(&'a mut self, cmd: &'a Cmd) -> RedisFuture<'a, Value> {
        match self {
            StoreConn::Standalone(c) => c.req_packed_command(cmd),
            StoreConn::Cluster(c) => c.req_packed_command(cmd),
        }
    }

    fn req_packed_commands<'a>(
        &'a mut self,
        pipeline: &'a Pipeline,
        offset: usize,
        count: usize,
    ) -> RedisFuture<'a, Vec<Value>> {
        match self {
            StoreConn::Standalone(c) => c.req_packed_commands(pipeline, offset, count),
            StoreConn::Cluster(c) => c.req_packed_commands(pipeline, offset, count),
        }
    }

    fn get_db(&self) -> i64 {
        match self {
            StoreConn::Standalone(c) => c.get_db(),
            StoreConn::Cluster(c) => c.get_db(),
        }
    }
}

/// The production [`StoreApi`] implementation on the `redis` driver.
pub struct RedisStoreClient {
    config: StoreConfig,
    /// Subscriber connections negotiate RESP3 and register a push observer.
    subscriber: bool,
    conn: RwLock<Option<StoreConn>>,
    push_rx: Mutex<Option<UnboundedReceiver<StoreMessage>>>,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl RedisStoreClient {
    /// Creates a data-plane client (no push channel).
    pub fn new(config: StoreConfig) -> Self {
        Self::build(config, false)
    }

    /// Creates a subscriber client: RESP3, push observer attached on connect.
    pub fn new_subscriber(config: StoreConfig) -> Self {
        Self::build(config, true)
    }

    fn build(config: StoreConfig, subscriber: bool) -> Self {
        Self {
            config,
            subscriber,
            conn: RwLock::new(None),
            push_rx: Mutex::new(None),
            forwarder: Mutex::new(None),
        }
    }

    /// Clones out the live connection, or reports the closed state.
    async fn current_conn(&self) -> Result<StoreConn, StoreError> {
        self.conn
            .read()
            .await
            .clone()
            .ok_or(StoreError::NotOpen)
    }

    /// Normalizes a driver result. Fatal transport errors drop the handle so
    /// the next guarded operation re-derives the closed state and reconnects.
    async fn after<T>(&self, res: Result<T, RedisError>) -> Result<T, StoreError> {
        match res {
            Ok(v) => Ok(v),
            Err(e) => {
                if e.is_connection_dropped() || e.is_io_error() || e.is_unrecoverable_error() {
                    log::warn!("store connection dropped: {e}");
                    *self.conn.write().await = None;
                }
                Err(StoreError::Redis(e))
            }
        }
    }

    /// Spawns the observer that converts raw push notifications into
    /// [`StoreMessage`]s. Detached again on `quit`.
    fn spawn_forwarder(
        mut raw_rx: UnboundedReceiver<PushInfo>,
        msg_tx: UnboundedSender<StoreMessage>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(info) = raw_rx.recv().await {
                match info.kind {
                    PushKind::Message | PushKind::SMessage => {
                        if info.data.len() != 2 {
                            continue;
                        }
                        let channel: String = match from_redis_value(info.data[0].clone()) {
                            Ok(c) => c,
                            Err(_) => continue,
                        };
                        let payload: String = match from_redis_value(info.data[1].clone()) {
                            Ok(p) => p,
                            Err(_) => continue,
                        };
                        if msg_tx.send(StoreMessage { channel, payload }).is_err() {
                            break;
                        }
                    }
                    PushKind::Disconnection => {
                        log::warn!("subscriber connection reported a disconnect");
                    }
                    _ => {}
                }
            }
        })
    }

    async fn open_standalone(&self) -> Result<StoreConn, StoreError> {
        let url = self
            .config
            .node_urls(self.subscriber)
            .into_iter()
            .next()
            .expect("standalone config always yields one url");
        let client = Client::open(url.as_str())?;

        if self.subscriber {
            let (raw_tx, raw_rx) = mpsc::unbounded_channel::<PushInfo>();
            let conn_config = AsyncConnectionConfig::new().set_push_sender(raw_tx);
            let conn = client
                .get_multiplexed_async_connection_with_config(&conn_config)
                .await?;
            self.attach_observer(raw_rx).await;
            Ok(StoreConn::Standalone(conn))
        } else {
            let conn = client.get_multiplexed_async_connection().await?;
            Ok(StoreConn::Standalone(conn))
        }
    }

    async fn open_cluster(&self) -> Result<StoreConn, StoreError> {
        let urls = self.config.node_urls(false);
        let mut builder = ClusterClientBuilder::new(urls);
        if self.subscriber {
            let (raw_tx, raw_rx) = mpsc::unbounded_channel::<PushInfo>();
            builder = builder
                .use_protocol(ProtocolVersion::RESP3)
                .push_sender(raw_tx);
            self.attach_observer(raw_rx).await;
        }
        let client = builder.build()?;
        let conn = client.get_async_connection().await?;
        Ok(StoreConn::Cluster(conn))
    }

    async fn attach_observer(&self, raw_rx: UnboundedReceiver<PushInfo>) {
        let (msg_tx, msg_rx) = mpsc::unbounded_channel::<StoreMessage>();
        let handle = Self::spawn_forwarder(raw_rx, msg_tx);
        if let Some(old) = self.forwarder.lock().await.replace(handle) {
            old.abort();
        }
        *self.push_rx.lock().await = Some(msg_rx);
    }
}

#[async_trait]
impl StoreApi for RedisStoreClient {
    async fn connect(&self) -> Result<(), StoreError> {
        let mut guard = self.conn.write().await;
        if guard.is_some() {
            log::debug!("store connection already open, skipping connect");
            return Ok(());
        }
        let conn = if self.config.is_cluster() {
            self.open_cluster().await?
        } else {
            self.open_standalone().await?
        };
        *guard = Some(conn);
        Ok(())
    }

    async fn quit(&self) -> Result<(), StoreError> {
        // Multiplexed and cluster connections close when the last clone drops.
        *self.conn.write().await = None;
        if let Some(handle) = self.forwarder.lock().await.take() {
            handle.abort();
        }
        self.push_rx.lock().await.take();
        Ok(())
    }

    async fn is_open(&self) -> bool {
        self.conn.read().await.is_some()
    }

    async fn ping(&self) -> Result<String, StoreError> {
        let mut conn = self.current_conn().await?;
        let res: Result<String, RedisError> = redis::cmd("PING").query_async(&mut conn).await;
        self.after(res).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.current_conn().await?;
        let res: Result<Option<String>, RedisError> =
            redis::cmd("GET").arg(key).query_async(&mut conn).await;
        self.after(res).await
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: Option<u64>,
    ) -> Result<(), StoreError> {
        let mut conn = self.current_conn().await?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl_seconds {
            if ttl > 0 {
                cmd.arg("EX").arg(ttl);
            }
        }
        let res: Result<(), RedisError> = cmd.query_async(&mut conn).await;
        self.after(res).await
    }

    async fn del(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.current_conn().await?;
        let res: Result<u64, RedisError> =
            redis::cmd("DEL").arg(key).query_async(&mut conn).await;
        self.after(res).await
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.current_conn().await?;
        let res: Result<Vec<String>, RedisError> =
            redis::cmd("KEYS").arg(pattern).query_async(&mut conn).await;
        self.after(res).await
    }

    async fn del_batch(&self, keys: &[String]) -> Result<u64, StoreError> {
        let mut conn = self.current_conn().await?;
        let mut pipe = redis::pipe();
        for key in keys {
            pipe.cmd("DEL").arg(key);
        }
        let res: Result<Vec<u64>, RedisError> = pipe.query_async(&mut conn).await;
        self.after(res).await.map(|counts| counts.iter().sum())
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<u64, StoreError> {
        let mut conn = self.current_conn().await?;
        // Sharded pub/sub in cluster mode, otherwise classic pub/sub
        let cmd_name = if self.config.is_cluster() {
            "SPUBLISH"
        } else {
            "PUBLISH"
        };
        let res: Result<u64, RedisError> = redis::cmd(cmd_name)
            .arg(channel)
            .arg(payload)
            .query_async(&mut conn)
            .await;
        self.after(res).await
    }

    async fn subscribe(&self, channel: &str) -> Result<(), StoreError> {
        let mut conn = self.current_conn().await?;
        let cmd_name = if self.config.is_cluster() {
            "SSUBSCRIBE"
        } else {
            "SUBSCRIBE"
        };
        let res: Result<Value, RedisError> = redis::cmd(cmd_name)
            .arg(channel)
            .query_async(&mut conn)
            .await;
        self.after(res).await.map(|_| ())
    }

    async fn unsubscribe(&self, channel: Option<&str>) -> Result<(), StoreError> {
        let mut conn = self.current_conn().await?;
        let cmd_name = if self.config.is_cluster() {
            "SUNSUBSCRIBE"
        } else {
            "UNSUBSCRIBE"
        };
        let mut cmd = redis::cmd(cmd_name);
        if let Some(channel) = channel {
            cmd.arg(channel);
        }
        let res: Result<Value, RedisError> = cmd.query_async(&mut conn).await;
        self.after(res).await.map(|_| ())
    }

    async fn take_messages(&self) -> Option<UnboundedReceiver<StoreMessage>> {
        self.push_rx.lock().await.take()
    }

    async fn set_nx_px(&self, key: &str, token: &str, ttl_ms: u64) -> Result<bool, StoreError> {
        let mut conn = self.current_conn().await?;
        let res: Result<Option<String>, RedisError> = redis::cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await;
        self.after(res).await.map(|reply| reply.is_some())
    }

    async fn del_if_match(&self, key: &str, token: &str) -> Result<bool, StoreError> {
        let mut conn = self.current_conn().await?;
        let res: Result<i64, RedisError> = redis::Script::new(DEL_IF_MATCH)
            .key(key)
            .arg(token)
            .invoke_async(&mut conn)
            .await;
        self.after(res).await.map(|n| n == 1)
    }

    async fn pexpire_if_match(
        &self,
        key: &str,
        token: &str,
        ttl_ms: u64,
    ) -> Result<bool, StoreError> {
        let mut conn = self.current_conn().await?;
        let res: Result<i64, RedisError> = redis::Script::new(PEXPIRE_IF_MATCH)
            .key(key)
            .arg(token)
            .arg(ttl_ms)
            .invoke_async(&mut conn)
            .await;
        self.after(res).await.map(|n| n == 1)
    }
}
