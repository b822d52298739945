//! In-memory [`StoreApi`] implementation for unit tests: deterministic,
//! inspectable, and able to inject failures per operation. Lock tests share
//! one [`MockState`] between two clients to simulate two holders talking to
//! the same instance.

use super::store_client::{StoreApi, StoreError, StoreMessage};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex as AsyncMutex;

/// Shared bus connecting publisher mocks to subscriber mocks.
pub type MockHub = Arc<Mutex<Vec<UnboundedSender<StoreMessage>>>>;

/// Creates an empty hub.
pub fn new_hub() -> MockHub {
    Arc::new(Mutex::new(Vec::new()))
}

#[derive(Default)]
pub struct MockState {
    pub kv: HashMap<String, String>,
    /// Recorded TTLs in milliseconds, keyed like `kv`.
    pub ttls_ms: HashMap<String, u64>,
    pub open: bool,
    pub connect_calls: u32,
    /// Chronological operation log, e.g. `"get a"`, `"del_batch 2"`.
    pub ops: Vec<String>,
    pub subscribed: HashSet<String>,
    /// Remaining injected failures per operation name.
    pub fail: HashMap<&'static str, u32>,
    /// Operations that never resolve, simulating a black-holed instance.
    pub hang: HashSet<&'static str>,
}

pub struct MockStore {
    pub state: Arc<Mutex<MockState>>,
    hub: Option<MockHub>,
    msg_tx: Mutex<Option<UnboundedSender<StoreMessage>>>,
    msg_rx: AsyncMutex<Option<UnboundedReceiver<StoreMessage>>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::with_state(Arc::new(Mutex::new(MockState::default())))
    }

    /// A client over externally owned state, for multi-holder scenarios.
    pub fn with_state(state: Arc<Mutex<MockState>>) -> Self {
        Self {
            state,
            hub: None,
            msg_tx: Mutex::new(None),
            msg_rx: AsyncMutex::new(None),
        }
    }

    /// Joins a hub: publishes reach every subscriber client on the hub.
    pub fn with_hub(hub: MockHub) -> Self {
        let mut store = Self::new();
        store.hub = Some(hub);
        store
    }

    /// Makes the next `times` calls of `op` fail.
    pub fn fail_times(&self, op: &'static str, times: u32) {
        self.state.lock().unwrap().fail.insert(op, times);
    }

    /// Makes every call of `op` suspend forever.
    pub fn hang_on(&self, op: &'static str) {
        self.state.lock().unwrap().hang.insert(op);
    }

    /// Suspends forever when `op` is black-holed.
    async fn gate(&self, op: &'static str) {
        let hung = self.state.lock().unwrap().hang.contains(op);
        if hung {
            std::future::pending::<()>().await;
        }
    }

    /// Injects an incoming message as if the store delivered it.
    pub fn push_message(&self, channel: &str, payload: &str) {
        if let Some(tx) = self.msg_tx.lock().unwrap().as_ref() {
            let _ = tx.send(StoreMessage {
                channel: channel.to_string(),
                payload: payload.to_string(),
            });
        }
    }

    pub fn op_count(&self, prefix: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .ops
            .iter()
            .filter(|op| op.starts_with(prefix))
            .count()
    }

    /// Records the attempt, applies failure injection, and enforces the
    /// open-connection requirement for data-plane operations.
    fn check(&self, op: &'static str, detail: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        if detail.is_empty() {
            state.ops.push(op.to_string());
        } else {
            state.ops.push(format!("{op} {detail}"));
        }
        if let Some(remaining) = state.fail.get_mut(op) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StoreError::Other(format!("injected {op} failure")));
            }
        }
        if op != "connect" && op != "quit" && !state.open {
            return Err(StoreError::NotOpen);
        }
        Ok(())
    }
}

#[async_trait]
impl StoreApi for MockStore {
    async fn connect(&self) -> Result<(), StoreError> {
        self.check("connect", "")?;
        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(hub) = &self.hub {
            hub.lock().unwrap().push(tx.clone());
        }
        *self.msg_tx.lock().unwrap() = Some(tx);
        *self.msg_rx.lock().await = Some(rx);
        let mut state = self.state.lock().unwrap();
        state.open = true;
        state.connect_calls += 1;
        Ok(())
    }

    async fn quit(&self) -> Result<(), StoreError> {
        self.check("quit", "")?;
        {
            let mut state = self.state.lock().unwrap();
            state.open = false;
            state.subscribed.clear();
        }
        self.msg_tx.lock().unwrap().take();
        self.msg_rx.lock().await.take();
        Ok(())
    }

    async fn is_open(&self) -> bool {
        self.state.lock().unwrap().open
    }

    async fn ping(&self) -> Result<String, StoreError> {
        self.check("ping", "")?;
        Ok("PONG".to_string())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check("get", key)?;
        Ok(self.state.lock().unwrap().kv.get(key).cloned())
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: Option<u64>,
    ) -> Result<(), StoreError> {
        self.check("set", key)?;
        let mut state = self.state.lock().unwrap();
        state.kv.insert(key.to_string(), value.to_string());
        if let Some(ttl) = ttl_seconds {
            state.ttls_ms.insert(key.to_string(), ttl * 1000);
        }
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<u64, StoreError> {
        self.check("del", key)?;
        let mut state = self.state.lock().unwrap();
        state.ttls_ms.remove(key);
        Ok(state.kv.remove(key).map(|_| 1).unwrap_or(0))
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        self.check("keys", pattern)?;
        let state = self.state.lock().unwrap();
        let keys = state
            .kv
            .keys()
            .filter(|k| match pattern.strip_suffix('*') {
                Some(prefix) => k.starts_with(prefix),
                None => k.as_str() == pattern,
            })
            .cloned()
            .collect();
        Ok(keys)
    }

    async fn del_batch(&self, keys: &[String]) -> Result<u64, StoreError> {
        self.check("del_batch", &keys.len().to_string())?;
        let mut removed = 0;
        let mut state = self.state.lock().unwrap();
        for key in keys {
            state.ttls_ms.remove(key);
            if state.kv.remove(key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<u64, StoreError> {
        self.check("publish", channel)?;
        let mut receivers = 0;
        if let Some(hub) = &self.hub {
            for tx in hub.lock().unwrap().iter() {
                if tx
                    .send(StoreMessage {
                        channel: channel.to_string(),
                        payload: payload.to_string(),
                    })
                    .is_ok()
                {
                    receivers += 1;
                }
            }
        }
        Ok(receivers)
    }

    async fn subscribe(&self, channel: &str) -> Result<(), StoreError> {
        self.check("subscribe", channel)?;
        let mut state = self.state.lock().unwrap();
        state.subscribed.insert(channel.to_string());
        Ok(())
    }

    async fn unsubscribe(&self, channel: Option<&str>) -> Result<(), StoreError> {
        self.check("unsubscribe", channel.unwrap_or("*"))?;
        let mut state = self.state.lock().unwrap();
        match channel {
            Some(channel) => {
                state.subscribed.remove(channel);
            }
            None => state.subscribed.clear(),
        }
        Ok(())
    }

    async fn take_messages(&self) -> Option<UnboundedReceiver<StoreMessage>> {
        self.msg_rx.lock().await.take()
    }

    async fn set_nx_px(&self, key: &str, token: &str, ttl_ms: u64) -> Result<bool, StoreError> {
        self.gate("set_nx_px").await;
        self.check("set_nx_px", key)?;
        let mut state = self.state.lock().unwrap();
        if state.kv.contains_key(key) {
            return Ok(false);
        }
        state.kv.insert(key.to_string(), token.to_string());
        state.ttls_ms.insert(key.to_string(), ttl_ms);
        Ok(true)
    }

    async fn del_if_match(&self, key: &str, token: &str) -> Result<bool, StoreError> {
        self.gate("del_if_match").await;
        self.check("del_if_match", key)?;
        let mut state = self.state.lock().unwrap();
        if state.kv.get(key).map(String::as_str) == Some(token) {
            state.kv.remove(key);
            state.ttls_ms.remove(key);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn pexpire_if_match(
        &self,
        key: &str,
        token: &str,
        ttl_ms: u64,
    ) -> Result<bool, StoreError> {
        self.gate("pexpire_if_match").await;
        self.check("pexpire_if_match", key)?;
        let mut state = self.state.lock().unwrap();
        if state.kv.get(key).map(String::as_str) == Some(token) {
            state.ttls_ms.insert(key.to_string(), ttl_ms);
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
