//! # Distributed Lock
//!
//! Quorum-based mutual exclusion over N independent store instances. A lock
//! is held when a majority of instances accepted an atomic set-if-absent of
//! a random token under the caller's TTL, and the remaining validity window
//! (TTL minus acquisition time minus clock-drift allowance) is positive.
//! Release and extend compare the stored token first, so a stale holder can
//! never evict a newer one. Lock rounds are bounded by the caller's
//! acquisition deadline, not by the connection retry policy.

use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

use crate::connections::store_client::{RedisStoreClient, StoreApi, StoreError};
use crate::connections::store_config::StoreConfig;
use crate::errors::SwitchError;
use crate::loggers::loggerlocal::LoggerLocal;
use crate::utils::new_token;
use std::sync::Arc;

/// Tuning knobs for the acquisition loop.
#[derive(Debug, Clone)]
pub struct LockOptions {
    /// Fraction of the TTL reserved for clock drift between instances.
    pub drift_factor: f64,
    /// Additional acquisition rounds after the first one fails.
    pub retry_count: u32,
    /// Base pause between rounds, in milliseconds.
    pub retry_delay_ms: u64,
    /// Upper bound of the random pause added to `retry_delay_ms`.
    pub retry_jitter_ms: u64,
    /// Hard bound on any single instance operation, in milliseconds. A hung
    /// instance counts as a failed vote instead of stalling the caller.
    pub op_timeout_ms: u64,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            drift_factor: 0.01,
            retry_count: 3,
            retry_delay_ms: 200,
            retry_jitter_ms: 100,
            op_timeout_ms: 1_000,
        }
    }
}

/// Proof of an acquired lock. Carries the random token that release and
/// extend must present to the instances.
#[derive(Debug, Clone)]
pub struct LockHandle {
    /// The locked resource key.
    pub resource_key: String,
    /// Random per-acquisition token stored under the key.
    pub token: String,
    /// When the guaranteed validity window ends.
    pub expires_at: Instant,
}

impl LockHandle {
    /// Remaining guaranteed validity. Zero once the window has closed.
    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}

/// Majority-vote lock coordinator over independent store instances.
pub struct DistributedLock<C: StoreApi = RedisStoreClient> {
    clients: Vec<C>,
    options: LockOptions,
    quorum: usize,
    logger: Arc<LoggerLocal>,
}

impl<C: StoreApi> std::fmt::Debug for DistributedLock<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedLock")
            .field("clients", &self.clients.len())
            .field("options", &self.options)
            .field("quorum", &self.quorum)
            .finish()
    }
}

impl DistributedLock<RedisStoreClient> {
    /// Builds a lock coordinator over one client per configured instance.
    /// At least one instance is required; each configuration is validated
    /// up front.
    pub fn new(
        configs: Vec<StoreConfig>,
        options: LockOptions,
        logger: Arc<LoggerLocal>,
    ) -> Result<Self, SwitchError> {
        if configs.is_empty() {
            return Err(SwitchError::Validation(
                "distributed lock: no store instances configured".into(),
            ));
        }
        configs.iter().try_for_each(StoreConfig::validate)?;
        let clients = configs.into_iter().map(RedisStoreClient::new).collect();
        Ok(Self::with_clients(clients, options, logger))
    }
}

impl<C: StoreApi> DistributedLock<C> {
    /// Builds a coordinator over externally supplied clients. Used by tests;
    /// production callers go through [`DistributedLock::new`].
    pub fn with_clients(clients: Vec<C>, options: LockOptions, logger: Arc<LoggerLocal>) -> Self {
        let quorum = clients.len() / 2 + 1;
        Self {
            clients,
            options,
            quorum,
            logger,
        }
    }

    /// Attempts to acquire `resource_key` for `ttl_ms` milliseconds, giving
    /// up once `acquire_timeout_ms` has elapsed or the configured rounds are
    /// exhausted. A round succeeds when a majority of instances granted the
    /// token and the validity window is still positive; a failed round
    /// releases every partial grant before pausing.
    pub async fn acquire(
        &self,
        resource_key: &str,
        ttl_ms: u64,
        acquire_timeout_ms: u64,
    ) -> Result<LockHandle, SwitchError> {
        let deadline = Instant::now() + Duration::from_millis(acquire_timeout_ms);
        let mut attempts = 0u32;

        for round in 0..=self.options.retry_count {
            attempts += 1;
            let token = new_token();
            let started = Instant::now();
            let mut granted = 0usize;

            for client in &self.clients {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                match tokio::time::timeout(
                    remaining.min(self.op_timeout()),
                    Self::try_instance(client, resource_key, &token, ttl_ms),
                )
                .await
                {
                    Ok(Ok(true)) => granted += 1,
                    Ok(Ok(false)) => {} // held under another token
                    Ok(Err(e)) => {
                        self.logger
                            .warn(
                                &format!("lock '{resource_key}': instance vote failed: {e}"),
                                None,
                            )
                            .await;
                    }
                    Err(_) => {
                        self.logger
                            .warn(
                                &format!("lock '{resource_key}': instance vote timed out"),
                                None,
                            )
                            .await;
                    }
                }
            }

            let validity = self.validity_window(ttl_ms, started.elapsed());
            if granted >= self.quorum && !validity.is_zero() {
                self.logger
                    .debug(
                        &format!(
                            "lock '{resource_key}' acquired on {granted}/{} instance(s)",
                            self.clients.len()
                        ),
                        None,
                    )
                    .await;
                return Ok(LockHandle {
                    resource_key: resource_key.to_string(),
                    token,
                    expires_at: Instant::now() + validity,
                });
            }

            // Partial grants must not linger: they would starve contenders
            self.release_token(resource_key, &token).await;

            if round < self.options.retry_count {
                let jitter = if self.options.retry_jitter_ms > 0 {
                    rand::rng().random_range(0..=self.options.retry_jitter_ms)
                } else {
                    0
                };
                let pause = Duration::from_millis(self.options.retry_delay_ms + jitter);
                if Instant::now() + pause >= deadline {
                    break;
                }
                tokio::time::sleep(pause).await;
            }
        }

        self.logger
            .warn(
                &format!("lock '{resource_key}' unavailable after {attempts} attempt(s)"),
                None,
            )
            .await;
        Err(SwitchError::LockUnavailable {
            resource: resource_key.to_string(),
            attempts,
        })
    }

    /// Renews the TTL of a held lock to `ttl_ms` from now. Succeeds only if
    /// a majority of instances still hold this handle's token; otherwise the
    /// lock is reported lost.
    pub async fn extend(&self, handle: &LockHandle, ttl_ms: u64) -> Result<LockHandle, SwitchError> {
        let started = Instant::now();
        let mut renewed = 0usize;
        for client in &self.clients {
            match self
                .bounded(client.pexpire_if_match(&handle.resource_key, &handle.token, ttl_ms))
                .await
            {
                Ok(true) => renewed += 1,
                Ok(false) => {}
                Err(e) => {
                    self.logger
                        .warn(
                            &format!(
                                "lock '{}': instance extend failed: {e}",
                                handle.resource_key
                            ),
                            None,
                        )
                        .await;
                }
            }
        }
        let validity = self.validity_window(ttl_ms, started.elapsed());
        if renewed >= self.quorum && !validity.is_zero() {
            Ok(LockHandle {
                resource_key: handle.resource_key.clone(),
                token: handle.token.clone(),
                expires_at: Instant::now() + validity,
            })
        } else {
            Err(SwitchError::LockLost {
                resource: handle.resource_key.clone(),
            })
        }
    }

    /// Releases a held lock on every instance that still carries this
    /// handle's token. Returns how many instances released; instances that
    /// already expired or were taken over release nothing. Transport errors
    /// are logged, not raised: the TTL is the backstop.
    pub async fn release(&self, handle: &LockHandle) -> Result<u64, SwitchError> {
        Ok(self.release_token(&handle.resource_key, &handle.token).await)
    }

    fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.options.op_timeout_ms.max(1))
    }

    /// Bounds one instance operation. A timeout is reported as a failed
    /// vote, never as a stall.
    async fn bounded<T>(
        &self,
        op: impl std::future::Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.op_timeout(), op).await {
            Ok(res) => res,
            Err(_) => Err(StoreError::Other("instance operation timed out".into())),
        }
    }

    async fn try_instance(
        client: &C,
        resource_key: &str,
        token: &str,
        ttl_ms: u64,
    ) -> Result<bool, StoreError> {
        if !client.is_open().await {
            client.connect().await?;
        }
        client.set_nx_px(resource_key, token, ttl_ms).await
    }

    async fn release_token(&self, resource_key: &str, token: &str) -> u64 {
        let mut released = 0u64;
        for client in &self.clients {
            match self.bounded(client.del_if_match(resource_key, token)).await {
                Ok(true) => released += 1,
                Ok(false) => {}
                Err(e) => {
                    self.logger
                        .warn(
                            &format!("lock '{resource_key}': instance release failed: {e}"),
                            None,
                        )
                        .await;
                }
            }
        }
        released
    }

    fn validity_window(&self, ttl_ms: u64, elapsed: Duration) -> Duration {
        let drift_ms = (ttl_ms as f64 * self.options.drift_factor).round() as u64 + 2;
        Duration::from_millis(ttl_ms)
            .checked_sub(elapsed + Duration::from_millis(drift_ms))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connections::store_mock::{MockState, MockStore};
    use std::sync::Mutex;

    fn shared_states() -> Vec<Arc<Mutex<MockState>>> {
        (0..3)
            .map(|_| Arc::new(Mutex::new(MockState::default())))
            .collect()
    }

    fn coordinator(
        states: &[Arc<Mutex<MockState>>],
        retry_count: u32,
    ) -> DistributedLock<MockStore> {
        let clients = states
            .iter()
            .map(|s| MockStore::with_state(Arc::clone(s)))
            .collect();
        DistributedLock::with_clients(
            clients,
            LockOptions {
                retry_count,
                retry_delay_ms: 0,
                retry_jitter_ms: 0,
                ..LockOptions::default()
            },
            Arc::new(LoggerLocal::disabled("lock_test")),
        )
    }

    #[tokio::test]
    async fn no_instances_is_rejected_at_construction() {
        let err = DistributedLock::new(
            Vec::new(),
            LockOptions::default(),
            Arc::new(LoggerLocal::disabled("lock_test")),
        )
        .unwrap_err();
        assert!(matches!(err, SwitchError::Validation(_)));
    }

    #[tokio::test]
    async fn second_holder_is_rejected_while_lock_is_held() {
        let states = shared_states();
        let holder = coordinator(&states, 0);
        let contender = coordinator(&states, 0);

        let handle = holder.acquire("txn:42", 10_000, 1_000).await.expect("acquire");
        let err = contender.acquire("txn:42", 10_000, 1_000).await.unwrap_err();
        match err {
            SwitchError::LockUnavailable { resource, attempts } => {
                assert_eq!(resource, "txn:42");
                assert_eq!(attempts, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
        // The failed round's cleanup must not evict the holder's token
        for state in &states {
            assert_eq!(
                state.lock().unwrap().kv.get("txn:42"),
                Some(&handle.token)
            );
        }
    }

    #[tokio::test]
    async fn release_frees_every_instance_for_the_next_holder() {
        let states = shared_states();
        let lock = coordinator(&states, 0);
        let handle = lock.acquire("r", 10_000, 1_000).await.expect("acquire");
        assert_eq!(lock.release(&handle).await.expect("release"), 3);
        lock.acquire("r", 10_000, 1_000).await.expect("reacquire");
    }

    #[tokio::test]
    async fn stale_release_cannot_evict_a_newer_holder() {
        let states = shared_states();
        let lock = coordinator(&states, 0);
        let stale = lock.acquire("r", 10_000, 1_000).await.expect("acquire");
        for state in &states {
            state
                .lock()
                .unwrap()
                .kv
                .insert("r".to_string(), "newer-token".to_string());
        }
        assert_eq!(lock.release(&stale).await.expect("release"), 0);
        for state in &states {
            assert_eq!(
                state.lock().unwrap().kv.get("r").map(String::as_str),
                Some("newer-token")
            );
        }
    }

    #[tokio::test]
    async fn minority_instance_failure_still_grants_the_lock() {
        let states = shared_states();
        let lock = coordinator(&states, 0);
        lock.clients[0].fail_times("set_nx_px", 1);
        lock.acquire("r", 10_000, 1_000).await.expect("quorum of 2/3");
    }

    #[tokio::test]
    async fn majority_instance_failure_denies_the_lock() {
        let states = shared_states();
        let lock = coordinator(&states, 0);
        lock.clients[0].fail_times("set_nx_px", 1);
        lock.clients[1].fail_times("set_nx_px", 1);
        let err = lock.acquire("r", 10_000, 1_000).await.unwrap_err();
        assert!(matches!(err, SwitchError::LockUnavailable { .. }));
    }

    #[tokio::test]
    async fn ttl_smaller_than_drift_allowance_never_grants() {
        let states = shared_states();
        let lock = coordinator(&states, 0);
        // drift allowance alone (1% + 2ms) consumes this whole TTL
        let err = lock.acquire("r", 2, 1_000).await.unwrap_err();
        assert!(matches!(err, SwitchError::LockUnavailable { .. }));
    }

    #[tokio::test]
    async fn concurrent_holders_resolve_to_exactly_one_winner() {
        let states = shared_states();
        let first = coordinator(&states, 0);
        let second = coordinator(&states, 0);

        let (a, b) = tokio::join!(
            first.acquire("batch:close", 10_000, 1_000),
            second.acquire("batch:close", 10_000, 1_000),
        );
        assert!(
            a.is_ok() != b.is_ok(),
            "exactly one contender must win: a={:?} b={:?}",
            a.is_ok(),
            b.is_ok()
        );

        // The winner's token survived the loser's cleanup on a quorum
        let winner = a.or(b).expect("one handle");
        let holding = states
            .iter()
            .filter(|s| {
                s.lock().unwrap().kv.get("batch:close") == Some(&winner.token)
            })
            .count();
        assert!(holding >= 2, "winner holds {holding}/3 instances");
    }

    #[tokio::test(start_paused = true)]
    async fn extend_is_bounded_when_an_instance_hangs() {
        let states = shared_states();
        let lock = coordinator(&states, 0);
        let handle = lock.acquire("r", 10_000, 1_000).await.expect("acquire");
        lock.clients[0].hang_on("pexpire_if_match");
        // The hung instance counts as a failed vote; the 2/3 quorum renews
        let renewed = lock.extend(&handle, 20_000).await.expect("extend");
        assert_eq!(renewed.token, handle.token);
        assert_eq!(
            states[1].lock().unwrap().ttls_ms.get("r").copied(),
            Some(20_000)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn release_is_bounded_when_an_instance_hangs() {
        let states = shared_states();
        let lock = coordinator(&states, 0);
        let handle = lock.acquire("r", 10_000, 1_000).await.expect("acquire");
        lock.clients[0].hang_on("del_if_match");
        assert_eq!(lock.release(&handle).await.expect("release"), 2);
        assert_eq!(
            states[1].lock().unwrap().kv.get("r").map(String::as_str),
            None
        );
    }

    #[tokio::test]
    async fn extend_renews_while_held_and_fails_after_takeover() {
        let states = shared_states();
        let lock = coordinator(&states, 0);
        let handle = lock.acquire("r", 10_000, 1_000).await.expect("acquire");
        let renewed = lock.extend(&handle, 20_000).await.expect("extend");
        assert_eq!(renewed.token, handle.token);
        assert_eq!(
            states[0].lock().unwrap().ttls_ms.get("r").copied(),
            Some(20_000)
        );

        for state in &states {
            state
                .lock()
                .unwrap()
                .kv
                .insert("r".to_string(), "taken-over".to_string());
        }
        let err = lock.extend(&handle, 20_000).await.unwrap_err();
        assert!(matches!(err, SwitchError::LockLost { .. }));
    }
}
