//! # Retry Policy
//!
//! A generic resilience primitive composed around every network call in this
//! layer. It knows nothing about what it retries: it calls the supplied
//! operation, waits a fixed delay on failure, and re-raises the last error
//! once the attempt budget is exhausted.

use crate::loggers::loggerlocal::LoggerLocal;
use std::future::Future;
use std::time::Duration;

/// Library-wide default number of attempts.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
/// Library-wide default delay between attempts, in milliseconds.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 200;

/// Per-component retry settings, fixed at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryOptions {
    /// Total attempts, including the first one. Always >= 1.
    pub attempts: u32,
    /// Delay between attempts, in milliseconds.
    pub delay_ms: u64,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_RETRY_ATTEMPTS,
            delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }
}

impl RetryOptions {
    /// The inter-attempt delay as a [`Duration`].
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Clamps `attempts` to at least 1.
    pub fn normalized(self) -> Self {
        Self {
            attempts: self.attempts.max(1),
            delay_ms: self.delay_ms,
        }
    }
}

/// Runs `operation` up to `attempts` times, sleeping `delay` between failures.
///
/// The first attempt counts as attempt 1. Each failed attempt before the last
/// is reported to `logger` at warning level with the attempt index; no
/// logging occurs when no logger is supplied. On exhausting attempts the last
/// observed error is returned unchanged.
///
/// The delay is real wall-clock time via `tokio::time::sleep`; tests mock it
/// with tokio's paused clock.
pub async fn retry_async<T, E, F, Fut>(
    mut operation: F,
    attempts: u32,
    delay: Duration,
    logger: Option<&LoggerLocal>,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= attempts {
                    return Err(err);
                }
                if let Some(logger) = logger {
                    logger
                        .warn(
                            &format!("attempt {attempt}/{attempts} failed: {err}"),
                            None,
                        )
                        .await;
                }
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
