//! # General Helpers
//!
//! Small, widely reused helpers: RFC 9557 timestamps for log records,
//! opaque token / correlation-id generation, and SHA-256 digests.

use chrono::{SecondsFormat, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Returns the current UTC datetime as an RFC 9557 string,
/// e.g. `2026-08-27T14:03:21.123Z[UTC]`.
pub fn current_datetime_rfc9557() -> String {
    format!(
        "{}[UTC]",
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
    )
}

/// Generates a random opaque token (hex, no hyphens).
///
/// Used as proof-of-ownership for distributed locks; collision probability
/// is negligible for the lock TTLs in play.
pub fn new_token() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Generates a correlation id suitable for the `x-swx-correlation-id` header.
pub fn new_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Returns the lowercase hex SHA-256 digest of the input.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}
