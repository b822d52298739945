//! # Normalized Error Types
//!
//! Every public operation in this library fails with a [`SwitchError`]: a
//! tagged system error carrying a component classification list (e.g.
//! `["redis"]`, `["redis","lock"]`) so callers get one uniform failure
//! channel regardless of which underlying client misbehaved. Raw driver
//! errors never cross the library boundary.

use crate::enums::Component;
use thiserror::Error;

/// The single error surface of `lib_switch`.
#[derive(Debug, Error)]
pub enum SwitchError {
    /// Establishing (or re-establishing) a connection exhausted its retries.
    #[error("[{}] connection failed: {detail}", .systems.join(","))]
    Connection {
        /// Component tags for downstream classification.
        systems: Vec<String>,
        /// Human-readable description of the last underlying failure.
        detail: String,
    },

    /// A remote operation exhausted its retries.
    #[error("[{}] operation '{op}' failed: {detail}", .systems.join(","))]
    Operation {
        /// Component tags for downstream classification.
        systems: Vec<String>,
        /// The operation that failed, e.g. "get" or "publish".
        op: String,
        /// Human-readable description of the last underlying failure.
        detail: String,
    },

    /// A lock acquisition round did not reach quorum within its bounds.
    /// This is a legitimate non-exceptional outcome, distinct from the
    /// transport errors reaching individual instances.
    #[error("[lock] could not acquire '{resource}' after {attempts} attempt(s): quorum not reached")]
    LockUnavailable {
        /// The contested resource key.
        resource: String,
        /// How many acquisition rounds were run.
        attempts: u32,
    },

    /// The holder's token no longer matches a quorum of instances; the lock
    /// expired or was taken over.
    #[error("[lock] lost ownership of '{resource}': token no longer matches a quorum")]
    LockLost {
        /// The resource key whose ownership was lost.
        resource: String,
    },

    /// Missing or malformed configuration, surfaced at construction time.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl SwitchError {
    /// Wraps an arbitrary error as a tagged connection failure.
    pub fn connection<E: std::fmt::Display>(tags: &[Component], err: E) -> Self {
        SwitchError::Connection {
            systems: tags.iter().map(|t| t.as_str().to_string()).collect(),
            detail: err.to_string(),
        }
    }

    /// Wraps an arbitrary error as a tagged operation failure.
    pub fn operation<E: std::fmt::Display>(tags: &[Component], op: &str, err: E) -> Self {
        SwitchError::Operation {
            systems: tags.iter().map(|t| t.as_str().to_string()).collect(),
            op: op.to_string(),
            detail: err.to_string(),
        }
    }

    /// The component tag list carried by this error, if any.
    pub fn systems(&self) -> &[String] {
        match self {
            SwitchError::Connection { systems, .. } | SwitchError::Operation { systems, .. } => {
                systems
            }
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_error_carries_tags_and_op() {
        let err = SwitchError::operation(&[Component::Redis], "get", "boom");
        assert_eq!(err.systems(), &["redis".to_string()]);
        assert_eq!(err.to_string(), "[redis] operation 'get' failed: boom");
    }

    #[test]
    fn connection_error_joins_multiple_tags() {
        let err = SwitchError::connection(&[Component::Db, Component::Redis], "refused");
        assert_eq!(err.to_string(), "[db,redis] connection failed: refused");
    }

    #[test]
    fn lock_outcomes_have_no_generic_tags() {
        let err = SwitchError::LockUnavailable {
            resource: "settlement-batch".into(),
            attempts: 4,
        };
        assert!(err.systems().is_empty());
        assert!(err.to_string().contains("quorum not reached"));
    }
}
