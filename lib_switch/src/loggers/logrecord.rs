use chrono::{DateTime, Utc};
use postgres_types::{FromSql, ToSql};
use serde_derive::Deserialize;
use serde_derive::Serialize;
use serde_json::Value;
use static_init::dynamic;

use crate::utils::misc::sys_info::{get_process_info, ProcessInfo, ProcessInfoError};
use crate::utils::misc::utils::current_datetime_rfc9557;

#[dynamic]
/// Statically initialized `ProcessInfo` instance, providing details about the current process.
pub static PROCESSINFO: Result<ProcessInfo, ProcessInfoError> = get_process_info();

/// Numeric severity levels used across the swxgate services.
///
/// 6 = fatal, 5 = error, 4 = warn, 3 = info, 2 = debug, 1 = verbose.
pub const LEVEL_FATAL: i64 = 6;
/// Error severity.
pub const LEVEL_ERROR: i64 = 5;
/// Warning severity.
pub const LEVEL_WARN: i64 = 4;
/// Informational severity.
pub const LEVEL_INFO: i64 = 3;
/// Debug severity.
pub const LEVEL_DEBUG: i64 = 2;
/// Verbose severity.
pub const LEVEL_VERBOSE: i64 = 1;

/// # Logrecord
///
/// Represents a structured log entry as shipped to the central log table.
/// Each record carries enough process and host identity to attribute events
/// from any of the independently deployed switch services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSql, FromSql)]
pub struct Logrecord {
    /// Unique identifier for the log record. Typically assigned by the database.
    pub id: Option<i64>,
    /// Timestamp (UTC) when the log record was created.
    pub ts: Option<DateTime<Utc>>,
    /// The severity level of the log (1 = Verbose .. 6 = Fatal).
    pub loglevel: i64,
    /// Details about the message content.
    pub message: Message,
    /// Information about the application generating the log.
    pub app: App,
    /// Information about the host where the log originated.
    pub host: Host,
    /// Information about the user associated with the log event.
    pub user: User,
    /// Details if the log record represents an error.
    pub error: ErrorBlock,
    /// Flexible JSON value for arbitrary tags or additional metadata.
    pub tags: Value,
    /// RFC 9557 formatted timestamp string.
    pub rfc9557: String,
}

impl Default for Logrecord {
    /// Creates a default `Logrecord` with identity blocks populated from the
    /// static process information and the current UTC timestamp.
    fn default() -> Self {
        Self {
            id: None,
            ts: Some(Utc::now()),
            loglevel: LEVEL_INFO,
            message: Message::default(),
            app: App::default(),
            host: Host::default(),
            user: User::default(),
            error: ErrorBlock::default(),
            tags: serde_json::json!([]),
            rfc9557: current_datetime_rfc9557(),
        }
    }
}

/// # Message
///
/// Represents the textual content of a log entry, including its language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSql, FromSql)]
pub struct Message {
    /// The language of the message (e.g., "en" for English).
    pub lang: String,
    /// The actual text content of the message.
    pub text: String,
}
impl Default for Message {
    fn default() -> Self {
        Self {
            text: "".to_string(),
            lang: "en".to_string(),
        }
    }
}

/// # App
///
/// Contains information about the application that generated the log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSql, FromSql)]
pub struct App {
    /// The process ID (PID) of the application.
    pub pid: i64,
    /// The name of the application.
    pub name: String,
}
impl Default for App {
    fn default() -> Self {
        let name = PROCESSINFO
            .as_ref()
            .map(|p| p.process_basename.clone())
            .unwrap_or_else(|_| "unknown".to_string());
        Self {
            name,
            pid: std::process::id() as i64,
        }
    }
}

/// # Host
///
/// Contains information about the host machine where the log originated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSql, FromSql)]
pub struct Host {
    /// The IP address of the host.
    pub ip: String,
    /// The name of the host.
    pub name: String,
}
impl Default for Host {
    fn default() -> Self {
        match PROCESSINFO.as_ref() {
            Ok(p) => Self {
                name: p.process_host.clone(),
                ip: p.process_host_ip.clone(),
            },
            Err(_) => Self {
                name: "unknown".to_string(),
                ip: "127.0.0.1".to_string(),
            },
        }
    }
}

/// # User
///
/// Contains information about the user associated with the log event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSql, FromSql)]
pub struct User {
    /// Additional information about the user.
    pub info: String,
    /// The name of the user.
    pub name: String,
}
impl Default for User {
    fn default() -> Self {
        match PROCESSINFO.as_ref() {
            Ok(p) => Self {
                name: p.process_uid.clone(),
                info: p.process_user.clone(),
            },
            Err(_) => Self {
                name: "0".to_string(),
                info: "unknown".to_string(),
            },
        }
    }
}

/// # ErrorBlock
///
/// Details pertaining to an error that occurred, if the log entry is error-related.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSql, FromSql)]
pub struct ErrorBlock {
    /// A specific error code.
    pub code: String,
    /// The stack trace where the error occurred.
    pub stack: String,
    /// Additional details or a descriptive message about the error.
    pub details: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_record_carries_process_identity() {
        let rec = Logrecord::default();
        assert_eq!(rec.loglevel, LEVEL_INFO);
        assert!(!rec.app.name.is_empty());
        assert!(rec.rfc9557.ends_with("[UTC]"));
    }

    #[test]
    fn record_roundtrips_through_json() {
        let mut rec = Logrecord::default();
        rec.message.text = "auth declined".to_string();
        rec.loglevel = LEVEL_WARN;
        let json = serde_json::to_string(&rec).expect("serialize");
        let back: Logrecord = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.message.text, "auth declined");
        assert_eq!(back.loglevel, LEVEL_WARN);
    }
}
