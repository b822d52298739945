//! # Platform Enumerations
//!
//! Shared enumerations and constants used across the swxgate services:
//! transaction kinds, ISO-8583 style response codes, component tags for
//! error classification, and the well-known broadcast channel names.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of financial transaction flowing through the switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxnType {
    Purchase,
    Withdrawal,
    BalanceInquiry,
    Transfer,
    Refund,
    Reversal,
}

impl TxnType {
    /// The ISO-8583 processing code prefix for this transaction kind.
    pub fn processing_code(&self) -> &'static str {
        match self {
            TxnType::Purchase => "00",
            TxnType::Withdrawal => "01",
            TxnType::BalanceInquiry => "31",
            TxnType::Transfer => "40",
            TxnType::Refund => "20",
            TxnType::Reversal => "21",
        }
    }
}

impl fmt::Display for TxnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Normalized outcome codes returned to acquiring channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseCode {
    Approved,
    DoNotHonor,
    InsufficientFunds,
    InvalidTransaction,
    IssuerUnavailable,
    DuplicateTransaction,
    SystemMalfunction,
}

impl ResponseCode {
    /// Two-digit wire code as carried in field 39.
    pub fn code(&self) -> &'static str {
        match self {
            ResponseCode::Approved => "00",
            ResponseCode::DoNotHonor => "05",
            ResponseCode::InvalidTransaction => "12",
            ResponseCode::InsufficientFunds => "51",
            ResponseCode::IssuerUnavailable => "91",
            ResponseCode::DuplicateTransaction => "94",
            ResponseCode::SystemMalfunction => "96",
        }
    }

    /// Whether this code represents a successful authorization.
    pub fn is_approved(&self) -> bool {
        matches!(self, ResponseCode::Approved)
    }
}

/// Component/system tags attached to normalized errors so downstream
/// classification can route failures without parsing message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Component {
    Redis,
    Db,
    Http,
    Lock,
    Config,
}

impl Component {
    /// The canonical lowercase tag string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Redis => "redis",
            Component::Db => "db",
            Component::Http => "http",
            Component::Lock => "lock",
            Component::Config => "config",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Well-known broadcast channel names shared by the services.
pub mod channels {
    /// Authorization results fan-out.
    pub const TXN_EVENTS: &str = "swx:events:txn";
    /// Settlement batch lifecycle notifications.
    pub const SETTLEMENT_EVENTS: &str = "swx:events:settlement";
    /// Configuration reload broadcasts.
    pub const CONFIG_RELOAD: &str = "swx:control:reload";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_codes_match_wire_values() {
        assert_eq!(ResponseCode::Approved.code(), "00");
        assert_eq!(ResponseCode::InsufficientFunds.code(), "51");
        assert!(ResponseCode::Approved.is_approved());
        assert!(!ResponseCode::IssuerUnavailable.is_approved());
    }

    #[test]
    fn component_tags_are_lowercase() {
        assert_eq!(Component::Redis.as_str(), "redis");
        assert_eq!(Component::Lock.to_string(), "lock");
    }
}
