//! # Store Connection Configuration
//!
//! Immutable connection parameters for the key-value store wrappers. The
//! topology (standalone vs cluster) is decided exactly once, when the
//! configuration is parsed: a `cluster` node list (or `type` of
//! `redis-cluster`) selects cluster mode, otherwise `host`/`port` select
//! standalone mode. Validation failures surface here, at construction,
//! never at first use.

use crate::connections::retry::RetryOptions;
use crate::errors::SwitchError;
use serde::{Deserialize, Serialize};

/// A single store node address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAddr {
    /// Hostname or IP of the node.
    pub host: String,
    /// TCP port of the node.
    pub port: u16,
}

impl NodeAddr {
    /// Renders the node as a `redis://` connection URL.
    pub fn url(&self) -> String {
        format!("redis://{}:{}", self.host, self.port)
    }
}

/// Deployment mode of the backing store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreTopology {
    /// A single node.
    Standalone(NodeAddr),
    /// A sharded multi-node cluster.
    Cluster(Vec<NodeAddr>),
}

/// Connection parameters for one wrapper instance. Immutable once the
/// component is constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    /// Standalone or cluster topology, decided at parse time.
    pub topology: StoreTopology,
    /// Whether connections are established on first use instead of eagerly.
    pub lazy_connect: bool,
    /// Per-component retry settings wrapped around every remote call.
    pub retry: RetryOptions,
}

/// Raw deserialization shape matching the recognized JSON options.
#[derive(Debug, Deserialize)]
struct RawStoreConfig {
    #[serde(rename = "type")]
    kind: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    cluster: Option<Vec<NodeAddr>>,
    #[serde(rename = "lazyConnect")]
    lazy_connect: Option<bool>,
    #[serde(rename = "retryAttempts")]
    retry_attempts: Option<u32>,
    #[serde(rename = "retryDelayMs")]
    retry_delay_ms: Option<u64>,
}

impl StoreConfig {
    /// Builds a standalone configuration with library defaults.
    pub fn standalone(host: &str, port: u16) -> Self {
        Self {
            topology: StoreTopology::Standalone(NodeAddr {
                host: host.to_string(),
                port,
            }),
            lazy_connect: true,
            retry: RetryOptions::default(),
        }
    }

    /// Builds a cluster configuration with library defaults.
    pub fn cluster(nodes: Vec<NodeAddr>) -> Self {
        Self {
            topology: StoreTopology::Cluster(nodes),
            lazy_connect: true,
            retry: RetryOptions::default(),
        }
    }

    /// Parses a configuration from its JSON representation.
    ///
    /// Topology is discriminated by the presence of a `cluster` field (or a
    /// `type` of `"redis-cluster"`); a standalone config requires `host` and
    /// `port`. The result is validated before being returned.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, SwitchError> {
        let raw: RawStoreConfig = serde_json::from_value(value.clone())
            .map_err(|e| SwitchError::Validation(format!("store config: {e}")))?;

        let wants_cluster = raw.cluster.is_some()
            || raw.kind.as_deref() == Some("redis-cluster");

        let topology = if wants_cluster {
            let nodes = raw.cluster.ok_or_else(|| {
                SwitchError::Validation(
                    "store config: type is 'redis-cluster' but no cluster node list given".into(),
                )
            })?;
            StoreTopology::Cluster(nodes)
        } else {
            let host = raw.host.ok_or_else(|| {
                SwitchError::Validation("store config: missing 'host'".into())
            })?;
            let port = raw.port.ok_or_else(|| {
                SwitchError::Validation("store config: missing 'port'".into())
            })?;
            StoreTopology::Standalone(NodeAddr { host, port })
        };

        let config = Self {
            topology,
            lazy_connect: raw.lazy_connect.unwrap_or(true),
            retry: RetryOptions {
                attempts: raw
                    .retry_attempts
                    .map(|a| a.max(1))
                    .unwrap_or(RetryOptions::default().attempts),
                delay_ms: raw
                    .retry_delay_ms
                    .unwrap_or(RetryOptions::default().delay_ms),
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration for structural problems.
    pub fn validate(&self) -> Result<(), SwitchError> {
        match &self.topology {
            StoreTopology::Standalone(node) => validate_node(node),
            StoreTopology::Cluster(nodes) => {
                if nodes.is_empty() {
                    return Err(SwitchError::Validation(
                        "store config: cluster node list is empty".into(),
                    ));
                }
                nodes.iter().try_for_each(validate_node)
            }
        }
    }

    /// Whether this configuration targets a cluster.
    pub fn is_cluster(&self) -> bool {
        matches!(self.topology, StoreTopology::Cluster(_))
    }

    /// Connection URLs for every configured node. For subscriber connections
    /// RESP3 is requested explicitly so the server pushes messages.
    pub(crate) fn node_urls(&self, resp3: bool) -> Vec<String> {
        let suffix = if resp3 { "/?protocol=resp3" } else { "" };
        match &self.topology {
            StoreTopology::Standalone(node) => vec![format!("{}{}", node.url(), suffix)],
            StoreTopology::Cluster(nodes) => {
                nodes.iter().map(|n| format!("{}{}", n.url(), suffix)).collect()
            }
        }
    }
}

fn validate_node(node: &NodeAddr) -> Result<(), SwitchError> {
    if node.host.trim().is_empty() {
        return Err(SwitchError::Validation(
            "store config: node host is empty".into(),
        ));
    }
    if node.port == 0 {
        return Err(SwitchError::Validation(format!(
            "store config: node '{}' has port 0",
            node.host
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn standalone_config_parses_with_defaults() {
        let cfg = StoreConfig::from_value(&json!({
            "type": "redis",
            "host": "10.0.0.5",
            "port": 6379
        }))
        .expect("valid config");
        assert!(!cfg.is_cluster());
        assert!(cfg.lazy_connect);
        assert_eq!(cfg.retry.attempts, 3);
        assert_eq!(cfg.retry.delay_ms, 200);
    }

    #[test]
    fn cluster_field_selects_cluster_topology() {
        let cfg = StoreConfig::from_value(&json!({
            "cluster": [
                {"host": "n1", "port": 7000},
                {"host": "n2", "port": 7001}
            ],
            "retryAttempts": 5,
            "retryDelayMs": 50
        }))
        .expect("valid config");
        assert!(cfg.is_cluster());
        assert_eq!(cfg.retry.attempts, 5);
        assert_eq!(cfg.retry.delay_ms, 50);
        assert_eq!(cfg.node_urls(false), vec!["redis://n1:7000", "redis://n2:7001"]);
    }

    #[test]
    fn missing_host_is_rejected_at_construction() {
        let err = StoreConfig::from_value(&json!({"port": 6379})).unwrap_err();
        assert!(matches!(err, SwitchError::Validation(_)));
    }

    #[test]
    fn empty_cluster_is_rejected() {
        let err = StoreConfig::from_value(&json!({"cluster": []})).unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn subscriber_urls_request_resp3() {
        let cfg = StoreConfig::standalone("localhost", 6379);
        assert_eq!(
            cfg.node_urls(true),
            vec!["redis://localhost:6379/?protocol=resp3"]
        );
    }
}
