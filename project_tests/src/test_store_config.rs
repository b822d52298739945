use lib_switch::configs::config_store::RuntimeConfig;
use lib_switch::{NodeAddr, StoreConfig};
use std::collections::BTreeMap;

/// # Store Configuration Integration Test
///
/// Exercises the path a service takes at startup: flattened layered options
/// are reassembled into a JSON section, parsed into a typed `StoreConfig`,
/// and validated, for both the standalone and cluster shapes.
fn main() {
    // Standalone shape
    let mut options = BTreeMap::new();
    options.insert("redis:type".to_string(), "redis".to_string());
    options.insert("redis:host".to_string(), "cache01.swx".to_string());
    options.insert("redis:port".to_string(), "6379".to_string());
    options.insert("redis:retryAttempts".to_string(), "5".to_string());
    options.insert("redis:retryDelayMs".to_string(), "100".to_string());
    let cfg = RuntimeConfig {
        config_options: options,
        ..RuntimeConfig::default()
    };

    let section = cfg.section("redis").expect("redis section present");
    let store = StoreConfig::from_value(&section).expect("valid standalone config");
    assert!(!store.is_cluster());
    assert_eq!(store.retry.attempts, 5);
    assert_eq!(store.retry.delay_ms, 100);

    // Cluster shape
    let mut options = BTreeMap::new();
    options.insert("redis:cluster:0:host".to_string(), "n1.swx".to_string());
    options.insert("redis:cluster:0:port".to_string(), "7000".to_string());
    options.insert("redis:cluster:1:host".to_string(), "n2.swx".to_string());
    options.insert("redis:cluster:1:port".to_string(), "7001".to_string());
    let cfg = RuntimeConfig {
        config_options: options,
        ..RuntimeConfig::default()
    };

    let section = cfg.section("redis").expect("redis section present");
    let store = StoreConfig::from_value(&section).expect("valid cluster config");
    assert!(store.is_cluster());

    // Builders validate the same way the parser does
    assert!(StoreConfig::standalone("cache01.swx", 6379).validate().is_ok());
    assert!(StoreConfig::cluster(vec![]).validate().is_err());
    assert!(StoreConfig::cluster(vec![NodeAddr {
        host: "n1.swx".to_string(),
        port: 7000,
    }])
    .validate()
    .is_ok());

    println!("test_store_config: OK");
}
