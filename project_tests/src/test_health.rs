use lib_switch::health::{all_healthy, check_all, HealthIndicator, HealthReport};

struct Probe {
    name: &'static str,
    healthy: bool,
}

#[async_trait::async_trait]
impl HealthIndicator for Probe {
    fn name(&self) -> &str {
        self.name
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }
}

/// # Health Aggregation Integration Test
///
/// Builds the aggregate a service exposes on its liveness endpoint and
/// verifies report ordering and overall status.
#[tokio::main]
async fn main() {
    let cache = Probe { name: "redis-cache", healthy: true };
    let pubsub = Probe { name: "redis-pubsub", healthy: true };
    let reports = check_all(&[&cache, &pubsub]).await;
    assert_eq!(
        reports,
        vec![
            HealthReport { component: "redis-cache".to_string(), healthy: true },
            HealthReport { component: "redis-pubsub".to_string(), healthy: true },
        ]
    );
    assert!(all_healthy(&reports));

    let broken = Probe { name: "redis-cache", healthy: false };
    let reports = check_all(&[&broken, &pubsub]).await;
    assert!(!all_healthy(&reports));

    println!("test_health: OK");
}
