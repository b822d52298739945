//! # Health Indicators
//!
//! A uniform probe surface over the library's connection wrappers. Service
//! binaries register one indicator per dependency and expose the aggregate
//! on their liveness endpoint. Probes never raise: an unreachable dependency
//! reports `false`.

use async_trait::async_trait;

/// One probeable dependency.
#[async_trait]
pub trait HealthIndicator: Send + Sync {
    /// Stable name of the dependency, used in reports.
    fn name(&self) -> &str;

    /// Whether the dependency currently answers its liveness probe.
    async fn health_check(&self) -> bool;
}

/// Outcome of probing one dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub component: String,
    pub healthy: bool,
}

/// Probes every indicator sequentially and collects the outcomes.
pub async fn check_all(indicators: &[&dyn HealthIndicator]) -> Vec<HealthReport> {
    let mut reports = Vec::with_capacity(indicators.len());
    for indicator in indicators {
        reports.push(HealthReport {
            component: indicator.name().to_string(),
            healthy: indicator.health_check().await,
        });
    }
    reports
}

/// Whether every report in an aggregate is healthy.
pub fn all_healthy(reports: &[HealthReport]) -> bool {
    reports.iter().all(|r| r.healthy)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        name: &'static str,
        healthy: bool,
    }

    #[async_trait]
    impl HealthIndicator for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        async fn health_check(&self) -> bool {
            self.healthy
        }
    }

    #[tokio::test]
    async fn aggregate_reports_every_indicator() {
        let cache = Fixed { name: "cache", healthy: true };
        let lock = Fixed { name: "lock", healthy: false };
        let reports = check_all(&[&cache, &lock]).await;
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0], HealthReport { component: "cache".into(), healthy: true });
        assert!(!all_healthy(&reports));
    }

    #[tokio::test]
    async fn empty_aggregate_is_healthy() {
        let reports = check_all(&[]).await;
        assert!(all_healthy(&reports));
    }
}
