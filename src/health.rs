use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::metrics::ReplyMetrics;
use crate::orchestrator::ReplyService;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub status: String,
    pub service: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub provider: ServiceStatus,
    pub tracked_clients: usize,
    pub max_calls_per_day: u32,
    pub metrics: ReplyMetrics,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub status: String,
    pub error: Option<String>,
}

static START_TIME: std::sync::LazyLock<SystemTime> = std::sync::LazyLock::new(SystemTime::now);

pub struct HealthChecker {
    service: ReplyService,
}

impl HealthChecker {
    pub fn new(service: ReplyService) -> Self {
        // Touch the start time so uptime counts from construction.
        std::sync::LazyLock::force(&START_TIME);
        Self { service }
    }

    pub async fn check_health(&self) -> HealthStatus {
        let now = SystemTime::now();
        let uptime = now.duration_since(*START_TIME)
            .unwrap_or_default()
            .as_secs();

        let provider = self.check_provider();

        let overall_status = if provider.status == "configured" {
            "healthy"
        } else {
            "degraded" // Quota endpoints still work without a provider
        };

        HealthStatus {
            status: overall_status.to_string(),
            service: env!("CARGO_PKG_NAME").to_string(),
            timestamp: now.duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: uptime,
            provider,
            tracked_clients: self.service.tracker().tracked_identifiers(),
            max_calls_per_day: self.service.tracker().policy().max_calls_per_day,
            metrics: self.service.metrics().snapshot().await,
        }
    }

    fn check_provider(&self) -> ServiceStatus {
        if self.service.is_provider_configured() {
            ServiceStatus {
                status: "configured".to_string(),
                error: None,
            }
        } else {
            ServiceStatus {
                status: "unconfigured".to_string(),
                error: Some("Provider URL or API key missing or unresolved".to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client_id::ClientIdResolver;
    use crate::generation::{GeminiClient, ProviderSettings};
    use crate::usage_tracker::{QuotaPolicy, UsageTracker};
    use std::sync::Arc;

    fn checker(settings: ProviderSettings) -> HealthChecker {
        let service = ReplyService::new(
            ClientIdResolver::with_local_address(None),
            Arc::new(UsageTracker::new(QuotaPolicy::default())),
            Arc::new(GeminiClient::new(settings).unwrap()),
        );
        HealthChecker::new(service)
    }

    #[tokio::test]
    async fn test_unconfigured_provider_is_degraded() {
        let status = checker(ProviderSettings::new(None, None)).check_health().await;
        assert_eq!(status.status, "degraded");
        assert_eq!(status.provider.status, "unconfigured");
        assert_eq!(status.max_calls_per_day, 5);
        assert_eq!(status.tracked_clients, 0);
    }

    #[tokio::test]
    async fn test_configured_provider_is_healthy() {
        let settings = ProviderSettings::new(
            Some("https://example.test/generate".to_string()),
            Some("key".parse().unwrap()),
        );
        let status = checker(settings).check_health().await;
        assert_eq!(status.status, "healthy");
        assert!(status.provider.error.is_none());
    }

    #[test]
    fn test_health_status_serialization() {
        let status = HealthStatus {
            status: "healthy".to_string(),
            service: "replygate".to_string(),
            timestamp: 1234567890,
            version: "1.0.0".to_string(),
            uptime_seconds: 3600,
            provider: ServiceStatus {
                status: "configured".to_string(),
                error: None,
            },
            tracked_clients: 3,
            max_calls_per_day: 5,
            metrics: ReplyMetrics::default(),
        };

        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("1234567890"));
        assert!(json.contains("uptimeSeconds"));
    }
}
