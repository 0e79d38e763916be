use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;

/// How a generation request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Generated,
    Throttled,
    Rejected,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplyMetrics {
    pub total_requests: u64,
    pub generated: u64,
    pub throttled: u64,
    pub rejected: u64,
    pub failed: u64,
    pub since: u64,
}

impl Default for ReplyMetrics {
    fn default() -> Self {
        Self {
            total_requests: 0,
            generated: 0,
            throttled: 0,
            rejected: 0,
            failed: 0,
            since: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        }
    }
}

/// Process-wide counters for generation outcomes.
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector {
    metrics: Arc<RwLock<ReplyMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, outcome: Outcome) {
        let mut metrics = self.metrics.write().await;
        metrics.total_requests += 1;
        match outcome {
            Outcome::Generated => metrics.generated += 1,
            Outcome::Throttled => metrics.throttled += 1,
            Outcome::Rejected => metrics.rejected += 1,
            Outcome::Failed => metrics.failed += 1,
        }
    }

    pub async fn snapshot(&self) -> ReplyMetrics {
        self.metrics.read().await.clone()
    }
}
