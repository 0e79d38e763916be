use envconfig::Envconfig;
use std::net::SocketAddr;
use std::time::Duration;

use crate::generation::{ApiKey, ProviderSettings};
use crate::usage_tracker::QuotaPolicy;

#[derive(Debug, Envconfig, Clone)]
pub struct Config {
    /// Server bind address
    #[envconfig(from = "BIND_ADDR", default = "127.0.0.1:8080")]
    pub bind_addr: SocketAddr,

    /// Generative-text endpoint; may be absent or an unresolved placeholder
    #[envconfig(from = "GEMINI_API_URL")]
    pub api_url: Option<String>,

    #[envconfig(from = "GEMINI_API_KEY")]
    pub api_key: Option<ApiKey>,

    /// Successful-or-attempted generations allowed per identifier per day
    #[envconfig(from = "MAX_CALLS_PER_DAY", default = "5")]
    pub max_calls_per_day: u32,

    /// Days a usage record is kept after its reset date
    #[envconfig(from = "USAGE_RETENTION_DAYS", default = "2")]
    pub usage_retention_days: u32,

    /// Usage cleanup interval in seconds
    #[envconfig(from = "CLEANUP_INTERVAL_SECS", default = "3600")]
    pub cleanup_interval_secs: u64,

    #[envconfig(from = "PROVIDER_TIMEOUT_SECS", default = "30")]
    pub provider_timeout_secs: u64,

    #[envconfig(from = "LOG_LEVEL", default = "info")]
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, envconfig::Error> {
        Config::init_from_env()
    }

    pub fn quota_policy(&self) -> QuotaPolicy {
        QuotaPolicy {
            max_calls_per_day: self.max_calls_per_day,
            retention_days: self.usage_retention_days,
        }
    }

    pub fn provider_settings(&self) -> ProviderSettings {
        ProviderSettings::new(self.api_url.clone(), self.api_key.clone())
            .with_timeout(Duration::from_secs(self.provider_timeout_secs))
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        let policy = QuotaPolicy::default();
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            api_url: None,
            api_key: None,
            max_calls_per_day: policy.max_calls_per_day,
            usage_retention_days: policy.retention_days,
            cleanup_interval_secs: 3600,
            provider_timeout_secs: 30,
            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_from_empty_env() {
        let config = Config::init_from_hashmap(&HashMap::new()).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.max_calls_per_day, 5);
        assert_eq!(config.usage_retention_days, 2);
        assert_eq!(config.cleanup_interval(), Duration::from_secs(3600));
        assert!(config.api_url.is_none());
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_overrides() {
        let env = HashMap::from([
            ("GEMINI_API_URL".to_string(), "https://example.test/generate".to_string()),
            ("GEMINI_API_KEY".to_string(), "abc123".to_string()),
            ("MAX_CALLS_PER_DAY".to_string(), "10".to_string()),
            ("PROVIDER_TIMEOUT_SECS".to_string(), "5".to_string()),
        ]);
        let config = Config::init_from_hashmap(&env).unwrap();

        assert_eq!(config.quota_policy().max_calls_per_day, 10);
        let settings = config.provider_settings();
        assert_eq!(settings.timeout, Duration::from_secs(5));
        assert_eq!(settings.api_key.as_ref().map(ApiKey::expose), Some("abc123"));
    }

    #[test]
    fn test_debug_does_not_print_key() {
        let config = Config {
            api_key: Some(ApiKey::new("super-secret")),
            ..Config::default()
        };
        assert!(!format!("{config:?}").contains("super-secret"));
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let env = HashMap::from([("MAX_CALLS_PER_DAY".to_string(), "lots".to_string())]);
        assert!(Config::init_from_hashmap(&env).is_err());
    }
}
