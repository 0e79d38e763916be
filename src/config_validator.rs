use crate::config::Config;
use crate::error::Error;
use crate::generation::is_unresolved;

/// Validates configuration objects for consistency and correctness
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates quota parameters
    pub fn validate_quota(max_calls_per_day: u32, cleanup_interval_secs: u64) -> Result<(), Error> {
        if max_calls_per_day == 0 {
            return Err(Error::Configuration(
                "Daily call limit must be greater than 0".to_string(),
            ));
        }

        if cleanup_interval_secs == 0 {
            return Err(Error::Configuration(
                "Cleanup interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn validate_timeout(timeout_secs: u64) -> Result<(), Error> {
        if timeout_secs == 0 {
            return Err(Error::Configuration(
                "Provider timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Problems with provider credentials. These do not stop the service;
    /// generation requests fail with a configuration error instead.
    pub fn provider_warnings(config: &Config) -> Vec<String> {
        let mut warnings = Vec::new();

        if is_unresolved(config.api_url.as_deref()) {
            warnings.push("GEMINI_API_URL is missing or unresolved".to_string());
        } else if let Some(url) = config.api_url.as_deref() {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                warnings.push(format!("GEMINI_API_URL '{url}' is not an http(s) URL"));
            }
        }

        if is_unresolved(config.api_key.as_ref().map(|key| key.expose())) {
            warnings.push("GEMINI_API_KEY is missing or unresolved".to_string());
        }

        warnings
    }

    /// Validates everything the server needs to start
    pub fn validate(config: &Config) -> Result<(), Error> {
        Self::validate_quota(config.max_calls_per_day, config.cleanup_interval_secs)?;
        Self::validate_timeout(config.provider_timeout_secs)?;

        for warning in Self::provider_warnings(config) {
            tracing::warn!("{}", warning);
        }

        Ok(())
    }
}
