use serde::Deserialize;
use std::time::Duration;

/// Which delivery strategy the sender facade is built with. Evaluated once
/// at construction and never re-checked per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    Disabled,
    Immediate,
    #[default]
    Batch,
}

/// Timeouts applied once when the outbound HTTP client is built. Individual
/// beacon sends carry no per-call overrides.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            connect_timeout_ms: 5_000,
            request_timeout_ms: 30_000,
        }
    }
}

impl HttpConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Sizing and deadlines for the batch delivery worker and its periodic job.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Maximum number of queue rows fetched per worker invocation.
    pub batch_size: usize,
    /// Wall-clock budget for one whole invocation, not per request.
    pub max_runtime_ms: u64,
    pub job_period_secs: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig {
            batch_size: 1_000,
            max_runtime_ms: 10_000,
            job_period_secs: 900,
        }
    }
}

impl BatchConfig {
    pub fn max_runtime(&self) -> Duration {
        Duration::from_millis(self.max_runtime_ms)
    }

    pub fn job_period(&self) -> Duration {
        Duration::from_secs(self.job_period_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReportingConfig {
    pub mode: DeliveryMode,
    /// Cap on resolved URIs per distinct ad tech per auction.
    pub max_uris_per_ad_tech: usize,
    pub http: HttpConfig,
    pub batch: BatchConfig,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        ReportingConfig {
            mode: DeliveryMode::default(),
            max_uris_per_ad_tech: crate::processor::DEFAULT_MAX_URIS_PER_AD_TECH,
            http: HttpConfig::default(),
            batch: BatchConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_missing_sections() {
        let config: ReportingConfig = serde_yaml::from_str("mode: immediate").unwrap();
        assert_eq!(config.mode, DeliveryMode::Immediate);
        assert_eq!(config.max_uris_per_ad_tech, 75);
        assert_eq!(config.http, HttpConfig::default());
        assert_eq!(config.batch, BatchConfig::default());
    }

    #[test]
    fn full_config_parses() {
        let yaml = r#"
            mode: batch
            max_uris_per_ad_tech: 10
            http:
                connect_timeout_ms: 250
                request_timeout_ms: 1000
            batch:
                batch_size: 50
                max_runtime_ms: 2000
                job_period_secs: 60
            "#;
        let config: ReportingConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.mode, DeliveryMode::Batch);
        assert_eq!(config.max_uris_per_ad_tech, 10);
        assert_eq!(config.http.connect_timeout(), Duration::from_millis(250));
        assert_eq!(config.batch.batch_size, 50);
        assert_eq!(config.batch.max_runtime(), Duration::from_secs(2));
        assert_eq!(config.batch.job_period(), Duration::from_secs(60));
    }

    #[test]
    fn unknown_mode_is_rejected() {
        assert!(serde_yaml::from_str::<ReportingConfig>("mode: sometimes").is_err());
    }
}
