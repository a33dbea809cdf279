//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the balancer.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

use crate::provider::ProviderInstance;
use crate::strategy::Strategy;

/// Root configuration for the provider balancer.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BalancerConfig {
    /// Strategy used when adaptive mode does not override it.
    pub strategy: Strategy,

    /// Active health check settings.
    pub health_check: HealthCheckConfig,

    /// Adaptive strategy override.
    pub adaptive: AdaptiveConfig,

    /// Sticky session settings.
    pub sticky_sessions: StickySessionConfig,

    /// Circuit breaker thresholds.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Retry policy advertised to dispatchers.
    pub retry: RetryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Providers to register at startup.
    pub providers: Vec<ProviderConfig>,
}

/// Active health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable periodic active health checks.
    pub enabled: bool,

    /// Health check interval in seconds.
    pub interval_secs: u64,

    /// Timeout for a single probe in seconds.
    pub probe_timeout_secs: u64,

    /// Success rate below which a provider fails the active check.
    pub min_success_rate: f64,

    /// Average response time (ms) above which a provider fails the active check.
    pub max_response_time_ms: f64,

    /// A provider without a metrics report for this long fails the active check.
    pub stale_after_secs: u64,
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            probe_timeout_secs: 5,
            min_success_rate: 0.7,
            max_response_time_ms: 15_000.0,
            stale_after_secs: 300,
        }
    }
}

/// Adaptive strategy configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdaptiveConfig {
    /// Let pool-wide load signals override the configured strategy.
    pub enabled: bool,

    /// Mean load ratio above which least-connections is forced.
    pub load_threshold: f64,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            load_threshold: 0.8,
        }
    }
}

/// Sticky session configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StickySessionConfig {
    /// Enable session affinity.
    pub enabled: bool,

    /// Idle time after which a session binding expires, in seconds.
    pub ttl_secs: u64,
}

impl StickySessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for StickySessionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_secs: 3600,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Enable circuit breaking.
    pub enabled: bool,

    /// Failures that open the circuit.
    pub failure_threshold: u32,

    /// Time after the last failure before a trial is allowed, in seconds.
    pub recovery_timeout_secs: u64,

    /// Trial successes needed to close a half-open circuit.
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            recovery_timeout_secs: 60,
            half_open_max_calls: 3,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of retry attempts.
    pub max_retries: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Growth factor between consecutive delays.
    pub backoff_multiplier: f64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 100,
            backoff_multiplier: 2.0,
            max_delay_ms: 10_000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,

    /// Buffered events per subscriber before the slowest one lags.
    pub event_capacity: usize,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
            event_capacity: 1024,
        }
    }
}

/// Provider registration entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    /// Unique provider identifier.
    pub id: String,

    /// Display name (defaults to the id).
    #[serde(default)]
    pub name: Option<String>,

    /// Vendor tag.
    #[serde(default = "default_provider_type")]
    pub provider_type: String,

    /// Provider endpoint URL.
    pub endpoint: String,

    /// Weight for weighted selection (1-100, default: 1).
    #[serde(default = "default_weight")]
    pub weight: u32,

    /// Maximum concurrent requests to this provider.
    #[serde(default = "default_max_provider_conns")]
    pub max_connections: usize,

    /// Capabilities offered by this provider.
    #[serde(default)]
    pub capabilities: BTreeSet<String>,

    /// Opaque vendor configuration passed through untouched.
    #[serde(default)]
    pub config: Option<toml::Table>,
}

fn default_provider_type() -> String {
    "custom".to_string()
}

fn default_weight() -> u32 {
    1
}

fn default_max_provider_conns() -> usize {
    100
}

impl ProviderConfig {
    /// Build the registration descriptor.
    pub fn to_instance(&self) -> ProviderInstance {
        let mut instance = ProviderInstance::new(&self.id, &self.endpoint)
            .with_name(self.name.clone().unwrap_or_else(|| self.id.clone()))
            .with_provider_type(&self.provider_type)
            .with_weight(self.weight)
            .with_max_connections(self.max_connections);
        instance.capabilities = self.capabilities.clone();
        if let Some(table) = &self.config {
            instance.config = serde_json::to_value(table).unwrap_or(serde_json::Value::Null);
        }
        instance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BalancerConfig::default();
        assert_eq!(config.strategy, Strategy::WeightedLeastConnections);
        assert_eq!(config.health_check.interval_secs, 30);
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.circuit_breaker.recovery_timeout_secs, 60);
        assert_eq!(config.circuit_breaker.half_open_max_calls, 3);
        assert_eq!(config.adaptive.load_threshold, 0.8);
        assert!(!config.sticky_sessions.enabled);
    }

    #[test]
    fn test_minimal_toml() {
        let config: BalancerConfig = toml::from_str(
            r#"
            strategy = "least_connections"

            [sticky_sessions]
            enabled = true
            ttl_secs = 120

            [[providers]]
            id = "openai-primary"
            endpoint = "https://api.openai.com/v1"
            weight = 70
            capabilities = ["streaming"]

            [providers.config]
            model = "gpt-4o"
            "#,
        )
        .unwrap();

        assert_eq!(config.strategy, Strategy::LeastConnections);
        assert!(config.sticky_sessions.enabled);
        assert_eq!(config.sticky_sessions.ttl_secs, 120);
        // Untouched sections keep their defaults.
        assert_eq!(config.retry.max_retries, 3);

        let instance = config.providers[0].to_instance();
        assert_eq!(instance.name, "openai-primary");
        assert_eq!(instance.weight, 70);
        assert_eq!(instance.max_connections, 100);
        assert!(instance.capabilities.contains("streaming"));
        assert_eq!(instance.config["model"], "gpt-4o");
    }
}
