//! Provider descriptors and performance summaries.
//!
//! # Responsibilities
//! - Describe a registered backend endpoint (`ProviderInstance`)
//! - Carry a point-in-time performance summary (`ProviderMetrics`)
//! - Express partial metric reports from the dispatcher (`MetricsUpdate`)
//! - Define the health classification shared by every subsystem

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::SystemTime;
use url::Url;

use crate::error::{BalancerError, Result};

/// Weight bounds accepted at registration.
pub const MIN_WEIGHT: u32 = 1;
pub const MAX_WEIGHT: u32 = 100;

/// Health classification of a provider.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HealthClassification {
    #[default]
    Unknown = 0,
    Healthy = 1,
    Degraded = 2,
    Unhealthy = 3,
    Maintenance = 4,
}

impl HealthClassification {
    /// Whether the classification admits the provider into candidate sets.
    pub fn is_available(self) -> bool {
        matches!(self, HealthClassification::Healthy | HealthClassification::Degraded)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HealthClassification::Unknown => "unknown",
            HealthClassification::Healthy => "healthy",
            HealthClassification::Degraded => "degraded",
            HealthClassification::Unhealthy => "unhealthy",
            HealthClassification::Maintenance => "maintenance",
        }
    }
}

impl From<u8> for HealthClassification {
    fn from(val: u8) -> Self {
        match val {
            1 => HealthClassification::Healthy,
            2 => HealthClassification::Degraded,
            3 => HealthClassification::Unhealthy,
            4 => HealthClassification::Maintenance,
            _ => HealthClassification::Unknown,
        }
    }
}

impl fmt::Display for HealthClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time performance summary of a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderMetrics {
    /// Average response time in milliseconds.
    pub avg_response_time_ms: f64,
    /// Fraction of successful requests (0-1).
    pub success_rate: f64,
    /// Cumulative request count.
    pub total_requests: u64,
    /// Cumulative error count.
    pub error_count: u64,
    /// Most recent response time in milliseconds.
    pub last_response_time_ms: f64,
    /// Requests per minute.
    pub throughput_rpm: f64,
    /// Optional CPU utilisation (0-1).
    pub cpu_usage: Option<f64>,
    /// Optional memory utilisation (0-1).
    pub memory_usage: Option<f64>,
}

impl Default for ProviderMetrics {
    fn default() -> Self {
        Self {
            avg_response_time_ms: 0.0,
            success_rate: 1.0,
            total_requests: 0,
            error_count: 0,
            last_response_time_ms: 0.0,
            throughput_rpm: 0.0,
            cpu_usage: None,
            memory_usage: None,
        }
    }
}

/// Partial metrics report. Absent fields leave the current value unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsUpdate {
    pub avg_response_time_ms: Option<f64>,
    pub success_rate: Option<f64>,
    pub total_requests: Option<u64>,
    pub error_count: Option<u64>,
    pub last_response_time_ms: Option<f64>,
    pub throughput_rpm: Option<f64>,
    pub cpu_usage: Option<f64>,
    pub memory_usage: Option<f64>,
}

impl MetricsUpdate {
    /// Shorthand for the two fields every dispatcher report carries.
    pub fn new(avg_response_time_ms: f64, success_rate: f64) -> Self {
        Self {
            avg_response_time_ms: Some(avg_response_time_ms),
            success_rate: Some(success_rate),
            ..Self::default()
        }
    }

    pub fn with_throughput(mut self, throughput_rpm: f64) -> Self {
        self.throughput_rpm = Some(throughput_rpm);
        self
    }

    pub fn with_counts(mut self, total_requests: u64, error_count: u64) -> Self {
        self.total_requests = Some(total_requests);
        self.error_count = Some(error_count);
        self
    }

    pub fn with_last_response_time(mut self, ms: f64) -> Self {
        self.last_response_time_ms = Some(ms);
        self
    }

    /// Reject values no well-behaved dispatcher can produce.
    pub fn validate(&self, provider_id: &str) -> Result<()> {
        let invalid = |reason: String| BalancerError::InvalidMetrics {
            id: provider_id.to_string(),
            reason,
        };

        for (field, value) in [
            ("avg_response_time_ms", self.avg_response_time_ms),
            ("last_response_time_ms", self.last_response_time_ms),
            ("throughput_rpm", self.throughput_rpm),
        ] {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(invalid(format!("{} must be a non-negative number, got {}", field, v)));
                }
            }
        }

        for (field, value) in [
            ("success_rate", self.success_rate),
            ("cpu_usage", self.cpu_usage),
            ("memory_usage", self.memory_usage),
        ] {
            if let Some(v) = value {
                if !(0.0..=1.0).contains(&v) {
                    return Err(invalid(format!("{} must be within [0, 1], got {}", field, v)));
                }
            }
        }

        Ok(())
    }

    /// Merge the present fields into `metrics`.
    pub fn apply(&self, metrics: &mut ProviderMetrics) {
        if let Some(v) = self.avg_response_time_ms {
            metrics.avg_response_time_ms = v;
        }
        if let Some(v) = self.success_rate {
            metrics.success_rate = v;
        }
        if let Some(v) = self.total_requests {
            metrics.total_requests = v;
        }
        if let Some(v) = self.error_count {
            metrics.error_count = v;
        }
        if let Some(v) = self.last_response_time_ms {
            metrics.last_response_time_ms = v;
        }
        if let Some(v) = self.throughput_rpm {
            metrics.throughput_rpm = v;
        }
        if self.cpu_usage.is_some() {
            metrics.cpu_usage = self.cpu_usage;
        }
        if self.memory_usage.is_some() {
            metrics.memory_usage = self.memory_usage;
        }
    }
}

impl From<ProviderMetrics> for MetricsUpdate {
    fn from(m: ProviderMetrics) -> Self {
        Self {
            avg_response_time_ms: Some(m.avg_response_time_ms),
            success_rate: Some(m.success_rate),
            total_requests: Some(m.total_requests),
            error_count: Some(m.error_count),
            last_response_time_ms: Some(m.last_response_time_ms),
            throughput_rpm: Some(m.throughput_rpm),
            cpu_usage: m.cpu_usage,
            memory_usage: m.memory_usage,
        }
    }
}

/// A registered backend endpoint, as seen by callers.
///
/// This is a value type: the balancer hands out snapshots, never references
/// into its live state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderInstance {
    /// Unique identifier within the registry.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Vendor tag (e.g. "openai", "anthropic").
    pub provider_type: String,
    /// Network endpoint.
    pub endpoint: String,
    /// Relative selection bias (1-100).
    pub weight: u32,
    /// Maximum concurrent in-flight requests.
    pub max_connections: usize,
    /// Current in-flight requests.
    pub current_connections: usize,
    /// Current health classification.
    pub health: HealthClassification,
    /// Latest performance summary.
    pub metrics: ProviderMetrics,
    /// Capabilities the provider offers (e.g. "streaming", "vision").
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    /// Opaque vendor configuration.
    #[serde(default)]
    pub config: serde_json::Value,
    /// Time of the last metrics or state change.
    pub last_updated: SystemTime,
}

impl ProviderInstance {
    /// Create a healthy provider with default weight and capacity.
    pub fn new(id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            provider_type: "custom".to_string(),
            endpoint: endpoint.into(),
            weight: MIN_WEIGHT,
            max_connections: 100,
            current_connections: 0,
            health: HealthClassification::Healthy,
            metrics: ProviderMetrics::default(),
            capabilities: BTreeSet::new(),
            config: serde_json::Value::Null,
            last_updated: SystemTime::now(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_provider_type(mut self, provider_type: impl Into<String>) -> Self {
        self.provider_type = provider_type.into();
        self
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_connections(mut self, current_connections: usize) -> Self {
        self.current_connections = current_connections;
        self
    }

    pub fn with_health(mut self, health: HealthClassification) -> Self {
        self.health = health;
        self
    }

    pub fn with_metrics(mut self, metrics: ProviderMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.insert(capability.into());
        self
    }

    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }

    /// Whether the provider offers every capability in `required`.
    pub fn has_capabilities(&self, required: &[String]) -> bool {
        required.iter().all(|c| self.capabilities.contains(c))
    }

    /// In-flight load as a fraction of capacity.
    pub fn load_ratio(&self) -> f64 {
        if self.max_connections == 0 {
            return 1.0;
        }
        self.current_connections as f64 / self.max_connections as f64
    }

    /// Boundary checks applied before registration.
    pub fn validate(&self) -> Result<Url> {
        let invalid = |reason: String| BalancerError::InvalidProvider {
            id: self.id.clone(),
            reason,
        };

        if self.id.trim().is_empty() {
            return Err(invalid("identifier must not be empty".to_string()));
        }
        if !(MIN_WEIGHT..=MAX_WEIGHT).contains(&self.weight) {
            return Err(invalid(format!(
                "weight {} outside {}..={}",
                self.weight, MIN_WEIGHT, MAX_WEIGHT
            )));
        }
        if self.max_connections == 0 {
            return Err(invalid("max_connections must be greater than 0".to_string()));
        }
        MetricsUpdate::from(self.metrics.clone()).validate(&self.id)?;

        Url::parse(&self.endpoint)
            .map_err(|e| invalid(format!("endpoint {:?} is not a valid URL: {}", self.endpoint, e)))
    }
}
