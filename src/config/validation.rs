//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds > 0, rates within [0, 1])
//! - Detect duplicate provider identifiers
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BalancerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::BalancerConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn check_rate(errors: &mut Vec<ValidationError>, field: &str, value: f64) {
    if !(0.0..=1.0).contains(&value) {
        errors.push(ValidationError::new(field, format!("must be within [0, 1], got {}", value)));
    }
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &BalancerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let hc = &config.health_check;
    if hc.enabled && hc.interval_secs == 0 {
        errors.push(ValidationError::new("health_check.interval_secs", "must be greater than 0"));
    }
    if hc.probe_timeout_secs == 0 {
        errors.push(ValidationError::new("health_check.probe_timeout_secs", "must be greater than 0"));
    }
    check_rate(&mut errors, "health_check.min_success_rate", hc.min_success_rate);
    if !(hc.max_response_time_ms > 0.0) {
        errors.push(ValidationError::new("health_check.max_response_time_ms", "must be greater than 0"));
    }

    if !(config.adaptive.load_threshold > 0.0) {
        errors.push(ValidationError::new("adaptive.load_threshold", "must be greater than 0"));
    }

    if config.sticky_sessions.enabled && config.sticky_sessions.ttl_secs == 0 {
        errors.push(ValidationError::new("sticky_sessions.ttl_secs", "must be greater than 0"));
    }

    let cb = &config.circuit_breaker;
    if cb.failure_threshold == 0 {
        errors.push(ValidationError::new("circuit_breaker.failure_threshold", "must be greater than 0"));
    }
    if cb.half_open_max_calls == 0 {
        errors.push(ValidationError::new("circuit_breaker.half_open_max_calls", "must be greater than 0"));
    }

    let retry = &config.retry;
    if !(retry.backoff_multiplier >= 1.0) {
        errors.push(ValidationError::new("retry.backoff_multiplier", "must be at least 1.0"));
    }
    if retry.max_delay_ms < retry.base_delay_ms {
        errors.push(ValidationError::new("retry.max_delay_ms", "must not be below base_delay_ms"));
    }

    let obs = &config.observability;
    if obs.metrics_enabled && obs.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("{:?} is not a socket address", obs.metrics_address),
        ));
    }
    if obs.event_capacity == 0 {
        errors.push(ValidationError::new("observability.event_capacity", "must be greater than 0"));
    }

    let mut seen = HashSet::new();
    for (i, provider) in config.providers.iter().enumerate() {
        let field = format!("providers[{}]", i);
        if !seen.insert(provider.id.as_str()) {
            errors.push(ValidationError::new(&field, format!("duplicate provider id {:?}", provider.id)));
        }
        if let Err(e) = provider.to_instance().validate() {
            errors.push(ValidationError::new(&field, e.to_string()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
