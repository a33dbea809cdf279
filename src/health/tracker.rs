//! Health classification.
//!
//! # Classification (passive, from reported metrics)
//! ```text
//! success_rate < 0.5            → Unhealthy
//! success_rate < 0.8            → Degraded
//! otherwise                     → Healthy
//! then avg_response_time > 10s  → Unhealthy
//!      avg_response_time > 5s   → at least Degraded
//! ```
//!
//! # Active Check
//! A provider fails when the probe fails, success_rate < min_success_rate,
//! avg_response_time > max_response_time_ms, or no metrics report arrived
//! within stale_after.
//! ```text
//! Healthy | Unknown   → Unhealthy   on failure
//! Unhealthy | Unknown → Healthy     on success
//! ```
//! Maintenance is never changed by either path.

use std::time::Duration;

use crate::config::HealthCheckConfig;
use crate::observability::{metrics, BalancerEvent, EventBus};
use crate::provider::{HealthClassification, Provider, ProviderMetrics};

const UNHEALTHY_SUCCESS_RATE: f64 = 0.5;
const DEGRADED_SUCCESS_RATE: f64 = 0.8;
const UNHEALTHY_RESPONSE_MS: f64 = 10_000.0;
const DEGRADED_RESPONSE_MS: f64 = 5_000.0;

fn severity(h: HealthClassification) -> u8 {
    match h {
        HealthClassification::Healthy => 0,
        HealthClassification::Degraded => 1,
        _ => 2,
    }
}

/// Classify a provider from its metrics. Pure function.
pub fn classify(metrics: &ProviderMetrics) -> HealthClassification {
    let by_success = if metrics.success_rate < UNHEALTHY_SUCCESS_RATE {
        HealthClassification::Unhealthy
    } else if metrics.success_rate < DEGRADED_SUCCESS_RATE {
        HealthClassification::Degraded
    } else {
        HealthClassification::Healthy
    };

    let by_latency = if metrics.avg_response_time_ms > UNHEALTHY_RESPONSE_MS {
        HealthClassification::Unhealthy
    } else if metrics.avg_response_time_ms > DEGRADED_RESPONSE_MS {
        HealthClassification::Degraded
    } else {
        HealthClassification::Healthy
    };

    // Latency can only raise severity.
    if severity(by_latency) > severity(by_success) {
        by_latency
    } else {
        by_success
    }
}

/// Applies classifications to live providers and announces transitions.
#[derive(Debug)]
pub struct HealthTracker {
    min_success_rate: f64,
    max_response_time_ms: f64,
    stale_after: Duration,
    events: EventBus,
}

impl HealthTracker {
    pub fn new(config: &HealthCheckConfig, events: EventBus) -> Self {
        Self {
            min_success_rate: config.min_success_rate,
            max_response_time_ms: config.max_response_time_ms,
            stale_after: config.stale_after(),
            events,
        }
    }

    /// Re-classify after a metrics update. Returns the new classification.
    pub fn apply_classification(&self, provider: &Provider) -> HealthClassification {
        let next = classify(&provider.metrics());
        self.transition(provider, |current| {
            (current != HealthClassification::Maintenance).then_some(next)
        });
        provider.health()
    }

    /// The metric half of the active check.
    pub fn passes_active_check(&self, provider: &Provider) -> bool {
        let metrics = provider.metrics();
        metrics.success_rate >= self.min_success_rate
            && metrics.avg_response_time_ms <= self.max_response_time_ms
            && provider.last_report().elapsed() <= self.stale_after
    }

    /// Apply the outcome of an active check.
    pub fn apply_active_result(&self, provider: &Provider, healthy: bool) {
        self.transition(provider, |current| match (current, healthy) {
            (HealthClassification::Healthy | HealthClassification::Unknown, false) => {
                Some(HealthClassification::Unhealthy)
            }
            (HealthClassification::Unhealthy | HealthClassification::Unknown, true) => {
                Some(HealthClassification::Healthy)
            }
            _ => None,
        });
    }

    /// Enter or leave maintenance. Leaving re-classifies from current metrics.
    pub fn set_maintenance(&self, provider: &Provider, enabled: bool) {
        if enabled {
            self.transition(provider, |_| Some(HealthClassification::Maintenance));
        } else {
            let next = classify(&provider.metrics());
            self.transition(provider, |current| {
                (current == HealthClassification::Maintenance).then_some(next)
            });
        }
    }

    /// Apply `decide` atomically; only the caller that actually changed the
    /// classification logs and emits.
    fn transition<F>(&self, provider: &Provider, decide: F)
    where
        F: FnMut(HealthClassification) -> Option<HealthClassification>,
    {
        let Some((old, next)) = provider.update_health(decide) else {
            return;
        };

        match next {
            HealthClassification::Unhealthy => {
                tracing::warn!(provider = %provider.id, from = %old, "Provider marked unhealthy")
            }
            _ => tracing::info!(provider = %provider.id, from = %old, to = %next, "Provider health changed"),
        }
        metrics::record_provider_health(&provider.id, next);
        self.events.emit(BalancerEvent::HealthChanged {
            provider_id: provider.id.clone(),
            old,
            new: next,
        });
    }
}
