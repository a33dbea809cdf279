//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define balancer metrics (selections, health, circuit state, connections)
//! - Expose Prometheus-compatible metrics endpoint
//! - Track per-provider and aggregate metrics
//!
//! # Metrics
//! - `balancer_selections_total` (counter): selections by provider, strategy
//! - `balancer_selection_failures_total` (counter): exhaustion errors
//! - `balancer_provider_health` (gauge): 1=healthy, 0.5=degraded, 0=otherwise
//! - `balancer_circuit_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `balancer_active_connections` (gauge): in-flight requests per provider
//! - `balancer_active_sessions` (gauge): live sticky sessions
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::provider::HealthClassification;
use crate::resilience::circuit_breaker::CircuitState;
use crate::strategy::Strategy;

/// Install the Prometheus exporter on `addr`. Must run inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Prometheus exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install Prometheus exporter"),
    }
}

pub fn record_selection(provider_id: &str, strategy: Strategy) {
    metrics::counter!(
        "balancer_selections_total",
        "provider" => provider_id.to_string(),
        "strategy" => strategy.as_str()
    )
    .increment(1);
}

pub fn record_selection_failure() {
    metrics::counter!("balancer_selection_failures_total").increment(1);
}

pub fn record_provider_health(provider_id: &str, health: HealthClassification) {
    let value = match health {
        HealthClassification::Healthy => 1.0,
        HealthClassification::Degraded => 0.5,
        _ => 0.0,
    };
    metrics::gauge!("balancer_provider_health", "provider" => provider_id.to_string()).set(value);
}

pub fn record_circuit_state(provider_id: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    };
    metrics::gauge!("balancer_circuit_state", "provider" => provider_id.to_string()).set(value);
}

pub fn record_active_connections(provider_id: &str, connections: usize) {
    metrics::gauge!("balancer_active_connections", "provider" => provider_id.to_string())
        .set(connections as f64);
}

pub fn record_active_sessions(count: usize) {
    metrics::gauge!("balancer_active_sessions").set(count as f64);
}
