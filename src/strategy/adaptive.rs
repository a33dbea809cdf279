//! Adaptive meta-strategy.
//!
//! # Decision Rule
//! ```text
//! mean load ratio > threshold          → least_connections
//! response-time variance > 1,000,000   → least_response_time
//! mean success rate < 0.95             → weighted_least_connections
//! otherwise                            → round_robin
//! ```
//! Signals are recomputed over the admitted candidates on every call.

use serde::Serialize;

use crate::provider::ProviderInstance;
use crate::strategy::Strategy;

/// Response-time variance (ms²) above which latency dominates the decision.
pub const RESPONSE_TIME_VARIANCE_LIMIT: f64 = 1_000_000.0;

/// Mean success rate below which reliability dominates the decision.
pub const SUCCESS_RATE_FLOOR: f64 = 0.95;

/// Pool-wide load signals over a candidate set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Default)]
pub struct LoadSignals {
    pub mean_load_ratio: f64,
    pub mean_success_rate: f64,
    pub response_time_variance: f64,
}

impl LoadSignals {
    /// Compute signals. An empty set yields all zeros.
    pub fn compute(candidates: &[ProviderInstance]) -> Self {
        if candidates.is_empty() {
            return Self::default();
        }
        let n = candidates.len() as f64;

        let mean_load_ratio = candidates.iter().map(|c| c.load_ratio()).sum::<f64>() / n;
        let mean_success_rate = candidates.iter().map(|c| c.metrics.success_rate).sum::<f64>() / n;

        let mean_rt = candidates.iter().map(|c| c.metrics.avg_response_time_ms).sum::<f64>() / n;
        let response_time_variance = candidates
            .iter()
            .map(|c| (c.metrics.avg_response_time_ms - mean_rt).powi(2))
            .sum::<f64>()
            / n;

        Self {
            mean_load_ratio,
            mean_success_rate,
            response_time_variance,
        }
    }
}

/// Chooses a concrete strategy from current load signals.
#[derive(Debug)]
pub struct Adaptive {
    load_threshold: f64,
}

impl Adaptive {
    pub fn new(load_threshold: f64) -> Self {
        Self { load_threshold }
    }

    pub fn resolve(&self, candidates: &[ProviderInstance]) -> Strategy {
        let signals = LoadSignals::compute(candidates);
        let chosen = if signals.mean_load_ratio > self.load_threshold {
            Strategy::LeastConnections
        } else if signals.response_time_variance > RESPONSE_TIME_VARIANCE_LIMIT {
            Strategy::LeastResponseTime
        } else if signals.mean_success_rate < SUCCESS_RATE_FLOOR {
            Strategy::WeightedLeastConnections
        } else {
            Strategy::RoundRobin
        };

        tracing::trace!(
            mean_load_ratio = signals.mean_load_ratio,
            mean_success_rate = signals.mean_success_rate,
            response_time_variance = signals.response_time_variance,
            strategy = %chosen,
            "Adaptive strategy resolved"
        );
        chosen
    }
}
