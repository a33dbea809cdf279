//! Selection confidence scoring.
//!
//! ```text
//! no alternatives             → 1.0
//! otherwise 0.5
//!     + 0.3 healthy / 0.1 degraded
//!     + 0.2 · success_rate
//!     + 0.1 if faster than the candidate mean
//! capped at 1.0
//! ```

use crate::provider::{HealthClassification, ProviderInstance};
use crate::stats::analysis::mean;

const BASE: f64 = 0.5;
const HEALTHY_BONUS: f64 = 0.3;
const DEGRADED_BONUS: f64 = 0.1;
const SUCCESS_WEIGHT: f64 = 0.2;
const FAST_BONUS: f64 = 0.1;

/// Score how confident the balancer is in `selected` over `alternatives`.
pub fn confidence(selected: &ProviderInstance, alternatives: &[ProviderInstance]) -> f64 {
    if alternatives.is_empty() {
        return 1.0;
    }

    let mut score = BASE;
    score += match selected.health {
        HealthClassification::Healthy => HEALTHY_BONUS,
        HealthClassification::Degraded => DEGRADED_BONUS,
        _ => 0.0,
    };
    score += selected.metrics.success_rate * SUCCESS_WEIGHT;

    let candidate_mean = mean(
        std::iter::once(selected)
            .chain(alternatives)
            .map(|c| c.metrics.avg_response_time_ms),
    );
    if selected.metrics.avg_response_time_ms < candidate_mean {
        score += FAST_BONUS;
    }

    score.min(1.0)
}
