//! Aggregate, ranking, anomaly and trend types.

use serde::Serialize;

use crate::provider::{HealthClassification, ProviderInstance};

/// Pool-wide aggregates over a provider set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PoolStatistics {
    pub total_providers: usize,
    pub healthy: usize,
    pub degraded: usize,
    pub unhealthy: usize,
    pub unknown: usize,
    pub maintenance: usize,
    pub total_connections: usize,
    /// Mean of average response times (ms); 0 for an empty set.
    pub average_response_time_ms: f64,
    /// Mean success rate; 0 for an empty set.
    pub average_success_rate: f64,
}

impl PoolStatistics {
    pub fn calculate(providers: &[ProviderInstance]) -> Self {
        let mut stats = Self {
            total_providers: providers.len(),
            ..Self::default()
        };
        for p in providers {
            match p.health {
                HealthClassification::Healthy => stats.healthy += 1,
                HealthClassification::Degraded => stats.degraded += 1,
                HealthClassification::Unhealthy => stats.unhealthy += 1,
                HealthClassification::Unknown => stats.unknown += 1,
                HealthClassification::Maintenance => stats.maintenance += 1,
            }
            stats.total_connections += p.current_connections;
        }
        stats.average_response_time_ms = mean(providers.iter().map(|p| p.metrics.avg_response_time_ms));
        stats.average_success_rate = mean(providers.iter().map(|p| p.metrics.success_rate));
        stats
    }
}

/// A provider's position in the performance ranking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderScore {
    pub provider_id: String,
    pub score: f64,
    pub health: HealthClassification,
}

/// Composite performance score (0-100).
///
/// `40·success + max(0, 30 − 5·avg_secs) + min(20, 20·rpm/100) + health bonus`
/// where the bonus is 10 for healthy, 5 for degraded, 0 otherwise.
pub fn performance_score(p: &ProviderInstance) -> f64 {
    let reliability = 40.0 * p.metrics.success_rate;
    let speed = (30.0 - p.metrics.avg_response_time_ms / 1000.0 * 5.0).max(0.0);
    let throughput = (p.metrics.throughput_rpm / 100.0 * 20.0).min(20.0);
    let bonus = match p.health {
        HealthClassification::Healthy => 10.0,
        HealthClassification::Degraded => 5.0,
        _ => 0.0,
    };
    reliability + speed + throughput + bonus
}

/// Rank providers by score, best first. Equal scores keep input order.
pub fn rank(providers: &[ProviderInstance]) -> Vec<ProviderScore> {
    let mut scores: Vec<ProviderScore> = providers
        .iter()
        .map(|p| ProviderScore {
            provider_id: p.id.clone(),
            score: performance_score(p),
            health: p.health,
        })
        .collect();
    scores.sort_by(|a, b| b.score.total_cmp(&a.score));
    scores
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    ResponseTime,
    SuccessRate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    High,
    Critical,
}

/// A metric that strayed more than two standard deviations from its history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Anomaly {
    pub provider_id: String,
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub current: f64,
    pub historical_mean: f64,
    pub std_dev: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    #[default]
    Stable,
    Degrading,
}

/// Direction of change over a provider's metrics history.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct PerformanceTrend {
    pub provider_id: String,
    pub samples: usize,
    /// Least-squares slope of average response time, ms per sample.
    pub response_time_slope: f64,
    /// Least-squares slope of success rate, per sample.
    pub success_rate_slope: f64,
    pub response_time: TrendDirection,
    pub success_rate: TrendDirection,
}

/// Relative response-time change per sample treated as a real trend.
const RESPONSE_TIME_TREND_RATIO: f64 = 0.01;
/// Absolute success-rate change per sample treated as a real trend.
const SUCCESS_RATE_TREND_STEP: f64 = 0.001;

impl PerformanceTrend {
    /// Trend with no signal, used when history is too short.
    pub fn empty(provider_id: &str, samples: usize) -> Self {
        Self {
            provider_id: provider_id.to_string(),
            samples,
            ..Self::default()
        }
    }

    pub fn from_series(provider_id: &str, response_times: &[f64], success_rates: &[f64]) -> Self {
        let samples = response_times.len().min(success_rates.len());
        if samples < 2 {
            return Self::empty(provider_id, samples);
        }

        let rt_slope = slope(response_times);
        let sr_slope = slope(success_rates);
        let rt_threshold = mean(response_times.iter().copied()) * RESPONSE_TIME_TREND_RATIO;

        // Rising latency is bad; rising success is good.
        let response_time = if rt_slope > rt_threshold {
            TrendDirection::Degrading
        } else if rt_slope < -rt_threshold {
            TrendDirection::Improving
        } else {
            TrendDirection::Stable
        };
        let success_rate = if sr_slope > SUCCESS_RATE_TREND_STEP {
            TrendDirection::Improving
        } else if sr_slope < -SUCCESS_RATE_TREND_STEP {
            TrendDirection::Degrading
        } else {
            TrendDirection::Stable
        };

        Self {
            provider_id: provider_id.to_string(),
            samples,
            response_time_slope: rt_slope,
            success_rate_slope: sr_slope,
            response_time,
            success_rate,
        }
    }
}

/// Arithmetic mean; 0 for no values.
pub fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Population standard deviation; 0 for no values.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values.iter().copied());
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Least-squares slope of `values` against their index; 0 with fewer than 2 points.
pub fn slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = mean(values.iter().copied());
    let (num, den) = values.iter().enumerate().fold((0.0, 0.0), |(num, den), (i, y)| {
        let dx = i as f64 - x_mean;
        (num + dx * (y - y_mean), den + dx * dx)
    });
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}
