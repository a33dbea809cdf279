//! Per-provider metrics history.
//!
//! # Responsibilities
//! - Merge partial metric reports into live provider state
//! - Keep a bounded ring of snapshots per provider (oldest evicted first)
//! - Answer anomaly and trend queries from that ring

use dashmap::DashMap;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::SystemTime;

use crate::provider::{MetricsUpdate, Provider, ProviderInstance, ProviderMetrics};
use crate::stats::analysis::{mean, std_dev, Anomaly, AnomalyKind, PerformanceTrend, Severity};

/// Snapshots retained per provider.
pub const HISTORY_CAPACITY: usize = 100;

/// Minimum history before anomaly detection says anything.
pub const MIN_ANOMALY_SAMPLES: usize = 10;

/// Deviations from the historical mean that count as anomalous.
const ANOMALY_SIGMA: f64 = 2.0;

/// One merged metrics snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSample {
    pub metrics: ProviderMetrics,
    pub recorded_at: SystemTime,
}

#[derive(Debug)]
pub struct MetricsCollector {
    history: DashMap<String, VecDeque<MetricsSample>>,
    capacity: usize,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            history: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Merge `update` into the provider and append the merged snapshot.
    pub fn record(&self, provider: &Provider, update: &MetricsUpdate) -> ProviderMetrics {
        let merged = provider.apply_metrics(update);

        let mut ring = self.history.entry(provider.id.clone()).or_default();
        if ring.len() >= self.capacity {
            ring.pop_front();
        }
        ring.push_back(MetricsSample {
            metrics: merged.clone(),
            recorded_at: SystemTime::now(),
        });

        merged
    }

    /// Oldest-first copy of a provider's history. Empty for unknown ids.
    pub fn history(&self, provider_id: &str) -> Vec<MetricsSample> {
        self.history
            .get(provider_id)
            .map(|ring| ring.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn sample_count(&self, provider_id: &str) -> usize {
        self.history.get(provider_id).map(|ring| ring.len()).unwrap_or(0)
    }

    pub fn remove(&self, provider_id: &str) {
        self.history.remove(provider_id);
    }

    pub fn clear(&self) {
        self.history.clear();
    }

    /// Compare a provider's current metrics with its history.
    ///
    /// Response time more than two standard deviations above the mean is a
    /// high-severity anomaly; success rate more than two below is critical.
    /// Fewer than `MIN_ANOMALY_SAMPLES` samples yields nothing.
    pub fn detect_anomalies(&self, provider: &ProviderInstance) -> Vec<Anomaly> {
        let (response_times, success_rates) = match self.series(&provider.id) {
            Some(series) if series.0.len() >= MIN_ANOMALY_SAMPLES => series,
            _ => return Vec::new(),
        };

        let mut anomalies = Vec::new();

        let rt_mean = mean(response_times.iter().copied());
        let rt_std = std_dev(&response_times);
        let rt_now = provider.metrics.avg_response_time_ms;
        if rt_now > rt_mean + ANOMALY_SIGMA * rt_std {
            anomalies.push(Anomaly {
                provider_id: provider.id.clone(),
                kind: AnomalyKind::ResponseTime,
                severity: Severity::High,
                current: rt_now,
                historical_mean: rt_mean,
                std_dev: rt_std,
            });
        }

        let sr_mean = mean(success_rates.iter().copied());
        let sr_std = std_dev(&success_rates);
        let sr_now = provider.metrics.success_rate;
        if sr_now < sr_mean - ANOMALY_SIGMA * sr_std {
            anomalies.push(Anomaly {
                provider_id: provider.id.clone(),
                kind: AnomalyKind::SuccessRate,
                severity: Severity::Critical,
                current: sr_now,
                historical_mean: sr_mean,
                std_dev: sr_std,
            });
        }

        if !anomalies.is_empty() {
            tracing::warn!(provider = %provider.id, count = anomalies.len(), "Metric anomalies detected");
        }
        anomalies
    }

    /// Least-squares trend over the retained history.
    pub fn performance_trend(&self, provider_id: &str) -> PerformanceTrend {
        match self.series(provider_id) {
            Some((response_times, success_rates)) => {
                PerformanceTrend::from_series(provider_id, &response_times, &success_rates)
            }
            None => PerformanceTrend::empty(provider_id, 0),
        }
    }

    fn series(&self, provider_id: &str) -> Option<(Vec<f64>, Vec<f64>)> {
        let ring = self.history.get(provider_id)?;
        Some(
            ring.iter()
                .map(|s| (s.metrics.avg_response_time_ms, s.metrics.success_rate))
                .unzip(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::analysis::TrendDirection;

    fn provider(id: &str) -> Provider {
        Provider::from_instance(ProviderInstance::new(id, "http://127.0.0.1:1")).unwrap()
    }

    #[test]
    fn test_record_merges_and_appends() {
        let collector = MetricsCollector::new();
        let p = provider("p");

        collector.record(&p, &MetricsUpdate::new(120.0, 0.9));
        let merged = collector.record(
            &p,
            &MetricsUpdate {
                throughput_rpm: Some(40.0),
                ..MetricsUpdate::default()
            },
        );

        // Absent fields are unchanged.
        assert_eq!(merged.avg_response_time_ms, 120.0);
        assert_eq!(merged.success_rate, 0.9);
        assert_eq!(merged.throughput_rpm, 40.0);
        assert_eq!(p.metrics(), merged);

        let history = collector.history("p");
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].metrics, merged);
    }

    #[test]
    fn test_history_is_bounded() {
        let collector = MetricsCollector::new();
        let p = provider("p");
        for i in 0..(HISTORY_CAPACITY + 5) {
            collector.record(&p, &MetricsUpdate::new(i as f64, 1.0));
        }

        let history = collector.history("p");
        assert_eq!(history.len(), HISTORY_CAPACITY);
        // Oldest five were evicted.
        assert_eq!(history[0].metrics.avg_response_time_ms, 5.0);
        assert_eq!(
            history[HISTORY_CAPACITY - 1].metrics.avg_response_time_ms,
            (HISTORY_CAPACITY + 4) as f64
        );
    }

    #[test]
    fn test_unknown_provider_queries() {
        let collector = MetricsCollector::new();
        assert!(collector.history("nope").is_empty());
        assert_eq!(collector.performance_trend("nope"), PerformanceTrend::empty("nope", 0));
        let snapshot = ProviderInstance::new("nope", "http://127.0.0.1:1");
        assert!(collector.detect_anomalies(&snapshot).is_empty());
    }

    #[test]
    fn test_anomalies_need_ten_samples() {
        let collector = MetricsCollector::new();
        let p = provider("p");
        for _ in 0..(MIN_ANOMALY_SAMPLES - 1) {
            collector.record(&p, &MetricsUpdate::new(100.0, 0.99));
        }
        let spiked = p.snapshot().with_metrics(ProviderMetrics {
            avg_response_time_ms: 5_000.0,
            success_rate: 0.1,
            ..ProviderMetrics::default()
        });
        assert!(collector.detect_anomalies(&spiked).is_empty());
    }

    #[test]
    fn test_detects_latency_and_success_anomalies() {
        let collector = MetricsCollector::new();
        let p = provider("p");
        for i in 0..20 {
            let jitter = (i % 3) as f64;
            collector.record(&p, &MetricsUpdate::new(100.0 + jitter, 0.98 + jitter / 100.0));
        }

        let normal = p.snapshot();
        assert!(collector.detect_anomalies(&normal).is_empty());

        let spiked = normal.clone().with_metrics(ProviderMetrics {
            avg_response_time_ms: 900.0,
            success_rate: 0.5,
            ..ProviderMetrics::default()
        });
        let anomalies = collector.detect_anomalies(&spiked);
        assert_eq!(anomalies.len(), 2);
        assert_eq!(anomalies[0].kind, AnomalyKind::ResponseTime);
        assert_eq!(anomalies[0].severity, Severity::High);
        assert_eq!(anomalies[1].kind, AnomalyKind::SuccessRate);
        assert_eq!(anomalies[1].severity, Severity::Critical);
    }

    #[test]
    fn test_faster_or_more_reliable_is_not_anomalous() {
        let collector = MetricsCollector::new();
        let p = provider("p");
        for i in 0..20 {
            let jitter = (i % 3) as f64;
            collector.record(&p, &MetricsUpdate::new(500.0 + jitter, 0.80 + jitter / 100.0));
        }
        let better = p.snapshot().with_metrics(ProviderMetrics {
            avg_response_time_ms: 10.0,
            success_rate: 1.0,
            ..ProviderMetrics::default()
        });
        assert!(collector.detect_anomalies(&better).is_empty());
    }

    #[test]
    fn test_trend_from_history() {
        let collector = MetricsCollector::new();
        let p = provider("p");
        for i in 0..10 {
            collector.record(&p, &MetricsUpdate::new(1_000.0 - 50.0 * i as f64, 0.9));
        }
        let trend = collector.performance_trend("p");
        assert_eq!(trend.samples, 10);
        assert_eq!(trend.response_time, TrendDirection::Improving);
        assert_eq!(trend.success_rate, TrendDirection::Stable);
        assert!((trend.response_time_slope + 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_remove_and_clear() {
        let collector = MetricsCollector::new();
        let a = provider("a");
        let b = provider("b");
        collector.record(&a, &MetricsUpdate::new(1.0, 1.0));
        collector.record(&b, &MetricsUpdate::new(1.0, 1.0));

        collector.remove("a");
        assert_eq!(collector.sample_count("a"), 0);
        assert_eq!(collector.sample_count("b"), 1);

        collector.clear();
        assert_eq!(collector.sample_count("b"), 0);
    }
}
