//! Metrics collection and analysis.
//!
//! # Data Flow
//! ```text
//! Dispatcher reports metrics
//!     → collector.rs merges into live provider state
//!     → snapshot appended to the provider's ring (capacity 100)
//!
//! Queries:
//!     pool snapshot → analysis.rs (statistics, ranking)
//!     ring          → anomalies (≥ 10 samples), trend (≥ 2 samples)
//! ```
//!
//! # Design Decisions
//! - Aggregates over empty sets are zero, never NaN
//! - Pure math lives in analysis.rs; the collector only owns history

pub mod analysis;
pub mod collector;

pub use analysis::{
    performance_score, rank, Anomaly, AnomalyKind, PerformanceTrend, PoolStatistics, ProviderScore, Severity,
    TrendDirection,
};
pub use collector::{MetricsCollector, MetricsSample, HISTORY_CAPACITY, MIN_ANOMALY_SAMPLES};
