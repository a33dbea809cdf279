//! Provider load balancing: strategy selection, health tracking, circuit
//! breaking, sticky sessions and metrics analysis behind a single
//! [`LoadBalancer`].

pub mod balancer;
pub mod config;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod observability;
pub mod provider;
pub mod resilience;
pub mod session;
pub mod stats;
pub mod strategy;

pub use balancer::{BalancerStatistics, LoadBalancer, LoadBalancerBuilder};
pub use config::BalancerConfig;
pub use error::{BalancerError, Result};
pub use health::{probe_fn, HealthProbe};
pub use observability::BalancerEvent;
pub use provider::{
    ConnectionGuard, HealthClassification, MetricsUpdate, ProviderInstance, ProviderMetrics, SelectionContext,
    SelectionResult,
};
pub use strategy::Strategy;
