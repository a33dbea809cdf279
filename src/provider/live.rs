//! Live provider state.
//!
//! # Responsibilities
//! - Hold the registered descriptor of a single provider
//! - Track in-flight connections (for connection-aware strategies)
//! - Track health classification and the latest metrics
//! - Produce consistent `ProviderInstance` snapshots

use std::collections::BTreeSet;
use std::ops::Deref;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;
use tokio::time::Instant;
use url::Url;

use crate::error::Result;
use crate::provider::instance::{HealthClassification, MetricsUpdate, ProviderInstance, ProviderMetrics};

#[derive(Debug)]
struct MetricsState {
    metrics: ProviderMetrics,
    last_updated: SystemTime,
    /// Monotonic time of the last metrics report, for staleness checks.
    last_report: Instant,
}

/// A single registered provider.
#[derive(Debug)]
pub struct Provider {
    pub id: String,
    pub name: String,
    pub provider_type: String,
    /// Endpoint exactly as registered.
    pub endpoint: String,
    pub url: Url,
    pub weight: u32,
    pub max_connections: usize,
    pub capabilities: BTreeSet<String>,
    pub config: serde_json::Value,

    /// Number of currently in-flight requests.
    active_connections: AtomicUsize,
    /// Current health classification (see `HealthClassification` discriminants).
    health: AtomicU8,
    state: RwLock<MetricsState>,
}

impl Provider {
    /// Validate a descriptor and build live state from it.
    pub fn from_instance(instance: ProviderInstance) -> Result<Self> {
        let url = instance.validate()?;
        Ok(Self {
            id: instance.id,
            name: instance.name,
            provider_type: instance.provider_type,
            endpoint: instance.endpoint,
            url,
            weight: instance.weight,
            max_connections: instance.max_connections,
            capabilities: instance.capabilities,
            config: instance.config,
            active_connections: AtomicUsize::new(instance.current_connections),
            health: AtomicU8::new(instance.health as u8),
            state: RwLock::new(MetricsState {
                metrics: instance.metrics,
                last_updated: instance.last_updated,
                last_report: Instant::now(),
            }),
        })
    }

    /// Consistent copy of the provider's current state.
    pub fn snapshot(&self) -> ProviderInstance {
        let state = self.state.read().expect("provider state lock poisoned");
        ProviderInstance {
            id: self.id.clone(),
            name: self.name.clone(),
            provider_type: self.provider_type.clone(),
            endpoint: self.endpoint.clone(),
            weight: self.weight,
            max_connections: self.max_connections,
            current_connections: self.connections(),
            health: self.health(),
            metrics: state.metrics.clone(),
            capabilities: self.capabilities.clone(),
            config: self.config.clone(),
            last_updated: state.last_updated,
        }
    }

    // --- Connection accounting ---

    /// Get the current number of in-flight requests.
    pub fn connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Whether the provider is at (or past) its connection cap.
    pub fn is_at_capacity(&self) -> bool {
        self.connections() >= self.max_connections
    }

    /// Increment in-flight count without checking the cap.
    pub fn inc_connections(&self) -> usize {
        self.active_connections.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Take one connection slot if the provider is below its cap.
    /// Returns the new in-flight count, or `None` when full.
    pub fn try_acquire(&self) -> Option<usize> {
        self.active_connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max_connections).then_some(n + 1)
            })
            .ok()
            .map(|prev| prev + 1)
    }

    /// Decrement in-flight count, saturating at zero.
    pub fn dec_connections(&self) -> usize {
        let prev = self
            .active_connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| Some(n.saturating_sub(1)))
            .unwrap_or(0);
        prev.saturating_sub(1)
    }

    // --- Health ---

    pub fn health(&self) -> HealthClassification {
        HealthClassification::from(self.health.load(Ordering::Relaxed))
    }

    /// Atomically move to `decide(current)`. Returns `(old, new)` only for
    /// the caller whose update changed the classification.
    pub fn update_health<F>(&self, mut decide: F) -> Option<(HealthClassification, HealthClassification)>
    where
        F: FnMut(HealthClassification) -> Option<HealthClassification>,
    {
        let mut next = None;
        let prev = self
            .health
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                let current = HealthClassification::from(raw);
                next = decide(current).filter(|n| *n != current);
                next.map(|n| n as u8)
            })
            .ok()?;

        let next = next?;
        self.state.write().expect("provider state lock poisoned").last_updated = SystemTime::now();
        Some((HealthClassification::from(prev), next))
    }

    // --- Metrics ---

    pub fn metrics(&self) -> ProviderMetrics {
        self.state.read().expect("provider state lock poisoned").metrics.clone()
    }

    /// Merge a partial report and return the merged metrics.
    pub fn apply_metrics(&self, update: &MetricsUpdate) -> ProviderMetrics {
        let mut state = self.state.write().expect("provider state lock poisoned");
        update.apply(&mut state.metrics);
        state.last_updated = SystemTime::now();
        state.last_report = Instant::now();
        state.metrics.clone()
    }

    /// Monotonic time of the last metrics report (registration counts as one).
    pub fn last_report(&self) -> Instant {
        self.state.read().expect("provider state lock poisoned").last_report
    }
}

/// A RAII guard that releases one in-flight connection on drop.
#[derive(Debug)]
pub struct ConnectionGuard {
    provider: Arc<Provider>,
}

impl ConnectionGuard {
    /// Wrap a connection that has already been counted.
    pub(crate) fn new(provider: Arc<Provider>) -> Self {
        Self { provider }
    }
}

impl Deref for ConnectionGuard {
    type Target = Provider;
    fn deref(&self) -> &Self::Target {
        &self.provider
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let remaining = self.provider.dec_connections();
        crate::observability::metrics::record_active_connections(&self.provider.id, remaining);
    }
}
