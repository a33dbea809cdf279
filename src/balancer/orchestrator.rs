//! The load balancer: registry plus every subsystem, behind one API.
//!
//! # Responsibilities
//! - Register and deregister providers, keeping per-provider state in sync
//! - Run the selection protocol (filter, sticky, strategy, bind, acquire)
//! - Route outcome and metric reports to the breaker, collector and tracker
//! - Own the background health monitor and session sweeper
//!
//! # Selection
//! ```text
//! validate context
//!     → snapshot registry, admit: health available, below cap,
//!       has capabilities, circuit admits
//!     → none admitted: NoProvidersAvailable
//!     → sticky binding still admitted: use it
//!     → else strategy engine (adaptive override when enabled)
//!     → bind session, take a connection slot
//!     → ProviderSelected event + counter, confidence score
//! ```

use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::balancer::confidence::confidence;
use crate::config::BalancerConfig;
use crate::error::{BalancerError, Result};
use crate::health::{HealthMonitor, HealthProbe, HealthTracker};
use crate::lifecycle::Shutdown;
use crate::observability::{metrics, BalancerEvent, EventBus};
use crate::provider::{
    ConnectionGuard, MetricsUpdate, Provider, ProviderInstance, ProviderRegistry, SelectionContext,
    SelectionResult,
};
use crate::resilience::{CircuitBreaker, CircuitBreakerState, RetryPolicy};
use crate::session::{SessionAffinityTracker, SessionSummary};
use crate::stats::{self, Anomaly, MetricsCollector, MetricsSample, PerformanceTrend, PoolStatistics, ProviderScore};
use crate::strategy::{Strategy, StrategyEngine};

const STICKY_REASON: &str = "sticky session";

/// Aggregate view returned by `LoadBalancer::get_statistics`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalancerStatistics {
    #[serde(flatten)]
    pub pool: PoolStatistics,
    pub active_sessions: usize,
    pub open_circuits: usize,
    pub strategy: Strategy,
    pub adaptive_enabled: bool,
    pub sticky_sessions_enabled: bool,
}

/// Builder for `LoadBalancer`.
pub struct LoadBalancerBuilder {
    config: BalancerConfig,
    probe: Option<Arc<dyn HealthProbe>>,
}

impl LoadBalancerBuilder {
    /// Transport-specific liveness probe used by active health checks.
    pub fn health_probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Build the balancer. Background tasks are spawned only when called
    /// inside a Tokio runtime.
    pub fn build(self) -> Arc<LoadBalancer> {
        let config = self.config;
        let events = EventBus::new(config.observability.event_capacity);
        let registry = Arc::new(ProviderRegistry::new());
        let health = Arc::new(HealthTracker::new(&config.health_check, events.clone()));
        let monitor = HealthMonitor::new(registry.clone(), health.clone(), self.probe, &config.health_check);

        let balancer = Arc::new(LoadBalancer {
            engine: StrategyEngine::new(config.adaptive.load_threshold),
            circuits: CircuitBreaker::new(&config.circuit_breaker, events.clone()),
            sessions: Arc::new(SessionAffinityTracker::new(config.sticky_sessions.ttl())),
            collector: MetricsCollector::new(),
            retry: RetryPolicy::new(&config.retry),
            shutdown: Shutdown::new(),
            tasks: Mutex::new(Vec::new()),
            registry,
            health,
            monitor,
            events,
            config,
        });
        balancer.spawn_background_tasks();

        tracing::info!(
            strategy = %balancer.config.strategy,
            adaptive = balancer.config.adaptive.enabled,
            sticky_sessions = balancer.config.sticky_sessions.enabled,
            circuit_breaker = balancer.config.circuit_breaker.enabled,
            "Load balancer initialized"
        );
        balancer
    }
}

/// Provider load balancer.
///
/// Every method takes `&self`; share it as `Arc<LoadBalancer>` across
/// request tasks.
pub struct LoadBalancer {
    config: BalancerConfig,
    registry: Arc<ProviderRegistry>,
    engine: StrategyEngine,
    circuits: CircuitBreaker,
    sessions: Arc<SessionAffinityTracker>,
    collector: MetricsCollector,
    health: Arc<HealthTracker>,
    monitor: HealthMonitor,
    retry: RetryPolicy,
    events: EventBus,
    shutdown: Shutdown,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl LoadBalancer {
    pub fn builder(config: BalancerConfig) -> LoadBalancerBuilder {
        LoadBalancerBuilder { config, probe: None }
    }

    /// Build with no health probe.
    pub fn new(config: BalancerConfig) -> Arc<Self> {
        Self::builder(config).build()
    }

    fn spawn_background_tasks(&self) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::debug!("No Tokio runtime; background health checks and session sweeps disabled");
                return;
            }
        };

        let mut tasks = self.tasks.lock().expect("task list lock poisoned");
        if self.config.health_check.enabled {
            tasks.push(handle.spawn(self.monitor.clone().run(self.shutdown.subscribe())));
        }
        if self.config.sticky_sessions.enabled {
            tasks.push(handle.spawn(self.sessions.clone().run_sweeper(self.shutdown.subscribe())));
        }
    }

    fn ensure_running(&self) -> Result<()> {
        if self.shutdown.is_triggered() {
            return Err(BalancerError::ShutDown);
        }
        Ok(())
    }

    pub fn config(&self) -> &BalancerConfig {
        &self.config
    }

    // --- Registry ---

    /// Register a provider. Duplicate ids are rejected and leave the
    /// registry unchanged.
    pub fn add_provider(&self, instance: ProviderInstance) -> Result<()> {
        self.ensure_running()?;
        let provider = self.registry.add(Provider::from_instance(instance)?)?;

        self.circuits.register(&provider.id);
        if !self.registry.contains(&provider.id) {
            // Removed concurrently before its breaker existed.
            self.circuits.remove(&provider.id);
            return Ok(());
        }
        metrics::record_provider_health(&provider.id, provider.health());
        metrics::record_active_connections(&provider.id, provider.connections());

        tracing::info!(
            provider = %provider.id,
            endpoint = %provider.endpoint,
            weight = provider.weight,
            max_connections = provider.max_connections,
            "Provider registered"
        );
        self.events.emit(BalancerEvent::ProviderAdded {
            provider_id: provider.id.clone(),
        });
        Ok(())
    }

    /// Deregister a provider and purge its breaker, history and sessions.
    /// Returns false if the id was not registered.
    pub fn remove_provider(&self, provider_id: &str) -> bool {
        if self.registry.remove(provider_id).is_none() {
            return false;
        }

        self.circuits.remove(provider_id);
        self.collector.remove(provider_id);
        let sessions = self.sessions.remove_provider_sessions(provider_id);

        tracing::info!(provider = %provider_id, sessions, "Provider removed");
        self.events.emit(BalancerEvent::ProviderRemoved {
            provider_id: provider_id.to_string(),
        });
        true
    }

    pub fn get_provider(&self, provider_id: &str) -> Option<ProviderInstance> {
        self.registry.get(provider_id).map(|p| p.snapshot())
    }

    /// Snapshots of every provider, in registration order.
    pub fn get_all_providers(&self) -> Vec<ProviderInstance> {
        self.registry.snapshots()
    }

    /// Providers whose health admits them to selection (healthy or degraded).
    pub fn get_healthy_providers(&self) -> Vec<ProviderInstance> {
        self.registry
            .snapshots()
            .into_iter()
            .filter(|p| p.health.is_available())
            .collect()
    }

    // --- Selection ---

    /// Choose a provider for one request and take a connection slot on it.
    ///
    /// The caller must release the slot with `release_provider` once the
    /// request completes; `select_provider_guarded` does that on drop.
    pub fn select_provider(&self, context: &SelectionContext) -> Result<SelectionResult> {
        self.select(context).map(|(result, _)| result)
    }

    /// Like `select_provider`, with a guard that releases the slot on drop.
    pub fn select_provider_guarded(&self, context: &SelectionContext) -> Result<(SelectionResult, ConnectionGuard)> {
        self.select(context)
            .map(|(result, provider)| (result, ConnectionGuard::new(provider)))
    }

    fn admits(&self, candidate: &ProviderInstance, context: &SelectionContext) -> bool {
        candidate.health.is_available()
            && candidate.current_connections < candidate.max_connections
            && candidate.has_capabilities(&context.required_capabilities)
            && self.circuits.is_closed(&candidate.id)
    }

    fn requested_strategy(&self) -> Strategy {
        if self.config.adaptive.enabled {
            Strategy::Adaptive
        } else {
            self.config.strategy
        }
    }

    fn sticky_provider(&self, context: &SelectionContext) -> Option<String> {
        if !self.config.sticky_sessions.enabled {
            return None;
        }
        context
            .session_key
            .as_deref()
            .and_then(|key| self.sessions.get_sticky_provider(key))
    }

    fn select(&self, context: &SelectionContext) -> Result<(SelectionResult, Arc<Provider>)> {
        self.ensure_running()?;
        context.validate()?;

        let providers = self.registry.all();
        let (mut live, mut candidates): (Vec<&Arc<Provider>>, Vec<ProviderInstance>) = providers
            .iter()
            .map(|p| (p, p.snapshot()))
            .filter(|(_, snapshot)| self.admits(snapshot, context))
            .unzip();

        let requested = self.requested_strategy();
        let mut sticky = self.sticky_provider(context);

        // A slot can fill between the snapshot and the acquire; drop that
        // candidate and choose again.
        let (index, strategy, reason, connections) = loop {
            if candidates.is_empty() {
                metrics::record_selection_failure();
                tracing::warn!(
                    request_id = %context.request_id,
                    registered = providers.len(),
                    "No providers available"
                );
                return Err(BalancerError::NoProvidersAvailable {
                    request_id: context.request_id.clone(),
                });
            }

            let sticky_index = sticky
                .take()
                .and_then(|id| candidates.iter().position(|c| c.id == id));
            let (index, strategy, reason) = match sticky_index {
                Some(index) => (
                    index,
                    self.engine.resolve(requested, &candidates),
                    STICKY_REASON.to_string(),
                ),
                None => {
                    let (effective, chosen) = self.engine.select(requested, &candidates, context)?;
                    let index = candidates
                        .iter()
                        .position(|c| c.id == chosen.id)
                        .unwrap_or_default();
                    let reason = if requested == Strategy::Adaptive {
                        format!("adaptive: {}", effective)
                    } else {
                        format!("strategy: {}", effective)
                    };
                    (index, effective, reason)
                }
            };

            match live[index].try_acquire() {
                Some(connections) => break (index, strategy, reason, connections),
                None => {
                    tracing::debug!(provider = %candidates[index].id, "Provider filled during selection, retrying");
                    live.remove(index);
                    candidates.remove(index);
                }
            }
        };

        let provider = Arc::clone(live[index]);
        let mut selected = candidates.remove(index);
        selected.current_connections = connections;
        let alternatives = candidates;

        if self.config.sticky_sessions.enabled && reason != STICKY_REASON {
            if let Some(key) = &context.session_key {
                self.sessions.set_session_provider(key, &selected.id);
                // A concurrent removal may have purged sessions before this
                // binding landed.
                if !self.registry.contains(&selected.id) {
                    self.sessions.unbind(key, &selected.id);
                }
            }
        }

        metrics::record_selection(&selected.id, strategy);
        metrics::record_active_connections(&selected.id, connections);
        tracing::debug!(
            request_id = %context.request_id,
            provider = %selected.id,
            strategy = %strategy,
            priority = ?context.priority,
            alternatives = alternatives.len(),
            reason = %reason,
            "Provider selected"
        );
        self.events.emit(BalancerEvent::ProviderSelected {
            request_id: context.request_id.clone(),
            provider_id: selected.id.clone(),
            strategy,
            reason: reason.clone(),
        });

        let result = SelectionResult {
            confidence: confidence(&selected, &alternatives),
            estimated_response_time_ms: selected.metrics.avg_response_time_ms,
            provider: selected,
            strategy,
            reason,
            alternatives,
            selected_at: SystemTime::now(),
        };
        Ok((result, provider))
    }

    /// Release one connection slot taken by `select_provider`.
    /// Unknown ids are ignored; the count never drops below zero.
    pub fn release_provider(&self, provider_id: &str) {
        if let Some(provider) = self.registry.get(provider_id) {
            let remaining = provider.dec_connections();
            metrics::record_active_connections(provider_id, remaining);
        }
    }

    // --- Reports ---

    /// Feed a request outcome to the circuit breaker. Unknown ids are ignored.
    pub fn record_request_result(&self, provider_id: &str, success: bool) {
        if self.registry.contains(provider_id) {
            self.circuits.record_result(provider_id, success);
        }
    }

    /// Merge a metrics report, append it to history and re-classify health.
    /// Unknown ids are ignored; out-of-range values are rejected.
    pub fn update_provider_metrics(&self, provider_id: &str, update: impl Into<MetricsUpdate>) -> Result<()> {
        let update = update.into();
        update.validate(provider_id)?;

        if let Some(provider) = self.registry.get(provider_id) {
            self.collector.record(&provider, &update);
            if !self.registry.contains(provider_id) {
                self.collector.remove(provider_id);
                return Ok(());
            }
            self.health.apply_classification(&provider);
        }
        Ok(())
    }

    // --- Health and circuits ---

    /// Put a provider into or out of maintenance. Returns false for unknown ids.
    pub fn set_maintenance(&self, provider_id: &str, enabled: bool) -> bool {
        match self.registry.get(provider_id) {
            Some(provider) => {
                self.health.set_maintenance(&provider, enabled);
                true
            }
            None => false,
        }
    }

    /// Run one active health check over every provider now.
    pub async fn run_health_checks(&self) {
        self.monitor.check_all().await;
    }

    /// Force a provider's circuit Closed. Returns false for unknown ids.
    pub fn reset_circuit(&self, provider_id: &str) -> bool {
        self.circuits.reset(provider_id)
    }

    pub fn circuit_state(&self, provider_id: &str) -> Option<CircuitBreakerState> {
        self.circuits.state(provider_id)
    }

    // --- Statistics ---

    pub fn get_statistics(&self) -> BalancerStatistics {
        BalancerStatistics {
            pool: PoolStatistics::calculate(&self.registry.snapshots()),
            active_sessions: self.sessions.len(),
            open_circuits: self.circuits.open_count(),
            strategy: self.config.strategy,
            adaptive_enabled: self.config.adaptive.enabled,
            sticky_sessions_enabled: self.config.sticky_sessions.enabled,
        }
    }

    pub fn get_performance_ranking(&self) -> Vec<ProviderScore> {
        stats::rank(&self.registry.snapshots())
    }

    /// Anomalies in a provider's current metrics. Empty for unknown ids.
    pub fn detect_anomalies(&self, provider_id: &str) -> Vec<Anomaly> {
        self.registry
            .get(provider_id)
            .map(|p| self.collector.detect_anomalies(&p.snapshot()))
            .unwrap_or_default()
    }

    pub fn get_performance_trend(&self, provider_id: &str) -> PerformanceTrend {
        self.collector.performance_trend(provider_id)
    }

    pub fn get_metrics_history(&self, provider_id: &str) -> Vec<MetricsSample> {
        self.collector.history(provider_id)
    }

    // --- Sessions ---

    /// Current sticky-session bindings, ordered by session key. Bindings
    /// past their TTL but not yet swept are included.
    pub fn get_sessions(&self) -> Vec<SessionSummary> {
        self.sessions.summaries()
    }

    /// Drop one sticky-session binding. Returns false if none existed.
    pub fn remove_session(&self, session_key: &str) -> bool {
        let removed = self.sessions.remove_session(session_key);
        if removed {
            tracing::debug!(session = %session_key, "Session binding removed");
        }
        removed
    }

    // --- Misc ---

    pub fn subscribe(&self) -> broadcast::Receiver<BalancerEvent> {
        self.events.subscribe()
    }

    /// Backoff policy dispatchers should follow when retrying.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Stop background tasks and drop all in-memory state. Idempotent.
    pub async fn shutdown(&self) {
        if !self.shutdown.trigger() {
            return;
        }

        let tasks = std::mem::take(&mut *self.tasks.lock().expect("task list lock poisoned"));
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Background task ended abnormally");
            }
        }

        let providers = self.registry.len();
        self.registry.clear();
        self.circuits.clear();
        self.sessions.clear();
        self.collector.clear();
        tracing::info!(providers, "Load balancer shut down");
    }
}
