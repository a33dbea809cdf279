//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe providers through a pluggable callback
//! - Combine probe results with metric thresholds
//! - Update provider health state based on results

use async_trait::async_trait;
use futures_util::future::join_all;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time;

use crate::config::HealthCheckConfig;
use crate::health::tracker::HealthTracker;
use crate::provider::{Provider, ProviderInstance, ProviderRegistry};

/// Error returned by a failed probe.
pub type ProbeError = Box<dyn std::error::Error + Send + Sync>;

/// Transport-specific liveness probe, supplied by the embedding application.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Return `Ok(true)` if the provider answered healthily.
    async fn probe(&self, provider: &ProviderInstance) -> Result<bool, ProbeError>;
}

/// Adapter turning an async closure into a `HealthProbe`.
pub struct FnProbe<F>(F);

#[async_trait]
impl<F, Fut> HealthProbe for FnProbe<F>
where
    F: Fn(ProviderInstance) -> Fut + Send + Sync,
    Fut: Future<Output = Result<bool, ProbeError>> + Send,
{
    async fn probe(&self, provider: &ProviderInstance) -> Result<bool, ProbeError> {
        (self.0)(provider.clone()).await
    }
}

/// Wrap an async closure as a shareable probe.
pub fn probe_fn<F, Fut>(f: F) -> Arc<dyn HealthProbe>
where
    F: Fn(ProviderInstance) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<bool, ProbeError>> + Send + 'static,
{
    Arc::new(FnProbe(f))
}

#[derive(Clone)]
pub struct HealthMonitor {
    registry: Arc<ProviderRegistry>,
    tracker: Arc<HealthTracker>,
    probe: Option<Arc<dyn HealthProbe>>,
    interval: Duration,
    probe_timeout: Duration,
}

impl HealthMonitor {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        tracker: Arc<HealthTracker>,
        probe: Option<Arc<dyn HealthProbe>>,
        config: &HealthCheckConfig,
    ) -> Self {
        Self {
            registry,
            tracker,
            probe,
            interval: config.interval(),
            probe_timeout: config.probe_timeout(),
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            probe = self.probe.is_some(),
            "Health monitor starting"
        );

        let mut ticker = time::interval(self.interval);
        // The first tick completes immediately; skip it so fresh registrations
        // are not judged before their first report.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Run one active check over every registered provider.
    pub async fn check_all(&self) {
        let providers = self.registry.all();
        let checks = providers.iter().map(|provider| self.check_one(provider.clone()));
        join_all(checks).await;
    }

    async fn check_one(&self, provider: Arc<Provider>) {
        let probe_ok = match &self.probe {
            Some(probe) => self.run_probe(probe.clone(), provider.snapshot()).await,
            None => true,
        };
        let healthy = probe_ok && self.tracker.passes_active_check(&provider);
        self.tracker.apply_active_result(&provider, healthy);
    }

    /// Run the probe on its own task with a deadline. Errors, timeouts and
    /// panics all count as unhealthy.
    async fn run_probe(&self, probe: Arc<dyn HealthProbe>, snapshot: ProviderInstance) -> bool {
        let id = snapshot.id.clone();
        let timeout = self.probe_timeout;
        let task = tokio::spawn(async move { time::timeout(timeout, probe.probe(&snapshot)).await });

        match task.await {
            Ok(Ok(Ok(healthy))) => {
                if !healthy {
                    tracing::warn!(provider = %id, "Health probe failed: provider reported unhealthy");
                }
                healthy
            }
            Ok(Ok(Err(e))) => {
                tracing::warn!(provider = %id, error = %e, "Health probe failed: probe error");
                false
            }
            Ok(Err(_)) => {
                tracing::warn!(provider = %id, timeout_secs = timeout.as_secs(), "Health probe failed: timeout");
                false
            }
            Err(e) => {
                tracing::warn!(provider = %id, error = %e, "Health probe failed: probe task aborted");
                false
            }
        }
    }
}
