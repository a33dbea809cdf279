//! balancer-sim: drive simulated traffic through the provider balancer.
//!
//! # Architecture Overview
//!
//! ```text
//!   TOML config ──▶ LoadBalancer ◀──────────────── workers (tokio tasks)
//!                   │                               │
//!                   │ select_provider_guarded ─────▶│ simulated latency/failure
//!                   │ record_request_result ◀───────│
//!                   │ update_provider_metrics ◀─────│ rolling window per provider
//!                   │ (guard drop releases slot) ◀──│
//!                   ▼
//!   statistics + ranking + selection counts ──▶ stdout (JSON)
//! ```
//!
//! Providers may carry `latency_ms` and `failure_rate` in their `config`
//! table to shape the simulation.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use dashmap::DashMap;
use rand::Rng;
use serde::Serialize;

use provider_balancer::config::{self, BalancerConfig, ProviderConfig};
use provider_balancer::observability::{logging, metrics};
use provider_balancer::stats::ProviderScore;
use provider_balancer::{BalancerError, BalancerStatistics, LoadBalancer, MetricsUpdate, SelectionContext, Strategy};

#[derive(Parser)]
#[command(name = "balancer-sim")]
#[command(about = "Drive simulated traffic through the provider balancer", long_about = None)]
struct Cli {
    /// Balancer configuration (TOML). Demo providers are used if absent.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Total requests to simulate.
    #[arg(short = 'n', long, default_value_t = 1000)]
    requests: usize,

    /// Concurrent dispatcher tasks.
    #[arg(short, long, default_value_t = 4)]
    workers: usize,

    /// Distinct session keys to spread requests over (0 disables sessions).
    #[arg(long, default_value_t = 0)]
    sessions: usize,

    /// Failure rate for providers that do not set their own.
    #[arg(long, default_value_t = 0.02)]
    failure_rate: f64,

    /// Override the configured strategy.
    #[arg(short, long)]
    strategy: Option<Strategy>,
}

#[derive(Debug, Clone, Copy)]
struct SimProfile {
    latency_ms: f64,
    failure_rate: f64,
}

/// Dispatcher-side rolling counters for one provider.
#[derive(Debug, Default)]
struct Window {
    total: u64,
    errors: u64,
    latency_sum_ms: f64,
}

impl Window {
    fn record(&mut self, latency_ms: f64, success: bool) -> MetricsUpdate {
        self.total += 1;
        if !success {
            self.errors += 1;
        }
        self.latency_sum_ms += latency_ms;

        let total = self.total as f64;
        MetricsUpdate::new(
            self.latency_sum_ms / total,
            (self.total - self.errors) as f64 / total,
        )
        .with_counts(self.total, self.errors)
        .with_last_response_time(latency_ms)
    }
}

#[derive(Serialize)]
struct Report {
    requests: usize,
    failures: usize,
    selections: BTreeMap<String, usize>,
    statistics: BalancerStatistics,
    ranking: Vec<ProviderScore>,
}

fn demo_providers() -> Vec<ProviderConfig> {
    [("primary", 60, 120.0), ("secondary", 30, 250.0), ("backup", 10, 600.0)]
        .into_iter()
        .map(|(id, weight, latency)| {
            let mut table = toml::Table::new();
            table.insert("latency_ms".into(), toml::Value::Float(latency));
            ProviderConfig {
                id: id.to_string(),
                name: None,
                provider_type: "demo".to_string(),
                endpoint: format!("https://{}.example.net", id),
                weight,
                max_connections: 50,
                capabilities: Default::default(),
                config: Some(table),
            }
        })
        .collect()
}

fn profile_for(provider: &ProviderConfig, default_failure_rate: f64) -> SimProfile {
    let field = |key: &str| {
        provider
            .config
            .as_ref()
            .and_then(|t| t.get(key))
            .and_then(|v| v.as_float().or_else(|| v.as_integer().map(|i| i as f64)))
    };
    SimProfile {
        latency_ms: field("latency_ms").unwrap_or(200.0),
        failure_rate: field("failure_rate").unwrap_or(default_failure_rate).clamp(0.0, 1.0),
    }
}

/// Draw a latency (±50% jitter) and an outcome for one request.
fn simulate(profile: SimProfile) -> (f64, bool) {
    let mut rng = rand::thread_rng();
    let latency = profile.latency_ms * rng.gen_range(0.5..1.5);
    let success = !rng.gen_bool(profile.failure_rate);
    (latency, success)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => BalancerConfig::default(),
    };
    if let Some(strategy) = cli.strategy {
        config.strategy = strategy;
    }
    if config.providers.is_empty() {
        config.providers = demo_providers();
    }

    logging::init_logging(&config.observability);
    tracing::info!("balancer-sim v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let profiles: Arc<BTreeMap<String, SimProfile>> = Arc::new(
        config
            .providers
            .iter()
            .map(|p| (p.id.clone(), profile_for(p, cli.failure_rate)))
            .collect(),
    );

    let balancer = LoadBalancer::new(config.clone());
    for provider in &config.providers {
        balancer.add_provider(provider.to_instance())?;
    }

    tracing::info!(
        providers = config.providers.len(),
        requests = cli.requests,
        workers = cli.workers,
        strategy = %config.strategy,
        "Simulation starting"
    );

    let windows: Arc<DashMap<String, Window>> = Arc::new(DashMap::new());
    let selections: Arc<DashMap<String, usize>> = Arc::new(DashMap::new());
    let workers = cli.workers.max(1);

    let mut handles = Vec::with_capacity(workers);
    for worker in 0..workers {
        let balancer = balancer.clone();
        let profiles = profiles.clone();
        let windows = windows.clone();
        let selections = selections.clone();
        let share = cli.requests / workers + usize::from(worker < cli.requests % workers);
        let sessions = cli.sessions;

        handles.push(tokio::spawn(async move {
            let mut failures = 0usize;
            for i in 0..share {
                let mut ctx = SelectionContext::new(format!("w{}-{}", worker, i));
                if sessions > 0 {
                    ctx = ctx.with_session(format!("session-{}", (worker + i * workers) % sessions));
                }

                let (result, _guard) = match balancer.select_provider_guarded(&ctx) {
                    Ok(selected) => selected,
                    Err(BalancerError::NoProvidersAvailable { .. }) => {
                        failures += 1;
                        tokio::task::yield_now().await;
                        continue;
                    }
                    Err(e) => return Err(e),
                };
                let id = result.provider.id;
                *selections.entry(id.clone()).or_default() += 1;

                let profile = profiles.get(&id).copied().unwrap_or(SimProfile {
                    latency_ms: 200.0,
                    failure_rate: 0.0,
                });
                let (latency, success) = simulate(profile);

                balancer.record_request_result(&id, success);
                let update = windows.entry(id.clone()).or_default().record(latency, success);
                balancer.update_provider_metrics(&id, update)?;

                tokio::task::yield_now().await;
            }
            Ok::<usize, BalancerError>(failures)
        }));
    }

    let mut failures = 0;
    for handle in handles {
        failures += handle.await??;
    }

    let report = Report {
        requests: cli.requests,
        failures,
        selections: selections.iter().map(|e| (e.key().clone(), *e.value())).collect(),
        statistics: balancer.get_statistics(),
        ranking: balancer.get_performance_ranking(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    balancer.shutdown().await;
    tracing::info!("balancer-sim finished");
    Ok(())
}
