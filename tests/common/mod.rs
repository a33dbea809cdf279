//! Shared fixtures for integration and load testing.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use provider_balancer::config::{BalancerConfig, HealthCheckConfig};
use provider_balancer::{LoadBalancer, ProviderInstance, SelectionContext, Strategy};

/// Config with background health checks off so tests drive health explicitly.
pub fn config(strategy: Strategy) -> BalancerConfig {
    BalancerConfig {
        strategy,
        health_check: HealthCheckConfig {
            enabled: false,
            ..HealthCheckConfig::default()
        },
        ..BalancerConfig::default()
    }
}

pub fn provider(id: &str) -> ProviderInstance {
    ProviderInstance::new(id, format!("http://{}.test:8080", id))
}

/// Build a balancer and register `providers`.
pub fn balancer(config: BalancerConfig, providers: Vec<ProviderInstance>) -> Arc<LoadBalancer> {
    let lb = LoadBalancer::new(config);
    for p in providers {
        lb.add_provider(p).unwrap();
    }
    lb
}

/// Run `n` selections, releasing each slot, and count picks per provider.
pub fn select_many(lb: &LoadBalancer, n: usize) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for i in 0..n {
        let result = lb.select_provider(&SelectionContext::new(format!("req-{}", i))).unwrap();
        lb.release_provider(&result.provider.id);
        *counts.entry(result.provider.id).or_insert(0) += 1;
    }
    counts
}
