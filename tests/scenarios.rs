//! End-to-end selection scenarios.

use std::time::Duration;

use provider_balancer::config::{AdaptiveConfig, CircuitBreakerConfig, StickySessionConfig};
use provider_balancer::resilience::CircuitState;
use provider_balancer::{BalancerError, HealthClassification, MetricsUpdate, SelectionContext, Strategy};

mod common;
use common::{balancer, config, provider, select_many};

#[test]
fn test_no_candidate_no_selection() {
    let mut cfg = config(Strategy::RoundRobin);
    cfg.circuit_breaker.failure_threshold = 1;

    let lb = balancer(
        cfg,
        vec![
            provider("sick").with_health(HealthClassification::Unhealthy),
            provider("tripped"),
            provider("full").with_max_connections(1).with_connections(1),
            provider("offline").with_health(HealthClassification::Maintenance),
        ],
    );
    lb.record_request_result("tripped", false);

    let err = lb.select_provider(&SelectionContext::new("req-1")).unwrap_err();
    assert_eq!(
        err,
        BalancerError::NoProvidersAvailable {
            request_id: "req-1".into()
        }
    );
}

#[test]
fn test_empty_registry_statistics_are_zero() {
    let lb = balancer(config(Strategy::RoundRobin), vec![]);
    let stats = lb.get_statistics();
    assert_eq!(stats.pool.total_providers, 0);
    assert_eq!(stats.pool.average_response_time_ms, 0.0);
    assert_eq!(stats.pool.average_success_rate, 0.0);
    assert!(lb.select_provider(&SelectionContext::new("r")).is_err());
}

#[test]
fn test_weighted_fairness() {
    const N: usize = 100_000;
    for strategy in [Strategy::WeightedRandom, Strategy::WeightedRoundRobin] {
        let lb = balancer(
            config(strategy),
            vec![
                provider("heavy").with_weight(70).with_max_connections(usize::MAX),
                provider("light").with_weight(30).with_max_connections(usize::MAX),
            ],
        );
        let counts = select_many(&lb, N);
        let ratio = counts["heavy"] as f64 / N as f64;
        assert!((ratio - 0.7).abs() < 0.01, "{}: heavy ratio {}", strategy, ratio);
    }
}

#[test]
fn test_round_robin_rotates() {
    let lb = balancer(
        config(Strategy::RoundRobin),
        vec![provider("a"), provider("b"), provider("c")],
    );
    let counts = select_many(&lb, 300);
    assert_eq!(counts["a"], 100);
    assert_eq!(counts["b"], 100);
    assert_eq!(counts["c"], 100);
}

#[tokio::test(start_paused = true)]
async fn test_circuit_trip_and_recovery() {
    let mut cfg = config(Strategy::RoundRobin);
    cfg.circuit_breaker = CircuitBreakerConfig {
        enabled: true,
        failure_threshold: 3,
        recovery_timeout_secs: 60,
        half_open_max_calls: 2,
    };
    let lb = balancer(cfg, vec![provider("x")]);
    let ctx = SelectionContext::new("probe");

    for _ in 0..3 {
        lb.record_request_result("x", false);
    }
    assert_eq!(lb.circuit_state("x").unwrap().state, CircuitState::Open);
    assert!(lb.select_provider(&ctx).is_err());

    // Recovery timeout elapses; the next evaluation half-opens the circuit.
    tokio::time::advance(Duration::from_secs(61)).await;
    let trial = lb.select_provider(&ctx).unwrap();
    lb.release_provider(&trial.provider.id);
    assert_eq!(lb.circuit_state("x").unwrap().state, CircuitState::HalfOpen);

    lb.record_request_result("x", true);
    lb.record_request_result("x", true);
    let state = lb.circuit_state("x").unwrap();
    assert_eq!(state.state, CircuitState::Closed);
    assert_eq!(state.failure_count, 0);

    // Trip again; a single half-open failure re-opens.
    for _ in 0..3 {
        lb.record_request_result("x", false);
    }
    tokio::time::advance(Duration::from_secs(61)).await;
    assert!(lb.select_provider(&ctx).is_ok());
    assert_eq!(lb.circuit_state("x").unwrap().state, CircuitState::HalfOpen);
    lb.record_request_result("x", false);
    assert_eq!(lb.circuit_state("x").unwrap().state, CircuitState::Open);
}

#[tokio::test(start_paused = true)]
async fn test_sticky_session_stability() {
    let mut cfg = config(Strategy::RoundRobin);
    cfg.sticky_sessions = StickySessionConfig {
        enabled: true,
        ttl_secs: 60,
    };
    let lb = balancer(cfg, vec![provider("a"), provider("b"), provider("c")]);

    let first = lb
        .select_provider(&SelectionContext::new("r0").with_session("user-42"))
        .unwrap();
    lb.release_provider(&first.provider.id);

    for i in 1..10 {
        tokio::time::advance(Duration::from_secs(30)).await;
        let ctx = SelectionContext::new(format!("r{}", i)).with_session("user-42");
        let result = lb.select_provider(&ctx).unwrap();
        lb.release_provider(&result.provider.id);
        assert_eq!(result.provider.id, first.provider.id);
        assert_eq!(result.reason, "sticky session");
    }

    // Idle past the TTL: the binding is gone and the strategy decides again.
    tokio::time::advance(Duration::from_secs(61)).await;
    let result = lb
        .select_provider(&SelectionContext::new("late").with_session("user-42"))
        .unwrap();
    assert_ne!(result.reason, "sticky session");
}

#[test]
fn test_sticky_binding_skips_unavailable_provider() {
    let mut cfg = config(Strategy::RoundRobin);
    cfg.sticky_sessions.enabled = true;
    let lb = balancer(cfg, vec![provider("a"), provider("b")]);

    let first = lb
        .select_provider(&SelectionContext::new("r0").with_session("s"))
        .unwrap()
        .provider
        .id;
    lb.set_maintenance(&first, true);

    let next = lb
        .select_provider(&SelectionContext::new("r1").with_session("s"))
        .unwrap();
    assert_ne!(next.provider.id, first);
    assert_ne!(next.reason, "sticky session");
}

#[test]
fn test_least_connections_skips_unhealthy() {
    let lb = balancer(
        config(Strategy::LeastConnections),
        vec![
            provider("a").with_weight(100),
            provider("b").with_weight(100).with_health(HealthClassification::Unhealthy),
        ],
    );
    for i in 0..50 {
        let result = lb.select_provider(&SelectionContext::new(format!("r{}", i))).unwrap();
        assert_eq!(result.provider.id, "a");
        assert!(result.alternatives.is_empty());
    }
}

#[test]
fn test_remove_then_select_then_remove_again() {
    let lb = balancer(config(Strategy::RoundRobin), vec![provider("x")]);
    assert!(lb.remove_provider("x"));

    let err = lb.select_provider(&SelectionContext::new("r")).unwrap_err();
    assert!(matches!(err, BalancerError::NoProvidersAvailable { .. }));
    assert!(!lb.remove_provider("x"));
}

#[test]
fn test_adaptive_prefers_least_connections_under_load() {
    let mut cfg = config(Strategy::RoundRobin);
    cfg.adaptive = AdaptiveConfig {
        enabled: true,
        load_threshold: 0.8,
    };
    let lb = balancer(
        cfg,
        vec![
            provider("a").with_max_connections(10).with_connections(9),
            provider("b").with_max_connections(20).with_connections(18),
        ],
    );

    let result = lb.select_provider(&SelectionContext::new("r")).unwrap();
    assert_eq!(result.strategy, Strategy::LeastConnections);
    assert_eq!(result.provider.id, "a");
    assert_eq!(result.alternatives.len(), 1);
}

#[test]
fn test_adaptive_falls_back_to_round_robin_when_calm() {
    let mut cfg = config(Strategy::LeastResponseTime);
    cfg.adaptive.enabled = true;
    let lb = balancer(cfg, vec![provider("a"), provider("b")]);

    let result = lb.select_provider(&SelectionContext::new("r")).unwrap();
    assert_eq!(result.strategy, Strategy::RoundRobin);
}

#[test]
fn test_degrading_metrics_remove_provider_from_rotation() {
    let lb = balancer(
        config(Strategy::RoundRobin),
        vec![provider("good"), provider("bad")],
    );
    lb.update_provider_metrics("bad", MetricsUpdate::new(300.0, 0.3)).unwrap();
    assert_eq!(lb.get_provider("bad").unwrap().health, HealthClassification::Unhealthy);

    let counts = select_many(&lb, 20);
    assert_eq!(counts.get("good"), Some(&20));
    assert_eq!(counts.get("bad"), None);

    // Recovery through reported metrics.
    lb.update_provider_metrics("bad", MetricsUpdate::new(300.0, 0.99)).unwrap();
    let counts = select_many(&lb, 20);
    assert_eq!(counts.get("bad"), Some(&10));
}
