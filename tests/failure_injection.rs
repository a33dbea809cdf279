//! Failure injection: probe failures, timeouts and error storms.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use provider_balancer::health::ProbeError;
use provider_balancer::resilience::CircuitState;
use provider_balancer::{
    probe_fn, BalancerEvent, HealthClassification, LoadBalancer, ProviderInstance, SelectionContext, Strategy,
};

mod common;
use common::{balancer, config, provider, select_many};

/// Probe that fails for ids in the shared set.
fn failing_probe(down: Arc<Mutex<HashSet<String>>>) -> Arc<dyn provider_balancer::HealthProbe> {
    probe_fn(move |p: ProviderInstance| {
        let down = down.clone();
        async move {
            let is_down = down.lock().unwrap().contains(&p.id);
            if is_down {
                Err::<bool, ProbeError>(format!("{} refused connection", p.id).into())
            } else {
                Ok(true)
            }
        }
    })
}

#[tokio::test]
async fn test_probe_failure_excludes_and_recovery_restores() {
    let down = Arc::new(Mutex::new(HashSet::from(["flaky".to_string()])));
    let lb = LoadBalancer::builder(config(Strategy::RoundRobin))
        .health_probe(failing_probe(down.clone()))
        .build();
    lb.add_provider(provider("steady")).unwrap();
    lb.add_provider(provider("flaky")).unwrap();
    let mut events = lb.subscribe();

    lb.run_health_checks().await;
    assert_eq!(lb.get_provider("flaky").unwrap().health, HealthClassification::Unhealthy);
    let counts = select_many(&lb, 10);
    assert_eq!(counts.get("flaky"), None);

    match events.recv().await.unwrap() {
        BalancerEvent::HealthChanged { provider_id, old, new } => {
            assert_eq!(provider_id, "flaky");
            assert_eq!(old, HealthClassification::Healthy);
            assert_eq!(new, HealthClassification::Unhealthy);
        }
        other => panic!("unexpected event: {:?}", other),
    }

    down.lock().unwrap().clear();
    lb.run_health_checks().await;
    let counts = select_many(&lb, 10);
    assert_eq!(counts.get("flaky"), Some(&5));
}

#[tokio::test(start_paused = true)]
async fn test_hung_probe_times_out_without_blocking_selection() {
    let hang = Arc::new(AtomicBool::new(true));
    let flag = hang.clone();
    let probe = probe_fn(move |_p: ProviderInstance| {
        let flag = flag.clone();
        async move {
            if flag.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            Ok(true)
        }
    });

    let mut cfg = config(Strategy::RoundRobin);
    cfg.health_check.probe_timeout_secs = 2;
    let lb = LoadBalancer::builder(cfg).health_probe(probe).build();
    lb.add_provider(provider("slowpoke")).unwrap();

    // Selection proceeds while the probe is in flight.
    let checks = {
        let lb = lb.clone();
        tokio::spawn(async move { lb.run_health_checks().await })
    };
    assert!(lb.select_provider(&SelectionContext::new("during")).is_ok());
    lb.release_provider("slowpoke");

    checks.await.unwrap();
    assert_eq!(lb.get_provider("slowpoke").unwrap().health, HealthClassification::Unhealthy);
    assert!(lb.select_provider(&SelectionContext::new("after")).is_err());

    hang.store(false, Ordering::SeqCst);
    lb.run_health_checks().await;
    assert_eq!(lb.get_provider("slowpoke").unwrap().health, HealthClassification::Healthy);
}

#[tokio::test(start_paused = true)]
async fn test_periodic_monitor_marks_provider_down() {
    let down = Arc::new(Mutex::new(HashSet::new()));
    let mut cfg = config(Strategy::RoundRobin);
    cfg.health_check.enabled = true;
    cfg.health_check.interval_secs = 10;
    let lb = LoadBalancer::builder(cfg)
        .health_probe(failing_probe(down.clone()))
        .build();
    lb.add_provider(provider("p")).unwrap();

    down.lock().unwrap().insert("p".to_string());
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(lb.get_provider("p").unwrap().health, HealthClassification::Unhealthy);

    lb.shutdown().await;
}

#[test]
fn test_error_storm_opens_circuit_and_shifts_traffic() {
    let mut cfg = config(Strategy::RoundRobin);
    cfg.circuit_breaker.failure_threshold = 5;
    let lb = balancer(cfg, vec![provider("primary"), provider("fallback")]);
    let mut events = lb.subscribe();

    for _ in 0..5 {
        lb.record_request_result("primary", false);
    }
    assert_eq!(lb.circuit_state("primary").unwrap().state, CircuitState::Open);
    assert_eq!(
        events.try_recv().unwrap(),
        BalancerEvent::CircuitStateChanged {
            provider_id: "primary".into(),
            old: CircuitState::Closed,
            new: CircuitState::Open,
        }
    );

    let counts = select_many(&lb, 10);
    assert_eq!(counts.get("fallback"), Some(&10));
    assert_eq!(lb.get_statistics().open_circuits, 1);
}

#[test]
fn test_interleaved_successes_keep_circuit_closed() {
    let mut cfg = config(Strategy::RoundRobin);
    cfg.circuit_breaker.failure_threshold = 3;
    let lb = balancer(cfg, vec![provider("p")]);

    // Each success pays back one failure.
    for _ in 0..10 {
        lb.record_request_result("p", false);
        lb.record_request_result("p", false);
        lb.record_request_result("p", true);
        lb.record_request_result("p", true);
    }
    assert_eq!(lb.circuit_state("p").unwrap().state, CircuitState::Closed);
}

#[test]
fn test_disabled_breaker_never_opens() {
    let mut cfg = config(Strategy::RoundRobin);
    cfg.circuit_breaker.enabled = false;
    let lb = balancer(cfg, vec![provider("p")]);

    for _ in 0..100 {
        lb.record_request_result("p", false);
    }
    assert!(lb.select_provider(&SelectionContext::new("r")).is_ok());
}
