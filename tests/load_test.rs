//! Concurrent load against a shared balancer.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use provider_balancer::{BalancerError, MetricsUpdate, SelectionContext, Strategy};

mod common;
use common::{balancer, config, provider};

const WORKERS: usize = 8;
const REQUESTS_PER_WORKER: usize = 500;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_selection_respects_capacity() {
    let lb = balancer(
        config(Strategy::LeastConnections),
        vec![
            provider("a").with_max_connections(3),
            provider("b").with_max_connections(3),
            provider("c").with_max_connections(3),
        ],
    );
    let exhausted = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for worker in 0..WORKERS {
        let lb = lb.clone();
        let exhausted = exhausted.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..REQUESTS_PER_WORKER {
                let ctx = SelectionContext::new(format!("w{}-{}", worker, i));
                match lb.select_provider_guarded(&ctx) {
                    Ok((result, guard)) => {
                        assert!(result.provider.current_connections <= result.provider.max_connections);
                        assert!(guard.connections() <= guard.max_connections);
                        lb.record_request_result(&result.provider.id, true);
                        tokio::task::yield_now().await;
                        drop(guard);
                    }
                    Err(BalancerError::NoProvidersAvailable { .. }) => {
                        exhausted.fetch_add(1, Ordering::Relaxed);
                        tokio::task::yield_now().await;
                    }
                    Err(e) => panic!("unexpected error: {}", e),
                }
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // Every slot came back.
    for p in lb.get_all_providers() {
        assert_eq!(p.current_connections, 0, "provider {} leaked slots", p.id);
    }
    assert!(exhausted.load(Ordering::Relaxed) < WORKERS * REQUESTS_PER_WORKER);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_registry_churn_during_selection() {
    let lb = balancer(
        config(Strategy::RoundRobin),
        vec![provider("stable-1"), provider("stable-2")],
    );

    let churn = {
        let lb = lb.clone();
        tokio::spawn(async move {
            for round in 0..200 {
                let id = format!("churn-{}", round % 4);
                if !lb.remove_provider(&id) {
                    lb.add_provider(provider(&id)).unwrap();
                }
                tokio::task::yield_now().await;
            }
        })
    };

    let mut selectors = Vec::new();
    for worker in 0..4 {
        let lb = lb.clone();
        selectors.push(tokio::spawn(async move {
            for i in 0..500 {
                let ctx = SelectionContext::new(format!("s{}-{}", worker, i));
                let result = lb.select_provider(&ctx).unwrap();
                lb.update_provider_metrics(&result.provider.id, MetricsUpdate::new(50.0, 1.0))
                    .unwrap();
                lb.release_provider(&result.provider.id);
                tokio::task::yield_now().await;
            }
        }));
    }

    churn.await.unwrap();
    for handle in selectors {
        handle.await.unwrap();
    }

    let stable = lb.get_provider("stable-1").unwrap();
    assert_eq!(stable.current_connections, 0);
    // 200 rounds over 4 ids leaves each one removed again.
    assert_eq!(lb.get_all_providers().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_removal_during_sticky_selection_leaves_no_state() {
    let mut cfg = config(Strategy::RoundRobin);
    cfg.sticky_sessions.enabled = true;
    let lb = balancer(cfg, vec![provider("stable")]);

    for round in 0..300 {
        lb.add_provider(provider("x")).unwrap();

        let mut selectors = Vec::new();
        for worker in 0..4 {
            let lb = lb.clone();
            selectors.push(tokio::spawn(async move {
                for i in 0..8 {
                    let ctx = SelectionContext::new(format!("r{}-{}-{}", round, worker, i))
                        .with_session(format!("s{}-{}", worker, i % 2));
                    if let Ok((result, _guard)) = lb.select_provider_guarded(&ctx) {
                        lb.record_request_result(&result.provider.id, i % 2 == 0);
                        lb.update_provider_metrics(&result.provider.id, MetricsUpdate::new(80.0, 0.99))
                            .unwrap();
                    }
                    tokio::task::yield_now().await;
                }
            }));
        }

        tokio::task::yield_now().await;
        assert!(lb.remove_provider("x"));
        for handle in selectors {
            handle.await.unwrap();
        }

        assert!(lb.circuit_state("x").is_none(), "round {}: circuit left behind", round);
        assert!(lb.get_metrics_history("x").is_empty(), "round {}: history left behind", round);
        let leaked = lb.get_sessions().iter().filter(|s| s.provider_id == "x").count();
        assert_eq!(leaked, 0, "round {}: sessions left behind", round);
    }

    let stats = lb.get_statistics();
    assert_eq!(stats.pool.total_providers, 1);
    assert!(lb.get_sessions().iter().all(|s| s.provider_id == "stable"));
}
