//! Circuit breaker for provider protection.
//!
//! # States
//! - Closed: normal operation, provider admitted into candidate sets
//! - Open: provider assumed down, excluded from candidate sets
//! - Half-Open: a limited number of trial calls decide recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= failure_threshold
//! Open → Half-Open: first evaluation after recovery_timeout since last failure
//! Half-Open → Closed: half_open_max_calls trial successes
//! Half-Open → Open: any trial failure
//! ```
//!
//! # Design Decisions
//! - Per-provider circuit breaker (not global)
//! - Open → Half-Open is evaluated lazily on admission, no timers
//! - Records exist only between `register` and `remove`; untracked ids
//!   read as Closed and are never re-created by lookups or results
//! - Successes in Closed decay the failure count by one instead of resetting
//!   it, so isolated failures heal without flapping

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::observability::{metrics, BalancerEvent, EventBus};

/// Circuit state of a single provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        })
    }
}

/// Per-provider breaker record.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerState {
    pub state: CircuitState,
    pub failure_count: u32,
    pub last_failure: Option<Instant>,
    /// Trial successes recorded while half-open.
    pub half_open_calls: u32,
}

impl Default for CircuitBreakerState {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure: None,
            half_open_calls: 0,
        }
    }
}

/// Circuit breakers for every provider, keyed by provider id.
#[derive(Debug)]
pub struct CircuitBreaker {
    enabled: bool,
    failure_threshold: u32,
    recovery_timeout: Duration,
    half_open_max_calls: u32,
    circuits: DashMap<String, CircuitBreakerState>,
    events: EventBus,
}

impl CircuitBreaker {
    pub fn new(config: &CircuitBreakerConfig, events: EventBus) -> Self {
        Self {
            enabled: config.enabled,
            failure_threshold: config.failure_threshold.max(1),
            recovery_timeout: Duration::from_secs(config.recovery_timeout_secs),
            half_open_max_calls: config.half_open_max_calls.max(1),
            circuits: DashMap::new(),
            events,
        }
    }

    /// Start tracking a provider in the Closed state.
    pub fn register(&self, provider_id: &str) {
        self.circuits
            .insert(provider_id.to_string(), CircuitBreakerState::default());
        metrics::record_circuit_state(provider_id, CircuitState::Closed);
    }

    /// Admission check. Untracked providers read as Closed.
    ///
    /// An Open circuit whose recovery timeout has elapsed moves to Half-Open
    /// here and is admitted as a trial.
    pub fn is_closed(&self, provider_id: &str) -> bool {
        if !self.enabled {
            return true;
        }

        let (admitted, transition) = {
            let Some(mut entry) = self.circuits.get_mut(provider_id) else {
                return true;
            };
            let cb = entry.value_mut();
            match cb.state {
                CircuitState::Closed => (true, None),
                CircuitState::Open => {
                    let recovered = cb
                        .last_failure
                        .map_or(true, |at| at.elapsed() > self.recovery_timeout);
                    if recovered {
                        cb.state = CircuitState::HalfOpen;
                        cb.half_open_calls = 0;
                        (true, Some((CircuitState::Open, CircuitState::HalfOpen)))
                    } else {
                        (false, None)
                    }
                }
                CircuitState::HalfOpen => (cb.half_open_calls < self.half_open_max_calls, None),
            }
        };

        if let Some((old, new)) = transition {
            self.announce(provider_id, old, new);
        }
        admitted
    }

    /// Record the outcome of a request routed to `provider_id`.
    /// Results for untracked providers are dropped.
    pub fn record_result(&self, provider_id: &str, success: bool) {
        if !self.enabled {
            return;
        }

        let transition = {
            let Some(mut entry) = self.circuits.get_mut(provider_id) else {
                return;
            };
            let cb = entry.value_mut();
            if success {
                self.on_success(cb)
            } else {
                self.on_failure(cb)
            }
        };

        if let Some((old, new)) = transition {
            self.announce(provider_id, old, new);
        }
    }

    fn on_success(&self, cb: &mut CircuitBreakerState) -> Option<(CircuitState, CircuitState)> {
        match cb.state {
            CircuitState::Closed => {
                cb.failure_count = cb.failure_count.saturating_sub(1);
                None
            }
            CircuitState::HalfOpen => {
                cb.half_open_calls += 1;
                if cb.half_open_calls >= self.half_open_max_calls {
                    cb.state = CircuitState::Closed;
                    cb.failure_count = 0;
                    cb.half_open_calls = 0;
                    Some((CircuitState::HalfOpen, CircuitState::Closed))
                } else {
                    None
                }
            }
            // Late result from a request admitted before the circuit opened.
            CircuitState::Open => None,
        }
    }

    fn on_failure(&self, cb: &mut CircuitBreakerState) -> Option<(CircuitState, CircuitState)> {
        cb.failure_count = cb.failure_count.saturating_add(1);
        cb.last_failure = Some(Instant::now());
        match cb.state {
            CircuitState::Closed if cb.failure_count >= self.failure_threshold => {
                cb.state = CircuitState::Open;
                Some((CircuitState::Closed, CircuitState::Open))
            }
            CircuitState::HalfOpen => {
                cb.state = CircuitState::Open;
                cb.half_open_calls = 0;
                Some((CircuitState::HalfOpen, CircuitState::Open))
            }
            _ => None,
        }
    }

    /// Force a tracked provider's circuit Closed. Returns false if untracked.
    pub fn reset(&self, provider_id: &str) -> bool {
        let old = {
            let Some(mut entry) = self.circuits.get_mut(provider_id) else {
                return false;
            };
            std::mem::take(entry.value_mut()).state
        };
        if old != CircuitState::Closed {
            self.announce(provider_id, old, CircuitState::Closed);
        }
        true
    }

    /// Stop tracking a provider.
    pub fn remove(&self, provider_id: &str) -> bool {
        self.circuits.remove(provider_id).is_some()
    }

    /// Snapshot of a provider's breaker record.
    pub fn state(&self, provider_id: &str) -> Option<CircuitBreakerState> {
        self.circuits.get(provider_id).map(|cb| cb.value().clone())
    }

    pub fn open_count(&self) -> usize {
        self.circuits
            .iter()
            .filter(|cb| cb.value().state == CircuitState::Open)
            .count()
    }

    pub fn clear(&self) {
        self.circuits.clear();
    }

    fn announce(&self, provider_id: &str, old: CircuitState, new: CircuitState) {
        match new {
            CircuitState::Open => {
                tracing::warn!(provider = %provider_id, from = %old, "Circuit opened")
            }
            _ => tracing::info!(provider = %provider_id, from = %old, to = %new, "Circuit state changed"),
        }
        metrics::record_circuit_state(provider_id, new);
        self.events.emit(BalancerEvent::CircuitStateChanged {
            provider_id: provider_id.to_string(),
            old,
            new,
        });
    }
}
