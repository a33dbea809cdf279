//! Typed balancer notifications.
//!
//! # Responsibilities
//! - Define the event shape for health, circuit and selection changes
//! - Fan events out to any number of subscribers
//!
//! # Design Decisions
//! - Broadcast channel: slow subscribers lag and drop, publishers never block
//! - Publishing with zero subscribers is not an error

use serde::Serialize;
use tokio::sync::broadcast;

use crate::provider::HealthClassification;
use crate::resilience::circuit_breaker::CircuitState;
use crate::strategy::Strategy;

/// A state change or decision made by the balancer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BalancerEvent {
    ProviderAdded {
        provider_id: String,
    },
    ProviderRemoved {
        provider_id: String,
    },
    HealthChanged {
        provider_id: String,
        old: HealthClassification,
        new: HealthClassification,
    },
    CircuitStateChanged {
        provider_id: String,
        old: CircuitState,
        new: CircuitState,
    },
    ProviderSelected {
        request_id: String,
        provider_id: String,
        strategy: Strategy,
        reason: String,
    },
}

/// Publisher side of the event channel. Cheap to clone.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BalancerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BalancerEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: BalancerEvent) {
        // Err only means nobody is listening.
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
