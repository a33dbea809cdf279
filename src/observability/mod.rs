//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Health tracker, circuit breaker, orchestrator produce:
//!     → events.rs (typed BalancerEvent on a broadcast channel)
//!     → metrics.rs (counters, gauges)
//!     → tracing log events (structured fields: provider, state, reason)
//!
//! Consumers:
//!     → Event subscribers (external logging/alerting)
//!     → Metrics endpoint (Prometheus scrape)
//!     → Log aggregation (stdout)
//! ```
//!
//! # Design Decisions
//! - The core defines event shape, never transport
//! - Emission never blocks the request path
//! - Metrics are cheap (no-op without an installed recorder)

pub mod events;
pub mod logging;
pub mod metrics;

pub use events::{BalancerEvent, EventBus};
