//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Passive classification (tracker.rs):
//!     Metrics update reported
//!     → classify(success rate, response time)
//!     → Healthy / Degraded / Unhealthy
//!
//! Active checks (monitor.rs):
//!     Periodic timer
//!     → Probe each provider (callback, bounded timeout)
//!     → Combine with metric thresholds and staleness
//!     → Healthy ←→ Unhealthy
//! ```
//!
//! # Design Decisions
//! - Active and passive checks are complementary
//! - A failed or timed-out probe is a health result, never an error
//! - Health state is per-provider; providers are never removed by health
//! - Maintenance is operator-owned and survives both paths

pub mod monitor;
pub mod tracker;

pub use monitor::{probe_fn, HealthMonitor, HealthProbe, ProbeError};
pub use tracker::{classify, HealthTracker};
