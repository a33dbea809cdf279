//! Session affinity subsystem.
//!
//! # Data Flow
//! ```text
//! Selection with a session key:
//!     → affinity.rs lookup (lazy expiry, refresh on hit)
//!     → hit and provider still admitted: reuse it
//!     → otherwise: strategy selects, binding is (re)written
//!
//! Background:
//!     sweeper (interval = min(ttl / 10, 60s)) drops expired bindings
//! ```
//!
//! # Design Decisions
//! - Lazy expiry on lookup is the correctness guarantee
//! - The sweep only bounds memory
//! - Bindings are purged when their provider is removed

pub mod affinity;

pub use affinity::{SessionAffinityEntry, SessionAffinityTracker, SessionSummary};
