//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request outcome reported by the dispatcher:
//!     → circuit_breaker.rs (track failures, open circuit if threshold exceeded)
//!     → admission filter consults the circuit on the next selection
//!
//! Dispatcher deciding to retry:
//!     → retry.rs (retry budget per request, exponential backoff + jitter)
//! ```
//!
//! # Design Decisions
//! - Circuit breaker prevents routing into a failing provider
//! - The balancer itself never retries; it only advises

pub mod circuit_breaker;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerState, CircuitState};
pub use retry::RetryPolicy;
