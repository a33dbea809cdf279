//! Load balancer orchestration.
//!
//! # Data Flow
//! ```text
//! Registration feed → LoadBalancer::add_provider / remove_provider
//!
//! Request dispatcher:
//!     select_provider(context)
//!         → admission filters → sticky lookup → strategy engine
//!         → SelectionResult (confidence.rs scores it)
//!     ... request runs on the caller's transport ...
//!     record_request_result → circuit breaker
//!     update_provider_metrics → collector → health tracker
//!     release_provider (or drop the ConnectionGuard)
//! ```
//!
//! # Design Decisions
//! - The orchestrator is the only stateful entry point callers see
//! - Selection never waits on I/O; probes run on background tasks
//! - Connection release is the caller's contract, with a RAII guard as the
//!   safe default

pub mod confidence;
pub mod orchestrator;

pub use orchestrator::{BalancerStatistics, LoadBalancer, LoadBalancerBuilder};
