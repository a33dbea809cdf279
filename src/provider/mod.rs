//! Provider model and registry.
//!
//! # Data Flow
//! ```text
//! Registration feed → ProviderInstance (validated)
//!     → live.rs (Provider: atomic connections + health, locked metrics)
//!     → registry.rs (ordered copy-on-write list)
//!     → snapshots handed to strategies and callers
//! ```
//!
//! # Design Decisions
//! - Callers only ever see `ProviderInstance` values, never live state
//! - Registration order is the candidate order used for tie-breaks
//! - Selection takes a slot only while the provider is below its cap

pub mod context;
pub mod instance;
pub mod live;
pub mod registry;

pub use context::{Priority, SelectionContext, SelectionResult};
pub use instance::{HealthClassification, MetricsUpdate, ProviderInstance, ProviderMetrics};
pub use live::{ConnectionGuard, Provider};
pub use registry::ProviderRegistry;
