//! Error definitions for the balancer core.

use thiserror::Error;

/// Errors surfaced by the balancer's public operations.
///
/// Runtime conditions (pool exhaustion) and caller bugs (malformed input) are
/// both reported here; unknown provider ids are not, those are silent no-ops.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BalancerError {
    /// No registered provider passed the admission filters.
    #[error("No providers available for request {request_id}")]
    NoProvidersAvailable { request_id: String },

    /// A provider with the same identifier is already registered.
    #[error("Provider {0} is already registered")]
    DuplicateProvider(String),

    /// The provider descriptor failed validation at registration.
    #[error("Invalid provider {id}: {reason}")]
    InvalidProvider { id: String, reason: String },

    /// The selection context is malformed.
    #[error("Invalid selection context: {0}")]
    InvalidContext(String),

    /// A metrics update carried out-of-range values.
    #[error("Invalid metrics for provider {id}: {reason}")]
    InvalidMetrics { id: String, reason: String },

    /// The balancer has been shut down.
    #[error("Load balancer has been shut down")]
    ShutDown,
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BalancerError>;
