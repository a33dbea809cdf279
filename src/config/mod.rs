//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → BalancerConfig (validated, immutable)
//!     → handed to LoadBalancer at construction
//! ```
//!
//! # Design Decisions
//! - Config is immutable for the balancer's lifetime; no hot reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::AdaptiveConfig;
pub use schema::BalancerConfig;
pub use schema::CircuitBreakerConfig;
pub use schema::HealthCheckConfig;
pub use schema::ObservabilityConfig;
pub use schema::ProviderConfig;
pub use schema::RetryConfig;
pub use schema::StickySessionConfig;
