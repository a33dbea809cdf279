//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! LoadBalancer::build:
//!     spawn health monitor + session sweeper (each holds a shutdown receiver)
//!
//! LoadBalancer::shutdown (shutdown.rs):
//!     trigger → background loops exit → state cleared
//! ```
//!
//! # Design Decisions
//! - One broadcast signal fans out to every background task
//! - Shutdown is idempotent; triggering twice is harmless

pub mod shutdown;

pub use shutdown::Shutdown;
