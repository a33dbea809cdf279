//! Per-request selection input and output.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, SystemTime};

use crate::error::{BalancerError, Result};
use crate::provider::instance::ProviderInstance;
use crate::strategy::Strategy;

/// Priority class of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

/// Input to a single selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionContext {
    pub request_id: String,
    pub client_address: Option<IpAddr>,
    pub session_key: Option<String>,
    /// Capabilities every candidate must offer.
    pub required_capabilities: Vec<String>,
    pub priority: Priority,
    /// Caller's own timeout budget. Informational; selection never waits.
    pub timeout: Duration,
    pub retry_count: u32,
    pub metadata: HashMap<String, String>,
}

impl Default for SelectionContext {
    fn default() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }
}

impl SelectionContext {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            client_address: None,
            session_key: None,
            required_capabilities: Vec::new(),
            priority: Priority::Normal,
            timeout: Duration::from_secs(30),
            retry_count: 0,
            metadata: HashMap::new(),
        }
    }

    pub fn with_session(mut self, session_key: impl Into<String>) -> Self {
        self.session_key = Some(session_key.into());
        self
    }

    pub fn with_client_address(mut self, addr: IpAddr) -> Self {
        self.client_address = Some(addr);
        self
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.required_capabilities.push(capability.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Key used by hash-based selection: session, then client address, then request id.
    pub fn affinity_key(&self) -> String {
        if let Some(session) = &self.session_key {
            return session.clone();
        }
        if let Some(addr) = &self.client_address {
            return addr.to_string();
        }
        self.request_id.clone()
    }

    pub fn validate(&self) -> Result<()> {
        if self.request_id.trim().is_empty() {
            return Err(BalancerError::InvalidContext("request_id must not be empty".into()));
        }
        if matches!(&self.session_key, Some(k) if k.trim().is_empty()) {
            return Err(BalancerError::InvalidContext("session_key must not be blank".into()));
        }
        if self.required_capabilities.iter().any(|c| c.trim().is_empty()) {
            return Err(BalancerError::InvalidContext("capability names must not be blank".into()));
        }
        Ok(())
    }
}

/// Outcome of a single selection. Immutable once returned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionResult {
    pub provider: ProviderInstance,
    /// Concrete strategy that made the choice.
    pub strategy: Strategy,
    pub reason: String,
    /// Other admitted candidates.
    pub alternatives: Vec<ProviderInstance>,
    /// Confidence score in [0, 1].
    pub confidence: f64,
    pub estimated_response_time_ms: f64,
    pub selected_at: SystemTime,
}
