//! Sticky-session bindings.
//!
//! # Responsibilities
//! - Bind a session key to the provider that served it
//! - Expire bindings idle for longer than the TTL
//! - Purge bindings when their provider is removed

use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{self, Instant};

use crate::observability::metrics;

/// Upper bound on the sweep interval.
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// A single session binding.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionAffinityEntry {
    pub session_key: String,
    pub provider_id: String,
    pub created_at: Instant,
    pub last_accessed: Instant,
    pub access_count: u64,
}

/// Serializable view of a binding, returned by `LoadBalancer::get_sessions`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session_key: String,
    pub provider_id: String,
    pub age_secs: u64,
    pub idle_secs: u64,
    pub access_count: u64,
}

/// Session key → provider bindings with idle expiry.
///
/// Expiry is checked lazily on lookup; the sweeper only bounds memory.
#[derive(Debug)]
pub struct SessionAffinityTracker {
    ttl: Duration,
    sessions: DashMap<String, SessionAffinityEntry>,
}

impl SessionAffinityTracker {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: DashMap::new(),
        }
    }

    /// `min(ttl / 10, 60s)`, never zero.
    pub fn sweep_interval(&self) -> Duration {
        (self.ttl / 10)
            .min(MAX_SWEEP_INTERVAL)
            .max(Duration::from_millis(1))
    }

    fn is_expired(&self, entry: &SessionAffinityEntry) -> bool {
        entry.last_accessed.elapsed() > self.ttl
    }

    /// Look up the provider bound to `session_key`, refreshing the binding.
    /// Expired bindings are deleted and reported as absent.
    pub fn get_sticky_provider(&self, session_key: &str) -> Option<String> {
        {
            let mut entry = self.sessions.get_mut(session_key)?;
            if !self.is_expired(&entry) {
                entry.last_accessed = Instant::now();
                entry.access_count += 1;
                return Some(entry.provider_id.clone());
            }
        }

        self.sessions
            .remove_if(session_key, |_, entry| self.is_expired(entry));
        tracing::debug!(session = %session_key, "Session binding expired");
        None
    }

    /// Create or overwrite a binding.
    pub fn set_session_provider(&self, session_key: &str, provider_id: &str) {
        let now = Instant::now();
        self.sessions
            .entry(session_key.to_string())
            .and_modify(|entry| {
                if entry.provider_id != provider_id {
                    entry.provider_id = provider_id.to_string();
                    entry.created_at = now;
                    entry.access_count = 0;
                }
                entry.last_accessed = now;
            })
            .or_insert_with(|| SessionAffinityEntry {
                session_key: session_key.to_string(),
                provider_id: provider_id.to_string(),
                created_at: now,
                last_accessed: now,
                access_count: 0,
            });
        metrics::record_active_sessions(self.sessions.len());
    }

    pub fn remove_session(&self, session_key: &str) -> bool {
        let removed = self.sessions.remove(session_key).is_some();
        if removed {
            metrics::record_active_sessions(self.sessions.len());
        }
        removed
    }

    /// Remove the binding for `session_key` only if it still points at
    /// `provider_id`.
    pub fn unbind(&self, session_key: &str, provider_id: &str) -> bool {
        let removed = self
            .sessions
            .remove_if(session_key, |_, entry| entry.provider_id == provider_id)
            .is_some();
        if removed {
            metrics::record_active_sessions(self.sessions.len());
        }
        removed
    }

    /// Drop every binding to `provider_id`. Returns how many were removed.
    pub fn remove_provider_sessions(&self, provider_id: &str) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, entry| entry.provider_id != provider_id);
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            tracing::debug!(provider = %provider_id, removed, "Purged provider sessions");
            metrics::record_active_sessions(self.sessions.len());
        }
        removed
    }

    /// Delete every expired binding. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, entry| !self.is_expired(entry));
        let removed = before.saturating_sub(self.sessions.len());
        metrics::record_active_sessions(self.sessions.len());
        removed
    }

    pub fn get(&self, session_key: &str) -> Option<SessionAffinityEntry> {
        self.sessions.get(session_key).map(|e| e.value().clone())
    }

    /// Every stored binding, ordered by session key.
    pub fn summaries(&self) -> Vec<SessionSummary> {
        let mut summaries: Vec<SessionSummary> = self
            .sessions
            .iter()
            .map(|e| SessionSummary {
                session_key: e.session_key.clone(),
                provider_id: e.provider_id.clone(),
                age_secs: e.created_at.elapsed().as_secs(),
                idle_secs: e.last_accessed.elapsed().as_secs(),
                access_count: e.access_count,
            })
            .collect();
        summaries.sort_by(|a, b| a.session_key.cmp(&b.session_key));
        summaries
    }

    /// Number of stored bindings, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn clear(&self) {
        self.sessions.clear();
        metrics::record_active_sessions(0);
    }

    /// Periodically sweep expired bindings until shutdown.
    pub async fn run_sweeper(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let interval = self.sweep_interval();
        tracing::info!(interval_ms = interval.as_millis() as u64, "Session sweeper starting");

        let mut ticker = time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = self.sweep_expired();
                    if removed > 0 {
                        tracing::debug!(removed, remaining = self.len(), "Swept expired sessions");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Session sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
