//! Provider registry.
//!
//! # Responsibilities
//! - Keep registered providers in registration order
//! - Reject duplicate identifiers
//! - Hand out consistent, lock-free snapshots for selection

use arc_swap::ArcSwap;
use std::sync::{Arc, Mutex};

use crate::error::{BalancerError, Result};
use crate::provider::instance::ProviderInstance;
use crate::provider::live::Provider;

/// Ordered, copy-on-write set of providers.
///
/// Readers load the current `Vec` without locking. Writers clone, modify and
/// swap it in under `write_lock`, so concurrent add/remove never lose updates.
#[derive(Debug)]
pub struct ProviderRegistry {
    providers: ArcSwap<Vec<Arc<Provider>>>,
    write_lock: Mutex<()>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: ArcSwap::from_pointee(Vec::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// Register a provider. Duplicate identifiers are rejected.
    pub fn add(&self, provider: Provider) -> Result<Arc<Provider>> {
        let _guard = self.write_lock.lock().expect("registry write lock poisoned");
        let current = self.providers.load();
        if current.iter().any(|p| p.id == provider.id) {
            return Err(BalancerError::DuplicateProvider(provider.id));
        }

        let provider = Arc::new(provider);
        let mut next = Vec::with_capacity(current.len() + 1);
        next.extend(current.iter().cloned());
        next.push(provider.clone());
        self.providers.store(Arc::new(next));
        Ok(provider)
    }

    /// Deregister a provider, returning it if it was present.
    pub fn remove(&self, id: &str) -> Option<Arc<Provider>> {
        let _guard = self.write_lock.lock().expect("registry write lock poisoned");
        let current = self.providers.load();
        let index = current.iter().position(|p| p.id == id)?;

        let mut next: Vec<Arc<Provider>> = current.iter().cloned().collect();
        let removed = next.remove(index);
        self.providers.store(Arc::new(next));
        Some(removed)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Provider>> {
        self.providers.load().iter().find(|p| p.id == id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.providers.load().iter().any(|p| p.id == id)
    }

    /// The current provider list (for health checking and selection).
    pub fn all(&self) -> Arc<Vec<Arc<Provider>>> {
        self.providers.load_full()
    }

    /// Snapshots of every provider, in registration order.
    pub fn snapshots(&self) -> Vec<ProviderInstance> {
        self.providers.load().iter().map(|p| p.snapshot()).collect()
    }

    pub fn len(&self) -> usize {
        self.providers.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every provider.
    pub fn clear(&self) {
        let _guard = self.write_lock.lock().expect("registry write lock poisoned");
        self.providers.store(Arc::new(Vec::new()));
    }
}
