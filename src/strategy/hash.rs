//! Hash-based selection.
//!
//! Gives stateless affinity: the same key maps to the same candidate for as
//! long as the candidate list is unchanged.

use crate::provider::{ProviderInstance, SelectionContext};
use crate::strategy::SelectionStrategy;

/// DJB2 rolling hash.
pub fn djb2(key: &str) -> u32 {
    key.bytes()
        .fold(5381u32, |hash, b| hash.wrapping_mul(33).wrapping_add(u32::from(b)))
}

/// Selects `candidates[djb2(key) % len]` where key is the session key,
/// client address or request id, in that order of preference.
#[derive(Debug, Default)]
pub struct HashAffinity;

impl HashAffinity {
    pub fn new() -> Self {
        Self
    }
}

impl SelectionStrategy for HashAffinity {
    fn select<'a>(
        &self,
        candidates: &'a [ProviderInstance],
        context: &SelectionContext,
    ) -> Option<&'a ProviderInstance> {
        if candidates.is_empty() {
            return None;
        }
        let index = djb2(&context.affinity_key()) as usize % candidates.len();
        candidates.get(index)
    }
}
