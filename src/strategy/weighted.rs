//! Weighted random selection (serves both weighted round-robin and weighted random).

use rand::Rng;

use crate::provider::{ProviderInstance, SelectionContext};
use crate::strategy::SelectionStrategy;

/// Weight-proportional random selector.
///
/// Draws a point in `[0, total_weight)` and walks the candidates subtracting
/// each weight until the remainder goes non-positive.
#[derive(Debug, Default)]
pub struct WeightedRandom;

impl WeightedRandom {
    pub fn new() -> Self {
        Self
    }

    /// Pick using a caller-supplied point in `[0, total_weight)`.
    pub(crate) fn pick(candidates: &[ProviderInstance], point: f64) -> Option<&ProviderInstance> {
        let first = candidates.first()?;
        let mut remaining = point;
        for candidate in candidates {
            remaining -= f64::from(candidate.weight);
            if remaining <= 0.0 {
                return Some(candidate);
            }
        }
        // Floating-point edge case: the point survived every subtraction.
        Some(first)
    }
}

impl SelectionStrategy for WeightedRandom {
    fn select<'a>(
        &self,
        candidates: &'a [ProviderInstance],
        _context: &SelectionContext,
    ) -> Option<&'a ProviderInstance> {
        let first = candidates.first()?;

        let total_weight: f64 = candidates.iter().map(|c| f64::from(c.weight)).sum();
        if total_weight <= 0.0 {
            return Some(first);
        }

        let point = rand::thread_rng().gen_range(0.0..total_weight);
        Self::pick(candidates, point)
    }
}
