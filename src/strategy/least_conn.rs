//! Least-load selection strategies.

use crate::provider::{ProviderInstance, SelectionContext};
use crate::strategy::{first_min_by, SelectionStrategy};

/// Least connections selector.
/// Selects the candidate with the minimum number of in-flight requests.
#[derive(Debug, Default)]
pub struct LeastConnections;

impl LeastConnections {
    pub fn new() -> Self {
        Self
    }
}

impl SelectionStrategy for LeastConnections {
    fn select<'a>(
        &self,
        candidates: &'a [ProviderInstance],
        _context: &SelectionContext,
    ) -> Option<&'a ProviderInstance> {
        // In case of tie, the first one is selected (stability)
        candidates.iter().min_by_key(|c| c.current_connections)
    }
}

/// Selects the candidate with the lowest average response time.
#[derive(Debug, Default)]
pub struct LeastResponseTime;

impl LeastResponseTime {
    pub fn new() -> Self {
        Self
    }
}

impl SelectionStrategy for LeastResponseTime {
    fn select<'a>(
        &self,
        candidates: &'a [ProviderInstance],
        _context: &SelectionContext,
    ) -> Option<&'a ProviderInstance> {
        first_min_by(candidates, |c| c.metrics.avg_response_time_ms)
    }
}

/// Selects the candidate minimising `connections / weight`.
#[derive(Debug, Default)]
pub struct WeightedLeastConnections;

impl WeightedLeastConnections {
    pub fn new() -> Self {
        Self
    }
}

impl SelectionStrategy for WeightedLeastConnections {
    fn select<'a>(
        &self,
        candidates: &'a [ProviderInstance],
        _context: &SelectionContext,
    ) -> Option<&'a ProviderInstance> {
        let first = candidates.first()?;
        if candidates.iter().all(|c| c.weight == 0) {
            return Some(first);
        }

        first_min_by(candidates, |c| {
            if c.weight == 0 {
                f64::INFINITY
            } else {
                c.current_connections as f64 / f64::from(c.weight)
            }
        })
    }
}
